use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use shub_kernel::EventTap;
use shub_types::{EventKind, HubEvent, SensorType};

use super::CampaignCell;
use super::phases::ORDER_SENSORS;
use super::stats::{EventStats, EventSummary, OrderStats, OrderSummary};

/// What the tap currently accumulates besides ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) enum Collect {
    #[default]
    Nothing,
    Flushes,
    Timing,
}

#[derive(Default)]
struct TapState {
    collect: Collect,
    responses: BTreeMap<SensorType, u32>,
    expected_gap_us: BTreeMap<SensorType, u64>,
    events: BTreeMap<SensorType, EventStats>,
    order: BTreeMap<SensorType, OrderStats>,
}

/// Event observer installed on the hub for the duration of a campaign.
pub(super) struct CheckTap {
    state: Mutex<TapState>,
    campaign: Arc<CampaignCell>,
}

impl CheckTap {
    pub(super) fn new(campaign: Arc<CampaignCell>) -> Self {
        Self {
            state: Mutex::new(TapState::default()),
            campaign,
        }
    }

    pub(super) fn collect(&self, collect: Collect) {
        self.state.lock().collect = collect;
    }

    pub(super) fn expect_gap(&self, sensor: SensorType, gap_us: u64) {
        self.state.lock().expected_gap_us.insert(sensor, gap_us);
    }

    pub(super) fn responses(&self, sensor: SensorType) -> u32 {
        self.state.lock().responses.get(&sensor).copied().unwrap_or(0)
    }

    pub(super) fn event_summary(&self, sensor: SensorType) -> Option<EventSummary> {
        self.state.lock().events.get(&sensor).map(EventStats::summary)
    }

    pub(super) fn order_summary(&self, sensor: SensorType) -> Option<OrderSummary> {
        self.state.lock().order.get(&sensor).map(OrderStats::summary)
    }
}

impl EventTap for CheckTap {
    fn on_event(&self, event: &HubEvent) {
        let ordering = event.kind == EventKind::Data
            && ORDER_SENSORS.contains(&event.sensor)
            && self.campaign.is_ordering();

        let mut state = self.state.lock();
        if ordering {
            state
                .order
                .entry(event.sensor)
                .or_default()
                .observe(event.timestamp_ns);
        }
        match (state.collect, event.kind) {
            (Collect::Flushes, EventKind::FlushComplete) => {
                *state.responses.entry(event.sensor).or_default() += 1;
            }
            (Collect::Timing, EventKind::Data) => {
                if let Some(expected) = state.expected_gap_us.get(&event.sensor).copied() {
                    state
                        .events
                        .entry(event.sensor)
                        .or_default()
                        .observe(event.timestamp_ns, expected);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tap() -> (CheckTap, Arc<CampaignCell>) {
        let campaign = Arc::new(CampaignCell::default());
        campaign.try_begin().unwrap();
        (CheckTap::new(campaign.clone()), campaign)
    }

    #[test]
    fn order_events_counted_only_while_ordering() {
        let (tap, campaign) = tap();
        let acc = SensorType::ACCELEROMETER;

        tap.on_event(&HubEvent::data(acc, 100, Vec::new()));
        assert!(tap.order_summary(acc).is_none());

        campaign.set_ordering(true);
        for ts in [100, 50, 200] {
            tap.on_event(&HubEvent::data(acc, ts, Vec::new()));
        }
        // Flush markers and non-ordering sensors are ignored.
        tap.on_event(&HubEvent::flush_complete(acc, 1));
        tap.on_event(&HubEvent::data(SensorType::PRESSURE, 1, Vec::new()));

        let summary = tap.order_summary(acc).unwrap();
        assert_eq!(summary.violations, 1);
        assert_eq!(summary.last_violation, Some((100, 50)));
        assert_eq!(summary.valid, 1);
        assert!(tap.order_summary(SensorType::PRESSURE).is_none());
    }

    #[test]
    fn flush_markers_counted_only_in_flush_mode() {
        let (tap, _campaign) = tap();
        let gyro = SensorType::GYROSCOPE;
        tap.on_event(&HubEvent::flush_complete(gyro, 1));
        tap.collect(Collect::Flushes);
        tap.on_event(&HubEvent::flush_complete(gyro, 2));
        tap.on_event(&HubEvent::data(gyro, 3, Vec::new()));
        tap.collect(Collect::Nothing);
        tap.on_event(&HubEvent::flush_complete(gyro, 4));
        assert_eq!(tap.responses(gyro), 1);
    }

    #[test]
    fn timing_needs_an_expected_gap() {
        let (tap, _campaign) = tap();
        tap.collect(Collect::Timing);
        tap.expect_gap(SensorType::ACCELEROMETER, 5_000);
        for ms in [5u64, 10, 15] {
            tap.on_event(&HubEvent::data(SensorType::ACCELEROMETER, ms * 1_000_000, Vec::new()));
            tap.on_event(&HubEvent::data(SensorType::LIGHT, ms * 1_000_000, Vec::new()));
        }
        let acc = tap.event_summary(SensorType::ACCELEROMETER).unwrap();
        assert_eq!(acc.count, 2);
        assert_eq!(acc.rms_us, 0);
        assert!(tap.event_summary(SensorType::LIGHT).is_none());
    }
}
