//! Campaign request parsing and normalisation.
//!
//! Requests come from an operator and are never rejected: a missing,
//! unparsable or out-of-range value silently falls back to the board
//! default.

use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use shub_types::SelfCheckDefaults;

const FALLBACK_DELAY_US: u32 = 500;
const FALLBACK_ITERATIONS: u32 = 50;

/// Exclusive upper bound of the iteration count.
pub const MAX_ITERATIONS: i64 = 100;
/// Exclusive upper bound of the inter-iteration delay, µs.
pub const MAX_DELAY_US: i64 = 5000;

/// Raw operator request.  `None` means "use the default".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckRequest {
    pub delay_us: Option<i64>,
    pub iterations: Option<i64>,
}

impl CheckRequest {
    pub fn new(delay_us: i64, iterations: i64) -> Self {
        Self {
            delay_us: Some(delay_us),
            iterations: Some(iterations),
        }
    }
}

impl FromStr for CheckRequest {
    type Err = std::convert::Infallible;

    /// `"<delay_us>,<iterations>"`; either field may be blank or garbage.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(',').map(|f| f.trim().parse::<i64>().ok());
        Ok(Self {
            delay_us: fields.next().flatten(),
            iterations: fields.next().flatten(),
        })
    }
}

/// Validated campaign parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CheckParams {
    pub delay_us: u32,
    pub iterations: u32,
}

impl CheckParams {
    /// Apply the valid ranges (`delay_us` in (0, 5000), `iterations` in
    /// [1, 100)) and substitute defaults for anything outside them.
    pub fn normalize(request: CheckRequest, defaults: &SelfCheckDefaults) -> Self {
        let default_delay = in_delay_range(i64::from(defaults.delay_us))
            .unwrap_or(FALLBACK_DELAY_US);
        let default_iterations = in_iteration_range(i64::from(defaults.iterations))
            .unwrap_or(FALLBACK_ITERATIONS);
        Self {
            delay_us: request
                .delay_us
                .and_then(in_delay_range)
                .unwrap_or(default_delay),
            iterations: request
                .iterations
                .and_then(in_iteration_range)
                .unwrap_or(default_iterations),
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_micros(u64::from(self.delay_us))
    }
}

fn in_delay_range(v: i64) -> Option<u32> {
    (v > 0 && v < MAX_DELAY_US).then_some(v as u32)
}

fn in_iteration_range(v: i64) -> Option<u32> {
    (1..MAX_ITERATIONS).contains(&v).then_some(v as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(request: CheckRequest) -> CheckParams {
        CheckParams::normalize(request, &SelfCheckDefaults::default())
    }

    #[test]
    fn out_of_range_values_fall_back_to_defaults() {
        let params = normalize(CheckRequest::new(0, 500));
        assert_eq!(params, CheckParams { delay_us: 500, iterations: 50 });
    }

    #[test]
    fn range_bounds() {
        assert_eq!(normalize(CheckRequest::new(1, 1)), CheckParams { delay_us: 1, iterations: 1 });
        assert_eq!(
            normalize(CheckRequest::new(4999, 99)),
            CheckParams { delay_us: 4999, iterations: 99 }
        );
        assert_eq!(
            normalize(CheckRequest::new(5000, 100)),
            CheckParams { delay_us: 500, iterations: 50 }
        );
        assert_eq!(
            normalize(CheckRequest::new(-3, 0)),
            CheckParams { delay_us: 500, iterations: 50 }
        );
    }

    #[test]
    fn textual_request_tolerates_garbage() {
        let req: CheckRequest = "250, 10".parse().unwrap();
        assert_eq!(req, CheckRequest::new(250, 10));

        let req: CheckRequest = "fast,7".parse().unwrap();
        assert_eq!(normalize(req), CheckParams { delay_us: 500, iterations: 7 });

        let req: CheckRequest = "".parse().unwrap();
        assert_eq!(req, CheckRequest::default());
    }

    #[test]
    fn board_defaults_are_honoured_when_valid() {
        let defaults = SelfCheckDefaults {
            delay_us: 1000,
            iterations: 5,
            ..SelfCheckDefaults::default()
        };
        let params = CheckParams::normalize(CheckRequest::default(), &defaults);
        assert_eq!(params, CheckParams { delay_us: 1000, iterations: 5 });

        let broken = SelfCheckDefaults {
            delay_us: 0,
            iterations: 1000,
            ..SelfCheckDefaults::default()
        };
        let params = CheckParams::normalize(CheckRequest::default(), &broken);
        assert_eq!(params, CheckParams { delay_us: 500, iterations: 50 });
    }
}
