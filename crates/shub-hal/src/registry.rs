//! [`SensorRegistry`] – sensor-type to codec lookup.
//!
//! Each sensor type the hub reports maps to one [`SensorCodec`] that knows
//! the sensor's human-readable name, how to decode its event payload and how
//! to render a decoded sample.  Types without a registered codec fall back to
//! [`RawCodec`], so lookups never fail.
//!
//! # Example
//!
//! ```
//! use shub_hal::registry::SensorRegistry;
//! use shub_types::SensorType;
//!
//! let registry = SensorRegistry::with_defaults();
//! assert_eq!(registry.name_of(SensorType::ACCELEROMETER), "accelerometer");
//!
//! let payload = [1u8, 0, 2, 0, 3, 0];
//! let line = registry.describe(SensorType::ACCELEROMETER, &payload);
//! assert_eq!(line, "accelerometer x=1 y=2 z=3");
//! ```

use std::collections::HashMap;

use shub_types::{HubError, SensorType};

/// A decoded sensor sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorSample {
    Axes([i16; 3]),
    /// Uncalibrated axes followed by the estimated bias.
    AxesWithBias([i16; 6]),
    Quaternion([i32; 4]),
    Scalar(i32),
    Counter(u64),
    Raw(Vec<u8>),
}

/// Decode/format capability pair for one sensor type.
pub trait SensorCodec: Send + Sync {
    /// Human-readable sensor name, e.g. `"gyroscope"`.
    fn name(&self) -> &str;

    /// Decode an event payload.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Decode`] when the payload is too short.
    fn decode(&self, sensor: SensorType, payload: &[u8]) -> Result<SensorSample, HubError>;

    /// Render a decoded sample on one line.
    fn format(&self, sample: &SensorSample) -> String;
}

fn need(sensor: SensorType, payload: &[u8], len: usize) -> Result<(), HubError> {
    if payload.len() < len {
        return Err(HubError::Decode {
            sensor,
            details: format!("expected {len} bytes, got {}", payload.len()),
        });
    }
    Ok(())
}

fn i16_at(payload: &[u8], i: usize) -> i16 {
    i16::from_le_bytes([payload[2 * i], payload[2 * i + 1]])
}

fn i32_at(payload: &[u8], i: usize) -> i32 {
    let b = &payload[4 * i..4 * i + 4];
    i32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

// ────────────────────────────────────────────────────────────────────────────
// Codecs
// ────────────────────────────────────────────────────────────────────────────

/// Three little-endian `i16` axes (accelerometer, gyroscope, magnetometer).
pub struct AxisCodec {
    name: &'static str,
}

impl AxisCodec {
    pub fn new(name: &'static str) -> Box<Self> {
        Box::new(Self { name })
    }
}

impl SensorCodec for AxisCodec {
    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, sensor: SensorType, payload: &[u8]) -> Result<SensorSample, HubError> {
        need(sensor, payload, 6)?;
        Ok(SensorSample::Axes([
            i16_at(payload, 0),
            i16_at(payload, 1),
            i16_at(payload, 2),
        ]))
    }

    fn format(&self, sample: &SensorSample) -> String {
        match sample {
            SensorSample::Axes([x, y, z]) => format!("{} x={x} y={y} z={z}", self.name),
            other => format!("{} {other:?}", self.name),
        }
    }
}

/// Six `i16` values: three raw axes then three bias terms.
pub struct UncalibratedAxisCodec {
    name: &'static str,
}

impl UncalibratedAxisCodec {
    pub fn new(name: &'static str) -> Box<Self> {
        Box::new(Self { name })
    }
}

impl SensorCodec for UncalibratedAxisCodec {
    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, sensor: SensorType, payload: &[u8]) -> Result<SensorSample, HubError> {
        need(sensor, payload, 12)?;
        let mut v = [0i16; 6];
        for (i, slot) in v.iter_mut().enumerate() {
            *slot = i16_at(payload, i);
        }
        Ok(SensorSample::AxesWithBias(v))
    }

    fn format(&self, sample: &SensorSample) -> String {
        match sample {
            SensorSample::AxesWithBias([x, y, z, bx, by, bz]) => {
                format!("{} x={x} y={y} z={z} bias=({bx},{by},{bz})", self.name)
            }
            other => format!("{} {other:?}", self.name),
        }
    }
}

/// Four `i32` quaternion components (rotation vectors).
pub struct QuaternionCodec {
    name: &'static str,
}

impl QuaternionCodec {
    pub fn new(name: &'static str) -> Box<Self> {
        Box::new(Self { name })
    }
}

impl SensorCodec for QuaternionCodec {
    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, sensor: SensorType, payload: &[u8]) -> Result<SensorSample, HubError> {
        need(sensor, payload, 16)?;
        Ok(SensorSample::Quaternion([
            i32_at(payload, 0),
            i32_at(payload, 1),
            i32_at(payload, 2),
            i32_at(payload, 3),
        ]))
    }

    fn format(&self, sample: &SensorSample) -> String {
        match sample {
            SensorSample::Quaternion([x, y, z, w]) => {
                format!("{} x={x} y={y} z={z} w={w}", self.name)
            }
            other => format!("{} {other:?}", self.name),
        }
    }
}

/// Single `i32` reading with a unit suffix.
pub struct ScalarCodec {
    name: &'static str,
    unit: &'static str,
}

impl ScalarCodec {
    pub fn new(name: &'static str, unit: &'static str) -> Box<Self> {
        Box::new(Self { name, unit })
    }
}

impl SensorCodec for ScalarCodec {
    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, sensor: SensorType, payload: &[u8]) -> Result<SensorSample, HubError> {
        need(sensor, payload, 4)?;
        Ok(SensorSample::Scalar(i32_at(payload, 0)))
    }

    fn format(&self, sample: &SensorSample) -> String {
        match sample {
            SensorSample::Scalar(v) => format!("{} {v}{}", self.name, self.unit),
            other => format!("{} {other:?}", self.name),
        }
    }
}

/// Monotonic `u64` counter (step counter).
pub struct CounterCodec {
    name: &'static str,
}

impl CounterCodec {
    pub fn new(name: &'static str) -> Box<Self> {
        Box::new(Self { name })
    }
}

impl SensorCodec for CounterCodec {
    fn name(&self) -> &str {
        self.name
    }

    fn decode(&self, sensor: SensorType, payload: &[u8]) -> Result<SensorSample, HubError> {
        need(sensor, payload, 8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(&payload[..8]);
        Ok(SensorSample::Counter(u64::from_le_bytes(b)))
    }

    fn format(&self, sample: &SensorSample) -> String {
        match sample {
            SensorSample::Counter(v) => format!("{} count={v}", self.name),
            other => format!("{} {other:?}", self.name),
        }
    }
}

/// Fallback for types without a dedicated codec: hex dump.
pub struct RawCodec;

impl SensorCodec for RawCodec {
    fn name(&self) -> &str {
        "unknown"
    }

    fn decode(&self, _sensor: SensorType, payload: &[u8]) -> Result<SensorSample, HubError> {
        Ok(SensorSample::Raw(payload.to_vec()))
    }

    fn format(&self, sample: &SensorSample) -> String {
        match sample {
            SensorSample::Raw(bytes) => {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{b:02x}")).collect();
                format!("raw [{}]", hex.join(" "))
            }
            other => format!("{other:?}"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────────────────────────────────────

/// Lookup table from [`SensorType`] to its [`SensorCodec`].
pub struct SensorRegistry {
    codecs: HashMap<SensorType, Box<dyn SensorCodec>>,
    fallback: RawCodec,
}

impl Default for SensorRegistry {
    fn default() -> Self {
        Self {
            codecs: HashMap::new(),
            fallback: RawCodec,
        }
    }
}

impl SensorRegistry {
    /// Create an empty registry (every type decodes as raw bytes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the well-known sensor types.
    pub fn with_defaults() -> Self {
        let mut r = Self::new();
        r.register(SensorType::ACCELEROMETER, AxisCodec::new("accelerometer"));
        r.register(SensorType::MAGNETOMETER, AxisCodec::new("magnetometer"));
        r.register(SensorType::GYROSCOPE, AxisCodec::new("gyroscope"));
        r.register(SensorType::LIGHT, ScalarCodec::new("light", "lux"));
        r.register(SensorType::PRESSURE, ScalarCodec::new("barometer", "Pa"));
        r.register(SensorType::PROXIMITY, ScalarCodec::new("proximity", ""));
        r.register(SensorType::GRAVITY, AxisCodec::new("gravity"));
        r.register(
            SensorType::LINEAR_ACCELERATION,
            AxisCodec::new("linear_acceleration"),
        );
        r.register(
            SensorType::ROTATION_VECTOR,
            QuaternionCodec::new("rotation_vector"),
        );
        r.register(
            SensorType::MAGNETOMETER_UNCALIBRATED,
            UncalibratedAxisCodec::new("magnetometer_uncalibrated"),
        );
        r.register(
            SensorType::GAME_ROTATION_VECTOR,
            QuaternionCodec::new("game_rotation_vector"),
        );
        r.register(
            SensorType::GYROSCOPE_UNCALIBRATED,
            UncalibratedAxisCodec::new("gyroscope_uncalibrated"),
        );
        r.register(
            SensorType::SIGNIFICANT_MOTION,
            ScalarCodec::new("significant_motion", ""),
        );
        r.register(
            SensorType::STEP_DETECTOR,
            ScalarCodec::new("step_detector", ""),
        );
        r.register(SensorType::STEP_COUNTER, CounterCodec::new("step_counter"));
        r.register(
            SensorType::GEOMAGNETIC_ROTATION_VECTOR,
            QuaternionCodec::new("geomagnetic_rotation_vector"),
        );
        r
    }

    /// Register a codec.  Any codec previously registered for `sensor` is
    /// replaced.
    pub fn register(&mut self, sensor: SensorType, codec: Box<dyn SensorCodec>) {
        self.codecs.insert(sensor, codec);
    }

    /// Codec for `sensor`, or the raw fallback.
    pub fn codec(&self, sensor: SensorType) -> &dyn SensorCodec {
        match self.codecs.get(&sensor) {
            Some(codec) => codec.as_ref(),
            None => &self.fallback,
        }
    }

    /// Human-readable name; unregistered types render as `sensor#N`.
    pub fn name_of(&self, sensor: SensorType) -> String {
        match self.codecs.get(&sensor) {
            Some(codec) => codec.name().to_string(),
            None => sensor.to_string(),
        }
    }

    /// Resolve a sensor by registered name or by number.
    pub fn lookup(&self, name: &str) -> Option<SensorType> {
        self.codecs
            .iter()
            .find(|(_, codec)| codec.name() == name)
            .map(|(sensor, _)| *sensor)
            .or_else(|| name.parse().ok())
    }

    /// Decode `payload` and render it, or describe why decoding failed.
    pub fn describe(&self, sensor: SensorType, payload: &[u8]) -> String {
        let codec = self.codec(sensor);
        match codec.decode(sensor, payload) {
            Ok(sample) => codec.format(&sample),
            Err(e) => format!("{} <{e}>", self.name_of(sensor)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_uncalibrated_gyroscope() {
        let registry = SensorRegistry::with_defaults();
        let mut payload = Vec::new();
        for v in [10i16, -20, 30, 1, 2, 3] {
            payload.extend_from_slice(&v.to_le_bytes());
        }
        let codec = registry.codec(SensorType::GYROSCOPE_UNCALIBRATED);
        let sample = codec
            .decode(SensorType::GYROSCOPE_UNCALIBRATED, &payload)
            .unwrap();
        assert_eq!(sample, SensorSample::AxesWithBias([10, -20, 30, 1, 2, 3]));
        assert_eq!(
            codec.format(&sample),
            "gyroscope_uncalibrated x=10 y=-20 z=30 bias=(1,2,3)"
        );
    }

    #[test]
    fn short_payload_is_a_decode_error() {
        let registry = SensorRegistry::with_defaults();
        let result = registry
            .codec(SensorType::PRESSURE)
            .decode(SensorType::PRESSURE, &[1, 2]);
        assert!(matches!(result, Err(HubError::Decode { .. })));
        assert!(registry.describe(SensorType::PRESSURE, &[1, 2]).starts_with("barometer <"));
    }

    #[test]
    fn unknown_type_falls_back_to_raw() {
        let registry = SensorRegistry::with_defaults();
        assert_eq!(registry.name_of(SensorType::new(42).unwrap()), "sensor#42");
        assert_eq!(registry.describe(SensorType::new(42).unwrap(), &[0xab, 0x01]), "raw [ab 01]");
    }

    #[test]
    fn lookup_by_name_or_number() {
        let registry = SensorRegistry::with_defaults();
        assert_eq!(registry.lookup("gyroscope"), Some(SensorType::GYROSCOPE));
        assert_eq!(registry.lookup("6"), Some(SensorType::PRESSURE));
        assert_eq!(registry.lookup("no_such_sensor"), None);
    }

    #[test]
    fn re_registering_replaces_codec() {
        let mut registry = SensorRegistry::with_defaults();
        registry.register(SensorType::LIGHT, ScalarCodec::new("ambient", "lux"));
        assert_eq!(registry.name_of(SensorType::LIGHT), "ambient");
    }
}
