//! Typed power sample adapters.
//!
//! Session sources deliver power in different shapes: activity streams as
//! parallel arrays with gaps, or per-record device data where any field may be
//! missing. Each adapter validates once and yields canonical [`PowerSample`]s,
//! so the detection code only ever sees one shape.

use crate::PowerSample;
use serde::{Deserialize, Serialize};

/// Anything that can produce validated power samples.
pub trait SampleSource {
    /// Return samples with a timestamp and positive, finite power.
    /// Order is not guaranteed; detection sorts and de-duplicates.
    fn power_samples(&self) -> Vec<PowerSample>;
}

/// Activity streams: a start time plus parallel arrays of elapsed-second
/// offsets and watts. Dropouts appear as `None` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamData {
    /// Unix timestamp in milliseconds of the first stream entry
    pub start_time_ms: i64,
    /// Offset in seconds from `start_time_ms`
    pub time: Vec<Option<f64>>,
    pub watts: Vec<Option<f64>>,
}

impl SampleSource for StreamData {
    fn power_samples(&self) -> Vec<PowerSample> {
        self.time
            .iter()
            .zip(self.watts.iter())
            .filter_map(|(t, w)| {
                let offset = (*t)?;
                let watts = (*w)?;
                if !offset.is_finite() {
                    return None;
                }
                let sample = PowerSample::new(self.start_time_ms + (offset * 1000.0).round() as i64, watts);
                sample.is_valid().then_some(sample)
            })
            .collect()
    }
}

/// A per-record reading as logged by a head unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unix timestamp in milliseconds
    pub timestamp_ms: Option<i64>,
    pub power: Option<f64>,
}

impl SampleSource for [DeviceRecord] {
    fn power_samples(&self) -> Vec<PowerSample> {
        self.iter()
            .filter_map(|r| {
                let sample = PowerSample::new(r.timestamp_ms?, r.power?);
                sample.is_valid().then_some(sample)
            })
            .collect()
    }
}

impl SampleSource for Vec<DeviceRecord> {
    fn power_samples(&self) -> Vec<PowerSample> {
        self.as_slice().power_samples()
    }
}

impl SampleSource for [PowerSample] {
    fn power_samples(&self) -> Vec<PowerSample> {
        self.iter().copied().filter(PowerSample::is_valid).collect()
    }
}

impl SampleSource for Vec<PowerSample> {
    fn power_samples(&self) -> Vec<PowerSample> {
        self.as_slice().power_samples()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_data_skips_gaps() {
        let stream = StreamData {
            start_time_ms: 10_000,
            time: vec![Some(0.0), Some(1.0), None, Some(3.0), Some(4.0)],
            watts: vec![Some(200.0), None, Some(210.0), Some(0.0), Some(220.0)],
        };

        let samples = stream.power_samples();
        assert_eq!(samples, vec![PowerSample::new(10_000, 200.0), PowerSample::new(14_000, 220.0)]);
    }

    #[test]
    fn test_stream_data_uneven_arrays() {
        let stream = StreamData {
            start_time_ms: 0,
            time: vec![Some(0.0), Some(1.0), Some(2.0)],
            watts: vec![Some(150.0)],
        };
        assert_eq!(stream.power_samples().len(), 1);
    }

    #[test]
    fn test_device_records() {
        let records = vec![
            DeviceRecord { timestamp_ms: Some(1000), power: Some(180.0) },
            DeviceRecord { timestamp_ms: None, power: Some(180.0) },
            DeviceRecord { timestamp_ms: Some(3000), power: None },
            DeviceRecord { timestamp_ms: Some(4000), power: Some(f64::NAN) },
        ];
        assert_eq!(records.power_samples(), vec![PowerSample::new(1000, 180.0)]);
    }

    #[test]
    fn test_device_records_from_json() {
        let json = r#"[{"timestamp_ms": 1000, "power": 250.5}, {"timestamp_ms": 2000}]"#;
        let records: Vec<DeviceRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.power_samples().len(), 1);
    }
}
