//! Data structures for telemetry samples.

use crate::error::MetricUnavailable;
use crate::gpio::PinState;
use serde::{Deserialize, Serialize};

/// One telemetry tick as pushed to `/ws/status` clients.
///
/// Any metric that could not be read is `None` and serializes as `null`; a
/// reading of zero is a real zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Overall CPU usage percentage (0.0 to 100.0)
    pub cpu_percent: Option<f32>,
    /// Number of logical CPU cores
    pub cpu_cores: Option<u32>,
    /// CPU model name
    pub cpu_model: Option<String>,
    /// CPU temperature in Celsius
    pub cpu_temperature: Option<f32>,
    /// Memory usage percentage (0.0 to 100.0)
    pub memory_percent: Option<f32>,
    /// Usage percentage of the monitored filesystem (0.0 to 100.0)
    pub disk_percent: Option<f32>,
    /// Output line state at sampling time
    pub pin_state: PinState,
    /// `"on"` or `"off"`, mirroring `pin_state.level`
    pub led: String,
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
}

/// Raw results of one collection pass, before degradation to `None`.
#[derive(Debug, Clone)]
pub struct MetricReadings {
    pub cpu_percent: Result<f32, MetricUnavailable>,
    pub cpu_cores: Result<u32, MetricUnavailable>,
    pub cpu_model: Result<String, MetricUnavailable>,
    pub cpu_temperature: Result<f32, MetricUnavailable>,
    pub memory_percent: Result<f32, MetricUnavailable>,
    pub disk_percent: Result<f32, MetricUnavailable>,
}

impl MetricReadings {
    /// Every metric failed for the same reason, e.g. the collector crashed.
    pub fn unavailable(reason: &str) -> Self {
        Self {
            cpu_percent: Err(MetricUnavailable::new("cpu_percent", reason)),
            cpu_cores: Err(MetricUnavailable::new("cpu_cores", reason)),
            cpu_model: Err(MetricUnavailable::new("cpu_model", reason)),
            cpu_temperature: Err(MetricUnavailable::new("cpu_temperature", reason)),
            memory_percent: Err(MetricUnavailable::new("memory_percent", reason)),
            disk_percent: Err(MetricUnavailable::new("disk_percent", reason)),
        }
    }

    /// The metrics that failed in this pass.
    pub fn failures(&self) -> Vec<&MetricUnavailable> {
        [
            self.cpu_percent.as_ref().err(),
            self.cpu_cores.as_ref().err(),
            self.cpu_model.as_ref().err(),
            self.cpu_temperature.as_ref().err(),
            self.memory_percent.as_ref().err(),
            self.disk_percent.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

impl TelemetrySample {
    /// Combine readings with the pin state, stamping the current time.
    pub fn from_readings(readings: MetricReadings, pin_state: PinState) -> Self {
        Self {
            cpu_percent: readings.cpu_percent.ok(),
            cpu_cores: readings.cpu_cores.ok(),
            cpu_model: readings.cpu_model.ok(),
            cpu_temperature: readings.cpu_temperature.ok(),
            memory_percent: readings.memory_percent.ok(),
            disk_percent: readings.disk_percent.ok(),
            pin_state,
            led: pin_state.label().to_string(),
            timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }
}

/// Share of `total` taken by `used`, or `None` when there is nothing to measure.
pub(crate) fn percent(used: u64, total: u64) -> Option<f32> {
    (total > 0).then(|| (used as f64 / total as f64 * 100.0) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pin(level: bool) -> PinState {
        PinState { pin: 17, level }
    }

    #[test]
    fn test_failed_metric_becomes_null() {
        let mut readings = MetricReadings::unavailable("test");
        readings.cpu_percent = Ok(12.5);
        let sample = TelemetrySample::from_readings(readings, pin(true));

        assert_eq!(sample.cpu_percent, Some(12.5));
        assert_eq!(sample.cpu_temperature, None);
        assert_eq!(sample.led, "on");

        let json: serde_json::Value = serde_json::to_value(&sample).unwrap();
        assert!(json["cpu_temperature"].is_null());
        assert_eq!(json["cpu_percent"], 12.5);
        assert_eq!(json["pin_state"]["pin"], 17);
        assert_eq!(json["pin_state"]["level"], true);
        assert!(json["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_failures_lists_only_failed_metrics() {
        let mut readings = MetricReadings::unavailable("nope");
        readings.cpu_cores = Ok(4);
        readings.memory_percent = Ok(40.0);
        let names: Vec<_> = readings.failures().iter().map(|f| f.metric).collect();
        assert_eq!(
            names,
            vec!["cpu_percent", "cpu_model", "cpu_temperature", "disk_percent"]
        );
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(1, 4), Some(25.0));
        assert_eq!(percent(0, 0), None);
    }
}
