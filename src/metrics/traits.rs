//! Traits for telemetry collection.

use crate::error::MetricUnavailable;
use crate::metrics::data::MetricReadings;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A source of host metrics.
///
/// `sample` may block (CPU usage needs two readings some time apart), so the
/// sampler always calls it from the blocking thread pool. Implementations
/// report each metric independently; one failing field must not fail the rest.
pub trait MetricSource: Send {
    fn sample(&mut self) -> MetricReadings;
}

/// Fixed readings, for tests and hosts without `/proc`.
#[derive(Debug, Clone)]
pub struct StaticSource {
    readings: MetricReadings,
    samples: Arc<AtomicUsize>,
}

impl StaticSource {
    /// A healthy four-core host.
    pub fn healthy() -> Self {
        Self {
            readings: MetricReadings {
                cpu_percent: Ok(12.5),
                cpu_cores: Ok(4),
                cpu_model: Ok("Cortex-A76".to_string()),
                cpu_temperature: Ok(48.3),
                memory_percent: Ok(35.0),
                disk_percent: Ok(61.2),
            },
            samples: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Same host with the thermal sensor missing.
    pub fn without_temperature(mut self) -> Self {
        self.readings.cpu_temperature = Err(MetricUnavailable::new(
            "cpu_temperature",
            "thermal zone not present",
        ));
        self
    }

    /// Number of times `sample` has been called, shared across clones.
    pub fn sample_count(&self) -> Arc<AtomicUsize> {
        self.samples.clone()
    }
}

impl MetricSource for StaticSource {
    fn sample(&mut self) -> MetricReadings {
        self.samples.fetch_add(1, Ordering::SeqCst);
        self.readings.clone()
    }
}
