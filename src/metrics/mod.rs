//! Host telemetry collection and periodic sampling.
//!
//! This module reads CPU usage, core count, model, temperature, memory and disk
//! usage from the Raspberry Pi and pushes one sample per interval to every
//! status subscriber. A metric that cannot be read is reported as `null`
//! rather than failing the sample.

pub mod collector;
pub mod data;
pub mod sampler;
pub mod traits;

// Re-export commonly used items
pub use collector::{read_temperature, SystemCollector};
pub use data::{MetricReadings, TelemetrySample};
pub use sampler::{TelemetrySampler, TelemetrySubscriber};
pub use traits::{MetricSource, StaticSource};
