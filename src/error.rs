//! Error handling for the Pi device gateway.
//!
//! Each hardware-facing component has its own error type so callers can tell a
//! pin failure from a busy camera. [`GatewayError`] wraps them for startup and
//! server-level plumbing.

use std::time::Duration;

/// A specialized `Result` type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// The top-level error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// GPIO line error
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Camera error
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

impl GatewayError {
    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Failure driving the GPIO output line.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum HardwareError {
    /// The line could not be claimed as an output
    #[error("failed to claim GPIO{pin} on chip {chip}: {reason}")]
    Open { chip: u8, pin: u8, reason: String },

    /// Writing a level to the line failed
    #[error("failed to write GPIO{pin}: {reason}")]
    Write { pin: u8, reason: String },

    /// The line was already released by shutdown
    #[error("GPIO{pin} has been released")]
    Released { pin: u8 },
}

/// Failure capturing or encoding a camera frame.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum CaptureError {
    /// Another capture held the device for longer than the allowed wait
    #[error("camera busy: device not available within {0:?}")]
    Busy(Duration),

    /// The sensor could not be opened or read
    #[error("camera unavailable: {0}")]
    Unavailable(String),

    /// A frame could not be converted to the requested format
    #[error("frame encoding failed: {0}")]
    Encode(String),

    /// The session has been shut down
    #[error("camera session closed")]
    Closed,
}

impl CaptureError {
    /// Whether the failure is transient contention rather than a device fault.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

/// Failure delivering to one subscriber. Never affects other subscribers.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberIoError {
    /// The client connection rejected a write
    #[error("write to subscriber {id} failed: {reason}")]
    Write { id: String, reason: String },

    /// The payload could not be serialized for the client
    #[error("failed to serialize payload for subscriber {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One telemetry field could not be read. The sample is still produced.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("metric {metric} unavailable: {reason}")]
pub struct MetricUnavailable {
    pub metric: &'static str,
    pub reason: String,
}

impl MetricUnavailable {
    pub fn new(metric: &'static str, reason: impl Into<String>) -> Self {
        Self {
            metric,
            reason: reason.into(),
        }
    }
}
