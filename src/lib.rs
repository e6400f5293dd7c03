//! # Pi Device Gateway
//!
//! Exposes a Raspberry Pi's LED pin, camera and host telemetry over HTTP and
//! WebSocket. Built for a Raspberry Pi 5 running Raspberry Pi OS, with
//! hardware-free backends for development on any machine.
//!
//! ## Features
//!
//! - **GPIO control**: drive one output line on and off (rppal, feature-gated)
//! - **Still capture**: PNG or JPEG snapshots from the camera
//! - **MJPEG streaming**: one shared camera feed fanned out to every viewer
//! - **Live telemetry**: CPU, temperature, memory and disk pushed over WebSocket
//! - **Library + Binary**: use as a crate or standalone application
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pi_device_gateway::{start_web_server, DeviceConfig, DeviceHub, WebConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hub = DeviceHub::from_config(DeviceConfig::default(), true)?;
//!
//!     // Serve on port 8080 until Ctrl-C
//!     start_web_server(WebConfig::default(), hub).await?;
//!     Ok(())
//! }
//! ```

pub mod camera;
pub mod config;
pub mod error;
pub mod fanout;
pub mod gpio;
pub mod hub;
pub mod metrics;
pub mod web;

// Re-export public API
pub use camera::{CameraSession, FrameBroker, FrameSubscriber};
pub use config::{CameraBackend, DeviceConfig, ImageFormat, Resolution};
pub use error::{CaptureError, GatewayError, HardwareError, MetricUnavailable, Result};
pub use gpio::{PinController, PinState};
pub use hub::{shutdown_signal, DeviceHub};
pub use metrics::{SystemCollector, TelemetrySample, TelemetrySampler};
pub use web::{start_web_server, AppState, WebConfig};

/// The default LED output line (BCM numbering)
pub const DEFAULT_LED_PIN: u8 = 17;

/// The default telemetry interval in seconds
pub const DEFAULT_INTERVAL_SECS: f64 = 1.0;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;
