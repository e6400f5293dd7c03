//! Hardware and sampling configuration.
//!
//! Values come from an optional TOML file and are then overridden by CLI flags.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Shortest telemetry period accepted from configuration.
pub const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

/// Sensor output size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl FromStr for Resolution {
    type Err = GatewayError;

    /// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once(|c| c == 'x' || c == 'X')
            .ok_or_else(|| GatewayError::config_error(format!("Invalid resolution: {}", s)))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<u32>()
                .map_err(|e| GatewayError::config_error(format!("Invalid resolution {}: {}", s, e)))
        };
        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

/// Still image encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            other => Err(GatewayError::config_error(format!(
                "Unsupported image format: {}. Use 'png' or 'jpeg'",
                other
            ))),
        }
    }
}

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CameraBackend {
    /// Raw YUV420 frames read from `rpicam-vid` stdout
    Rpicam,
    /// Synthetic frames, no hardware required
    TestPattern,
}

impl FromStr for CameraBackend {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rpicam" | "libcamera" => Ok(Self::Rpicam),
            "test-pattern" | "test" => Ok(Self::TestPattern),
            other => Err(GatewayError::config_error(format!(
                "Unknown camera backend: {}. Use 'rpicam' or 'test-pattern'",
                other
            ))),
        }
    }
}

/// Configuration for the GPIO line, camera and telemetry sampler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// GPIO chip index
    pub chip: u8,
    /// BCM pin number of the output line
    pub pin: u8,
    /// Camera output size
    pub resolution: Resolution,
    /// Telemetry sampling interval in seconds
    pub interval_seconds: f64,
    /// Target capture rate of the continuous feed
    pub framerate: u32,
    /// Default encoding for still captures
    pub still_format: ImageFormat,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    /// How long a still capture waits for the device before failing busy
    pub capture_timeout_ms: u64,
    /// Frames buffered per stream subscriber before the oldest is dropped
    pub stream_queue_depth: usize,
    /// Camera backend
    pub camera: CameraBackend,
    /// Command used by the rpicam backend
    pub rpicam_command: String,
    /// Thermal zone file reporting millidegrees Celsius
    pub thermal_path: String,
    /// Mount point whose usage is reported as disk_percent
    pub disk_mount: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            chip: 0,
            pin: crate::DEFAULT_LED_PIN,
            resolution: Resolution::default(),
            interval_seconds: crate::DEFAULT_INTERVAL_SECS,
            framerate: 15,
            still_format: ImageFormat::Jpeg,
            jpeg_quality: 80,
            capture_timeout_ms: 2000,
            stream_queue_depth: 4,
            camera: CameraBackend::Rpicam,
            rpicam_command: "rpicam-vid".to_string(),
            thermal_path: "/sys/class/thermal/thermal_zone0/temp".to_string(),
            disk_mount: "/".to_string(),
        }
    }
}

impl DeviceConfig {
    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            GatewayError::config_error(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable before touching hardware.
    pub fn validate(&self) -> Result<()> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return Err(GatewayError::config_error("Resolution must be non-zero"));
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(GatewayError::config_error(format!(
                "Resolution {}x{} must have even dimensions",
                width, height
            )));
        }
        match Duration::try_from_secs_f64(self.interval_seconds) {
            Ok(interval) if interval >= MIN_SAMPLE_INTERVAL => {}
            _ => {
                return Err(GatewayError::config_error(format!(
                    "Sampling interval must be a finite number of seconds >= {}, got {}",
                    MIN_SAMPLE_INTERVAL.as_secs_f64(),
                    self.interval_seconds
                )));
            }
        }
        if self.framerate == 0 {
            return Err(GatewayError::config_error("Framerate must be non-zero"));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(GatewayError::config_error(format!(
                "JPEG quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        if self.stream_queue_depth == 0 {
            return Err(GatewayError::config_error("Stream queue depth must be non-zero"));
        }
        Ok(())
    }

    pub fn with_pin(mut self, chip: u8, pin: u8) -> Self {
        self.chip = chip;
        self.pin = pin;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_interval_seconds(mut self, interval_seconds: f64) -> Self {
        self.interval_seconds = interval_seconds;
        self
    }

    pub fn with_camera(mut self, camera: CameraBackend) -> Self {
        self.camera = camera;
        self
    }

    pub fn with_still_format(mut self, format: ImageFormat) -> Self {
        self.still_format = format;
        self
    }

    pub fn with_capture_timeout(mut self, timeout: Duration) -> Self {
        self.capture_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_stream_queue_depth(mut self, depth: usize) -> Self {
        self.stream_queue_depth = depth;
        self
    }

    /// Sampling period, clamped to [`MIN_SAMPLE_INTERVAL`]. Values `validate`
    /// rejects fall back to the default interval.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_seconds)
            .map(|interval| interval.max(MIN_SAMPLE_INTERVAL))
            .unwrap_or_else(|_| Duration::from_secs_f64(crate::DEFAULT_INTERVAL_SECS))
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.framerate as f64)
    }
}
