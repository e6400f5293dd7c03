//! Construction and teardown of the hardware-facing components.

use crate::camera::{self, CameraDevice, CameraSession, FrameBroker};
use crate::config::DeviceConfig;
use crate::error::Result;
use crate::gpio::line::{open_default, OutputLine};
use crate::gpio::PinController;
use crate::metrics::{MetricSource, SystemCollector, TelemetrySampler};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Every device the gateway owns, shared with the web layer behind one `Arc`.
pub struct DeviceHub {
    config: DeviceConfig,
    pins: Arc<PinController>,
    camera: Arc<CameraSession>,
    broker: FrameBroker,
    telemetry: TelemetrySampler,
    shut_down: AtomicBool,
}

impl DeviceHub {
    /// Open the pin, camera and metric backends described by `config`.
    ///
    /// With `mock_gpio` the LED line is simulated in memory. Must be called
    /// from within a Tokio runtime.
    pub fn from_config(config: DeviceConfig, mock_gpio: bool) -> Result<Self> {
        config.validate()?;

        let line = open_default(config.chip, config.pin, mock_gpio)?;
        let device = camera::open_device(&config);
        let source = SystemCollector::new(&config.thermal_path, &config.disk_mount);

        info!(
            "Device hub ready: GPIO{} on chip {}, {:?} camera at {}x{}",
            config.pin, config.chip, config.camera, config.resolution.width, config.resolution.height
        );
        Ok(Self::with_parts(config, line, device, Box::new(source)))
    }

    /// Assemble a hub from already-open backends.
    pub fn with_parts(
        config: DeviceConfig,
        line: Box<dyn OutputLine>,
        device: Box<dyn CameraDevice>,
        source: Box<dyn MetricSource>,
    ) -> Self {
        let pins = Arc::new(PinController::new(config.pin, line));
        let camera = Arc::new(CameraSession::new(
            device,
            config.capture_timeout(),
            config.jpeg_quality,
        ));
        let broker = FrameBroker::new(camera.clone(), config.stream_queue_depth);
        let telemetry = TelemetrySampler::start(source, pins.clone(), config.interval());

        Self {
            config,
            pins,
            camera,
            broker,
            telemetry,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn pins(&self) -> &PinController {
        &self.pins
    }

    pub fn camera(&self) -> &CameraSession {
        &self.camera
    }

    pub fn broker(&self) -> &FrameBroker {
        &self.broker
    }

    pub fn telemetry(&self) -> &TelemetrySampler {
        &self.telemetry
    }

    /// End every stream and status subscription so open connections finish.
    pub async fn close_subscribers(&self) {
        self.telemetry.shutdown();
        self.broker.shutdown().await;
    }

    /// Stop all activity and release the hardware. Safe to call more than once.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down devices...");
        self.close_subscribers().await;
        self.camera.release(self.config.capture_timeout()).await;
        self.pins.shutdown().await;
        info!("Devices shut down");
    }
}

/// Resolves on Ctrl-C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
