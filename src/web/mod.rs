//! Web server and API endpoints for the device gateway.
//!
//! REST endpoints drive the LED and take stills, `/camera/stream` serves an
//! MJPEG feed and `/ws/status` pushes live telemetry.

pub mod config;
pub mod handlers;
pub mod router;
pub mod stream;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::error::{GatewayError, Result};
use crate::hub::{shutdown_signal, DeviceHub};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<DeviceHub>,
}

impl AppState {
    pub fn new(hub: Arc<DeviceHub>) -> Self {
        Self { hub }
    }
}

/// Serve the gateway until Ctrl-C or SIGTERM, then release the hardware.
pub async fn start_web_server(config: WebConfig, hub: DeviceHub) -> Result<()> {
    let hub = Arc::new(hub);
    let app = create_app(&config, AppState::new(hub.clone()));

    // Parse the bind address
    let addr = config
        .bind_address()
        .parse::<SocketAddr>()
        .map_err(|e| GatewayError::config_error(format!("Invalid bind address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    info!("Starting device gateway on http://{}", addr);
    info!("Control page at http://{}/", addr);
    info!("MJPEG stream at http://{}/camera/stream", addr);
    info!("Status WebSocket at ws://{}/ws/status", addr);

    // Long-lived streams only end once their subscriptions are closed
    let signal_hub = hub.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            signal_hub.close_subscribers().await;
        })
        .await
        .map_err(|e| GatewayError::web_server_error(format!("Server error: {}", e)));

    hub.shutdown().await;
    served
}
