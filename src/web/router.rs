//! Web application router and middleware setup.

use crate::web::config::WebConfig;
use crate::web::{handlers, stream, websocket, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Create the main axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, state: AppState) -> Router {
    let mut app = Router::new()
        // GPIO routes; the literal status path wins over the state capture
        .route(
            "/gpio/led/status",
            get(handlers::led_status).post(handlers::set_led_status),
        )
        .route("/gpio/led/:state", post(handlers::set_led))
        // Camera routes
        .route("/camera/capture", get(handlers::capture))
        .route("/camera/stream", get(stream::mjpeg_stream))
        // Telemetry
        .route("/ws/status", get(websocket::status_handler))
        .route("/api/status", get(handlers::status))
        .route("/api/health", get(handlers::health_check));

    app = match custom_index(config) {
        Some((static_path, index_file)) => {
            info!("Serving static files from: {:?}", static_path);
            app.nest_service("/static", ServeDir::new(static_path))
                .route_service("/", ServeFile::new(index_file))
        }
        None => app.route("/", get(handlers::default_index)),
    };

    // Add middleware layers
    let service_builder = ServiceBuilder::new().layer(TraceLayer::new_for_http());

    // Add CORS if enabled
    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(service_builder).with_state(state)
}

/// The configured static directory and its `index.html`, if both exist.
fn custom_index(config: &WebConfig) -> Option<(PathBuf, PathBuf)> {
    let static_path = PathBuf::from(config.static_path.as_ref()?);
    if !static_path.is_dir() {
        warn!(
            "Static path {:?} does not exist, serving built-in control page",
            static_path
        );
        return None;
    }

    let index_file = static_path.join("index.html");
    if !index_file.is_file() {
        warn!(
            "No index.html in {:?}, serving built-in control page",
            static_path
        );
        return None;
    }
    Some((static_path, index_file))
}
