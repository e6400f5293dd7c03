//! HTTP handlers for the GPIO, camera and telemetry endpoints.

use crate::config::ImageFormat;
use crate::gpio::parse_level;
use crate::metrics::TelemetrySample;
use crate::web::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

/// Body returned for a state segment other than `on` or `off`.
pub const INVALID_STATE_ERROR: &str = "Invalid state. Use 'on' or 'off'";

/// `POST /gpio/led/{state}`.
///
/// An unknown state is reported in the body with status 200 and the pin is
/// left alone. A hardware failure is a 500.
pub async fn set_led(State(state): State<AppState>, Path(led): Path<String>) -> Response {
    let Some(level) = parse_level(&led) else {
        warn!("Rejected LED state {:?}", led);
        return Json(json!({ "error": INVALID_STATE_ERROR })).into_response();
    };

    match state.hub.pins().set(level).await {
        Ok(pin) => {
            info!("LED turned {}", pin.label());
            Json(json!({ "led": led, "success": true })).into_response()
        }
        Err(e) => {
            error!("Failed to turn LED {}: {}", led, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "led": led, "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `POST /gpio/led/status`. The literal status path shadows the `:state`
/// capture, so a POST there is treated as the state `status`.
pub async fn set_led_status(state: State<AppState>) -> Response {
    set_led(state, Path("status".to_string())).await
}

/// `GET /gpio/led/status`. Served from the cached state, never the hardware.
pub async fn led_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "led": state.hub.pins().get().label() }))
}

#[derive(Debug, Deserialize)]
pub struct CaptureParams {
    pub format: Option<String>,
}

/// `GET /camera/capture[?format=png|jpeg]`.
pub async fn capture(State(state): State<AppState>, Query(params): Query<CaptureParams>) -> Response {
    let format = match params.format.as_deref().map(str::parse::<ImageFormat>) {
        None => state.hub.config().still_format,
        Some(Ok(format)) => format,
        Some(Err(e)) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                .into_response();
        }
    };

    match state.hub.camera().capture_still(format).await {
        Ok(image) => ([(header::CONTENT_TYPE, format.content_type())], image).into_response(),
        Err(e) if e.is_busy() => {
            warn!("Still capture rejected: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Still capture failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// `GET /api/status`: one telemetry sample taken on demand.
pub async fn status(State(state): State<AppState>) -> Json<TelemetrySample> {
    Json(state.hub.telemetry().sample_now().await)
}

/// Health check endpoint.
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "pi-device-gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Serve the built-in control page when no static index is configured.
pub async fn default_index() -> Html<&'static str> {
    Html(DEFAULT_INDEX_HTML)
}

/// LED buttons, the live stream and the status feed on one page.
const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Pi Device Gateway</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            background: #1e1f26;
            color: #e8e8e8;
            margin: 0;
            padding: 20px;
        }

        .container {
            max-width: 960px;
            margin: 0 auto;
        }

        .grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(300px, 1fr));
            gap: 20px;
        }

        .card {
            background: #2a2c36;
            border-radius: 10px;
            padding: 20px;
        }

        .card h3 {
            margin-top: 0;
            color: #8fb4ff;
        }

        button {
            background: #4c6ef5;
            color: white;
            border: none;
            border-radius: 6px;
            padding: 10px 18px;
            margin-right: 8px;
            cursor: pointer;
        }

        img {
            width: 100%;
            border-radius: 6px;
            background: #000;
        }

        .metric {
            display: flex;
            justify-content: space-between;
            padding: 6px 0;
            border-bottom: 1px solid #3a3c48;
        }
    </style>
</head>
<body>
    <div class="container">
        <h1>Pi Device Gateway</h1>
        <div class="grid">
            <div class="card">
                <h3>LED</h3>
                <p>State: <strong id="led">unknown</strong></p>
                <button onclick="setLed('on')">On</button>
                <button onclick="setLed('off')">Off</button>
            </div>
            <div class="card">
                <h3>Status</h3>
                <div class="metric"><span>CPU</span><span id="cpu_percent">-</span></div>
                <div class="metric"><span>Cores</span><span id="cpu_cores">-</span></div>
                <div class="metric"><span>Model</span><span id="cpu_model">-</span></div>
                <div class="metric"><span>Temperature</span><span id="cpu_temperature">-</span></div>
                <div class="metric"><span>Memory</span><span id="memory_percent">-</span></div>
                <div class="metric"><span>Disk</span><span id="disk_percent">-</span></div>
                <p id="connection">Connecting...</p>
            </div>
            <div class="card">
                <h3>Camera</h3>
                <img src="/camera/stream" alt="camera stream">
                <p><a href="/camera/capture?format=png">Still (PNG)</a> | <a href="/camera/capture?format=jpeg">Still (JPEG)</a></p>
            </div>
        </div>
    </div>

    <script>
        const units = { cpu_percent: '%', cpu_temperature: ' °C', memory_percent: '%', disk_percent: '%' };

        function show(id, value) {
            const el = document.getElementById(id);
            if (value === null || value === undefined) {
                el.textContent = 'n/a';
            } else if (typeof value === 'number' && units[id]) {
                el.textContent = value.toFixed(1) + units[id];
            } else {
                el.textContent = value;
            }
        }

        async function setLed(state) {
            const res = await fetch('/gpio/led/' + state, { method: 'POST' });
            const body = await res.json();
            if (body.success) show('led', body.led);
        }

        fetch('/gpio/led/status').then(r => r.json()).then(b => show('led', b.led));

        function connect() {
            const proto = location.protocol === 'https:' ? 'wss:' : 'ws:';
            const ws = new WebSocket(proto + '//' + location.host + '/ws/status');
            ws.onopen = () => show('connection', 'Live');
            ws.onmessage = (event) => {
                const sample = JSON.parse(event.data);
                for (const key of Object.keys(units).concat(['cpu_cores', 'cpu_model'])) {
                    show(key, sample[key]);
                }
                show('led', sample.led);
            };
            ws.onclose = () => {
                show('connection', 'Disconnected, retrying...');
                setTimeout(connect, 3000);
            };
        }

        connect();
    </script>
</body>
</html>"#;
