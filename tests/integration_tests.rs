//! End-to-end tests against the full router with simulated hardware.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use pi_device_gateway::camera::{DeviceProbe, TestPatternDevice};
use pi_device_gateway::gpio::{LineProbe, MemoryLine};
use pi_device_gateway::metrics::StaticSource;
use pi_device_gateway::web::{create_app, stream::MJPEG_CONTENT_TYPE};
use pi_device_gateway::{AppState, DeviceConfig, DeviceHub, Resolution, WebConfig};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

struct TestGateway {
    app: Router,
    hub: Arc<DeviceHub>,
    line: LineProbe,
    camera: DeviceProbe,
}

/// A gateway whose thermal sensor is missing.
fn gateway() -> TestGateway {
    let config = DeviceConfig::default()
        .with_resolution(Resolution::new(64, 48))
        .with_interval_seconds(0.05);

    let line = MemoryLine::new(config.pin);
    let line_probe = line.probe();
    let device = TestPatternDevice::new(config.resolution).with_frame_time(Duration::from_millis(20));
    let camera_probe = device.probe();

    let hub = Arc::new(DeviceHub::with_parts(
        config,
        Box::new(line),
        Box::new(device),
        Box::new(StaticSource::healthy().without_temperature()),
    ));
    let app = create_app(&WebConfig::default(), AppState::new(hub.clone()));

    TestGateway {
        app,
        hub,
        line: line_probe,
        camera: camera_probe,
    }
}

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, axum::response::Response) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    (response.status(), response)
}

async fn json(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let (status, response) = send(app, method, uri).await;
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_led_on_then_status() {
    let gw = gateway();

    let (status, body) = json(&gw.app, Method::POST, "/gpio/led/on").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "led": "on", "success": true }));
    assert!(gw.line.level());

    let (status, body) = json(&gw.app, Method::GET, "/gpio/led/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "led": "on" }));

    let (_, body) = json(&gw.app, Method::POST, "/gpio/led/off").await;
    assert_eq!(body["led"], "off");
    let (_, body) = json(&gw.app, Method::GET, "/gpio/led/status").await;
    assert_eq!(body["led"], "off");
}

#[tokio::test]
async fn test_invalid_led_state_leaves_pin_untouched() {
    let gw = gateway();
    json(&gw.app, Method::POST, "/gpio/led/on").await;
    let writes = gw.line.writes();

    let (status, body) = json(&gw.app, Method::POST, "/gpio/led/invalid").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({ "error": "Invalid state. Use 'on' or 'off'" })
    );
    assert_eq!(gw.line.writes(), writes);

    let (_, body) = json(&gw.app, Method::GET, "/gpio/led/status").await;
    assert_eq!(body["led"], "on");
}

#[tokio::test]
async fn test_led_hardware_failure_is_500() {
    let gw = gateway();
    gw.line.set_failing(true);

    let (status, body) = json(&gw.app, Method::POST, "/gpio/led/on").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["led"], "on");
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("GPIO17"));

    let (_, body) = json(&gw.app, Method::GET, "/gpio/led/status").await;
    assert_eq!(body["led"], "off");
}

#[tokio::test]
async fn test_post_to_status_path_is_an_invalid_state() {
    let gw = gateway();
    let (status, body) = json(&gw.app, Method::POST, "/gpio/led/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({ "error": "Invalid state. Use 'on' or 'off'" })
    );
    assert_eq!(gw.line.writes(), 0);

    let (status, body) = json(&gw.app, Method::GET, "/gpio/led/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["led"], "off");
}

#[tokio::test]
async fn test_capture_formats() {
    let gw = gateway();

    let (status, response) = send(&gw.app, Method::GET, "/camera/capture?format=png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let png = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

    // Default format is the configured one (jpeg)
    let (status, response) = send(&gw.app, Method::GET, "/camera/capture").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let jpeg = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

    let (status, body) = json(&gw.app, Method::GET, "/camera/capture?format=gif").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("gif"));
}

#[tokio::test]
async fn test_capture_during_open_stream() {
    let gw = gateway();

    let (status, response) = send(&gw.app, Method::GET, "/camera/stream").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], MJPEG_CONTENT_TYPE);
    let mut parts = response.into_body().into_data_stream();

    let first = tokio::time::timeout(Duration::from_secs(2), parts.next())
        .await
        .expect("first part should arrive")
        .unwrap()
        .unwrap();
    assert!(first.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
    assert!(first.ends_with(b"\r\n"));
    assert!(gw.hub.broker().is_streaming());

    let (status, response) = send(&gw.app, Method::GET, "/camera/capture?format=png").await;
    assert_eq!(status, StatusCode::OK);
    let png = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&png[1..4], b"PNG");

    // The stream keeps flowing after the still
    let next = tokio::time::timeout(Duration::from_secs(2), parts.next())
        .await
        .expect("stream should continue")
        .unwrap()
        .unwrap();
    assert!(next.starts_with(b"--frame"));

    // Closing the last viewer stops the feed
    drop(parts);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(gw.hub.broker().subscriber_count(), 0);
    assert!(!gw.hub.broker().is_streaming());
    let captures = gw.camera.captures();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(gw.camera.captures(), captures);
}

#[tokio::test]
async fn test_closing_subscribers_ends_stream() {
    let gw = gateway();
    let (_, response) = send(&gw.app, Method::GET, "/camera/stream").await;
    let mut parts = response.into_body().into_data_stream();
    parts.next().await.unwrap().unwrap();

    gw.hub.close_subscribers().await;

    let ended = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(part) = parts.next().await {
            part.unwrap();
        }
    })
    .await;
    assert!(ended.is_ok(), "stream body should finish after shutdown");

    let (status, _) = send(&gw.app, Method::GET, "/camera/stream").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_health_and_status() {
    let gw = gateway();

    let (status, body) = json(&gw.app, Method::GET, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "pi-device-gateway");

    let (status, body) = json(&gw.app, Method::GET, "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["cpu_temperature"].is_null());
    assert_eq!(body["cpu_cores"], 4);
    assert_eq!(body["led"], "off");
}

#[tokio::test]
async fn test_default_index_page() {
    let gw = gateway();
    let (status, response) = send(&gw.app, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    let html = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8_lossy(&html);
    assert!(html.contains("/ws/status"));
    assert!(html.contains("/camera/stream"));
}

#[tokio::test]
async fn test_status_websocket_reports_null_temperature() {
    let gw = gateway();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = gw.app.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/status", addr))
        .await
        .expect("websocket should connect");

    let message = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("sample should arrive")
        .unwrap()
        .unwrap();
    let sample: Value = match message {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected text message, got {:?}", other),
    };
    assert!(sample["cpu_temperature"].is_null());
    assert_eq!(sample["cpu_percent"], 12.5);
    assert_eq!(sample["pin_state"]["pin"], 17);
    assert!(sample["timestamp"].as_u64().unwrap() > 0);
    assert_eq!(gw.hub.telemetry().subscriber_count(), 1);

    // Closing the socket unsubscribes
    ws.close(None).await.unwrap();
    let unsubscribed = tokio::time::timeout(Duration::from_secs(2), async {
        while gw.hub.telemetry().subscriber_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(unsubscribed.is_ok());
}

#[tokio::test]
async fn test_status_websocket_ends_on_shutdown() {
    let gw = gateway();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = gw.app.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws/status", addr))
        .await
        .unwrap();
    ws.next().await.unwrap().unwrap();

    gw.hub.shutdown().await;

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(Ok(message)) = ws.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    let _ = ws.send(Message::Close(None)).await;
}
