//! MJPEG streaming over `multipart/x-mixed-replace`.

use crate::camera::FrameSubscriber;
use crate::fanout::Connection;
use crate::web::AppState;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bytes::{BufMut, Bytes, BytesMut};
use futures_util::stream;
use serde_json::json;
use std::convert::Infallible;
use tracing::warn;

pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

/// Wrap one JPEG as a multipart part.
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
    part.put_slice(PART_HEADER);
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// A stream client: its subscription and connection state, ended together.
struct StreamClient {
    subscriber: FrameSubscriber,
    connection: Connection,
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.connection.disconnect();
    }
}

/// `GET /camera/stream`.
///
/// The body ends when the client goes away or the broker shuts down; either
/// way the subscription is dropped and the feed stops with its last viewer.
pub async fn mjpeg_stream(State(state): State<AppState>) -> Response {
    let mut connection = Connection::new("stream");
    let subscriber = match state.hub.broker().subscribe() {
        Ok(subscriber) => subscriber,
        Err(e) => {
            connection.fail(&e);
            warn!("Stream request rejected: {}", e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response();
        }
    };
    connection.activate();

    let client = StreamClient {
        subscriber,
        connection,
    };
    let parts = stream::unfold(client, |client| async move {
        let frame = client.subscriber.next_frame().await?;
        Some((Ok::<_, Infallible>(mjpeg_part(&frame.jpeg)), client))
    });

    (
        [
            (header::CONTENT_TYPE, MJPEG_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(parts),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_framing() {
        let part = mjpeg_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(part.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
        assert_eq!(part.len(), PART_HEADER.len() + 4 + 2);
    }
}
