//! WebSocket handler for live telemetry on `/ws/status`.

use crate::error::SubscriberIoError;
use crate::fanout::{Connection, SubscriberId};
use crate::metrics::TelemetrySample;
use crate::web::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error};

/// WebSocket upgrade handler.
pub async fn status_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_status_socket(socket, state))
}

/// Push one JSON sample per telemetry tick until either side goes away.
async fn handle_status_socket(socket: WebSocket, state: AppState) {
    let mut connection = Connection::new("status");
    let id = connection.id();
    let mut subscriber = state.hub.telemetry().subscribe();
    connection.activate();

    let (mut sender, mut receiver) = socket.split();

    // Spawn a task to watch for the client closing
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    debug!("Status client {} sent close", id);
                    break;
                }
                Ok(_) => {
                    debug!("Ignoring message from status client {}", id);
                }
                Err(e) => {
                    debug!("Status client {} read error: {}", id, e);
                    break;
                }
            }
        }
    });

    // Spawn a task to send samples to the client
    let mut send_task = tokio::spawn(async move {
        while let Some(sample) = subscriber.next_sample().await {
            match send_sample(&mut sender, id, &sample).await {
                Ok(()) => {}
                Err(e @ SubscriberIoError::Serialize { .. }) => {
                    error!("{}", e);
                }
                Err(e) => return Err(e),
            }
        }
        // Sampler shut down; a failed close means the client is already gone
        let _ = sender.send(Message::Close(None)).await;
        Ok(())
    });

    // Wait for either task to complete
    let outcome = tokio::select! {
        sent = &mut send_task => sent,
        _ = &mut recv_task => {
            send_task.abort();
            Ok(Ok(()))
        }
    };
    recv_task.abort();

    match outcome {
        Ok(Ok(())) => {
            connection.disconnect();
        }
        Ok(Err(e)) => {
            connection.fail(e);
        }
        Err(e) if e.is_cancelled() => {
            connection.disconnect();
        }
        Err(e) => {
            connection.fail(e);
        }
    }
}

async fn send_sample(
    sender: &mut SplitSink<WebSocket, Message>,
    id: SubscriberId,
    sample: &TelemetrySample,
) -> Result<(), SubscriberIoError> {
    let json = serde_json::to_string(sample).map_err(|source| SubscriberIoError::Serialize {
        id: id.to_string(),
        source,
    })?;

    sender
        .send(Message::Text(json))
        .await
        .map_err(|e| SubscriberIoError::Write {
            id: id.to_string(),
            reason: e.to_string(),
        })
}
