use axum::extract::ws::Message;
use futures::SinkExt;
use stagecast_services::media::signaling::OutboundEvent;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::storage::WsStorage;

/// Sends a JSON message to every listed connection.
pub async fn broadcast(
    ws_storage: &WsStorage,
    connection_ids: &[String],
    message: &serde_json::Value,
) {
    let text = serde_json::to_string(message).unwrap_or_default();

    for connection_id in connection_ids {
        let Some(sender) = ws_storage.get(connection_id) else {
            continue;
        };
        let mut guard = sender.lock().await;
        if let Err(e) = guard.send(Message::text(text.clone())).await {
            warn!(connection_id, %e, "Failed to send WS message");
        }
    }
}

/// Pumps orchestrator fan-out events onto the sockets. Per-connection
/// request replies bypass this path, so cross-connection broadcast ordering
/// is unspecified.
pub fn spawn_event_pump(
    ws_storage: Arc<WsStorage>,
    mut events_rx: mpsc::UnboundedReceiver<OutboundEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            let message = match serde_json::to_value(&event.signal) {
                Ok(message) => message,
                Err(e) => {
                    warn!(%e, "unserializable signal");
                    continue;
                }
            };
            broadcast(&ws_storage, &event.targets, &message).await;
        }
        debug!("event pump stopped");
    });
}
