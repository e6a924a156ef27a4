use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use stagecast_services::media::MediaError;
use stagecast_services::media::signaling::{ClientEnvelope, ClientSignal, ServerSignal};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::storage::WsSender;
use crate::state::AppState;

pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(connection_id, "signaling channel connected");

    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));
    state.ws_storage.add(connection_id.clone(), sender.clone());

    // Tell the client its channel id before anything else
    {
        let hello = serde_json::json!({
            "type": "connected",
            "data": { "connectionId": connection_id },
        });
        let mut guard = sender.lock().await;
        let _ = guard.send(Message::text(hello.to_string())).await;
    }

    // Inbound messages are handled strictly in order; the handshake
    // protocol depends on it (produce must observe a connected transport).
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_client_message(&state, &connection_id, &sender, &text).await;
            }
            Ok(Message::Ping(data)) => {
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(connection_id, %e, "signaling channel error");
                break;
            }
            _ => {}
        }
    }

    // Disconnect is authoritative cleanup; in-flight work for this
    // connection is never awaited.
    state.ws_storage.remove(&connection_id);
    state.orchestrator.disconnect(&connection_id).await;
    info!(connection_id, "signaling channel disconnected");
}

async fn handle_client_message(
    state: &AppState,
    connection_id: &str,
    sender: &WsSender,
    text: &str,
) {
    let envelope: ClientEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(connection_id, %e, "unrecognized signaling message");
            send_event(
                sender,
                &ServerSignal::Error {
                    message: "unrecognized message".to_string(),
                },
            )
            .await;
            return;
        }
    };

    let id = envelope.id;
    let result = dispatch(state, connection_id, envelope.signal).await;
    match (id, result) {
        (Some(id), Ok(payload)) => send_reply(sender, id, payload).await,
        (Some(id), Err(e)) => {
            send_reply(sender, id, serde_json::json!({ "error": e.to_string() })).await;
        }
        (None, Ok(_)) => {}
        (None, Err(e)) => {
            send_event(
                sender,
                &ServerSignal::Error {
                    message: e.to_string(),
                },
            )
            .await;
        }
    }
}

async fn dispatch(
    state: &AppState,
    connection_id: &str,
    signal: ClientSignal,
) -> Result<serde_json::Value, MediaError> {
    match signal {
        ClientSignal::JoinRoom { room_id, name, role } => to_value(
            state
                .orchestrator
                .join_room(connection_id, &room_id, &name, role)
                .await?,
        ),
        ClientSignal::LeaveRoom {} => {
            state.orchestrator.disconnect(connection_id).await;
            Ok(serde_json::Value::Null)
        }
        ClientSignal::CreateTransport { direction } => to_value(
            state
                .orchestrator
                .create_transport(connection_id, direction)
                .await?,
        ),
        ClientSignal::ConnectTransport {
            transport_id,
            dtls_parameters,
        } => to_value(
            state
                .orchestrator
                .connect_transport(connection_id, &transport_id, dtls_parameters)
                .await?,
        ),
        ClientSignal::Produce {
            transport_id,
            kind,
            rtp_parameters,
        } => to_value(
            state
                .orchestrator
                .produce(connection_id, &transport_id, kind, rtp_parameters)
                .await?,
        ),
        ClientSignal::Consume {
            producer_id,
            rtp_capabilities,
        } => to_value(
            state
                .orchestrator
                .consume(connection_id, &producer_id, rtp_capabilities)
                .await?,
        ),
        ClientSignal::CloseProducer { producer_id } => {
            state
                .orchestrator
                .close_producer(connection_id, &producer_id)
                .await?;
            Ok(serde_json::json!({}))
        }
        ClientSignal::StartHls { room_id } => {
            state.orchestrator.start_hls(connection_id, &room_id).await?;
            Ok(serde_json::json!({}))
        }
        ClientSignal::StopHls { room_id } => {
            state.orchestrator.stop_hls(connection_id, &room_id).await?;
            Ok(serde_json::json!({}))
        }
    }
}

fn to_value<T: Serialize>(payload: T) -> Result<serde_json::Value, MediaError> {
    serde_json::to_value(payload).map_err(|e| MediaError::Internal(e.to_string()))
}

async fn send_reply(sender: &WsSender, id: u64, data: serde_json::Value) {
    let message = serde_json::json!({ "id": id, "type": "response", "data": data });
    let mut guard = sender.lock().await;
    let _ = guard.send(Message::text(message.to_string())).await;
}

async fn send_event(sender: &WsSender, signal: &ServerSignal) {
    let Ok(message) = serde_json::to_value(signal) else {
        return;
    };
    let mut guard = sender.lock().await;
    let _ = guard.send(Message::text(message.to_string())).await;
}
