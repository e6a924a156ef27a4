use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use super::test_app::TestApp;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimal signaling client: correlation-id requests plus an event buffer,
/// mirroring how the web client drives the protocol.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    pending: VecDeque<Value>,
    next_id: u64,
    pub connection_id: String,
}

impl WsClient {
    pub async fn connect(app: &TestApp) -> Self {
        let (stream, _) = connect_async(app.ws_url())
            .await
            .expect("Failed to open signaling channel");
        let mut client = Self {
            stream,
            pending: VecDeque::new(),
            next_id: 0,
            connection_id: String::new(),
        };

        let hello = client.next_message().await.expect("connected hello");
        assert_eq!(hello["type"], "connected");
        client.connection_id = hello["data"]["connectionId"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        client
    }

    /// Sends a request and returns the matching response payload. Events
    /// arriving in between are buffered for `event()`.
    pub async fn request(&mut self, message_type: &str, data: Value) -> Value {
        self.next_id += 1;
        let id = self.next_id;
        let envelope = serde_json::json!({ "id": id, "type": message_type, "data": data });
        self.stream
            .send(Message::text(envelope.to_string()))
            .await
            .expect("Failed to send request");

        loop {
            let message = self.next_message().await.expect("response");
            if message["type"] == "response" && message["id"] == id {
                return message["data"].clone();
            }
            self.pending.push_back(message);
        }
    }

    /// Fire-and-forget message (no reply expected).
    pub async fn emit(&mut self, message_type: &str, data: Value) {
        let envelope = serde_json::json!({ "type": message_type, "data": data });
        self.stream
            .send(Message::text(envelope.to_string()))
            .await
            .expect("Failed to send message");
    }

    /// Next event of the given type, buffered or fresh.
    pub async fn event(&mut self, event_type: &str) -> Value {
        if let Some(position) = self.pending.iter().position(|m| m["type"] == event_type) {
            return self.pending.remove(position).unwrap();
        }
        loop {
            let message = self.next_message().await.expect("event");
            if message["type"] == event_type {
                return message;
            }
            self.pending.push_back(message);
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }

    async fn next_message(&mut self) -> Option<Value> {
        loop {
            let frame = tokio::time::timeout(RECV_TIMEOUT, self.stream.next())
                .await
                .expect("timed out waiting for signaling message")?;
            match frame.ok()? {
                Message::Text(text) => return serde_json::from_str(&text).ok(),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }
}
