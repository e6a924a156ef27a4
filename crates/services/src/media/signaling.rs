use mediasoup::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    Host,
    Guest,
    Viewer,
}

impl ParticipantRole {
    /// Hosts and guests publish media; viewers only read the HLS playlist.
    pub fn is_streamer(self) -> bool {
        !matches!(self, ParticipantRole::Viewer)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportDirection {
    Send,
    Recv,
    /// Server-local plain transports feeding the transcoder; never
    /// requested by clients.
    Hls,
}

/// Client -> Server signaling messages (sent over WebSocket).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientSignal {
    #[serde(rename = "join-room", rename_all = "camelCase")]
    JoinRoom {
        room_id: String,
        name: String,
        role: ParticipantRole,
    },

    #[serde(rename = "leave-room")]
    LeaveRoom {},

    #[serde(rename = "create-transport")]
    CreateTransport { direction: TransportDirection },

    #[serde(rename = "connect-transport", rename_all = "camelCase")]
    ConnectTransport {
        transport_id: String,
        dtls_parameters: DtlsParameters,
    },

    #[serde(rename = "produce", rename_all = "camelCase")]
    Produce {
        transport_id: String,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },

    #[serde(rename = "consume", rename_all = "camelCase")]
    Consume {
        producer_id: String,
        rtp_capabilities: RtpCapabilities,
    },

    /// Close one owned producer without leaving the room.
    #[serde(rename = "close-producer", rename_all = "camelCase")]
    CloseProducer { producer_id: String },

    #[serde(rename = "start-hls", rename_all = "camelCase")]
    StartHls { room_id: String },

    #[serde(rename = "stop-hls", rename_all = "camelCase")]
    StopHls { room_id: String },
}

/// Inbound wire envelope. A message carrying `id` expects exactly one
/// `{id, type: "response", data}` back, where `data` is the success payload
/// or `{error: message}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(flatten)]
    pub signal: ClientSignal,
}

/// Server -> Client events (fire-and-forget, no correlation id).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerSignal {
    #[serde(rename = "new-participant")]
    NewParticipant { participant: ParticipantInfo },

    #[serde(rename = "participant-left", rename_all = "camelCase")]
    ParticipantLeft { participant_id: String },

    #[serde(rename = "new-producer", rename_all = "camelCase")]
    NewProducer {
        producer_id: String,
        participant_id: String,
    },

    #[serde(rename = "producer-closed", rename_all = "camelCase")]
    ProducerClosed { producer_id: String },

    #[serde(rename = "hls-started", rename_all = "camelCase")]
    HlsStarted {
        room_id: String,
        playlist_url: String,
    },

    #[serde(rename = "hls-restarted", rename_all = "camelCase")]
    HlsRestarted {
        room_id: String,
        playlist_url: String,
    },

    #[serde(rename = "hls-stopped", rename_all = "camelCase")]
    HlsStopped { room_id: String },

    #[serde(rename = "error")]
    Error { message: String },
}

/// Fan-out unit handed to the socket layer: deliver `signal` to every
/// listed connection. Ordering across connections is unspecified.
#[derive(Debug, Clone)]
pub struct OutboundEvent {
    pub targets: Vec<String>,
    pub signal: ServerSignal,
}

pub type EventSender = mpsc::UnboundedSender<OutboundEvent>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: String,
    pub name: String,
    pub role: ParticipantRole,
    pub has_audio: bool,
    pub has_video: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub id: String,
    pub name: String,
    pub hls_url: Option<String>,
    pub participants: Vec<ParticipantInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerSnapshot {
    pub producer_id: String,
    pub participant_id: String,
}

/// Reply to `join-room`. Capabilities are `null` for viewers, and the
/// existing-producers snapshot lets late joiners consume immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub room: RoomSnapshot,
    pub participant_id: String,
    pub router_rtp_capabilities: Option<serde_json::Value>,
    pub existing_producers: Vec<ProducerSnapshot>,
}

/// Reply to `create-transport`: client-side bootstrap parameters only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportCreated {
    pub id: String,
    pub ice_parameters: serde_json::Value,
    pub ice_candidates: serde_json::Value,
    pub dtls_parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConnected {
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Produced {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerCreated {
    pub id: String,
    pub producer_id: String,
    pub kind: String,
    pub rtp_parameters: serde_json::Value,
}
