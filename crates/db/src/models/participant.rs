use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Mirror row for a live participant, keyed by its stable participant id.
/// `socket_id` is the signaling-channel id and changes on reconnect. The
/// collection mirrors in-memory state only; it is truncated at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub room_id: String,
    pub socket_id: String,
    pub is_host: bool,
    pub is_viewer: bool,
    #[serde(default)]
    pub has_video: bool,
    #[serde(default)]
    pub has_audio: bool,
    pub joined_at: DateTime,
}

impl ParticipantRecord {
    pub const COLLECTION: &'static str = "participants";
}
