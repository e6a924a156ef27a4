use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Metadata-store mirror of a room.
///
/// `is_active` is true exactly while a live router exists for the room;
/// `hls_url` is present exactly while a transcoder is running. Room ids are
/// caller-chosen strings (direct-URL joins mint records on the fly).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hls_url: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Room {
    pub const COLLECTION: &'static str = "rooms";
}
