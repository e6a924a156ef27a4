use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResponse {
    pub room_id: String,
    pub name: String,
    pub playlist_url: String,
}

/// Rooms currently emitting an HLS playlist.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<StreamResponse>>, ApiError> {
    let rooms = state.rooms.list_streaming().await?;
    let streams = rooms
        .into_iter()
        .filter_map(|room| {
            room.hls_url.map(|playlist_url| StreamResponse {
                room_id: room.id,
                name: room.name,
                playlist_url,
            })
        })
        .collect();
    Ok(Json(streams))
}

pub async fn get(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<StreamResponse>, ApiError> {
    let room = state
        .rooms
        .get(&room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".to_string()))?;

    let playlist_url = room
        .hls_url
        .ok_or_else(|| ApiError::NotFound("Stream not running".to_string()))?;

    Ok(Json(StreamResponse {
        room_id: room.id,
        name: room.name,
        playlist_url,
    }))
}
