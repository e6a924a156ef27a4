use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use stagecast_db::models::Room;
use validator::Validate;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub hls_url: Option<String>,
    pub created_at: String,
}

fn to_response(room: Room) -> RoomResponse {
    RoomResponse {
        id: room.id,
        name: room.name,
        is_active: room.is_active,
        hls_url: room.hls_url,
        created_at: room
            .created_at
            .try_to_rfc3339_string()
            .unwrap_or_default(),
    }
}

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<RoomResponse>>, ApiError> {
    let rooms = state.rooms.list().await?;
    Ok(Json(rooms.into_iter().map(to_response).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<RoomResponse>, ApiError> {
    body.validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let id = nanoid::nanoid!(10);
    let room = state.rooms.create(&id, &body.name).await?;
    Ok(Json(to_response(room)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>, ApiError> {
    let room = state
        .rooms
        .get(&room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Room not found".to_string()))?;
    Ok(Json(to_response(room)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // close the live room (participants, HLS, router) before the record goes
    state.orchestrator.close_room_by_id(&room_id).await;

    if !state.rooms.delete(&room_id).await? {
        return Err(ApiError::NotFound("Room not found".to_string()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
