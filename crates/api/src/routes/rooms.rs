//! Room routes

use std::collections::HashMap;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use roomchat_shared::{ChatMessage, NewRoom, Room, RoomId, RoomUpdate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::{
    error::{ApiError, ApiResult},
    routes::Caller,
    state::AppState,
    websocket::SessionError,
};

const MAX_ROOM_NAME_LEN: usize = 100;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub name: String,
    pub password: Option<String>,
}

/// Partial update. A blank `password` removes the password; an absent one
/// leaves it unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordCheckRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct PasswordCheckResponse {
    pub valid: bool,
}

/// Room as exposed over HTTP. The password itself is never serialized.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomResponse {
    #[serde(flatten)]
    pub room: Room,
    pub has_password: bool,
}

impl From<Room> for RoomResponse {
    fn from(room: Room) -> Self {
        Self {
            has_password: room.has_password(),
            room,
        }
    }
}

fn validate_room_name(name: &str) -> ApiResult<String> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_ROOM_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "Room name must be between 1 and {MAX_ROOM_NAME_LEN} characters"
        )));
    }
    Ok(name.to_string())
}

/// Blank passwords mean "no password"
fn normalize_password(password: Option<&str>) -> Option<String> {
    password
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

fn password_matches(room: &Room, candidate: &str) -> bool {
    match &room.password {
        None => true,
        Some(expected) => expected.as_bytes().ct_eq(candidate.trim().as_bytes()).into(),
    }
}

async fn load_room(state: &AppState, room_id: RoomId) -> ApiResult<Room> {
    state.store.get_room(room_id).await?.ok_or(ApiError::NotFound)
}

async fn load_owned_room(state: &AppState, caller: Caller, room_id: RoomId, action: &str) -> ApiResult<Room> {
    let room = load_room(state, room_id).await?;
    if caller.0 != Some(room.owner_id) {
        return Err(ApiError::Forbidden(format!("Only the room owner can {action} the room")));
    }
    Ok(room)
}

// =============================================================================
// Handlers
// =============================================================================

/// All live rooms, newest first
pub async fn list_rooms(State(state): State<AppState>) -> ApiResult<Json<Vec<RoomResponse>>> {
    let rooms = state.store.list_rooms().await?;
    Ok(Json(rooms.into_iter().map(RoomResponse::from).collect()))
}

/// Create a room owned by the caller
pub async fn create_room(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<CreateRoomRequest>,
) -> ApiResult<(StatusCode, Json<RoomResponse>)> {
    let owner = caller.require_user(&state).await?;
    let name = validate_room_name(&req.name)?;

    let room = state
        .store
        .create_room(NewRoom {
            name,
            password: normalize_password(req.password.as_deref()),
            owner_id: owner.id,
        })
        .await?;

    tracing::info!(room_id = %room.id, owner_id = %owner.id, "Room created");

    Ok((StatusCode::CREATED, Json(room.into())))
}

pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
) -> ApiResult<Json<RoomResponse>> {
    Ok(Json(load_room(&state, room_id).await?.into()))
}

/// Rename a room or change its password (owner only)
pub async fn update_room(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<UpdateRoomRequest>,
) -> ApiResult<Json<RoomResponse>> {
    load_owned_room(&state, caller, room_id, "update").await?;

    let update = RoomUpdate {
        name: req.name.as_deref().map(validate_room_name).transpose()?,
        password: req.password.as_deref().map(|p| normalize_password(Some(p))),
    };

    let room = state
        .store
        .update_room(room_id, update)
        .await?
        .ok_or(ApiError::NotFound)?;

    tracing::info!(room_id = %room_id, "Room updated");

    Ok(Json(room.into()))
}

/// Soft-delete a room (owner only)
pub async fn delete_room(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(room_id): Path<RoomId>,
) -> ApiResult<Json<serde_json::Value>> {
    load_owned_room(&state, caller, room_id, "delete").await?;

    if !state.store.delete_room(room_id).await? {
        return Err(ApiError::NotFound);
    }

    tracing::info!(room_id = %room_id, "Room deleted");

    Ok(Json(json!({ "success": true })))
}

/// Check a join password. Rooms without a password accept anything.
pub async fn check_password(
    State(state): State<AppState>,
    Path(room_id): Path<RoomId>,
    Json(req): Json<PasswordCheckRequest>,
) -> ApiResult<Json<PasswordCheckResponse>> {
    let room = load_room(&state, room_id).await?;
    Ok(Json(PasswordCheckResponse {
        valid: password_matches(&room, &req.password),
    }))
}

/// Message history, oldest first.
///
/// An identified caller reading the history has the room marked read for
/// them, the same as joining it.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(room_id): Path<RoomId>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    load_room(&state, room_id).await?;

    if let Some(user) = caller.user(&state).await? {
        state
            .sessions
            .read_state()
            .mark_read(room_id, &user.nickname)
            .await?;
    }

    Ok(Json(state.store.list_messages(room_id).await?))
}

/// Unread counts per room for the caller; empty when the caller is
/// unidentified or names a user that does not exist
pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<HashMap<RoomId, u64>>> {
    let Some(user_id) = caller.0 else {
        return Ok(Json(HashMap::new()));
    };

    match state
        .sessions
        .read_state()
        .unread_counts_by_room_for_user(user_id)
        .await
    {
        Ok(counts) => Ok(Json(counts)),
        Err(SessionError::UserNotFound(_)) => Ok(Json(HashMap::new())),
        Err(e) => Err(e.into()),
    }
}
