//! User routes

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};
use roomchat_shared::User;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    routes::Caller,
    state::AppState,
};

const MAX_NICKNAME_LEN: usize = 50;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct NicknameRequest {
    pub nickname: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: Option<User>,
}

fn validate_nickname(nickname: &str) -> ApiResult<&str> {
    let nickname = nickname.trim();
    if nickname.is_empty() || nickname.chars().count() > MAX_NICKNAME_LEN {
        return Err(ApiError::Validation(format!(
            "Nickname must be between 1 and {MAX_NICKNAME_LEN} characters"
        )));
    }
    Ok(nickname)
}

// =============================================================================
// Handlers
// =============================================================================

/// Create a user. The returned id is what clients send as `X-User-Id`.
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<NicknameRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let nickname = validate_nickname(&req.nickname)?;
    let user = state.store.create_user(nickname).await?;

    tracing::info!(user_id = %user.id, "User created");

    Ok((StatusCode::CREATED, Json(UserResponse { user: Some(user) })))
}

/// Current caller, or `{"user": null}` when unidentified
pub async fn get_me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<UserResponse>> {
    let user = caller.user(&state).await?;
    Ok(Json(UserResponse { user }))
}

/// Change the caller's nickname
pub async fn update_me(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(req): Json<NicknameRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = caller.0.ok_or(ApiError::Unauthorized)?;
    let nickname = validate_nickname(&req.nickname)?;

    let user = state
        .store
        .update_user(user_id, nickname)
        .await?
        .ok_or(ApiError::UserNotFound)?;

    tracing::info!(user_id = %user.id, "User nickname updated");

    Ok(Json(UserResponse { user: Some(user) }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_nickname_trims() {
        assert_eq!(validate_nickname("  alice ").unwrap(), "alice");
    }

    #[test]
    fn test_validate_nickname_rejects_blank_and_long() {
        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"x".repeat(MAX_NICKNAME_LEN + 1)).is_err());
    }
}
