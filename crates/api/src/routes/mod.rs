//! API routes

pub mod health;
pub mod rooms;
pub mod users;

use axum::{
    extract::Request,
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use roomchat_shared::{User, UserId};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    error::{ApiError, ApiResult},
    state::AppState,
    websocket::ws_handler,
};

/// Header carrying the caller's user id
pub const USER_ID_HEADER: &str = "x-user-id";

/// Identity of the caller as claimed by the `X-User-Id` header.
///
/// The header is trusted as-is; there is no credential behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Caller(pub Option<UserId>);

impl Caller {
    /// Resolve the caller to a stored user, or fail with 401
    pub async fn require_user(self, state: &AppState) -> ApiResult<User> {
        self.user(state).await?.ok_or(ApiError::Unauthorized)
    }

    /// Resolve the caller to a stored user, if any
    pub async fn user(self, state: &AppState) -> ApiResult<Option<User>> {
        match self.0 {
            Some(user_id) => Ok(state.store.get_user(user_id).await?),
            None => Ok(None),
        }
    }
}

/// Attach the [`Caller`] extension to every API request
pub async fn identify_caller(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let caller = match request.headers().get(USER_ID_HEADER) {
        None => Caller(None),
        Some(value) => {
            let user_id = value
                .to_str()
                .ok()
                .and_then(|v| v.trim().parse::<uuid::Uuid>().ok())
                .ok_or_else(|| ApiError::Validation("X-User-Id must be a UUID".to_string()))?;
            Caller(Some(UserId::from(user_id)))
        }
    };

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// CORS policy from configuration; an empty list or `*` allows any origin
pub fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(USER_ID_HEADER)]);

    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    let api_v1_routes = Router::new()
        // User routes
        .route("/users", post(users::create_user))
        .route("/users/me", get(users::get_me).patch(users::update_me))
        // Room routes
        .route("/rooms", get(rooms::list_rooms).post(rooms::create_room))
        .route("/rooms/unread", get(rooms::unread_counts))
        .route(
            "/rooms/:room_id",
            get(rooms::get_room)
                .patch(rooms::update_room)
                .delete(rooms::delete_room),
        )
        .route("/rooms/:room_id/password-check", post(rooms::check_password))
        .route("/rooms/:room_id/messages", get(rooms::list_messages))
        .layer(middleware::from_fn(identify_caller))
        // WebSocket route (identity travels inside join/send events)
        .route("/ws", get(ws_handler));

    let cors = cors_layer(&state.config);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
