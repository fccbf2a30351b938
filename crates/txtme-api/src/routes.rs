use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
};
use tower_http::services::ServeDir;

use txtme_types::api::HealthResponse;

use crate::auth;
use crate::messages;
use crate::middleware::require_auth;
use crate::profile;
use crate::rate_limit::limit_sends;
use crate::state::AppState;
use crate::storage::MAX_AUDIO_BYTES;

/// Room for multipart framing and the text fields around a full-size voice note.
const SEND_BODY_LIMIT: usize = MAX_AUDIO_BYTES + 1024 * 1024;

/// Build the full HTTP surface. The caller adds transport layers (CORS,
/// tracing) and must serve it with `ConnectInfo<SocketAddr>`, which the
/// send throttle keys on.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/u/{username}", get(profile::lookup_user));

    let ingest_routes = Router::new()
        .route("/send", post(messages::send_message))
        .layer(DefaultBodyLimit::max(SEND_BODY_LIMIT))
        .route_layer(middleware::from_fn_with_state(state.clone(), limit_sends));

    let protected_routes = Router::new()
        .route("/messages/{user_id}", get(messages::get_messages))
        .route("/messages/{user_id}/{message_id}", delete(messages::delete_message))
        .route("/delete-message", post(messages::delete_message_by_body))
        .route("/update-profile", post(profile::update_profile))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let uploads = ServeDir::new(state.audio.dir());

    Router::new()
        .merge(public_routes)
        .merge(ingest_routes)
        .merge(protected_routes)
        .nest_service("/uploads", uploads)
        .with_state(state)
}

async fn root() -> &'static str {
    "Txtme API running"
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
