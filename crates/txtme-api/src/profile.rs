use axum::{
    Extension, Json,
    extract::{Path, State, rejection::JsonRejection},
    response::IntoResponse,
};

use txtme_types::api::{Claims, SuccessResponse, UpdateProfileRequest};

use crate::error::{ApiError, blocking};
use crate::identity;
use crate::state::AppState;

/// GET /u/{username}: public profile, no credential required.
pub async fn lookup_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let profile = blocking(move || identity::lookup_public(&st.db, &username)).await?;
    Ok(Json(profile))
}

/// POST /update-profile: overwrite the caller's theme and avatar.
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let st = state.clone();
    blocking(move || identity::update_profile(&st.db, claims.sub, req.theme_id, req.avatar_id))
        .await?;

    Ok(Json(SuccessResponse::ok()))
}
