use axum::{Json, extract::State, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use tracing::info;

use txtme_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, blocking};
use crate::identity;
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let st = state.clone();
    let (user_id, username, token) = blocking(move || {
        let user_id = identity::register(&st.db, &req.username, &req.password)?;
        let token = identity::issue_token(&st.jwt_secret, user_id)?;
        Ok((user_id, req.username, token))
    })
    .await?;

    info!(%user_id, "Registered new user");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user_id,
            username,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let st = state.clone();
    let (user, token) = blocking(move || {
        identity::login(
            &st.db,
            &st.jwt_secret,
            &req.username,
            &req.password,
            req.push_token.as_deref(),
        )
    })
    .await?;

    Ok(Json(LoginResponse {
        id: identity::user_uuid(&user)?,
        username: user.username,
        theme_id: user.theme_id,
        avatar_id: user.avatar_id,
        push_token: user.push_token,
        token,
    }))
}
