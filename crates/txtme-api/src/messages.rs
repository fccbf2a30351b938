use axum::{
    Extension, Json,
    extract::{
        FromRequest, Multipart, Path, Request, State,
        multipart::Field,
        rejection::{JsonRejection, PathRejection},
    },
    http::header,
    response::IntoResponse,
};
use bytes::BytesMut;
use tracing::warn;
use uuid::Uuid;

use txtme_db::models::MessageRow;
use txtme_types::api::{
    Claims, DeleteMessageRequest, DeleteMessageResponse, SendMessageRequest, SuccessResponse,
};
use txtme_types::models::{Message, MessageKind};

use crate::error::{ApiError, blocking};
use crate::intake::{self, AudioPart, Submission};
use crate::state::AppState;
use crate::storage::MAX_AUDIO_BYTES;

/// POST /send: anonymous ingestion. Multipart (text or audio) or JSON (text).
pub async fn send_message(
    State(state): State<AppState>,
    req: Request,
) -> Result<impl IntoResponse, ApiError> {
    let is_json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"));

    let submission = if is_json {
        let Json(body) = Json::<SendMessageRequest>::from_request(req, &state).await?;
        Submission::from(body)
    } else {
        let multipart = Multipart::from_request(req, &state).await?;
        read_multipart(multipart).await?
    };

    let valid = intake::validate(submission)?;
    intake::submit(&state, valid).await?;

    Ok(Json(SuccessResponse::ok()))
}

async fn read_multipart(mut multipart: Multipart) -> Result<Submission, ApiError> {
    let mut sub = Submission::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "recipientId" => sub.recipient_id = Some(field.text().await?),
            "type" => sub.kind = Some(field.text().await?),
            "content" => sub.content = Some(field.text().await?),
            "gameMode" => sub.game_mode = Some(field.text().await?),
            "burnAfter" => {
                let raw = field.text().await?;
                let raw = raw.trim();
                if !raw.is_empty() {
                    let value = raw.parse::<i64>().map_err(|_| {
                        ApiError::InvalidPayload("burnAfter must be a whole number of seconds".into())
                    })?;
                    sub.burn_after = Some(value);
                }
            }
            "audio" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = read_capped(field, MAX_AUDIO_BYTES).await?;
                sub.audio = Some(AudioPart { bytes, content_type });
            }
            _ => continue,
        }
    }

    Ok(sub)
}

/// Read a file part, stopping as soon as it grows past `cap`.
async fn read_capped(mut field: Field<'_>, cap: usize) -> Result<bytes::Bytes, ApiError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.chunk().await? {
        if buf.len() + chunk.len() > cap {
            return Err(ApiError::PayloadTooLarge);
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// GET /messages/{user_id}: the caller's inbox, newest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner = owned_inbox(&user_id, &claims)?;

    let db = state.clone();
    let uid = owner.to_string();
    let now = chrono::Utc::now().timestamp();
    let listing = blocking(move || Ok(db.db.list_messages(&uid, now)?)).await?;

    state.audio.discard_for(&listing.purged).await;

    let messages: Vec<Message> = listing
        .messages
        .into_iter()
        .map(|row| to_message(row, owner))
        .collect();

    Ok(Json(messages))
}

/// DELETE /messages/{user_id}/{message_id}
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    path: Result<Path<(String, i64)>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path((user_id, message_id)) = path?;
    let owner = owned_inbox(&user_id, &claims)?;
    let deleted = delete_owned(&state, owner, message_id).await?;
    Ok(Json(DeleteMessageResponse { success: true, deleted }))
}

/// POST /delete-message: deletes from the caller's own inbox.
pub async fn delete_message_by_body(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<DeleteMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let deleted = delete_owned(&state, claims.sub, req.message_id).await?;
    Ok(Json(DeleteMessageResponse { success: true, deleted }))
}

/// A message id belonging to someone else is simply not deleted; the caller
/// cannot tell it apart from an id that never existed.
async fn delete_owned(state: &AppState, owner: Uuid, message_id: i64) -> Result<bool, ApiError> {
    let db = state.clone();
    let uid = owner.to_string();
    let removed = blocking(move || Ok(db.db.delete_message(&uid, message_id)?)).await?;

    match removed {
        Some(row) => {
            state.audio.discard_for(std::slice::from_ref(&row)).await;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn owned_inbox(path_user_id: &str, claims: &Claims) -> Result<Uuid, ApiError> {
    match path_user_id.parse::<Uuid>() {
        Ok(id) if id == claims.sub => Ok(id),
        _ => Err(ApiError::Forbidden),
    }
}

fn to_message(row: MessageRow, recipient_id: Uuid) -> Message {
    let kind = row.kind.parse().unwrap_or_else(|e| {
        warn!("Corrupt kind on message {}: {}", row.id, e);
        MessageKind::Text
    });
    let created_at = chrono::DateTime::from_timestamp(row.created_at, 0).unwrap_or_else(|| {
        warn!("Corrupt created_at {} on message {}", row.created_at, row.id);
        chrono::DateTime::default()
    });

    Message {
        id: row.id,
        recipient_id,
        kind,
        content: row.content,
        game_mode: row.game_mode,
        burn_after: u64::try_from(row.burn_after).unwrap_or_default(),
        created_at,
    }
}
