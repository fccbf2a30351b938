use bytes::Bytes;
use tracing::{info, warn};
use uuid::Uuid;

use txtme_db::models::NewMessage;
use txtme_types::api::SendMessageRequest;
use txtme_types::models::MessageKind;

use crate::error::{ApiError, blocking};
use crate::state::AppState;
use crate::storage::MAX_AUDIO_BYTES;

const DEFAULT_GAME_MODE: &str = "none";

/// A submission as it arrived, before any checks.
#[derive(Debug, Default)]
pub struct Submission {
    pub recipient_id: Option<String>,
    pub kind: Option<String>,
    pub content: Option<String>,
    pub game_mode: Option<String>,
    pub burn_after: Option<i64>,
    pub audio: Option<AudioPart>,
}

#[derive(Debug)]
pub struct AudioPart {
    pub bytes: Bytes,
    /// Declared media type of the part, if the client sent one.
    pub content_type: Option<String>,
}

impl From<SendMessageRequest> for Submission {
    fn from(req: SendMessageRequest) -> Self {
        Self {
            recipient_id: req.recipient_id,
            kind: req.kind,
            content: req.content,
            game_mode: req.game_mode,
            burn_after: req.burn_after,
            audio: None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Audio { bytes: Bytes, extension: &'static str },
}

/// A submission whose shape has been checked. The recipient is not yet
/// resolved.
#[derive(Debug)]
pub struct ValidSubmission {
    pub recipient_id: String,
    pub payload: Payload,
    pub game_mode: String,
    pub burn_after: u64,
}

impl ValidSubmission {
    pub fn kind(&self) -> MessageKind {
        match self.payload {
            Payload::Text(_) => MessageKind::Text,
            Payload::Audio { .. } => MessageKind::Audio,
        }
    }
}

/// Shape checks that need no I/O.
pub fn validate(sub: Submission) -> Result<ValidSubmission, ApiError> {
    let recipient_id = sub
        .recipient_id
        .filter(|r| !r.is_empty())
        .ok_or_else(|| ApiError::InvalidPayload("Missing recipientId".into()))?;

    let kind = match sub.kind.as_deref() {
        None | Some("") => MessageKind::Text,
        Some(k) => k
            .parse::<MessageKind>()
            .map_err(|e| ApiError::InvalidPayload(e.to_string()))?,
    };

    let burn_after = match sub.burn_after {
        None => 0,
        Some(b) => u64::try_from(b)
            .map_err(|_| ApiError::InvalidPayload("burnAfter must not be negative".into()))?,
    };

    let content = sub.content.filter(|c| !c.is_empty());
    let payload = match (kind, content, sub.audio) {
        (MessageKind::Text, Some(text), None) => Payload::Text(text),
        (MessageKind::Audio, None, Some(audio)) => {
            if audio.bytes.len() > MAX_AUDIO_BYTES {
                return Err(ApiError::PayloadTooLarge);
            }
            let extension = audio_extension(audio.content_type.as_deref())
                .ok_or(ApiError::UnsupportedMedia)?;
            Payload::Audio { bytes: audio.bytes, extension }
        }
        (MessageKind::Text, _, _) => {
            return Err(ApiError::InvalidPayload("Text messages need content and no audio".into()));
        }
        (MessageKind::Audio, _, _) => {
            return Err(ApiError::InvalidPayload("Audio messages need an audio file and no content".into()));
        }
    };

    let game_mode = sub
        .game_mode
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| DEFAULT_GAME_MODE.to_string());

    Ok(ValidSubmission {
        recipient_id,
        payload,
        game_mode,
        burn_after,
    })
}

/// Map a declared media type to a stored file extension.
///
/// Any `audio/*` type is accepted, as is `application/octet-stream` or no
/// type at all. Anything else is `None`.
pub fn audio_extension(content_type: Option<&str>) -> Option<&'static str> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    match essence.as_str() {
        "" | "application/octet-stream" => Some("mp3"),
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => Some("m4a"),
        "audio/aac" => Some("aac"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/webm" => Some("webm"),
        "audio/ogg" => Some("ogg"),
        other if other.starts_with("audio/") => Some("mp3"),
        _ => None,
    }
}

/// Store a validated submission in its recipient's inbox and queue the push.
///
/// The recipient is resolved before any audio is written, so a rejected
/// submission leaves nothing behind. Returns the new message id.
pub async fn submit(state: &AppState, sub: ValidSubmission) -> Result<i64, ApiError> {
    let recipient_uuid: Uuid = sub
        .recipient_id
        .parse()
        .map_err(|_| ApiError::RecipientNotFound)?;
    let recipient_id = recipient_uuid.to_string();

    let db = state.clone();
    let rid = recipient_id.clone();
    let recipient = blocking(move || Ok(db.db.get_user_by_id(&rid)?))
        .await?
        .ok_or(ApiError::RecipientNotFound)?;

    let kind = sub.kind();
    let (content, stored_audio) = match sub.payload {
        Payload::Text(text) => (text, None),
        Payload::Audio { bytes, extension } => {
            let name = state.audio.save(&bytes, extension).await?;
            (name.clone(), Some(name))
        }
    };

    let db = state.clone();
    let game_mode = sub.game_mode;
    let burn_after = i64::try_from(sub.burn_after)
        .map_err(|_| ApiError::InvalidPayload("burnAfter out of range".into()))?;
    let inserted = blocking(move || {
        let msg = NewMessage {
            recipient_id: &recipient_id,
            kind: kind.as_str(),
            content: &content,
            game_mode: &game_mode,
            burn_after,
            // Whole seconds, matching the expiry check in `list_messages`.
            created_at: chrono::Utc::now().timestamp(),
        };
        Ok(db.db.insert_message(&msg)?)
    })
    .await;

    let message_id = match inserted {
        Ok(id) => id,
        Err(e) => {
            if let Some(name) = stored_audio {
                if let Err(rm) = state.audio.delete(&name).await {
                    warn!("Failed to remove orphaned audio {}: {}", name, rm);
                }
            }
            return Err(e);
        }
    };

    info!(message_id, kind = %kind, "Message delivered to inbox");

    if let Some(token) = recipient.push_token.as_deref() {
        state.dispatcher.dispatch(token, notification_body(kind));
    }

    Ok(message_id)
}

pub fn notification_body(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Audio => "Voice note",
        MessageKind::Text => "Secret message",
    }
}
