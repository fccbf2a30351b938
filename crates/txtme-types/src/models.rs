use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a message carries: inline text or a reference to a stored voice note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Audio,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Audio => "audio",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown message kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for MessageKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "audio" => Ok(Self::Audio),
            other => Err(UnknownKind(other.to_string())),
        }
    }
}

/// The non-secret view of a user, served to anonymous senders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub theme_id: u32,
    pub avatar_id: u32,
}

/// An inbox entry as returned to its recipient.
///
/// There is deliberately no sender field: the store never learns who sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub recipient_id: Uuid,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Inline text, or the stored object name for audio.
    pub content: String,
    pub game_mode: String,
    /// Seconds after `created_at` at which the message burns. 0 = keep.
    pub burn_after: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_known_values_only() {
        assert_eq!("text".parse::<MessageKind>(), Ok(MessageKind::Text));
        assert_eq!("audio".parse::<MessageKind>(), Ok(MessageKind::Audio));
        assert!("Audio".parse::<MessageKind>().is_err());
        assert!("video".parse::<MessageKind>().is_err());
    }

    #[test]
    fn message_serializes_kind_as_type() {
        let msg = Message {
            id: 7,
            recipient_id: Uuid::nil(),
            kind: MessageKind::Audio,
            content: "1700000000000000000.mp3".into(),
            game_mode: "none".into(),
            burn_after: 0,
            created_at: DateTime::default(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "audio");
        assert!(json.get("kind").is_none());
        assert!(json.get("sender_id").is_none());
    }
}
