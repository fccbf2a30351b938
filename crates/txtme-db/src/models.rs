/// Database row types. These map directly to SQLite rows.
/// Distinct from txtme-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub theme_id: u32,
    pub avatar_id: u32,
    pub push_token: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    pub id: i64,
    pub recipient_id: String,
    pub kind: String,
    pub content: String,
    pub game_mode: String,
    pub burn_after: i64,
    /// Unix seconds.
    pub created_at: i64,
}

pub struct NewMessage<'a> {
    pub recipient_id: &'a str,
    pub kind: &'a str,
    pub content: &'a str,
    pub game_mode: &'a str,
    pub burn_after: i64,
    pub created_at: i64,
}

/// Result of reading an inbox: the live messages, plus the expired rows the
/// read removed so their stored objects can be cleaned up.
pub struct InboxListing {
    pub messages: Vec<MessageRow>,
    pub purged: Vec<MessageRow>,
}
