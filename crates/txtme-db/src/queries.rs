use crate::models::{InboxListing, MessageRow, NewMessage, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, ErrorCode, Row};

const USER_COLUMNS: &str = "id, username, password, theme_id, avatar_id, push_token, created_at";
const MESSAGE_COLUMNS: &str = "id, recipient_id, kind, content, game_mode, burn_after, created_at";

impl Database {
    // -- Users --

    /// Insert a user. Returns `false` if the username is already taken.
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Last write wins; a user holds at most one device token.
    pub fn set_push_token(&self, id: &str, push_token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET push_token = ?1 WHERE id = ?2",
                (push_token, id),
            )?;
            Ok(())
        })
    }

    /// Returns `false` if no such user exists.
    pub fn update_profile(&self, id: &str, theme_id: u32, avatar_id: u32) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET theme_id = ?1, avatar_id = ?2 WHERE id = ?3",
                rusqlite::params![theme_id, avatar_id, id],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Messages --

    /// Append a message to its recipient's inbox and return the new id.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (recipient_id, kind, content, game_mode, burn_after, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    msg.recipient_id,
                    msg.kind,
                    msg.content,
                    msg.game_mode,
                    msg.burn_after,
                    msg.created_at,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// List a recipient's inbox newest first, dropping any message that has
    /// burned by `now` (unix seconds). Burned rows are deleted in the same call.
    ///
    /// Timestamps are whole seconds, so a message stays listed until its age
    /// in seconds exceeds `burn_after`: up to just under a second past its
    /// exact expiry, never before it.
    pub fn list_messages(&self, recipient_id: &str, now: i64) -> Result<InboxListing> {
        self.with_conn(|conn| {
            let purged = delete_returning(
                conn,
                "DELETE FROM messages
                 WHERE recipient_id = ?1 AND burn_after > 0 AND ?2 - created_at > burn_after",
                rusqlite::params![recipient_id, now],
            )?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE recipient_id = ?1 ORDER BY id DESC"
            ))?;
            let messages = stmt
                .query_map([recipient_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(InboxListing { messages, purged })
        })
    }

    /// Delete a message only if it belongs to `recipient_id`.
    /// Returns the removed row, or `None` when nothing matched.
    pub fn delete_message(&self, recipient_id: &str, message_id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut rows = delete_returning(
                conn,
                "DELETE FROM messages WHERE id = ?1 AND recipient_id = ?2",
                rusqlite::params![message_id, recipient_id],
            )?;
            Ok(rows.pop())
        })
    }

    /// Remove every burned message across all inboxes.
    pub fn purge_expired(&self, now: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            delete_returning(
                conn,
                "DELETE FROM messages WHERE burn_after > 0 AND ?1 - created_at > burn_after",
                [now],
            )
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                theme_id: row.get(3)?,
                avatar_id: row.get(4)?,
                push_token: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn delete_returning<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(&format!("{sql} RETURNING {MESSAGE_COLUMNS}"))?;
    let rows = stmt
        .query_map(params, message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        kind: row.get(2)?,
        content: row.get(3)?,
        game_mode: row.get(4)?,
        burn_after: row.get(5)?,
        created_at: row.get(6)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn db_with_user(name: &str) -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4().to_string();
        assert!(db.create_user(&id, name, "hash").unwrap());
        (db, id)
    }

    fn text<'a>(recipient: &'a str, content: &'a str, burn_after: i64, created_at: i64) -> NewMessage<'a> {
        NewMessage {
            recipient_id: recipient,
            kind: "text",
            content,
            game_mode: "none",
            burn_after,
            created_at,
        }
    }

    #[test]
    fn duplicate_username_is_rejected_case_sensitively() {
        let (db, _) = db_with_user("alice");
        assert!(!db.create_user("other-id", "alice", "hash2").unwrap());
        assert!(db.create_user("third-id", "Alice", "hash3").unwrap());
    }

    #[test]
    fn new_user_has_default_selectors_and_no_token() {
        let (db, id) = db_with_user("alice");
        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.theme_id, 0);
        assert_eq!(user.avatar_id, 0);
        assert!(user.push_token.is_none());
        assert!(db.get_user_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn push_token_is_last_write_wins() {
        let (db, id) = db_with_user("alice");
        db.set_push_token(&id, "ExponentPushToken[a]").unwrap();
        db.set_push_token(&id, "ExponentPushToken[b]").unwrap();
        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!(user.push_token.as_deref(), Some("ExponentPushToken[b]"));
    }

    #[test]
    fn update_profile_reports_missing_user() {
        let (db, id) = db_with_user("alice");
        assert!(db.update_profile(&id, 3, 9).unwrap());
        assert!(db.update_profile(&id, 3, 9).unwrap());
        assert!(!db.update_profile("nobody", 1, 1).unwrap());
        let user = db.get_user_by_id(&id).unwrap().unwrap();
        assert_eq!((user.theme_id, user.avatar_id), (3, 9));
    }

    #[test]
    fn inbox_lists_newest_first_per_recipient() {
        let (db, alice) = db_with_user("alice");
        let bob = Uuid::new_v4().to_string();
        db.create_user(&bob, "bob", "hash").unwrap();

        let first = db.insert_message(&text(&alice, "one", 0, 100)).unwrap();
        db.insert_message(&text(&bob, "for bob", 0, 100)).unwrap();
        let second = db.insert_message(&text(&alice, "two", 0, 100)).unwrap();
        assert!(second > first);

        let listing = db.list_messages(&alice, 100).unwrap();
        let ids: Vec<i64> = listing.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![second, first]);
        assert!(listing.purged.is_empty());
    }

    #[test]
    fn insert_requires_existing_recipient() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_message(&text("ghost", "hi", 0, 0)).is_err());
    }

    #[test]
    fn burned_messages_vanish_after_their_window() {
        let (db, alice) = db_with_user("alice");
        let keep = db.insert_message(&text(&alice, "forever", 0, 1_000)).unwrap();
        let burn = db.insert_message(&text(&alice, "ten seconds", 10, 1_000)).unwrap();

        // Age exactly equal to burn_after is still visible. Both instants are
        // truncated to seconds, so this covers reads up to 1_010.999.
        let listing = db.list_messages(&alice, 1_010).unwrap();
        assert_eq!(listing.messages.len(), 2);
        assert!(listing.purged.is_empty());

        let listing = db.list_messages(&alice, 1_011).unwrap();
        assert_eq!(listing.messages.iter().map(|m| m.id).collect::<Vec<_>>(), vec![keep]);
        assert_eq!(listing.purged.len(), 1);
        assert_eq!(listing.purged[0].id, burn);

        // Physically gone: a later read reports nothing more to purge.
        let listing = db.list_messages(&alice, 1_000_000).unwrap();
        assert_eq!(listing.messages.len(), 1);
        assert!(listing.purged.is_empty());
    }

    #[test]
    fn delete_is_scoped_to_owner() {
        let (db, alice) = db_with_user("alice");
        let bob = Uuid::new_v4().to_string();
        db.create_user(&bob, "bob", "hash").unwrap();
        let id = db.insert_message(&text(&alice, "secret", 0, 5)).unwrap();

        assert!(db.delete_message(&bob, id).unwrap().is_none());
        assert_eq!(db.list_messages(&alice, 5).unwrap().messages.len(), 1);

        let removed = db.delete_message(&alice, id).unwrap().unwrap();
        assert_eq!(removed.content, "secret");
        assert!(db.delete_message(&alice, id).unwrap().is_none());
        assert!(db.list_messages(&alice, 5).unwrap().messages.is_empty());
    }

    #[test]
    fn purge_expired_sweeps_every_inbox() {
        let (db, alice) = db_with_user("alice");
        let bob = Uuid::new_v4().to_string();
        db.create_user(&bob, "bob", "hash").unwrap();
        db.insert_message(&text(&alice, "a", 5, 0)).unwrap();
        db.insert_message(&text(&bob, "b", 5, 0)).unwrap();
        db.insert_message(&text(&bob, "c", 0, 0)).unwrap();

        assert!(db.purge_expired(5).unwrap().is_empty());
        let purged = db.purge_expired(6).unwrap();
        assert_eq!(purged.len(), 2);
        assert!(db.list_messages(&alice, 6).unwrap().messages.is_empty());
        assert_eq!(db.list_messages(&bob, 6).unwrap().messages.len(), 1);
    }
}
