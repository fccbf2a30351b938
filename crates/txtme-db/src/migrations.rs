use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users + messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                theme_id    INTEGER NOT NULL DEFAULT 0,
                avatar_id   INTEGER NOT NULL DEFAULT 0,
                push_token  TEXT,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- No sender column: senders are anonymous by construction.
            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                recipient_id    TEXT NOT NULL REFERENCES users(id),
                kind            TEXT NOT NULL DEFAULT 'text',
                content         TEXT NOT NULL,
                game_mode       TEXT NOT NULL DEFAULT 'none',
                burn_after      INTEGER NOT NULL DEFAULT 0 CHECK (burn_after >= 0),
                created_at      INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_recipient
                ON messages(recipient_id, id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
