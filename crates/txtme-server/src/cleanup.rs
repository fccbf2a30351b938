use std::time::Duration;
use tracing::{info, warn};

use txtme_api::AppState;

/// Background task that burns expired messages nobody has read.
///
/// Reads already purge lazily; this catches inboxes that are never opened so
/// their rows and audio objects do not linger.
pub async fn run_cleanup_loop(state: AppState, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        match sweep_expired(&state, chrono::Utc::now().timestamp()).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: burned {} expired messages", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}

async fn sweep_expired(state: &AppState, now: i64) -> anyhow::Result<usize> {
    let st = state.clone();
    let purged = tokio::task::spawn_blocking(move || st.db.purge_expired(now)).await??;

    state.audio.discard_for(&purged).await;
    Ok(purged.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use txtme_api::AppStateInner;
    use txtme_api::rate_limit::AbuseGuard;
    use txtme_api::storage::AudioStore;
    use txtme_db::Database;
    use txtme_db::models::NewMessage;
    use txtme_notify::{Dispatcher, ExpoProvider};

    async fn state(dir: &std::path::Path) -> AppState {
        let provider = ExpoProvider::new("http://127.0.0.1:9/push", Duration::from_secs(1)).unwrap();
        Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test".into(),
            dispatcher: Dispatcher::new(Arc::new(provider), Duration::from_secs(1)),
            guard: AbuseGuard::default(),
            audio: AudioStore::new(dir.join("uploads")).await.unwrap(),
        })
    }

    #[tokio::test]
    async fn sweep_burns_rows_and_audio() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path()).await;

        let user = uuid::Uuid::new_v4().to_string();
        assert!(state.db.create_user(&user, "alice", "hash").unwrap());

        let name = state.audio.save(b"voice", "mp3").await.unwrap();
        let insert = |kind: &str, content: &str, burn_after: i64| {
            state
                .db
                .insert_message(&NewMessage {
                    recipient_id: &user,
                    kind,
                    content,
                    game_mode: "none",
                    burn_after,
                    created_at: 1_000,
                })
                .unwrap()
        };
        insert("audio", name.as_str(), 10);
        insert("text", "burns", 10);
        insert("text", "forever", 0);

        assert_eq!(sweep_expired(&state, 1_011).await.unwrap(), 2);
        assert!(!state.audio.dir().join(&name).exists());

        let left = state.db.list_messages(&user, 1_011).unwrap();
        assert_eq!(left.messages.len(), 1);
        assert_eq!(left.messages[0].content, "forever");

        assert_eq!(sweep_expired(&state, 1_011).await.unwrap(), 0);
    }
}
