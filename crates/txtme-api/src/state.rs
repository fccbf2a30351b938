use std::sync::Arc;

use txtme_db::Database;
use txtme_notify::Dispatcher;

use crate::rate_limit::AbuseGuard;
use crate::storage::AudioStore;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// HS256 signing key, loaded once at startup.
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
    pub guard: AbuseGuard,
    pub audio: AudioStore,
}
