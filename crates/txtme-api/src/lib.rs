pub mod auth;
pub mod error;
pub mod identity;
pub mod intake;
pub mod messages;
pub mod middleware;
pub mod profile;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod storage;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
