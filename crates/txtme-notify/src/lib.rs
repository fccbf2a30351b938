pub mod dispatcher;
pub mod expo;

pub use dispatcher::{Dispatcher, PushNotification, PushProvider, is_push_token};
pub use expo::ExpoProvider;
