use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Title shown on every new-message notification.
pub const NOTIFICATION_TITLE: &str = "New Txtme!";

/// One notification for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushNotification {
    pub to: String,
    pub sound: String,
    pub title: String,
    pub body: String,
}

/// An external push service. One call is one delivery attempt.
pub trait PushProvider: Send + Sync + 'static {
    fn send<'a>(&'a self, notification: &'a PushNotification) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// Best-effort, fire-and-forget push delivery.
///
/// Each dispatch makes a single attempt on its own task, bounded by a timeout.
/// Failures are logged and dropped; nothing is retried and nothing reaches
/// the caller.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    provider: Arc<dyn PushProvider>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn PushProvider>, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(DispatcherInner { provider, timeout }),
        }
    }

    /// Queue one notification to `push_token`. Malformed tokens are dropped
    /// before any network call. The returned handle is only useful to tests;
    /// callers are free to ignore it.
    pub fn dispatch(&self, push_token: &str, body: &str) -> Option<JoinHandle<()>> {
        if !is_push_token(push_token) {
            debug!("Dropping push to malformed token");
            return None;
        }

        let notification = PushNotification {
            to: push_token.to_string(),
            sound: "default".into(),
            title: NOTIFICATION_TITLE.into(),
            body: body.to_string(),
        };
        let inner = self.inner.clone();

        Some(tokio::spawn(async move {
            match tokio::time::timeout(inner.timeout, inner.provider.send(&notification)).await {
                Ok(Ok(())) => debug!("Push delivered to provider"),
                Ok(Err(e)) => warn!("Push dispatch failed: {:#}", e),
                Err(_) => warn!("Push dispatch timed out after {:?}", inner.timeout),
            }
        }))
    }
}

/// Accepts Expo device tokens: `ExponentPushToken[...]`, `ExpoPushToken[...]`,
/// or a bare 8-4-4-4-12 alphanumeric id.
pub fn is_push_token(token: &str) -> bool {
    let bracketed = (token.starts_with("ExponentPushToken[") || token.starts_with("ExpoPushToken["))
        && token.ends_with(']');
    bracketed || is_dashed_id(token)
}

fn is_dashed_id(token: &str) -> bool {
    let groups: Vec<&str> = token.split('-').collect();
    groups.len() == 5
        && groups
            .iter()
            .zip([8, 4, 4, 4, 12])
            .all(|(g, len)| g.len() == len && g.bytes().all(|b| b.is_ascii_alphanumeric()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<PushNotification>>,
    }

    impl PushProvider for Recorder {
        fn send<'a>(&'a self, n: &'a PushNotification) -> BoxFuture<'a, anyhow::Result<()>> {
            async move {
                self.sent.lock().unwrap().push(n.clone());
                Ok(())
            }
            .boxed()
        }
    }

    #[derive(Default)]
    struct Failing {
        attempts: AtomicUsize,
    }

    impl PushProvider for Failing {
        fn send<'a>(&'a self, _n: &'a PushNotification) -> BoxFuture<'a, anyhow::Result<()>> {
            async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::anyhow!("provider rejected token"))
            }
            .boxed()
        }
    }

    struct Stalled;

    impl PushProvider for Stalled {
        fn send<'a>(&'a self, _n: &'a PushNotification) -> BoxFuture<'a, anyhow::Result<()>> {
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            }
            .boxed()
        }
    }

    #[test]
    fn token_format() {
        assert!(is_push_token("ExponentPushToken[xxxxxxxxxxxxxxxxxxxxxx]"));
        assert!(is_push_token("ExpoPushToken[abc]"));
        assert!(is_push_token("a1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d6"));
        assert!(!is_push_token(""));
        assert!(!is_push_token("ExponentPushToken[unterminated"));
        assert!(!is_push_token("fcm:abcdef"));
        assert!(!is_push_token("a1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d"));
        assert!(!is_push_token("a1b2c3d4-e5f6-a7b8-c9d0-e1f2a3b4c5d!"));
    }

    #[tokio::test]
    async fn delivers_one_notification() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(recorder.clone(), Duration::from_secs(1));

        dispatcher
            .dispatch("ExponentPushToken[abc]", "Secret message")
            .unwrap()
            .await
            .unwrap();

        let sent = recorder.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "ExponentPushToken[abc]");
        assert_eq!(sent[0].title, NOTIFICATION_TITLE);
        assert_eq!(sent[0].sound, "default");
        assert_eq!(sent[0].body, "Secret message");
    }

    #[tokio::test]
    async fn malformed_token_never_reaches_provider() {
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Dispatcher::new(recorder.clone(), Duration::from_secs(1));

        assert!(dispatcher.dispatch("not-a-token", "Voice note").is_none());
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failure_is_swallowed_without_retry() {
        let failing = Arc::new(Failing::default());
        let dispatcher = Dispatcher::new(failing.clone(), Duration::from_secs(1));

        // The task itself completes cleanly even though delivery failed.
        dispatcher
            .dispatch("ExpoPushToken[x]", "Voice note")
            .unwrap()
            .await
            .unwrap();
        assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_provider_is_cut_off() {
        let dispatcher = Dispatcher::new(Arc::new(Stalled), Duration::from_millis(20));
        let handle = dispatcher.dispatch("ExpoPushToken[x]", "Voice note").unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("dispatch should give up at its own timeout")
            .unwrap();
    }
}
