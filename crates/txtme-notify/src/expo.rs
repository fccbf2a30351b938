use std::time::Duration;

use anyhow::{Context, Result, bail};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde::Deserialize;

use crate::dispatcher::{PushNotification, PushProvider};

pub const DEFAULT_PUSH_URL: &str = "https://exp.host/--/api/v2/push/send";

/// Expo push service client.
pub struct ExpoProvider {
    client: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    data: Vec<PushTicket>,
}

#[derive(Debug, Deserialize)]
struct PushTicket {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

impl ExpoProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building push HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn post(&self, notification: &PushNotification) -> Result<()> {
        let resp = self
            .client
            .post(&self.url)
            .json(&[notification])
            .send()
            .await?
            .error_for_status()?;

        let body: PushResponse = resp.json().await.context("decoding push tickets")?;
        if let Some(ticket) = body.data.iter().find(|t| t.status != "ok") {
            bail!(
                "push ticket {}: {}",
                ticket.status,
                ticket.message.as_deref().unwrap_or("no message")
            );
        }
        Ok(())
    }
}

impl PushProvider for ExpoProvider {
    fn send<'a>(&'a self, notification: &'a PushNotification) -> BoxFuture<'a, Result<()>> {
        self.post(notification).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;

    /// Serve a fake push endpoint that records each request body and replies
    /// with `reply`.
    async fn fake_expo(reply: Value) -> (String, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let app = Router::new().route(
            "/push",
            post(move |Json(body): Json<Value>| {
                let tx = tx.clone();
                let reply = reply.clone();
                async move {
                    let _ = tx.send(body);
                    Json(reply)
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/push", addr), rx)
    }

    fn note() -> PushNotification {
        PushNotification {
            to: "ExponentPushToken[abc]".into(),
            sound: "default".into(),
            title: "New Txtme!".into(),
            body: "Secret message".into(),
        }
    }

    #[tokio::test]
    async fn posts_expo_message_array() {
        let (url, mut rx) = fake_expo(json!({ "data": [{ "status": "ok", "id": "t-1" }] })).await;
        let provider = ExpoProvider::new(url, Duration::from_secs(5)).unwrap();

        provider.send(&note()).await.unwrap();

        let body = rx.recv().await.unwrap();
        assert_eq!(
            body,
            json!([{
                "to": "ExponentPushToken[abc]",
                "sound": "default",
                "title": "New Txtme!",
                "body": "Secret message",
            }])
        );
    }

    #[tokio::test]
    async fn error_ticket_is_a_failure() {
        let (url, _rx) = fake_expo(json!({
            "data": [{ "status": "error", "message": "DeviceNotRegistered" }]
        }))
        .await;
        let provider = ExpoProvider::new(url, Duration::from_secs(5)).unwrap();

        let err = provider.send(&note()).await.unwrap_err();
        assert!(err.to_string().contains("DeviceNotRegistered"));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_failure() {
        // Nothing listens on the discard port of the loopback address.
        let provider = ExpoProvider::new("http://127.0.0.1:9/push", Duration::from_secs(2)).unwrap();
        assert!(provider.send(&note()).await.is_err());
    }
}
