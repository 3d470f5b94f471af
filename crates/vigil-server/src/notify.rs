//! Concrete notifiers.
//!
//! [`LogNotifier`] only records the notice through `tracing`; it is the
//! default and is meant for development. [`WebhookNotifier`] POSTs the
//! notice as JSON and treats any 2xx response as delivered.

use std::{future::Future, time::Duration};

use vigil_core::notify::{DeliveryError, Notifier, TriggerNotice};

use crate::{NotifierConfig, NotifierKind, error::Error};

// ─── Log ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn send<'a>(
    &'a self,
    notice: &'a TriggerNotice,
  ) -> impl Future<Output = Result<(), DeliveryError>> + Send + 'a {
    tracing::info!(
      subject = %notice.subject_id,
      epoch = notice.epoch,
      to = %notice.beneficiary_email,
      owner = %notice.owner_name,
      "trigger notice (log only)"
    );
    std::future::ready(Ok(()))
  }
}

// ─── Webhook ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
  client: reqwest::Client,
  url:    String,
}

impl WebhookNotifier {
  pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client, url: url.into() })
  }
}

impl Notifier for WebhookNotifier {
  fn send<'a>(
    &'a self,
    notice: &'a TriggerNotice,
  ) -> impl Future<Output = Result<(), DeliveryError>> + Send + 'a {
    async move {
      let resp = self
        .client
        .post(&self.url)
        .json(notice)
        .send()
        .await
        .map_err(|e| DeliveryError(e.to_string()))?;

      let status = resp.status();
      if !status.is_success() {
        return Err(DeliveryError(format!("webhook responded with {status}")));
      }
      Ok(())
    }
  }
}

// ─── Selection ────────────────────────────────────────────────────────────────

/// The notifier chosen by configuration.
#[derive(Debug, Clone)]
pub enum ServerNotifier {
  Log(LogNotifier),
  Webhook(WebhookNotifier),
}

impl ServerNotifier {
  pub fn from_config(config: &NotifierConfig) -> Result<Self, Error> {
    match config.kind {
      NotifierKind::Log => Ok(ServerNotifier::Log(LogNotifier)),
      NotifierKind::Webhook => {
        let url = config
          .webhook_url
          .as_deref()
          .ok_or_else(|| Error::Config("notifier.webhook_url is required for the webhook notifier".into()))?;
        let notifier = WebhookNotifier::new(url, Duration::from_secs(config.timeout_secs))?;
        Ok(ServerNotifier::Webhook(notifier))
      }
    }
  }
}

impl Notifier for ServerNotifier {
  fn send<'a>(
    &'a self,
    notice: &'a TriggerNotice,
  ) -> impl Future<Output = Result<(), DeliveryError>> + Send + 'a {
    async move {
      match self {
        ServerNotifier::Log(n) => n.send(notice).await,
        ServerNotifier::Webhook(n) => n.send(notice).await,
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::{Arc, Mutex};

  use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
  use serde_json::Value;
  use tokio::net::TcpListener;
  use uuid::Uuid;

  fn notice() -> TriggerNotice {
    TriggerNotice {
      subject_id:        Uuid::new_v4(),
      epoch:             1,
      beneficiary_id:    Uuid::new_v4(),
      beneficiary_email: "ben@example.com".into(),
      beneficiary_name:  "Ben".into(),
      owner_name:        "Ada".into(),
      access_key:        "ab".repeat(32),
    }
  }

  type Received = Arc<Mutex<Vec<Value>>>;

  /// Serve `/ok` (records the body) and `/fail` (500) on an ephemeral port.
  async fn spawn_receiver() -> (String, Received) {
    let received: Received = Arc::default();
    let app = Router::new()
      .route(
        "/ok",
        post(|State(rx): State<Received>, Json(body): Json<Value>| async move {
          rx.lock().unwrap().push(body);
          StatusCode::NO_CONTENT
        }),
      )
      .route("/fail", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
      .with_state(Arc::clone(&received));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), received)
  }

  #[tokio::test]
  async fn webhook_posts_notice_as_json() {
    let (base, received) = spawn_receiver().await;
    let notifier = WebhookNotifier::new(format!("{base}/ok"), Duration::from_secs(5)).unwrap();
    let notice = notice();

    notifier.send(&notice).await.unwrap();

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["beneficiary_email"], "ben@example.com");
    assert_eq!(bodies[0]["subject_id"], notice.subject_id.to_string());
  }

  #[tokio::test]
  async fn webhook_non_2xx_is_a_failure() {
    let (base, _) = spawn_receiver().await;
    let notifier = WebhookNotifier::new(format!("{base}/fail"), Duration::from_secs(5)).unwrap();

    let err = notifier.send(&notice()).await.unwrap_err();
    assert!(err.0.contains("500"), "{err}");
  }

  #[tokio::test]
  async fn webhook_unreachable_is_a_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let notifier = WebhookNotifier::new(format!("http://{addr}/"), Duration::from_secs(2)).unwrap();
    assert!(notifier.send(&notice()).await.is_err());
  }

  #[test]
  fn webhook_requires_url() {
    let config = NotifierConfig { kind: NotifierKind::Webhook, ..NotifierConfig::default() };
    assert!(matches!(ServerNotifier::from_config(&config), Err(Error::Config(_))));

    let log = NotifierConfig::default();
    assert!(matches!(ServerNotifier::from_config(&log), Ok(ServerNotifier::Log(_))));
  }
}
