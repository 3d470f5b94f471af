//! Vigil server: configuration, operator auth, notifiers, and the HTTP
//! application wrapping [`vigil_api`].

pub mod auth;
pub mod error;
pub mod notify;

pub use error::Error;

use std::{path::PathBuf, sync::Arc, time::Duration};

use axum::{Router, middleware, routing::get};
use chrono::TimeDelta;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use vigil_core::{
  clock::Clock, notify::Notifier, store::SwitchStore, subject::PeriodBounds,
};
use vigil_engine::{Switch, WorkerConfig};

use auth::{AuthConfig, require_auth};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `VIGIL_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:               String,
  pub port:               u16,
  pub store_path:         PathBuf,
  pub auth_username:      String,
  pub auth_password_hash: String,
  #[serde(default)]
  pub period:             PeriodConfig,
  #[serde(default)]
  pub worker:             WorkerSettings,
  #[serde(default)]
  pub notifier:           NotifierConfig,
}

/// `[period]`: inactivity period limits, in days.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PeriodConfig {
  pub min_days:     u32,
  pub max_days:     u32,
  pub default_days: u32,
}

impl Default for PeriodConfig {
  fn default() -> Self {
    let bounds = PeriodBounds::default();
    Self {
      min_days:     bounds.min_days,
      max_days:     bounds.max_days,
      default_days: bounds.default_days,
    }
  }
}

/// `[worker]`: timer polling and delivery recovery.
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct WorkerSettings {
  pub poll_interval_secs: u64,
  pub batch_size:         usize,
  pub claim_timeout_secs: i64,
  pub sweep_grace_secs:   i64,
}

impl Default for WorkerSettings {
  fn default() -> Self {
    Self {
      poll_interval_secs: 30,
      batch_size:         64,
      claim_timeout_secs: 900,
      sweep_grace_secs:   60,
    }
  }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
  #[default]
  Log,
  Webhook,
}

/// `[notifier]`: how trigger notices leave the process.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotifierConfig {
  pub kind:         NotifierKind,
  pub webhook_url:  Option<String>,
  pub timeout_secs: u64,
}

impl Default for NotifierConfig {
  fn default() -> Self {
    Self { kind: NotifierKind::Log, webhook_url: None, timeout_secs: 10 }
  }
}

impl ServerConfig {
  /// Period bounds, checked for consistency.
  pub fn period_bounds(&self) -> Result<PeriodBounds, Error> {
    let PeriodConfig { min_days, max_days, default_days } = self.period;
    if min_days == 0 || min_days > max_days {
      return Err(Error::Config(format!(
        "period.min_days ({min_days}) must be at least 1 and not above period.max_days ({max_days})"
      )));
    }
    if max_days > PeriodBounds::CEILING_DAYS {
      return Err(Error::Config(format!(
        "period.max_days ({max_days}) must not exceed {}",
        PeriodBounds::CEILING_DAYS
      )));
    }
    if !(min_days..=max_days).contains(&default_days) {
      return Err(Error::Config(format!(
        "period.default_days ({default_days}) must lie within {min_days}..={max_days}"
      )));
    }
    Ok(PeriodBounds { min_days, max_days, default_days })
  }

  pub fn worker_config(&self) -> Result<WorkerConfig, Error> {
    let w = self.worker;
    if w.poll_interval_secs == 0 || w.batch_size == 0 {
      return Err(Error::Config(
        "worker.poll_interval_secs and worker.batch_size must be positive".into(),
      ));
    }
    if w.claim_timeout_secs <= 0 || w.sweep_grace_secs < 0 {
      return Err(Error::Config(
        "worker.claim_timeout_secs must be positive and worker.sweep_grace_secs not negative"
          .into(),
      ));
    }
    // A send still in flight must never outlive its claim.
    if !i64::try_from(self.notifier.timeout_secs).is_ok_and(|t| t < w.claim_timeout_secs) {
      return Err(Error::Config(format!(
        "notifier.timeout_secs ({}) must be below worker.claim_timeout_secs ({})",
        self.notifier.timeout_secs, w.claim_timeout_secs
      )));
    }
    Ok(WorkerConfig {
      poll_interval: Duration::from_secs(w.poll_interval_secs),
      batch_size:    w.batch_size,
      claim_timeout: TimeDelta::seconds(w.claim_timeout_secs),
      sweep_grace:   TimeDelta::seconds(w.sweep_grace_secs),
    })
  }

  pub fn auth_config(&self) -> AuthConfig {
    AuthConfig {
      username:      self.auth_username.clone(),
      password_hash: self.auth_password_hash.clone(),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the application router: the JSON API under `/api` behind operator
/// auth, plus an unauthenticated `/health` probe.
pub fn router<S, N, C>(switch: Switch<S, N, C>, auth: AuthConfig) -> Router
where
  S: SwitchStore + 'static,
  N: Notifier + 'static,
  C: Clock + 'static,
{
  let api = vigil_api::api_router(switch)
    .layer(middleware::from_fn_with_state(Arc::new(auth), require_auth));

  Router::new()
    .nest("/api", api)
    .route("/health", get(|| async { "ok" }))
    .layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use rand_core::OsRng;
  use tower::ServiceExt as _;
  use vigil_store_sqlite::SqliteStore;

  use crate::notify::LogNotifier;

  async fn make_app(password: &str) -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt  = SaltString::generate(&mut OsRng);
    let hash  = Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string();
    let switch = Switch::new(Arc::new(store), Arc::new(LogNotifier));
    router(switch, AuthConfig { username: "operator".into(), password_hash: hash })
  }

  fn auth_header(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }

  fn enroll_request(auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
      .method("POST")
      .uri("/api/subjects")
      .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder
      .body(Body::from(r#"{"email":"owner@example.com","period_days":14}"#))
      .unwrap()
  }

  #[tokio::test]
  async fn api_requires_operator_credentials() {
    let app = make_app("secret").await;

    let resp = app.clone().oneshot(enroll_request(None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

    let wrong = auth_header("operator", "nope");
    let resp = app.clone().oneshot(enroll_request(Some(&wrong))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let right = auth_header("operator", "secret");
    let resp = app.oneshot(enroll_request(Some(&right))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
  }

  #[tokio::test]
  async fn health_is_public() {
    let app  = make_app("secret").await;
    let req  = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  fn parse_config(toml: &str) -> ServerConfig {
    config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap()
  }

  const BASE: &str = r#"
    host = "127.0.0.1"
    port = 8080
    store_path = "/tmp/vigil.db"
    auth_username = "operator"
    auth_password_hash = "x"
  "#;

  #[test]
  fn config_sections_default() {
    let cfg = parse_config(BASE);
    assert_eq!(cfg.period_bounds().unwrap(), PeriodBounds::default());
    assert_eq!(cfg.notifier.kind, NotifierKind::Log);

    let worker = cfg.worker_config().unwrap();
    assert_eq!(worker.poll_interval, Duration::from_secs(30));
    assert_eq!(worker.claim_timeout, TimeDelta::minutes(15));
  }

  #[test]
  fn config_sections_override() {
    let cfg = parse_config(&format!(
      "{BASE}
      [period]
      max_days = 60
      default_days = 14

      [worker]
      batch_size = 8

      [notifier]
      kind = \"webhook\"
      webhook_url = \"https://hooks.example.com/vigil\"
      "
    ));

    let bounds = cfg.period_bounds().unwrap();
    assert_eq!((bounds.min_days, bounds.max_days, bounds.default_days), (7, 60, 14));
    assert_eq!(cfg.worker_config().unwrap().batch_size, 8);
    assert_eq!(cfg.notifier.kind, NotifierKind::Webhook);
    assert_eq!(cfg.notifier.timeout_secs, 10);
  }

  #[test]
  fn inconsistent_period_is_rejected() {
    let cfg = parse_config(&format!("{BASE}\n[period]\ndefault_days = 120\n"));
    assert!(matches!(cfg.period_bounds(), Err(Error::Config(_))));

    let cfg = parse_config(&format!("{BASE}\n[period]\nmin_days = 30\nmax_days = 10\n"));
    assert!(matches!(cfg.period_bounds(), Err(Error::Config(_))));

    let cfg = parse_config(&format!("{BASE}\n[period]\nmax_days = 3000000000\n"));
    assert!(matches!(cfg.period_bounds(), Err(Error::Config(_))));
  }

  #[test]
  fn notifier_timeout_must_fit_inside_claim() {
    let cfg = parse_config(&format!(
      "{BASE}\n[worker]\nclaim_timeout_secs = 30\n[notifier]\ntimeout_secs = 30\n"
    ));
    assert!(matches!(cfg.worker_config(), Err(Error::Config(_))));

    let cfg = parse_config(&format!(
      "{BASE}\n[worker]\nclaim_timeout_secs = 31\n[notifier]\ntimeout_secs = 30\n"
    ));
    assert_eq!(cfg.worker_config().unwrap().claim_timeout, TimeDelta::seconds(31));
  }
}
