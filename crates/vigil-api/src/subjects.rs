//! Handlers for `/subjects` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/subjects` | All enrolled subjects |
//! | `POST` | `/subjects` | Body: `{"email":"…","period_days":30}` |
//! | `GET`  | `/subjects/:id` | 404 if not found |
//! | `POST` | `/subjects/:id/heartbeat` | Optional body `{"kind":"login"}` |
//! | `PUT`  | `/subjects/:id/settings` | Body: `{"period_days":14}` and/or `{"display_name":"…"}` |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::{
  clock::Clock,
  notify::Notifier,
  store::SwitchStore,
  subject::{ActivityKind, Subject, SwitchStatus},
};
use vigil_engine::Switch;

use crate::error::ApiError;

// ─── View ─────────────────────────────────────────────────────────────────────

/// What the owner sees about their switch.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubjectView {
  pub subject_id:     Uuid,
  pub email:          String,
  pub display_name:   Option<String>,
  pub status:         SwitchStatus,
  pub period_days:    i64,
  pub last_active_at: DateTime<Utc>,
  /// When the switch triggers without another check-in. Absent once
  /// triggered.
  pub next_check_at:  Option<DateTime<Utc>>,
  pub epoch:          u64,
  pub triggered_at:   Option<DateTime<Utc>>,
}

impl From<Subject> for SubjectView {
  fn from(s: Subject) -> Self {
    let next_check_at = (s.status == SwitchStatus::Active).then(|| s.expires_at());
    Self {
      subject_id: s.subject_id,
      email: s.email,
      display_name: s.display_name,
      status: s.status,
      period_days: s.period.whole_days(),
      last_active_at: s.last_active_at,
      next_check_at,
      epoch: s.epoch,
      triggered_at: s.triggered_at,
    }
  }
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /subjects`
pub async fn list<S, N, C>(
  State(switch): State<Switch<S, N, C>>,
) -> Result<Json<Vec<SubjectView>>, ApiError>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  let subjects = switch.subjects().await?;
  Ok(Json(subjects.into_iter().map(SubjectView::from).collect()))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub email:        String,
  pub display_name: Option<String>,
  pub period_days:  Option<u32>,
}

/// `POST /subjects`
pub async fn create<S, N, C>(
  State(switch): State<Switch<S, N, C>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  if body.email.trim().is_empty() {
    return Err(ApiError::BadRequest("email must not be empty".into()));
  }
  let subject = switch
    .enroll(body.email, body.display_name, body.period_days)
    .await?;
  Ok((StatusCode::CREATED, Json(SubjectView::from(subject))))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /subjects/:id`
pub async fn get_one<S, N, C>(
  State(switch): State<Switch<S, N, C>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SubjectView>, ApiError>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  let subject = switch.status(id).await?;
  Ok(Json(subject.into()))
}

// ─── Heartbeat ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatBody {
  #[serde(default)]
  pub kind: ActivityKind,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeartbeatResponse {
  pub subject: SubjectView,
  /// `true` if this check-in re-armed a triggered switch.
  pub rearmed: bool,
}

/// `POST /subjects/:id/heartbeat`
pub async fn heartbeat<S, N, C>(
  State(switch): State<Switch<S, N, C>>,
  Path(id): Path<Uuid>,
  body: Option<Json<HeartbeatBody>>,
) -> Result<Json<HeartbeatResponse>, ApiError>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  let kind = body.map(|Json(b)| b.kind).unwrap_or_default();
  let record = switch.record_activity(id, kind).await?;
  Ok(Json(HeartbeatResponse {
    subject: record.subject.into(),
    rearmed: record.rearmed,
  }))
}

// ─── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SettingsBody {
  pub period_days:  Option<u32>,
  pub display_name: Option<String>,
}

/// `PUT /subjects/:id/settings`
pub async fn settings<S, N, C>(
  State(switch): State<Switch<S, N, C>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SettingsBody>,
) -> Result<Json<SubjectView>, ApiError>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  if body.period_days.is_none() && body.display_name.is_none() {
    return Err(ApiError::BadRequest("nothing to update".into()));
  }
  let subject = switch
    .update_settings(id, body.period_days, body.display_name)
    .await?;
  Ok(Json(subject.into()))
}
