//! Handler for `GET /subjects/:id/audit[?limit=<n>]`.

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use uuid::Uuid;
use vigil_core::{
  audit::AuditEntry, clock::Clock, notify::Notifier, store::SwitchStore,
};
use vigil_engine::Switch;

use crate::error::ApiError;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct AuditParams {
  pub limit: Option<usize>,
}

/// Newest entries first.
pub async fn list<S, N, C>(
  State(switch): State<Switch<S, N, C>>,
  Path(id): Path<Uuid>,
  Query(params): Query<AuditParams>,
) -> Result<Json<Vec<AuditEntry>>, ApiError>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
  if limit == 0 || limit > MAX_LIMIT {
    return Err(ApiError::BadRequest(format!("limit must be between 1 and {MAX_LIMIT}")));
  }

  switch.status(id).await?;
  let entries = switch
    .store()
    .list_audit(id, limit)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(entries))
}
