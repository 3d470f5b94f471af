//! Handlers for delivery records.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/subjects/:id/deliveries` | Optional `?epoch=<n>` |
//! | `POST` | `/deliveries/:id/retry` | 409 if already sent |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vigil_core::{
  clock::Clock, delivery::Delivery, notify::Notifier, store::SwitchStore,
};
use vigil_engine::{Attempt, Switch};

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub epoch: Option<u64>,
}

/// `GET /subjects/:id/deliveries[?epoch=<n>]`
pub async fn list<S, N, C>(
  State(switch): State<Switch<S, N, C>>,
  Path(id): Path<Uuid>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Delivery>>, ApiError>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  switch.status(id).await?;
  let deliveries = switch
    .store()
    .list_deliveries(id, params.epoch)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(deliveries))
}

// ─── Retry ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct RetryResponse {
  pub attempt:  Attempt,
  pub delivery: Delivery,
}

/// `POST /deliveries/:id/retry`
pub async fn retry<S, N, C>(
  State(switch): State<Switch<S, N, C>>,
  Path(id): Path<Uuid>,
) -> Result<Json<RetryResponse>, ApiError>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  let attempt = switch.retry_delivery(id).await?;
  let delivery = switch
    .store()
    .get_delivery(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("delivery {id} not found")))?;
  Ok(Json(RetryResponse { attempt, delivery }))
}
