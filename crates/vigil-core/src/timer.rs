//! Timer: a persisted, generation-tagged expiry check.
//!
//! Each subject owns at most one timer row. A timer is a request to run the
//! expiry evaluator for `(subject_id, generation)` no earlier than `fire_at`.
//! Firing is at-least-once: the evaluator re-derives its decision from the
//! subject's current state and discards fires whose generation is stale.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timer {
  pub subject_id: Uuid,
  pub generation: u64,
  pub fire_at:    DateTime<Utc>,
}
