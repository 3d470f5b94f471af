//! Delivery records: per-beneficiary notification state for one epoch.
//!
//! A delivery is created `Pending` inside the trigger transaction. Before
//! sending, a dispatcher must claim it; only the holder of the claim token
//! may resolve it. `Sent` is terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
  Pending,
  Sent,
  Failed,
}

impl DeliveryState {
  pub fn as_str(self) -> &'static str {
    match self {
      DeliveryState::Pending => "pending",
      DeliveryState::Sent => "sent",
      DeliveryState::Failed => "failed",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(DeliveryState::Pending),
      "sent" => Ok(DeliveryState::Sent),
      "failed" => Ok(DeliveryState::Failed),
      other => Err(Error::UnknownDiscriminant {
        kind:  "delivery state",
        value: other.to_owned(),
      }),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
  pub delivery_id:    Uuid,
  pub subject_id:     Uuid,
  pub beneficiary_id: Uuid,
  pub epoch:          u64,
  pub state:          DeliveryState,
  pub attempts:       u32,
  /// Present while a dispatcher holds the delivery.
  pub claim_token:    Option<Uuid>,
  pub claimed_at:     Option<DateTime<Utc>>,
  pub last_error:     Option<String>,
  pub created_at:     DateTime<Utc>,
  pub resolved_at:    Option<DateTime<Utc>>,
}

impl Delivery {
  pub fn is_claimed(&self) -> bool { self.claim_token.is_some() }
}

/// How a claimed delivery attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
  Sent,
  Failed(String),
}

impl DeliveryOutcome {
  pub fn state(&self) -> DeliveryState {
    match self {
      DeliveryOutcome::Sent => DeliveryState::Sent,
      DeliveryOutcome::Failed(_) => DeliveryState::Failed,
    }
  }
}

/// A `(subject, epoch)` pair with deliveries still waiting for a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DispatchKey {
  pub subject_id: Uuid,
  pub epoch:      u64,
}
