//! The `Notifier` trait: the delivery capability the dispatcher consumes.
//!
//! Implementations make a single delivery attempt and report success or
//! failure. Retrying is not the notifier's job.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Everything a beneficiary needs to be told the switch has fired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerNotice {
  pub subject_id:        Uuid,
  pub epoch:             u64,
  pub beneficiary_id:    Uuid,
  pub beneficiary_email: String,
  pub beneficiary_name:  String,
  pub owner_name:        String,
  pub access_key:        String,
}

/// A failed delivery attempt.
#[derive(Debug, Clone, Error)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

pub trait Notifier: Send + Sync {
  fn send<'a>(
    &'a self,
    notice: &'a TriggerNotice,
  ) -> impl Future<Output = Result<(), DeliveryError>> + Send + 'a;
}
