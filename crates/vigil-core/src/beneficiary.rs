//! Beneficiary: a party released to when the switch triggers.

use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore as _};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beneficiary {
  pub beneficiary_id: Uuid,
  pub subject_id:     Uuid,
  pub name:           String,
  pub email:          String,
  /// Opaque key handed to the beneficiary in the trigger notice.
  pub access_key:     String,
  pub created_at:     DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBeneficiary {
  pub subject_id: Uuid,
  pub name:       String,
  pub email:      String,
}

/// Generate a fresh access key: 32 random bytes, lowercase hex.
pub fn generate_access_key() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  hex::encode(bytes)
}
