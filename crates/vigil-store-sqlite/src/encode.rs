//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 UTC strings with a fixed
//! microsecond fraction and a `Z` suffix, so lexical order in SQL equals
//! chronological order. UUIDs are stored as hyphenated lowercase strings.
//! Counters (`generation`, `epoch`, `attempts`) are stored as INTEGER.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Row, types::Type};
use uuid::Uuid;
use vigil_core::{
  audit::{AuditEntry, AuditKind},
  beneficiary::Beneficiary,
  delivery::{Delivery, DeliveryState},
  subject::{Period, Subject, SwitchStatus},
  timer::Timer,
};

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

/// Surface a decode failure from inside a `tokio_rusqlite` closure.
pub fn conversion(e: Error) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `subjects` row.
pub struct RawSubject {
  pub subject_id:     String,
  pub email:          String,
  pub display_name:   Option<String>,
  pub period_secs:    i64,
  pub last_active_at: String,
  pub status:         String,
  pub generation:     i64,
  pub epoch:          i64,
  pub created_at:     String,
  pub triggered_at:   Option<String>,
}

impl RawSubject {
  pub const COLUMNS: &'static str = "subject_id, email, display_name, period_secs, \
     last_active_at, status, generation, epoch, created_at, triggered_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id:     row.get(0)?,
      email:          row.get(1)?,
      display_name:   row.get(2)?,
      period_secs:    row.get(3)?,
      last_active_at: row.get(4)?,
      status:         row.get(5)?,
      generation:     row.get(6)?,
      epoch:          row.get(7)?,
      created_at:     row.get(8)?,
      triggered_at:   row.get(9)?,
    })
  }

  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id:     decode_uuid(&self.subject_id)?,
      email:          self.email,
      display_name:   self.display_name,
      period:         Period::from_secs(self.period_secs),
      last_active_at: decode_dt(&self.last_active_at)?,
      status:         SwitchStatus::parse(&self.status)?,
      generation:     self.generation as u64,
      epoch:          self.epoch as u64,
      created_at:     decode_dt(&self.created_at)?,
      triggered_at:   decode_opt_dt(self.triggered_at.as_deref())?,
    })
  }
}

/// Raw values read directly from a `timers` row.
pub struct RawTimer {
  pub subject_id: String,
  pub generation: i64,
  pub fire_at:    String,
}

impl RawTimer {
  pub const COLUMNS: &'static str = "subject_id, generation, fire_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      subject_id: row.get(0)?,
      generation: row.get(1)?,
      fire_at:    row.get(2)?,
    })
  }

  pub fn into_timer(self) -> Result<Timer> {
    Ok(Timer {
      subject_id: decode_uuid(&self.subject_id)?,
      generation: self.generation as u64,
      fire_at:    decode_dt(&self.fire_at)?,
    })
  }
}

/// Raw values read directly from a `beneficiaries` row.
pub struct RawBeneficiary {
  pub beneficiary_id: String,
  pub subject_id:     String,
  pub name:           String,
  pub email:          String,
  pub access_key:     String,
  pub created_at:     String,
}

impl RawBeneficiary {
  pub const COLUMNS: &'static str =
    "beneficiary_id, subject_id, name, email, access_key, created_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      beneficiary_id: row.get(0)?,
      subject_id:     row.get(1)?,
      name:           row.get(2)?,
      email:          row.get(3)?,
      access_key:     row.get(4)?,
      created_at:     row.get(5)?,
    })
  }

  pub fn into_beneficiary(self) -> Result<Beneficiary> {
    Ok(Beneficiary {
      beneficiary_id: decode_uuid(&self.beneficiary_id)?,
      subject_id:     decode_uuid(&self.subject_id)?,
      name:           self.name,
      email:          self.email,
      access_key:     self.access_key,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `deliveries` row.
pub struct RawDelivery {
  pub delivery_id:    String,
  pub subject_id:     String,
  pub beneficiary_id: String,
  pub epoch:          i64,
  pub state:          String,
  pub attempts:       i64,
  pub claim_token:    Option<String>,
  pub claimed_at:     Option<String>,
  pub last_error:     Option<String>,
  pub created_at:     String,
  pub resolved_at:    Option<String>,
}

impl RawDelivery {
  pub const COLUMNS: &'static str = "delivery_id, subject_id, beneficiary_id, epoch, \
     state, attempts, claim_token, claimed_at, last_error, created_at, resolved_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      delivery_id:    row.get(0)?,
      subject_id:     row.get(1)?,
      beneficiary_id: row.get(2)?,
      epoch:          row.get(3)?,
      state:          row.get(4)?,
      attempts:       row.get(5)?,
      claim_token:    row.get(6)?,
      claimed_at:     row.get(7)?,
      last_error:     row.get(8)?,
      created_at:     row.get(9)?,
      resolved_at:    row.get(10)?,
    })
  }

  pub fn into_delivery(self) -> Result<Delivery> {
    Ok(Delivery {
      delivery_id:    decode_uuid(&self.delivery_id)?,
      subject_id:     decode_uuid(&self.subject_id)?,
      beneficiary_id: decode_uuid(&self.beneficiary_id)?,
      epoch:          self.epoch as u64,
      state:          DeliveryState::parse(&self.state)?,
      attempts:       self.attempts as u32,
      claim_token:    self.claim_token.as_deref().map(decode_uuid).transpose()?,
      claimed_at:     decode_opt_dt(self.claimed_at.as_deref())?,
      last_error:     self.last_error,
      created_at:     decode_dt(&self.created_at)?,
      resolved_at:    decode_opt_dt(self.resolved_at.as_deref())?,
    })
  }
}

/// Raw values read directly from an `audit_log` row.
pub struct RawAudit {
  pub entry_id:    String,
  pub subject_id:  String,
  pub kind:        String,
  pub message:     String,
  pub recorded_at: String,
}

impl RawAudit {
  pub const COLUMNS: &'static str = "entry_id, subject_id, kind, message, recorded_at";

  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:    row.get(0)?,
      subject_id:  row.get(1)?,
      kind:        row.get(2)?,
      message:     row.get(3)?,
      recorded_at: row.get(4)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditEntry> {
    Ok(AuditEntry {
      entry_id:    decode_uuid(&self.entry_id)?,
      subject_id:  decode_uuid(&self.subject_id)?,
      kind:        AuditKind::parse(&self.kind)?,
      message:     self.message,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeDelta;

  use super::*;

  #[test]
  fn encoded_timestamps_sort_chronologically() {
    let base = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
      .unwrap()
      .with_timezone(&Utc);
    let a = encode_dt(base);
    let b = encode_dt(base + TimeDelta::microseconds(1));
    let c = encode_dt(base + TimeDelta::seconds(1));
    assert_eq!(a, "2024-03-01T12:00:00.000000Z");
    assert!(a < b && b < c);
  }

  #[test]
  fn dt_roundtrip_keeps_micros() {
    let now = Utc::now();
    let back = decode_dt(&encode_dt(now)).unwrap();
    assert_eq!(back.timestamp_micros(), now.timestamp_micros());
  }
}
