//! Subject: the account being watched by the switch.
//!
//! A subject carries its own countdown state: the inactivity period, the last
//! check-in, the switch status and the timer generation. The generation and
//! `last_active_at` are always written together, so any reader that observes
//! one observes the matching other.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, audit::AuditKind};

const SECS_PER_DAY: i64 = 24 * 60 * 60;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Switch status for the subject's current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchStatus {
  /// Countdown running; check-ins keep pushing the deadline out.
  Active,
  /// The countdown expired and beneficiaries were released. Terminal for the
  /// epoch.
  Triggered,
}

impl SwitchStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      SwitchStatus::Active => "active",
      SwitchStatus::Triggered => "triggered",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(SwitchStatus::Active),
      "triggered" => Ok(SwitchStatus::Triggered),
      other => Err(Error::UnknownDiscriminant {
        kind:  "switch status",
        value: other.to_owned(),
      }),
    }
  }
}

// ─── Period ──────────────────────────────────────────────────────────────────

/// The inactivity threshold. Serialised as whole seconds.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Period(i64);

impl Period {
  pub const fn from_days(days: u32) -> Self { Self(days as i64 * SECS_PER_DAY) }

  pub const fn from_secs(secs: i64) -> Self { Self(secs) }

  pub const fn as_secs(self) -> i64 { self.0 }

  /// Whole days, rounded down.
  pub const fn whole_days(self) -> i64 { self.0 / SECS_PER_DAY }

  pub fn as_delta(self) -> TimeDelta { TimeDelta::seconds(self.0) }
}

impl fmt::Display for Period {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match (self.0 % SECS_PER_DAY, self.whole_days()) {
      (0, 1) => write!(f, "1 day"),
      (0, days) => write!(f, "{days} days"),
      _ => write!(f, "{}s", self.0),
    }
  }
}

/// Allowed range for a subject's period, in days (inclusive), and the
/// period given to subjects enrolled without one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodBounds {
  pub min_days:     u32,
  pub max_days:     u32,
  pub default_days: u32,
}

impl Default for PeriodBounds {
  fn default() -> Self { Self { min_days: 7, max_days: 90, default_days: 30 } }
}

impl PeriodBounds {
  /// Longest period any configuration may allow, about a century.
  pub const CEILING_DAYS: u32 = 36_500;

  /// Validate `days`, or the default period if `None`.
  pub fn resolve(&self, days: Option<u32>) -> Result<Period> {
    self.check_days(days.unwrap_or(self.default_days))
  }

  /// Validate a period given in days and convert it.
  pub fn check_days(&self, days: u32) -> Result<Period> {
    let max = self.max_days.min(Self::CEILING_DAYS);
    if days < self.min_days || days > max {
      return Err(Error::PeriodOutOfBounds { days, min: self.min_days, max });
    }
    Ok(Period::from_days(days))
  }
}

// ─── Activity ────────────────────────────────────────────────────────────────

/// The surface a check-in came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
  /// The explicit "I'm still here" action.
  #[default]
  Heartbeat,
  /// A successful authentication.
  Login,
}

impl ActivityKind {
  pub fn audit_kind(self) -> AuditKind {
    match self {
      ActivityKind::Heartbeat => AuditKind::Heartbeat,
      ActivityKind::Login => AuditKind::Login,
    }
  }

  /// Audit log message for a check-in of this kind.
  pub fn describe(self) -> &'static str {
    match self {
      ActivityKind::Heartbeat => "Activity check-in (I'm still here)",
      ActivityKind::Login => "User logged in",
    }
  }
}

// ─── Subject ─────────────────────────────────────────────────────────────────

/// A monitored account and its countdown state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id:     Uuid,
  pub email:          String,
  pub display_name:   Option<String>,
  pub period:         Period,
  /// Monotonically non-decreasing.
  pub last_active_at: DateTime<Utc>,
  pub status:         SwitchStatus,
  /// Bumped on every check-in; fire events carrying an older value are stale.
  pub generation:     u64,
  /// Bumped when a triggered subject is re-armed. Delivery records are
  /// scoped to one epoch.
  pub epoch:          u64,
  pub created_at:     DateTime<Utc>,
  pub triggered_at:   Option<DateTime<Utc>>,
}

impl Subject {
  /// Name shown to beneficiaries: the display name, falling back to email.
  pub fn owner_name(&self) -> &str {
    self
      .display_name
      .as_deref()
      .filter(|n| !n.trim().is_empty())
      .unwrap_or(&self.email)
  }

  /// The instant the current countdown runs out.
  pub fn expires_at(&self) -> DateTime<Utc> {
    self.last_active_at + self.period.as_delta()
  }

  /// Time since the last check-in, never negative.
  pub fn inactive_for(&self, now: DateTime<Utc>) -> TimeDelta {
    (now - self.last_active_at).max(TimeDelta::zero())
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.inactive_for(now) >= self.period.as_delta()
  }
}

/// Input for enrolling a new subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubject {
  pub email:        String,
  pub display_name: Option<String>,
  pub period:       Period,
}

/// Owner-editable settings. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
  pub period:       Option<Period>,
  pub display_name: Option<String>,
}

/// Result of a recorded check-in.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
  /// Subject state after the check-in was applied.
  pub subject: Subject,
  /// `true` if the check-in moved a triggered subject into a new epoch.
  pub rearmed: bool,
}
