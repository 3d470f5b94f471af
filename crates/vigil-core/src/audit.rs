//! Append-only audit log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
  Enrolled,
  Heartbeat,
  Login,
  SettingsUpdated,
  DmsTriggered,
  DmsRearmed,
  NotificationSent,
  NotificationFailed,
  DmsNotified,
}

impl AuditKind {
  pub fn as_str(self) -> &'static str {
    match self {
      AuditKind::Enrolled => "enrolled",
      AuditKind::Heartbeat => "heartbeat",
      AuditKind::Login => "login",
      AuditKind::SettingsUpdated => "settings_updated",
      AuditKind::DmsTriggered => "dms_triggered",
      AuditKind::DmsRearmed => "dms_rearmed",
      AuditKind::NotificationSent => "notification_sent",
      AuditKind::NotificationFailed => "notification_failed",
      AuditKind::DmsNotified => "dms_notified",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    Ok(match s {
      "enrolled" => AuditKind::Enrolled,
      "heartbeat" => AuditKind::Heartbeat,
      "login" => AuditKind::Login,
      "settings_updated" => AuditKind::SettingsUpdated,
      "dms_triggered" => AuditKind::DmsTriggered,
      "dms_rearmed" => AuditKind::DmsRearmed,
      "notification_sent" => AuditKind::NotificationSent,
      "notification_failed" => AuditKind::NotificationFailed,
      "dms_notified" => AuditKind::DmsNotified,
      other => {
        return Err(Error::UnknownDiscriminant {
          kind:  "audit kind",
          value: other.to_owned(),
        });
      }
    })
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
  pub entry_id:    Uuid,
  pub subject_id:  Uuid,
  pub kind:        AuditKind,
  pub message:     String,
  pub recorded_at: DateTime<Utc>,
}
