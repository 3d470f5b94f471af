//! [`SqliteStore`]: the SQLite implementation of [`SwitchStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use vigil_core::{
  audit::{AuditEntry, AuditKind},
  beneficiary::{Beneficiary, NewBeneficiary, generate_access_key},
  delivery::{Delivery, DeliveryOutcome, DeliveryState, DispatchKey},
  store::{SwitchStore, TriggerOutcome},
  subject::{
    ActivityKind, ActivityRecord, NewSubject, SettingsUpdate, Subject, SwitchStatus,
  },
  timer::Timer,
};

use crate::{
  Error, Result,
  encode::{
    RawAudit, RawBeneficiary, RawDelivery, RawSubject, RawTimer, conversion,
    decode_uuid, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

/// Written to deliveries whose claim outlived the claim timeout.
const INTERRUPTED: &str = "interrupted before delivery was confirmed";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vigil switch store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let path = path.as_ref();
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    tracing::debug!(path = %path.display(), "opened sqlite store");
    Ok(store)
  }

  /// Open an in-memory store for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers (run on the connection thread) ──────────────────────────────

fn load_subject(conn: &Connection, id: &str) -> rusqlite::Result<Option<Subject>> {
  let raw = conn
    .query_row(
      &format!("SELECT {} FROM subjects WHERE subject_id = ?1", RawSubject::COLUMNS),
      params![id],
      RawSubject::from_row,
    )
    .optional()?;
  raw.map(|r| r.into_subject().map_err(conversion)).transpose()
}

fn load_delivery(conn: &Connection, id: &str) -> rusqlite::Result<Option<Delivery>> {
  let raw = conn
    .query_row(
      &format!("SELECT {} FROM deliveries WHERE delivery_id = ?1", RawDelivery::COLUMNS),
      params![id],
      RawDelivery::from_row,
    )
    .optional()?;
  raw.map(|r| r.into_delivery().map_err(conversion)).transpose()
}

fn select_deliveries(
  conn:       &Connection,
  subject_id: &str,
  epoch:      Option<i64>,
) -> rusqlite::Result<Vec<Delivery>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {} FROM deliveries
     WHERE subject_id = ?1 AND (?2 IS NULL OR epoch = ?2)
     ORDER BY created_at, rowid",
    RawDelivery::COLUMNS
  ))?;
  let raws = stmt
    .query_map(params![subject_id, epoch], RawDelivery::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws
    .into_iter()
    .map(|r| r.into_delivery().map_err(conversion))
    .collect()
}

fn insert_audit(conn: &Connection, entry: &AuditEntry) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO audit_log (entry_id, subject_id, kind, message, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      encode_uuid(entry.entry_id),
      encode_uuid(entry.subject_id),
      entry.kind.as_str(),
      entry.message,
      encode_dt(entry.recorded_at),
    ],
  )?;
  Ok(())
}

fn audit(
  conn:       &Connection,
  subject_id: Uuid,
  kind:       AuditKind,
  message:    String,
  at:         DateTime<Utc>,
) -> rusqlite::Result<AuditEntry> {
  let entry = AuditEntry {
    entry_id: Uuid::new_v4(),
    subject_id,
    kind,
    message,
    recorded_at: at,
  };
  insert_audit(conn, &entry)?;
  Ok(entry)
}

/// Arm `timer` unless the subject is gone, no longer active, or already on a
/// different generation.
fn upsert_timer(conn: &Connection, timer: &Timer) -> rusqlite::Result<bool> {
  let changed = conn.execute(
    "INSERT INTO timers (subject_id, generation, fire_at)
     SELECT ?1, ?2, ?3
     WHERE EXISTS (
       SELECT 1 FROM subjects
       WHERE subject_id = ?1 AND generation = ?2 AND status = 'active'
     )
     ON CONFLICT (subject_id) DO UPDATE
       SET generation = excluded.generation,
           fire_at    = excluded.fire_at
       WHERE excluded.generation >= timers.generation",
    params![
      encode_uuid(timer.subject_id),
      timer.generation as i64,
      encode_dt(timer.fire_at),
    ],
  )?;
  Ok(changed > 0)
}

// ─── SwitchStore impl ────────────────────────────────────────────────────────

impl SwitchStore for SqliteStore {
  type Error = Error;

  // ── Subjects ──────────────────────────────────────────────────────────────

  async fn enroll(&self, input: NewSubject, now: DateTime<Utc>) -> Result<Subject> {
    let subject_id = Uuid::new_v4();
    let id_str     = encode_uuid(subject_id);
    let now_str    = encode_dt(now);
    let fire_at    = now + input.period.as_delta();

    let subject = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO subjects (
             subject_id, email, display_name, period_secs, last_active_at,
             status, generation, epoch, created_at, triggered_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, 'active', 1, 1, ?5, NULL)",
          params![
            id_str,
            input.email,
            input.display_name,
            input.period.as_secs(),
            now_str,
          ],
        )?;
        upsert_timer(&tx, &Timer { subject_id, generation: 1, fire_at })?;
        audit(
          &tx,
          subject_id,
          AuditKind::Enrolled,
          format!("Dead man's switch armed with a {} period", input.period),
          now,
        )?;
        let subject = load_subject(&tx, &id_str)?;
        tx.commit()?;
        Ok(subject)
      })
      .await?;

    subject.ok_or(Error::SubjectNotFound(subject_id))
  }

  async fn get_subject(&self, id: Uuid) -> Result<Option<Subject>> {
    let id_str = encode_uuid(id);
    Ok(self.conn.call(move |conn| Ok(load_subject(conn, &id_str)?)).await?)
  }

  async fn list_subjects(&self) -> Result<Vec<Subject>> {
    let raws: Vec<RawSubject> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM subjects ORDER BY created_at, rowid",
          RawSubject::COLUMNS
        ))?;
        let rows = stmt
          .query_map([], RawSubject::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_subject).collect()
  }

  async fn record_activity(
    &self,
    id:   Uuid,
    kind: ActivityKind,
    at:   DateTime<Utc>,
  ) -> Result<Option<ActivityRecord>> {
    let id_str = encode_uuid(id);

    let record = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(current) = load_subject(&tx, &id_str)? else {
          return Ok(None);
        };

        let last_active_at = current.last_active_at.max(at);
        let generation     = current.generation + 1;
        let rearmed        = current.status == SwitchStatus::Triggered;
        let epoch          = if rearmed { current.epoch + 1 } else { current.epoch };

        tx.execute(
          "UPDATE subjects
           SET last_active_at = ?2, generation = ?3, epoch = ?4,
               status = 'active', triggered_at = NULL
           WHERE subject_id = ?1",
          params![id_str, encode_dt(last_active_at), generation as i64, epoch as i64],
        )?;
        upsert_timer(&tx, &Timer {
          subject_id: id,
          generation,
          fire_at: last_active_at + current.period.as_delta(),
        })?;

        audit(&tx, id, kind.audit_kind(), kind.describe().to_owned(), at)?;
        if rearmed {
          audit(
            &tx,
            id,
            AuditKind::DmsRearmed,
            format!("Dead man's switch re-armed by check-in; epoch {epoch} begins"),
            at,
          )?;
        }

        let subject = load_subject(&tx, &id_str)?;
        tx.commit()?;
        Ok(subject.map(|subject| ActivityRecord { subject, rearmed }))
      })
      .await?;

    Ok(record)
  }

  async fn update_settings(
    &self,
    id:     Uuid,
    update: SettingsUpdate,
    at:     DateTime<Utc>,
  ) -> Result<Option<Subject>> {
    let id_str = encode_uuid(id);

    let subject = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(current) = load_subject(&tx, &id_str)? else {
          return Ok(None);
        };

        let period       = update.period.unwrap_or(current.period);
        let display_name = update.display_name.or(current.display_name);

        tx.execute(
          "UPDATE subjects SET period_secs = ?2, display_name = ?3 WHERE subject_id = ?1",
          params![id_str, period.as_secs(), display_name],
        )?;
        if period != current.period {
          upsert_timer(&tx, &Timer {
            subject_id: id,
            generation: current.generation,
            fire_at:    current.last_active_at + period.as_delta(),
          })?;
        }
        audit(
          &tx,
          id,
          AuditKind::SettingsUpdated,
          "Updated account settings".to_owned(),
          at,
        )?;

        let subject = load_subject(&tx, &id_str)?;
        tx.commit()?;
        Ok(subject)
      })
      .await?;

    Ok(subject)
  }

  // ── Timers ────────────────────────────────────────────────────────────────

  async fn get_timer(&self, subject_id: Uuid) -> Result<Option<Timer>> {
    let id_str = encode_uuid(subject_id);

    let raw: Option<RawTimer> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {} FROM timers WHERE subject_id = ?1", RawTimer::COLUMNS),
              params![id_str],
              RawTimer::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawTimer::into_timer).transpose()
  }

  async fn schedule(&self, timer: Timer) -> Result<bool> {
    Ok(self.conn.call(move |conn| Ok(upsert_timer(conn, &timer)?)).await?)
  }

  async fn cancel(&self, subject_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(subject_id);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM timers WHERE subject_id = ?1", params![id_str])?)
      })
      .await?;
    Ok(removed > 0)
  }

  async fn due_timers(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Timer>> {
    let now_str = encode_dt(now);
    let limit   = limit as i64;

    let raws: Vec<RawTimer> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM timers WHERE fire_at <= ?1 ORDER BY fire_at LIMIT ?2",
          RawTimer::COLUMNS
        ))?;
        let rows = stmt
          .query_map(params![now_str, limit], RawTimer::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTimer::into_timer).collect()
  }

  async fn acknowledge(&self, timer: Timer) -> Result<bool> {
    let id_str      = encode_uuid(timer.subject_id);
    let fire_at_str = encode_dt(timer.fire_at);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM timers WHERE subject_id = ?1 AND generation = ?2 AND fire_at = ?3",
          params![id_str, timer.generation as i64, fire_at_str],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  // ── State machine ─────────────────────────────────────────────────────────

  async fn trigger(
    &self,
    id:                  Uuid,
    expected_generation: u64,
    at:                  DateTime<Utc>,
    message:             String,
  ) -> Result<TriggerOutcome> {
    let id_str = encode_uuid(id);
    let at_str = encode_dt(at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if load_subject(&tx, &id_str)?.is_none() {
          return Ok(TriggerOutcome::Missing);
        }

        let won = tx.execute(
          "UPDATE subjects SET status = 'triggered', triggered_at = ?3
           WHERE subject_id = ?1 AND status = 'active' AND generation = ?2",
          params![id_str, expected_generation as i64, at_str],
        )?;
        if won == 0 {
          return Ok(TriggerOutcome::Lost);
        }

        let Some(subject) = load_subject(&tx, &id_str)? else {
          return Ok(TriggerOutcome::Missing);
        };
        audit(&tx, id, AuditKind::DmsTriggered, message, at)?;

        let beneficiary_ids: Vec<String> = {
          let mut stmt = tx.prepare(
            "SELECT beneficiary_id FROM beneficiaries
             WHERE subject_id = ?1 ORDER BY created_at, rowid",
          )?;
          stmt
            .query_map(params![id_str], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        for beneficiary_id in &beneficiary_ids {
          tx.execute(
            "INSERT INTO deliveries (
               delivery_id, subject_id, beneficiary_id, epoch, state, attempts, created_at
             ) VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5)
             ON CONFLICT (beneficiary_id, epoch) DO NOTHING",
            params![
              encode_uuid(Uuid::new_v4()),
              id_str,
              beneficiary_id,
              subject.epoch as i64,
              at_str,
            ],
          )?;
        }
        let deliveries = select_deliveries(&tx, &id_str, Some(subject.epoch as i64))?;

        tx.execute("DELETE FROM timers WHERE subject_id = ?1", params![id_str])?;
        tx.commit()?;
        Ok(TriggerOutcome::Triggered { subject, deliveries })
      })
      .await?;

    Ok(outcome)
  }

  // ── Beneficiary directory ─────────────────────────────────────────────────

  async fn add_beneficiary(
    &self,
    input: NewBeneficiary,
    at:    DateTime<Utc>,
  ) -> Result<Beneficiary> {
    let beneficiary = Beneficiary {
      beneficiary_id: Uuid::new_v4(),
      subject_id:     input.subject_id,
      name:           input.name,
      email:          input.email,
      access_key:     generate_access_key(),
      created_at:     at,
    };

    let id_str      = encode_uuid(beneficiary.beneficiary_id);
    let subject_str = encode_uuid(beneficiary.subject_id);
    let name        = beneficiary.name.clone();
    let email       = beneficiary.email.clone();
    let access_key  = beneficiary.access_key.clone();
    let at_str      = encode_dt(at);

    // (subject exists, email already registered)
    let (exists, duplicate) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM subjects WHERE subject_id = ?1",
            params![subject_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok((false, false));
        }
        let duplicate = tx
          .query_row(
            "SELECT 1 FROM beneficiaries WHERE subject_id = ?1 AND email = ?2",
            params![subject_str, email],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if duplicate {
          return Ok((true, true));
        }
        tx.execute(
          "INSERT INTO beneficiaries (
             beneficiary_id, subject_id, name, email, access_key, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          params![id_str, subject_str, name, email, access_key, at_str],
        )?;
        tx.commit()?;
        Ok((true, false))
      })
      .await?;

    if !exists {
      return Err(Error::SubjectNotFound(beneficiary.subject_id));
    }
    if duplicate {
      return Err(Error::DuplicateBeneficiary {
        subject_id: beneficiary.subject_id,
        email:      beneficiary.email,
      });
    }
    Ok(beneficiary)
  }

  async fn get_beneficiary(&self, id: Uuid) -> Result<Option<Beneficiary>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawBeneficiary> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {} FROM beneficiaries WHERE beneficiary_id = ?1",
                RawBeneficiary::COLUMNS
              ),
              params![id_str],
              RawBeneficiary::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawBeneficiary::into_beneficiary).transpose()
  }

  async fn list_beneficiaries(&self, subject_id: Uuid) -> Result<Vec<Beneficiary>> {
    let id_str = encode_uuid(subject_id);

    let raws: Vec<RawBeneficiary> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM beneficiaries WHERE subject_id = ?1 ORDER BY created_at, rowid",
          RawBeneficiary::COLUMNS
        ))?;
        let rows = stmt
          .query_map(params![id_str], RawBeneficiary::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawBeneficiary::into_beneficiary).collect()
  }

  async fn remove_beneficiary(&self, id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(id);
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM beneficiaries WHERE beneficiary_id = ?1",
          params![id_str],
        )?)
      })
      .await?;
    Ok(removed > 0)
  }

  // ── Deliveries ────────────────────────────────────────────────────────────

  async fn get_delivery(&self, id: Uuid) -> Result<Option<Delivery>> {
    let id_str = encode_uuid(id);
    Ok(self.conn.call(move |conn| Ok(load_delivery(conn, &id_str)?)).await?)
  }

  async fn list_deliveries(
    &self,
    subject_id: Uuid,
    epoch:      Option<u64>,
  ) -> Result<Vec<Delivery>> {
    let id_str = encode_uuid(subject_id);
    let epoch  = epoch.map(|e| e as i64);
    Ok(
      self
        .conn
        .call(move |conn| Ok(select_deliveries(conn, &id_str, epoch)?))
        .await?,
    )
  }

  async fn claim_delivery(
    &self,
    id:   Uuid,
    from: DeliveryState,
    at:   DateTime<Utc>,
  ) -> Result<Option<Delivery>> {
    if from == DeliveryState::Sent {
      return Ok(None);
    }

    let id_str    = encode_uuid(id);
    let token_str = encode_uuid(Uuid::new_v4());
    let at_str    = encode_dt(at);

    let claimed = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE deliveries
           SET claim_token = ?3, claimed_at = ?4, attempts = attempts + 1
           WHERE delivery_id = ?1 AND state = ?2 AND claim_token IS NULL",
          params![id_str, from.as_str(), token_str, at_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(load_delivery(conn, &id_str)?)
      })
      .await?;

    Ok(claimed)
  }

  async fn resolve_delivery(
    &self,
    id:          Uuid,
    claim_token: Uuid,
    outcome:     DeliveryOutcome,
    at:          DateTime<Utc>,
  ) -> Result<bool> {
    let id_str    = encode_uuid(id);
    let token_str = encode_uuid(claim_token);
    let at_str    = encode_dt(at);

    let resolved = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let error = match &outcome {
          DeliveryOutcome::Sent => None,
          DeliveryOutcome::Failed(e) => Some(e.clone()),
        };
        let changed = tx.execute(
          "UPDATE deliveries
           SET state = ?3, last_error = ?4, resolved_at = ?5,
               claim_token = NULL, claimed_at = NULL
           WHERE delivery_id = ?1 AND claim_token = ?2",
          params![id_str, token_str, outcome.state().as_str(), error, at_str],
        )?;
        if changed == 0 {
          return Ok(false);
        }

        let row: Option<(String, String)> = tx
          .query_row(
            "SELECT d.subject_id, b.email
             FROM deliveries d
             JOIN beneficiaries b ON b.beneficiary_id = d.beneficiary_id
             WHERE d.delivery_id = ?1",
            params![id_str],
            |row| Ok((row.get(0)?, row.get(1)?)),
          )
          .optional()?;
        if let Some((subject_str, email)) = row {
          let subject_id = decode_uuid(&subject_str).map_err(conversion)?;
          let (kind, message) = match error {
            None => (AuditKind::NotificationSent, format!("Trigger notice sent to {email}")),
            Some(e) => (
              AuditKind::NotificationFailed,
              format!("Trigger notice to {email} failed: {e}"),
            ),
          };
          audit(&tx, subject_id, kind, message, at)?;
        }

        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(resolved)
  }

  async fn abandon_claims(
    &self,
    claimed_before: DateTime<Utc>,
    at:             DateTime<Utc>,
  ) -> Result<Vec<Delivery>> {
    let before_str = encode_dt(claimed_before);
    let at_str     = encode_dt(at);

    let abandoned = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let stale: Vec<(String, String, String)> = {
          let mut stmt = tx.prepare(
            "SELECT d.delivery_id, d.subject_id, b.email
             FROM deliveries d
             JOIN beneficiaries b ON b.beneficiary_id = d.beneficiary_id
             WHERE d.claim_token IS NOT NULL AND d.claimed_at < ?1",
          )?;
          stmt
            .query_map(params![before_str], |row| {
              Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut abandoned = Vec::with_capacity(stale.len());
        for (delivery_str, subject_str, email) in stale {
          tx.execute(
            "UPDATE deliveries
             SET state = 'failed', last_error = ?2, resolved_at = ?3,
                 claim_token = NULL, claimed_at = NULL
             WHERE delivery_id = ?1",
            params![delivery_str, INTERRUPTED, at_str],
          )?;
          let subject_id = decode_uuid(&subject_str).map_err(conversion)?;
          audit(
            &tx,
            subject_id,
            AuditKind::NotificationFailed,
            format!("Trigger notice to {email} failed: {INTERRUPTED}"),
            at,
          )?;
          if let Some(delivery) = load_delivery(&tx, &delivery_str)? {
            abandoned.push(delivery);
          }
        }

        tx.commit()?;
        Ok(abandoned)
      })
      .await?;

    Ok(abandoned)
  }

  async fn pending_dispatches(
    &self,
    created_before: DateTime<Utc>,
  ) -> Result<Vec<DispatchKey>> {
    let before_str = encode_dt(created_before);

    let rows: Vec<(String, i64)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT subject_id, epoch FROM deliveries
           WHERE state = 'pending' AND claim_token IS NULL AND created_at < ?1
           ORDER BY subject_id, epoch",
        )?;
        let rows = stmt
          .query_map(params![before_str], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(subject_str, epoch)| {
        Ok(DispatchKey {
          subject_id: decode_uuid(&subject_str)?,
          epoch:      epoch as u64,
        })
      })
      .collect()
  }

  // ── Audit log ─────────────────────────────────────────────────────────────

  async fn record_audit(
    &self,
    subject_id: Uuid,
    kind:       AuditKind,
    message:    String,
    at:         DateTime<Utc>,
  ) -> Result<AuditEntry> {
    Ok(
      self
        .conn
        .call(move |conn| Ok(audit(conn, subject_id, kind, message, at)?))
        .await?,
    )
  }

  async fn list_audit(&self, subject_id: Uuid, limit: usize) -> Result<Vec<AuditEntry>> {
    let id_str = encode_uuid(subject_id);
    let limit  = limit as i64;

    let raws: Vec<RawAudit> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {} FROM audit_log WHERE subject_id = ?1
           ORDER BY recorded_at DESC, rowid DESC LIMIT ?2",
          RawAudit::COLUMNS
        ))?;
        let rows = stmt
          .query_map(params![id_str, limit], RawAudit::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAudit::into_entry).collect()
  }
}
