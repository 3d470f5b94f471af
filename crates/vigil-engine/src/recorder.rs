//! Activity Recorder: enrolment, check-ins and owner settings.
//!
//! A check-in is one store write that advances `last_active_at`, bumps the
//! generation and re-arms the timer together. A fire event already in flight
//! for the previous generation is discarded by the evaluator, so nothing
//! here needs to wait for, or cancel, a running evaluation.

use uuid::Uuid;
use vigil_core::{
  clock::Clock,
  notify::Notifier,
  store::SwitchStore,
  subject::{ActivityKind, ActivityRecord, NewSubject, SettingsUpdate, Subject},
};

use crate::{
  Switch,
  error::{Error, Result, store_err},
};

impl<S, N, C> Switch<S, N, C>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  /// Enrol a new subject with its countdown armed from now. Without an
  /// explicit period the configured default is used.
  pub async fn enroll(
    &self,
    email: String,
    display_name: Option<String>,
    period_days: Option<u32>,
  ) -> Result<Subject> {
    let period = self.bounds.resolve(period_days)?;
    let subject = self
      .store
      .enroll(NewSubject { email, display_name, period }, self.clock.now())
      .await
      .map_err(store_err)?;

    tracing::info!(
      subject = %subject.subject_id,
      period = %subject.period,
      "subject enrolled"
    );
    Ok(subject)
  }

  /// Record a check-in.
  ///
  /// Fails with [`Error::SubjectNotFound`] for an unknown subject. A store
  /// failure is returned as-is: the caller must treat the check-in as not
  /// having happened and retry.
  pub async fn record_activity(
    &self,
    subject_id: Uuid,
    kind: ActivityKind,
  ) -> Result<ActivityRecord> {
    let record = self
      .store
      .record_activity(subject_id, kind, self.clock.now())
      .await
      .map_err(store_err)?
      .ok_or(Error::SubjectNotFound(subject_id))?;

    if record.rearmed {
      tracing::info!(
        subject = %subject_id,
        epoch = record.subject.epoch,
        "triggered subject checked in; switch re-armed"
      );
    } else {
      tracing::debug!(
        subject = %subject_id,
        generation = record.subject.generation,
        next_check = %record.subject.expires_at(),
        ?kind,
        "activity recorded"
      );
    }
    Ok(record)
  }

  /// Change the period and/or display name.
  pub async fn update_settings(
    &self,
    subject_id: Uuid,
    period_days: Option<u32>,
    display_name: Option<String>,
  ) -> Result<Subject> {
    let period = period_days
      .map(|days| self.bounds.check_days(days))
      .transpose()?;

    let subject = self
      .store
      .update_settings(
        subject_id,
        SettingsUpdate { period, display_name },
        self.clock.now(),
      )
      .await
      .map_err(store_err)?
      .ok_or(Error::SubjectNotFound(subject_id))?;

    tracing::debug!(subject = %subject_id, period = %subject.period, "settings updated");
    Ok(subject)
  }

  /// Every enrolled subject, in enrolment order.
  pub async fn subjects(&self) -> Result<Vec<Subject>> {
    self.store.list_subjects().await.map_err(store_err)
  }

  /// Current subject state, for display.
  pub async fn status(&self, subject_id: Uuid) -> Result<Subject> {
    self
      .store
      .get_subject(subject_id)
      .await
      .map_err(store_err)?
      .ok_or(Error::SubjectNotFound(subject_id))
  }
}
