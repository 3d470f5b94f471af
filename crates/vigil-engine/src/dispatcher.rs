//! Notification Dispatcher.
//!
//! Every send is bracketed by a claim and a resolve. The claim is a
//! compare-and-set on the delivery row, so two dispatchers racing on the
//! same delivery never both reach the notifier, and a `Sent` delivery can
//! never be claimed again. One beneficiary's failure is recorded on its own
//! row and does not stop the others or touch the subject's status.

use serde::Serialize;
use uuid::Uuid;
use vigil_core::{
  audit::AuditKind,
  clock::Clock,
  delivery::{Delivery, DeliveryOutcome, DeliveryState},
  notify::{Notifier, TriggerNotice},
  store::SwitchStore,
  subject::{Subject, SwitchStatus},
};

use crate::{
  Switch,
  error::{Error, Result, store_err},
};

/// Resolution written when the owner checked in before a delivery was made.
const OWNER_RETURNED: &str = "owner checked in before delivery";

/// Outcome of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum Attempt {
  Sent,
  Failed(String),
  /// Nothing was sent: the delivery is held by another dispatcher, already
  /// resolved, or its beneficiary was removed.
  Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
  pub sent:    usize,
  pub failed:  usize,
  pub skipped: usize,
  /// Attempts cut short by a store error. Their deliveries are left to the
  /// recovery sweep.
  pub errors:  usize,
}

impl DispatchReport {
  fn record(&mut self, attempt: &Attempt) {
    match attempt {
      Attempt::Sent => self.sent += 1,
      Attempt::Failed(_) => self.failed += 1,
      Attempt::Skipped => self.skipped += 1,
    }
  }
}

/// Work done by one recovery sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
  /// Claims that outlived the claim timeout, now resolved as failed.
  pub abandoned:    usize,
  /// Result of resuming dispatches that never ran.
  pub redispatched: DispatchReport,
}

impl<S, N, C> Switch<S, N, C>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  /// Attempt every unclaimed pending delivery of `subject_id` for `epoch`.
  ///
  /// Called once by the evaluation that won the trigger, and again by the
  /// recovery sweep for dispatches that were interrupted.
  pub async fn notify_all(&self, subject_id: Uuid, epoch: u64) -> Result<DispatchReport> {
    let mut report = DispatchReport::default();
    let Some(subject) = self.store.get_subject(subject_id).await.map_err(store_err)? else {
      return Ok(report);
    };

    let pending: Vec<Delivery> = self
      .store
      .list_deliveries(subject_id, Some(epoch))
      .await
      .map_err(store_err)?
      .into_iter()
      .filter(|d| d.state == DeliveryState::Pending && !d.is_claimed())
      .collect();

    for delivery in &pending {
      match self
        .attempt(&subject, delivery.delivery_id, DeliveryState::Pending)
        .await
      {
        Ok(attempt) => report.record(&attempt),
        Err(e) => {
          tracing::error!(delivery = %delivery.delivery_id, error = %e, "delivery attempt failed");
          report.errors += 1;
        }
      }
    }

    if report.sent + report.failed > 0 {
      let message = format!(
        "Notified {} of {} beneficiaries",
        report.sent,
        report.sent + report.failed
      );
      self
        .store
        .record_audit(subject_id, AuditKind::DmsNotified, message, self.clock.now())
        .await
        .map_err(store_err)?;
    }

    tracing::info!(
      subject = %subject_id,
      epoch,
      sent = report.sent,
      failed = report.failed,
      skipped = report.skipped,
      errors = report.errors,
      "dispatch finished"
    );
    Ok(report)
  }

  /// Attempt one pending delivery. A no-op once it has been sent.
  pub async fn deliver(&self, delivery_id: Uuid) -> Result<Attempt> {
    let (delivery, subject) = self.load_delivery(delivery_id).await?;
    if delivery.state != DeliveryState::Pending {
      return Ok(Attempt::Skipped);
    }
    self.attempt(&subject, delivery_id, DeliveryState::Pending).await
  }

  /// Operator-initiated retry of a failed delivery.
  ///
  /// Fails with [`Error::AlreadySent`] if the delivery was sent.
  pub async fn retry_delivery(&self, delivery_id: Uuid) -> Result<Attempt> {
    let (delivery, subject) = self.load_delivery(delivery_id).await?;
    if delivery.state == DeliveryState::Sent {
      return Err(Error::AlreadySent(delivery_id));
    }
    tracing::info!(delivery = %delivery_id, attempts = delivery.attempts, "retrying delivery");
    self.attempt(&subject, delivery_id, delivery.state).await
  }

  /// Resolve stale claims as failed, then resume dispatches whose
  /// deliveries have sat unclaimed for longer than `grace`.
  pub async fn recover(
    &self,
    claim_timeout: chrono::TimeDelta,
    grace: chrono::TimeDelta,
  ) -> Result<RecoveryReport> {
    let now = self.clock.now();
    let mut report = RecoveryReport::default();

    let abandoned = self
      .store
      .abandon_claims(now - claim_timeout, now)
      .await
      .map_err(store_err)?;
    for delivery in &abandoned {
      tracing::warn!(
        delivery = %delivery.delivery_id,
        subject = %delivery.subject_id,
        "delivery claim timed out; marked failed for manual follow-up"
      );
    }
    report.abandoned = abandoned.len();

    let waiting = self
      .store
      .pending_dispatches(now - grace)
      .await
      .map_err(store_err)?;
    for key in waiting {
      tracing::info!(subject = %key.subject_id, epoch = key.epoch, "resuming dispatch");
      let resumed = self.notify_all(key.subject_id, key.epoch).await?;
      report.redispatched.sent += resumed.sent;
      report.redispatched.failed += resumed.failed;
      report.redispatched.skipped += resumed.skipped;
      report.redispatched.errors += resumed.errors;
    }

    Ok(report)
  }

  async fn load_delivery(&self, delivery_id: Uuid) -> Result<(Delivery, Subject)> {
    let delivery = self
      .store
      .get_delivery(delivery_id)
      .await
      .map_err(store_err)?
      .ok_or(Error::DeliveryNotFound(delivery_id))?;
    let subject = self
      .store
      .get_subject(delivery.subject_id)
      .await
      .map_err(store_err)?
      .ok_or(Error::SubjectNotFound(delivery.subject_id))?;
    Ok((delivery, subject))
  }

  /// Claim, send, resolve.
  async fn attempt(
    &self,
    subject: &Subject,
    delivery_id: Uuid,
    from: DeliveryState,
  ) -> Result<Attempt> {
    let Some(claimed) = self
      .store
      .claim_delivery(delivery_id, from, self.clock.now())
      .await
      .map_err(store_err)?
    else {
      tracing::debug!(delivery = %delivery_id, "delivery not claimable; skipped");
      return Ok(Attempt::Skipped);
    };
    let Some(token) = claimed.claim_token else {
      return Ok(Attempt::Skipped);
    };

    if subject.status != SwitchStatus::Triggered || subject.epoch != claimed.epoch {
      self
        .resolve(delivery_id, token, DeliveryOutcome::Failed(OWNER_RETURNED.to_owned()))
        .await?;
      tracing::debug!(delivery = %delivery_id, "epoch no longer triggered; delivery withdrawn");
      return Ok(Attempt::Skipped);
    }

    let Some(beneficiary) = self
      .store
      .get_beneficiary(claimed.beneficiary_id)
      .await
      .map_err(store_err)?
    else {
      // Removing a beneficiary removes its delivery rows with it.
      tracing::debug!(delivery = %delivery_id, "beneficiary removed; skipped");
      return Ok(Attempt::Skipped);
    };

    let notice = TriggerNotice {
      subject_id:        subject.subject_id,
      epoch:             claimed.epoch,
      beneficiary_id:    beneficiary.beneficiary_id,
      beneficiary_email: beneficiary.email,
      beneficiary_name:  beneficiary.name,
      owner_name:        subject.owner_name().to_owned(),
      access_key:        beneficiary.access_key,
    };

    match self.notifier.send(&notice).await {
      Ok(()) => {
        self.resolve(delivery_id, token, DeliveryOutcome::Sent).await?;
        tracing::info!(
          delivery = %delivery_id,
          to = %notice.beneficiary_email,
          "trigger notice sent"
        );
        Ok(Attempt::Sent)
      }
      Err(e) => {
        self
          .resolve(delivery_id, token, DeliveryOutcome::Failed(e.0.clone()))
          .await?;
        tracing::warn!(
          delivery = %delivery_id,
          to = %notice.beneficiary_email,
          error = %e,
          "trigger notice failed"
        );
        Ok(Attempt::Failed(e.0))
      }
    }
  }

  async fn resolve(
    &self,
    delivery_id: Uuid,
    token: Uuid,
    outcome: DeliveryOutcome,
  ) -> Result<()> {
    let resolved = self
      .store
      .resolve_delivery(delivery_id, token, outcome, self.clock.now())
      .await
      .map_err(store_err)?;
    if !resolved {
      // Only possible if the claim was abandoned by a recovery sweep while
      // the send was in progress.
      tracing::warn!(delivery = %delivery_id, "claim lost before resolution");
    }
    Ok(())
  }
}
