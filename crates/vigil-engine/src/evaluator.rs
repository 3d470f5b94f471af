//! Expiry Evaluator.
//!
//! A fire event is a hint, not a verdict. Each evaluation re-reads the
//! subject and re-derives the decision:
//!
//! 1. subject gone → discard;
//! 2. generation differs from the event's → discard (superseded by a
//!    check-in; the common case);
//! 3. already triggered → discard (duplicate delivery of the event);
//! 4. not yet inactive for a full period → re-arm at `last_active_at +
//!    period` under the same generation;
//! 5. otherwise → trigger, and dispatch if the trigger was won.

use chrono::{DateTime, Utc};
use serde::Serialize;
use vigil_core::{
  clock::Clock, notify::Notifier, store::SwitchStore, subject::SwitchStatus,
  timer::Timer,
};

use crate::{
  Switch,
  dispatcher::DispatchReport,
  error::{Result, store_err},
};

/// What a single fire event turned out to mean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Evaluation {
  SubjectMissing,
  Stale { current_generation: u64 },
  AlreadyTriggered,
  Rescheduled { fire_at: DateTime<Utc> },
  /// A concurrent evaluation won the trigger transition.
  LostRace,
  Triggered { report: DispatchReport },
}

impl<S, N, C> Switch<S, N, C>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  /// Decide what the fire event `fire` means and act on it.
  pub async fn evaluate(&self, fire: Timer) -> Result<Evaluation> {
    let Some(subject) = self
      .store
      .get_subject(fire.subject_id)
      .await
      .map_err(store_err)?
    else {
      tracing::debug!(subject = %fire.subject_id, "fire for missing subject discarded");
      return Ok(Evaluation::SubjectMissing);
    };

    if subject.generation != fire.generation {
      tracing::debug!(
        subject = %fire.subject_id,
        fired = fire.generation,
        current = subject.generation,
        "stale fire discarded"
      );
      return Ok(Evaluation::Stale { current_generation: subject.generation });
    }

    if subject.status == SwitchStatus::Triggered {
      tracing::debug!(subject = %fire.subject_id, "duplicate fire for triggered subject");
      return Ok(Evaluation::AlreadyTriggered);
    }

    let now = self.clock.now();
    if !subject.is_expired(now) {
      let timer = Timer {
        subject_id: subject.subject_id,
        generation: subject.generation,
        fire_at:    subject.expires_at(),
      };
      let armed = self.store.schedule(timer).await.map_err(store_err)?;
      tracing::debug!(
        subject = %subject.subject_id,
        fire_at = %timer.fire_at,
        armed,
        "fired before expiry; re-armed"
      );
      return Ok(Evaluation::Rescheduled { fire_at: timer.fire_at });
    }

    let Some(triggered) = self.trigger(&subject).await? else {
      return Ok(Evaluation::LostRace);
    };
    let report = self
      .notify_all(triggered.subject.subject_id, triggered.subject.epoch)
      .await?;
    Ok(Evaluation::Triggered { report })
  }

  /// Evaluate a persisted timer, then remove it unless the evaluation
  /// re-armed it. A failure leaves the timer in place to fire again.
  pub async fn fire(&self, timer: Timer) -> Result<Evaluation> {
    let evaluation = self.evaluate(timer).await?;
    if !matches!(evaluation, Evaluation::Rescheduled { .. }) {
      self.store.acknowledge(timer).await.map_err(store_err)?;
    }
    Ok(evaluation)
  }
}
