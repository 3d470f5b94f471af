//! DMS state machine.
//!
//! ```text
//!   enroll ──► ACTIVE ──trigger (CAS on status + generation)──► TRIGGERED
//!                ▲                                                 │
//!                └──────── check-in (new epoch) ◄──────────────────┘
//! ```
//!
//! Only the caller that wins the compare-and-set proceeds to dispatch.

use vigil_core::{
  clock::Clock,
  delivery::Delivery,
  notify::Notifier,
  store::{SwitchStore, TriggerOutcome},
  subject::Subject,
};

use crate::{
  Switch,
  error::{Result, store_err},
};

/// A won trigger transition.
#[derive(Debug, Clone)]
pub struct Triggered {
  pub subject:    Subject,
  /// One pending delivery per beneficiary for the triggered epoch.
  pub deliveries: Vec<Delivery>,
}

impl<S, N, C> Switch<S, N, C>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  /// Attempt ACTIVE → TRIGGERED for the state `observed` was read at.
  ///
  /// Returns `None` if another evaluation already triggered the subject, a
  /// check-in moved it to a newer generation, or it no longer exists.
  pub async fn trigger(&self, observed: &Subject) -> Result<Option<Triggered>> {
    let now = self.clock.now();
    let message = format!(
      "Dead man's switch activated after {} of inactivity (last check-in {})",
      observed.period,
      observed.last_active_at.format("%Y-%m-%d %H:%M UTC"),
    );

    let outcome = self
      .store
      .trigger(observed.subject_id, observed.generation, now, message)
      .await
      .map_err(store_err)?;

    match outcome {
      TriggerOutcome::Triggered { subject, deliveries } => {
        tracing::info!(
          subject = %subject.subject_id,
          epoch = subject.epoch,
          inactive_hours = observed.inactive_for(now).num_hours(),
          beneficiaries = deliveries.len(),
          "dead man's switch triggered"
        );
        Ok(Some(Triggered { subject, deliveries }))
      }
      TriggerOutcome::Lost => {
        tracing::debug!(subject = %observed.subject_id, "trigger lost compare-and-set");
        Ok(None)
      }
      TriggerOutcome::Missing => {
        tracing::debug!(subject = %observed.subject_id, "subject vanished before trigger");
        Ok(None)
      }
    }
  }
}
