//! Timer worker.
//!
//! Polls the store for due timers and turns each into a fire event. Fires
//! for different subjects are evaluated concurrently; fires for the same
//! subject are safe to overlap because the evaluator and trigger are
//! idempotent. Every tick ends with a recovery sweep so that a dispatch
//! interrupted by a crash is resumed on the next run.

use std::{future::Future, time::Duration};

use chrono::TimeDelta;
use serde::Serialize;
use tokio::{task::JoinSet, time::MissedTickBehavior};
use uuid::Uuid;
use vigil_core::{clock::Clock, notify::Notifier, store::SwitchStore};

use crate::{Evaluation, RecoveryReport, Switch, error::store_err};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
  /// How often the store is polled for due timers.
  pub poll_interval: Duration,
  /// Maximum number of timers fired per tick.
  pub batch_size:    usize,
  /// Age after which an unresolved delivery claim is abandoned.
  pub claim_timeout: TimeDelta,
  /// Age after which an unclaimed pending delivery is redispatched.
  pub sweep_grace:   TimeDelta,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(30),
      batch_size:    64,
      claim_timeout: TimeDelta::minutes(15),
      sweep_grace:   TimeDelta::minutes(1),
    }
  }
}

/// What one tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
  pub evaluations: Vec<(Uuid, Evaluation)>,
  /// Fires that failed; their timers stay in place and fire again.
  pub errors:      usize,
  pub recovery:    RecoveryReport,
}

impl TickReport {
  pub fn triggered(&self) -> usize {
    self
      .evaluations
      .iter()
      .filter(|(_, e)| matches!(e, Evaluation::Triggered { .. }))
      .count()
  }
}

pub struct TimerWorker<S, N, C> {
  switch: Switch<S, N, C>,
  config: WorkerConfig,
}

impl<S, N, C> TimerWorker<S, N, C>
where
  S: SwitchStore + 'static,
  N: Notifier + 'static,
  C: Clock + 'static,
{
  pub fn new(switch: Switch<S, N, C>, config: WorkerConfig) -> Self {
    Self { switch, config }
  }

  /// Fire every due timer once, then run the recovery sweep.
  ///
  /// Only a failure to list timers is returned; individual fire failures
  /// are logged and counted.
  pub async fn tick(&self) -> crate::Result<TickReport> {
    let now = self.switch.clock.now();
    let due = self
      .switch
      .store
      .due_timers(now, self.config.batch_size)
      .await
      .map_err(store_err)?;

    let mut report = TickReport::default();
    let mut fires = JoinSet::new();
    for timer in due {
      let switch = self.switch.clone();
      fires.spawn(async move { (timer.subject_id, switch.fire(timer).await) });
    }

    while let Some(joined) = fires.join_next().await {
      match joined {
        Ok((subject_id, Ok(evaluation))) => report.evaluations.push((subject_id, evaluation)),
        Ok((subject_id, Err(e))) => {
          tracing::error!(subject = %subject_id, error = %e, "timer fire failed; will retry");
          report.errors += 1;
        }
        Err(e) => {
          tracing::error!(error = %e, "timer fire task panicked");
          report.errors += 1;
        }
      }
    }

    match self
      .switch
      .recover(self.config.claim_timeout, self.config.sweep_grace)
      .await
    {
      Ok(recovery) => report.recovery = recovery,
      Err(e) => {
        tracing::error!(error = %e, "recovery sweep failed");
        report.errors += 1;
      }
    }

    Ok(report)
  }

  /// Tick on the configured interval until `shutdown` resolves.
  pub async fn run(self, shutdown: impl Future<Output = ()>) {
    let mut interval = tokio::time::interval(self.config.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    tracing::info!(
      poll_interval = ?self.config.poll_interval,
      batch_size = self.config.batch_size,
      "timer worker started"
    );

    loop {
      tokio::select! {
        _ = &mut shutdown => break,
        _ = interval.tick() => {
          match self.tick().await {
            Ok(report) if !report.evaluations.is_empty() || report.errors > 0 => {
              tracing::debug!(
                fired = report.evaluations.len(),
                triggered = report.triggered(),
                errors = report.errors,
                "tick complete"
              );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "could not list due timers"),
          }
        }
      }
    }

    tracing::info!("timer worker stopped");
  }
}
