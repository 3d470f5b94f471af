//! The dead man's switch scheduling core.
//!
//! [`Switch`] ties a [`SwitchStore`], a [`Notifier`] and a [`Clock`]
//! together. Its operations are split by component:
//!
//! | Module | Component |
//! |--------|-----------|
//! | [`recorder`] | Activity Recorder: enrolment, check-ins, settings |
//! | [`evaluator`] | Expiry Evaluator: decides what a timer fire means |
//! | [`machine`] | State machine: the compare-and-set trigger transition |
//! | [`dispatcher`] | Notification Dispatcher: claims and sends deliveries |
//! | [`worker`] | Turns persisted timers into fire events on an interval |
//!
//! No operation holds a lock across subjects. Everything that must be atomic
//! is a single store call.

pub mod dispatcher;
pub mod error;
pub mod evaluator;
pub mod machine;
pub mod recorder;
pub mod worker;

pub use dispatcher::{Attempt, DispatchReport, RecoveryReport};
pub use error::{Error, Result};
pub use evaluator::Evaluation;
pub use machine::Triggered;
pub use worker::{TickReport, TimerWorker, WorkerConfig};

use std::sync::Arc;

use vigil_core::{
  clock::{Clock, SystemClock},
  notify::Notifier,
  store::SwitchStore,
  subject::PeriodBounds,
};

/// A dead man's switch over one store.
///
/// Cloning is cheap; every clone shares the same store, notifier and clock.
pub struct Switch<S, N, C = SystemClock> {
  store:    Arc<S>,
  notifier: Arc<N>,
  clock:    Arc<C>,
  bounds:   PeriodBounds,
}

impl<S, N, C> Clone for Switch<S, N, C> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      notifier: Arc::clone(&self.notifier),
      clock:    Arc::clone(&self.clock),
      bounds:   self.bounds,
    }
  }
}

impl<S, N> Switch<S, N, SystemClock>
where
  S: SwitchStore,
  N: Notifier,
{
  /// A switch on the system clock with default period bounds.
  pub fn new(store: Arc<S>, notifier: Arc<N>) -> Self {
    Self::with_clock(store, notifier, Arc::new(SystemClock))
  }
}

impl<S, N, C> Switch<S, N, C>
where
  S: SwitchStore,
  N: Notifier,
  C: Clock,
{
  pub fn with_clock(store: Arc<S>, notifier: Arc<N>, clock: Arc<C>) -> Self {
    Self { store, notifier, clock, bounds: PeriodBounds::default() }
  }

  pub fn with_bounds(mut self, bounds: PeriodBounds) -> Self {
    self.bounds = bounds;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn clock(&self) -> &C { &self.clock }

  pub fn bounds(&self) -> PeriodBounds { self.bounds }
}
