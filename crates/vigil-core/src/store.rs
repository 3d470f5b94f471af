//! The `SwitchStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `vigil-store-sqlite`).
//! The engine depends on this abstraction, not on any concrete backend.
//!
//! Every method is atomic on its own: where a method touches several rows
//! (subject, timer, deliveries, audit log) the backend must apply them in a
//! single transaction. Timestamps are always supplied by the caller.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  audit::{AuditEntry, AuditKind},
  beneficiary::{Beneficiary, NewBeneficiary},
  delivery::{Delivery, DeliveryOutcome, DeliveryState, DispatchKey},
  subject::{ActivityKind, ActivityRecord, NewSubject, SettingsUpdate, Subject},
  timer::Timer,
};

/// Result of the compare-and-set trigger transition.
#[derive(Debug, Clone)]
pub enum TriggerOutcome {
  /// This caller won: the subject is now triggered and one pending delivery
  /// exists per beneficiary for the subject's epoch.
  Triggered {
    subject:    Subject,
    deliveries: Vec<Delivery>,
  },
  /// The subject was no longer active at the expected generation.
  Lost,
  /// The subject no longer exists.
  Missing,
}

/// Abstraction over a Vigil switch store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait SwitchStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Subjects ──────────────────────────────────────────────────────────

  /// Create an active subject (generation 1, epoch 1) with
  /// `last_active_at = now` and arm its timer at `now + period`. Writes an
  /// `enrolled` audit entry.
  fn enroll(
    &self,
    input: NewSubject,
    now: DateTime<Utc>,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  /// Retrieve a subject by UUID. Returns `None` if not found.
  fn get_subject(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  fn list_subjects(
    &self,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + '_;

  /// Apply a check-in: advance `last_active_at` to `at` (never backwards),
  /// bump the generation, re-arm the timer at `last_active_at + period`, and
  /// write an audit entry for `kind`. A triggered subject is moved back to
  /// active in a new epoch. Returns `None` if the subject does not exist.
  fn record_activity(
    &self,
    id: Uuid,
    kind: ActivityKind,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<ActivityRecord>, Self::Error>> + Send + '_;

  /// Apply settings. A period change re-arms the timer at
  /// `last_active_at + period` under the current generation. Returns `None`
  /// if the subject does not exist.
  fn update_settings(
    &self,
    id: Uuid,
    update: SettingsUpdate,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + '_;

  // ── Timers ────────────────────────────────────────────────────────────

  fn get_timer(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Option<Timer>, Self::Error>> + Send + '_;

  /// Arm or re-arm a subject's timer. A timer carrying an older generation
  /// than the stored one is ignored. Returns whether the row was written.
  fn schedule(
    &self,
    timer: Timer,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Best-effort removal of a subject's timer.
  fn cancel(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Timers with `fire_at <= now`, earliest first.
  fn due_timers(
    &self,
    now: DateTime<Utc>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Timer>, Self::Error>> + Send + '_;

  /// Remove a timer after its fire was handled, only if the stored row still
  /// equals `timer` (same generation and `fire_at`).
  fn acknowledge(
    &self,
    timer: Timer,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── State machine ─────────────────────────────────────────────────────

  /// Compare-and-set ACTIVE → TRIGGERED, guarded on `expected_generation`.
  ///
  /// On success, in the same transaction: set `triggered_at`, write a
  /// `dms_triggered` audit entry with `message`, create one pending delivery
  /// per beneficiary for the current epoch, and remove the timer.
  fn trigger(
    &self,
    id: Uuid,
    expected_generation: u64,
    at: DateTime<Utc>,
    message: String,
  ) -> impl Future<Output = Result<TriggerOutcome, Self::Error>> + Send + '_;

  // ── Beneficiary directory ─────────────────────────────────────────────

  /// Register a beneficiary with a freshly generated access key.
  fn add_beneficiary(
    &self,
    input: NewBeneficiary,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Beneficiary, Self::Error>> + Send + '_;

  fn get_beneficiary(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Beneficiary>, Self::Error>> + Send + '_;

  fn list_beneficiaries(
    &self,
    subject_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Beneficiary>, Self::Error>> + Send + '_;

  /// Remove a beneficiary together with its delivery records.
  fn remove_beneficiary(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  // ── Deliveries ────────────────────────────────────────────────────────

  fn get_delivery(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Delivery>, Self::Error>> + Send + '_;

  /// Deliveries for a subject, optionally restricted to one epoch.
  fn list_deliveries(
    &self,
    subject_id: Uuid,
    epoch: Option<u64>,
  ) -> impl Future<Output = Result<Vec<Delivery>, Self::Error>> + Send + '_;

  /// Claim an unclaimed delivery currently in state `from`, incrementing its
  /// attempt count. Returns the claimed delivery, or `None` if it was not in
  /// `from`, already claimed, or missing.
  fn claim_delivery(
    &self,
    id: Uuid,
    from: DeliveryState,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Delivery>, Self::Error>> + Send + '_;

  /// Resolve a claimed delivery and release the claim. Writes a
  /// `notification_sent` / `notification_failed` audit entry. Returns
  /// `false` if `claim_token` no longer holds the delivery.
  fn resolve_delivery(
    &self,
    id: Uuid,
    claim_token: Uuid,
    outcome: DeliveryOutcome,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Resolve every claim taken before `claimed_before` as failed. The send
  /// may or may not have happened, so these are never resent automatically.
  fn abandon_claims(
    &self,
    claimed_before: DateTime<Utc>,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Delivery>, Self::Error>> + Send + '_;

  /// `(subject, epoch)` pairs with unclaimed pending deliveries created
  /// before `created_before`.
  fn pending_dispatches(
    &self,
    created_before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<DispatchKey>, Self::Error>> + Send + '_;

  // ── Audit log ─────────────────────────────────────────────────────────

  fn record_audit(
    &self,
    subject_id: Uuid,
    kind: AuditKind,
    message: String,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<AuditEntry, Self::Error>> + Send + '_;

  /// Newest first.
  fn list_audit(
    &self,
    subject_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + '_;
}
