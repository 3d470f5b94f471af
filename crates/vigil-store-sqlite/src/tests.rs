//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{DateTime, TimeDelta, TimeZone as _, Utc};
use uuid::Uuid;
use vigil_core::{
  audit::AuditKind,
  beneficiary::NewBeneficiary,
  delivery::{DeliveryOutcome, DeliveryState},
  store::{SwitchStore, TriggerOutcome},
  subject::{ActivityKind, NewSubject, Period, SettingsUpdate, SwitchStatus},
  timer::Timer,
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() }

fn new_subject(days: u32) -> NewSubject {
  NewSubject {
    email:        "owner@example.com".into(),
    display_name: Some("Owner".into()),
    period:       Period::from_days(days),
  }
}

fn beneficiary(subject_id: Uuid, name: &str) -> NewBeneficiary {
  NewBeneficiary {
    subject_id,
    name: name.into(),
    email: format!("{}@example.com", name.to_lowercase()),
  }
}

// ─── Subjects ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn enroll_arms_timer_in_same_write() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();

  assert_eq!(subject.status, SwitchStatus::Active);
  assert_eq!(subject.generation, 1);
  assert_eq!(subject.epoch, 1);
  assert_eq!(subject.last_active_at, t0());

  let timer = s.get_timer(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(timer.generation, 1);
  assert_eq!(timer.fire_at, t0() + TimeDelta::days(7));

  let audit = s.list_audit(subject.subject_id, 10).await.unwrap();
  assert_eq!(audit.len(), 1);
  assert_eq!(audit[0].kind, AuditKind::Enrolled);
}

#[tokio::test]
async fn get_subject_missing_returns_none() {
  let s = store().await;
  assert!(s.get_subject(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn list_subjects_in_enrolment_order() {
  let s = store().await;
  let a = s.enroll(new_subject(7), t0()).await.unwrap();
  let b = s.enroll(new_subject(30), t0() + TimeDelta::hours(1)).await.unwrap();

  let all = s.list_subjects().await.unwrap();
  let ids: Vec<_> = all.iter().map(|x| x.subject_id).collect();
  assert_eq!(ids, vec![a.subject_id, b.subject_id]);
}

// ─── Activity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn activity_bumps_generation_and_rearms_timer() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  let at = t0() + TimeDelta::days(3);

  let record = s
    .record_activity(subject.subject_id, ActivityKind::Heartbeat, at)
    .await
    .unwrap()
    .unwrap();
  assert!(!record.rearmed);
  assert_eq!(record.subject.generation, 2);
  assert_eq!(record.subject.last_active_at, at);

  let timer = s.get_timer(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(timer.generation, 2);
  assert_eq!(timer.fire_at, at + TimeDelta::days(7));
}

#[tokio::test]
async fn activity_never_moves_last_active_backwards() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  let later = t0() + TimeDelta::days(2);
  s.record_activity(subject.subject_id, ActivityKind::Heartbeat, later)
    .await
    .unwrap();

  let record = s
    .record_activity(subject.subject_id, ActivityKind::Login, t0() + TimeDelta::days(1))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(record.subject.last_active_at, later);
  assert_eq!(record.subject.generation, 3);
}

#[tokio::test]
async fn activity_for_missing_subject_returns_none() {
  let s = store().await;
  let record = s
    .record_activity(Uuid::new_v4(), ActivityKind::Heartbeat, t0())
    .await
    .unwrap();
  assert!(record.is_none());
}

#[tokio::test]
async fn activity_writes_audit_entry_for_its_kind() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  s.record_activity(subject.subject_id, ActivityKind::Login, t0() + TimeDelta::hours(1))
    .await
    .unwrap();

  let audit = s.list_audit(subject.subject_id, 10).await.unwrap();
  assert_eq!(audit[0].kind, AuditKind::Login);
  assert_eq!(audit[0].message, "User logged in");
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn period_change_rearms_under_same_generation() {
  let s = store().await;
  let subject = s.enroll(new_subject(30), t0()).await.unwrap();

  let updated = s
    .update_settings(
      subject.subject_id,
      SettingsUpdate { period: Some(Period::from_days(10)), display_name: None },
      t0() + TimeDelta::days(1),
    )
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.period, Period::from_days(10));
  assert_eq!(updated.generation, 1);
  assert_eq!(updated.display_name.as_deref(), Some("Owner"));

  let timer = s.get_timer(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(timer.generation, 1);
  assert_eq!(timer.fire_at, t0() + TimeDelta::days(10));
}

// ─── Timers ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn schedule_ignores_stale_generation() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  s.record_activity(subject.subject_id, ActivityKind::Heartbeat, t0() + TimeDelta::days(1))
    .await
    .unwrap();

  let stale = Timer {
    subject_id: subject.subject_id,
    generation: 1,
    fire_at:    t0() + TimeDelta::days(30),
  };
  assert!(!s.schedule(stale).await.unwrap());

  let timer = s.get_timer(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(timer.generation, 2);
  assert_eq!(timer.fire_at, t0() + TimeDelta::days(8));
}

#[tokio::test]
async fn schedule_for_missing_subject_is_ignored() {
  let s = store().await;
  let timer = Timer { subject_id: Uuid::new_v4(), generation: 1, fire_at: t0() };
  assert!(!s.schedule(timer).await.unwrap());
}

#[tokio::test]
async fn due_timers_earliest_first() {
  let s = store().await;
  let late = s.enroll(new_subject(30), t0()).await.unwrap();
  let early = s.enroll(new_subject(7), t0()).await.unwrap();

  assert!(s.due_timers(t0() + TimeDelta::days(6), 10).await.unwrap().is_empty());

  let due = s.due_timers(t0() + TimeDelta::days(31), 10).await.unwrap();
  let ids: Vec<_> = due.iter().map(|t| t.subject_id).collect();
  assert_eq!(ids, vec![early.subject_id, late.subject_id]);

  let limited = s.due_timers(t0() + TimeDelta::days(31), 1).await.unwrap();
  assert_eq!(limited.len(), 1);
}

#[tokio::test]
async fn acknowledge_only_removes_matching_row() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  let armed = s.get_timer(subject.subject_id).await.unwrap().unwrap();

  s.record_activity(subject.subject_id, ActivityKind::Heartbeat, t0() + TimeDelta::days(1))
    .await
    .unwrap();
  assert!(!s.acknowledge(armed).await.unwrap());
  assert!(s.get_timer(subject.subject_id).await.unwrap().is_some());

  let current = s.get_timer(subject.subject_id).await.unwrap().unwrap();
  assert!(s.acknowledge(current).await.unwrap());
  assert!(s.get_timer(subject.subject_id).await.unwrap().is_none());
}

#[tokio::test]
async fn cancel_removes_timer() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  assert!(s.cancel(subject.subject_id).await.unwrap());
  assert!(!s.cancel(subject.subject_id).await.unwrap());
}

// ─── Trigger ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn trigger_creates_pending_deliveries_and_clears_timer() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  s.add_beneficiary(beneficiary(subject.subject_id, "Alice"), t0()).await.unwrap();
  s.add_beneficiary(beneficiary(subject.subject_id, "Bob"), t0()).await.unwrap();

  let at = t0() + TimeDelta::days(7);
  let outcome = s
    .trigger(subject.subject_id, 1, at, "fired".into())
    .await
    .unwrap();

  let TriggerOutcome::Triggered { subject: triggered, deliveries } = outcome else {
    panic!("expected trigger to win");
  };
  assert_eq!(triggered.status, SwitchStatus::Triggered);
  assert_eq!(triggered.triggered_at, Some(at));
  assert_eq!(deliveries.len(), 2);
  assert!(deliveries.iter().all(|d| d.state == DeliveryState::Pending && d.epoch == 1));
  assert!(s.get_timer(subject.subject_id).await.unwrap().is_none());
}

#[tokio::test]
async fn second_trigger_loses() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  let at = t0() + TimeDelta::days(7);

  let first = s.trigger(subject.subject_id, 1, at, "fired".into()).await.unwrap();
  let second = s.trigger(subject.subject_id, 1, at, "fired".into()).await.unwrap();
  assert!(matches!(first, TriggerOutcome::Triggered { .. }));
  assert!(matches!(second, TriggerOutcome::Lost));

  let triggered = s
    .list_audit(subject.subject_id, 50)
    .await
    .unwrap()
    .into_iter()
    .filter(|e| e.kind == AuditKind::DmsTriggered)
    .count();
  assert_eq!(triggered, 1);
}

#[tokio::test]
async fn trigger_with_stale_generation_loses() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  s.record_activity(subject.subject_id, ActivityKind::Heartbeat, t0() + TimeDelta::days(1))
    .await
    .unwrap();

  let outcome = s
    .trigger(subject.subject_id, 1, t0() + TimeDelta::days(7), "fired".into())
    .await
    .unwrap();
  assert!(matches!(outcome, TriggerOutcome::Lost));
  let current = s.get_subject(subject.subject_id).await.unwrap().unwrap();
  assert_eq!(current.status, SwitchStatus::Active);
}

#[tokio::test]
async fn trigger_missing_subject() {
  let s = store().await;
  let outcome = s.trigger(Uuid::new_v4(), 1, t0(), "fired".into()).await.unwrap();
  assert!(matches!(outcome, TriggerOutcome::Missing));
}

#[tokio::test]
async fn activity_after_trigger_starts_new_epoch() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  s.add_beneficiary(beneficiary(subject.subject_id, "Alice"), t0()).await.unwrap();
  s.trigger(subject.subject_id, 1, t0() + TimeDelta::days(7), "fired".into())
    .await
    .unwrap();

  let record = s
    .record_activity(subject.subject_id, ActivityKind::Heartbeat, t0() + TimeDelta::days(8))
    .await
    .unwrap()
    .unwrap();
  assert!(record.rearmed);
  assert_eq!(record.subject.status, SwitchStatus::Active);
  assert_eq!(record.subject.epoch, 2);
  assert_eq!(record.subject.triggered_at, None);
  assert!(s.get_timer(subject.subject_id).await.unwrap().is_some());

  // The previous epoch's records are untouched; the new one has none yet.
  assert_eq!(s.list_deliveries(subject.subject_id, Some(1)).await.unwrap().len(), 1);
  assert!(s.list_deliveries(subject.subject_id, Some(2)).await.unwrap().is_empty());

  let audit = s.list_audit(subject.subject_id, 1).await.unwrap();
  assert_eq!(audit[0].kind, AuditKind::DmsRearmed);
}

// ─── Beneficiaries ───────────────────────────────────────────────────────────

#[tokio::test]
async fn add_beneficiary_requires_subject() {
  let s = store().await;
  let missing = Uuid::new_v4();
  let err = s.add_beneficiary(beneficiary(missing, "Alice"), t0()).await.unwrap_err();
  assert!(matches!(err, Error::SubjectNotFound(id) if id == missing));
}

#[tokio::test]
async fn duplicate_beneficiary_email_rejected() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  s.add_beneficiary(beneficiary(subject.subject_id, "Alice"), t0()).await.unwrap();
  let err = s
    .add_beneficiary(beneficiary(subject.subject_id, "Alice"), t0())
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateBeneficiary { .. }));
}

#[tokio::test]
async fn removing_beneficiary_removes_its_deliveries() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  let alice = s.add_beneficiary(beneficiary(subject.subject_id, "Alice"), t0()).await.unwrap();
  s.add_beneficiary(beneficiary(subject.subject_id, "Bob"), t0()).await.unwrap();
  s.trigger(subject.subject_id, 1, t0() + TimeDelta::days(7), "fired".into())
    .await
    .unwrap();

  assert!(s.remove_beneficiary(alice.beneficiary_id).await.unwrap());
  assert!(s.get_beneficiary(alice.beneficiary_id).await.unwrap().is_none());
  let remaining = s.list_deliveries(subject.subject_id, None).await.unwrap();
  assert_eq!(remaining.len(), 1);
  assert_ne!(remaining[0].beneficiary_id, alice.beneficiary_id);
}

// ─── Deliveries ──────────────────────────────────────────────────────────────

async fn triggered_with_one_delivery(s: &SqliteStore) -> (Uuid, Uuid) {
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  s.add_beneficiary(beneficiary(subject.subject_id, "Alice"), t0()).await.unwrap();
  let TriggerOutcome::Triggered { deliveries, .. } = s
    .trigger(subject.subject_id, 1, t0() + TimeDelta::days(7), "fired".into())
    .await
    .unwrap()
  else {
    panic!("expected trigger to win");
  };
  (subject.subject_id, deliveries[0].delivery_id)
}

#[tokio::test]
async fn claim_is_exclusive() {
  let s = store().await;
  let (_, delivery_id) = triggered_with_one_delivery(&s).await;
  let at = t0() + TimeDelta::days(7);

  let claimed = s
    .claim_delivery(delivery_id, DeliveryState::Pending, at)
    .await
    .unwrap()
    .unwrap();
  assert!(claimed.is_claimed());
  assert_eq!(claimed.attempts, 1);

  assert!(
    s.claim_delivery(delivery_id, DeliveryState::Pending, at)
      .await
      .unwrap()
      .is_none()
  );
}

#[tokio::test]
async fn resolve_requires_matching_token_and_sent_is_terminal() {
  let s = store().await;
  let (subject_id, delivery_id) = triggered_with_one_delivery(&s).await;
  let at = t0() + TimeDelta::days(7);

  let claimed = s
    .claim_delivery(delivery_id, DeliveryState::Pending, at)
    .await
    .unwrap()
    .unwrap();
  assert!(
    !s.resolve_delivery(delivery_id, Uuid::new_v4(), DeliveryOutcome::Sent, at)
      .await
      .unwrap()
  );
  let token = claimed.claim_token.unwrap();
  assert!(s.resolve_delivery(delivery_id, token, DeliveryOutcome::Sent, at).await.unwrap());

  let sent = s.get_delivery(delivery_id).await.unwrap().unwrap();
  assert_eq!(sent.state, DeliveryState::Sent);
  assert!(!sent.is_claimed());

  for from in [DeliveryState::Pending, DeliveryState::Failed, DeliveryState::Sent] {
    assert!(s.claim_delivery(delivery_id, from, at).await.unwrap().is_none());
  }

  let audit = s.list_audit(subject_id, 1).await.unwrap();
  assert_eq!(audit[0].kind, AuditKind::NotificationSent);
}

#[tokio::test]
async fn failed_delivery_records_error() {
  let s = store().await;
  let (subject_id, delivery_id) = triggered_with_one_delivery(&s).await;
  let at = t0() + TimeDelta::days(7);

  let claimed = s
    .claim_delivery(delivery_id, DeliveryState::Pending, at)
    .await
    .unwrap()
    .unwrap();
  s.resolve_delivery(
    delivery_id,
    claimed.claim_token.unwrap(),
    DeliveryOutcome::Failed("mailbox full".into()),
    at,
  )
  .await
  .unwrap();

  let failed = s.get_delivery(delivery_id).await.unwrap().unwrap();
  assert_eq!(failed.state, DeliveryState::Failed);
  assert_eq!(failed.last_error.as_deref(), Some("mailbox full"));

  let audit = s.list_audit(subject_id, 1).await.unwrap();
  assert_eq!(audit[0].kind, AuditKind::NotificationFailed);
  assert!(audit[0].message.contains("mailbox full"));
}

#[tokio::test]
async fn stale_claims_are_abandoned_as_failed() {
  let s = store().await;
  let (_, delivery_id) = triggered_with_one_delivery(&s).await;
  let claimed_at = t0() + TimeDelta::days(7);
  s.claim_delivery(delivery_id, DeliveryState::Pending, claimed_at)
    .await
    .unwrap()
    .unwrap();

  let none = s.abandon_claims(claimed_at, claimed_at).await.unwrap();
  assert!(none.is_empty());

  let later = claimed_at + TimeDelta::hours(1);
  let abandoned = s.abandon_claims(later, later).await.unwrap();
  assert_eq!(abandoned.len(), 1);
  assert_eq!(abandoned[0].state, DeliveryState::Failed);
  assert!(!abandoned[0].is_claimed());
}

#[tokio::test]
async fn pending_dispatches_skip_claimed_and_fresh() {
  let s = store().await;
  let (subject_id, delivery_id) = triggered_with_one_delivery(&s).await;
  let created = t0() + TimeDelta::days(7);

  assert!(s.pending_dispatches(created).await.unwrap().is_empty());
  let keys = s.pending_dispatches(created + TimeDelta::minutes(5)).await.unwrap();
  assert_eq!(keys.len(), 1);
  assert_eq!(keys[0].subject_id, subject_id);
  assert_eq!(keys[0].epoch, 1);

  s.claim_delivery(delivery_id, DeliveryState::Pending, created)
    .await
    .unwrap();
  assert!(s.pending_dispatches(created + TimeDelta::minutes(5)).await.unwrap().is_empty());
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn audit_newest_first_with_limit() {
  let s = store().await;
  let subject = s.enroll(new_subject(7), t0()).await.unwrap();
  s.record_audit(subject.subject_id, AuditKind::Heartbeat, "one".into(), t0() + TimeDelta::hours(1))
    .await
    .unwrap();
  s.record_audit(subject.subject_id, AuditKind::Heartbeat, "two".into(), t0() + TimeDelta::hours(2))
    .await
    .unwrap();

  let entries = s.list_audit(subject.subject_id, 2).await.unwrap();
  let messages: Vec<_> = entries.iter().map(|e| e.message.as_str()).collect();
  assert_eq!(messages, vec!["two", "one"]);
}
