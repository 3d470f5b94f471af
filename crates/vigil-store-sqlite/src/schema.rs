//! SQL schema for the Vigil SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS subjects (
    subject_id     TEXT PRIMARY KEY,
    email          TEXT NOT NULL,
    display_name   TEXT,
    period_secs    INTEGER NOT NULL CHECK (period_secs > 0),
    last_active_at TEXT NOT NULL,   -- fixed-width RFC 3339 UTC; sortable
    status         TEXT NOT NULL,   -- 'active' | 'triggered'
    generation     INTEGER NOT NULL,
    epoch          INTEGER NOT NULL,
    created_at     TEXT NOT NULL,
    triggered_at   TEXT
);

-- At most one armed timer per subject. Rewritten in the same transaction
-- as the subject row it belongs to.
CREATE TABLE IF NOT EXISTS timers (
    subject_id TEXT PRIMARY KEY REFERENCES subjects(subject_id) ON DELETE CASCADE,
    generation INTEGER NOT NULL,
    fire_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS beneficiaries (
    beneficiary_id TEXT PRIMARY KEY,
    subject_id     TEXT NOT NULL REFERENCES subjects(subject_id) ON DELETE CASCADE,
    name           TEXT NOT NULL,
    email          TEXT NOT NULL,
    access_key     TEXT NOT NULL UNIQUE,
    created_at     TEXT NOT NULL,
    UNIQUE (subject_id, email)
);

-- One row per beneficiary per trigger epoch.
CREATE TABLE IF NOT EXISTS deliveries (
    delivery_id    TEXT PRIMARY KEY,
    subject_id     TEXT NOT NULL REFERENCES subjects(subject_id) ON DELETE CASCADE,
    beneficiary_id TEXT NOT NULL REFERENCES beneficiaries(beneficiary_id) ON DELETE CASCADE,
    epoch          INTEGER NOT NULL,
    state          TEXT NOT NULL DEFAULT 'pending',   -- 'pending' | 'sent' | 'failed'
    attempts       INTEGER NOT NULL DEFAULT 0,
    claim_token    TEXT,
    claimed_at     TEXT,
    last_error     TEXT,
    created_at     TEXT NOT NULL,
    resolved_at    TEXT,
    UNIQUE (beneficiary_id, epoch)
);

-- Append-only. Outlives the subject it describes.
CREATE TABLE IF NOT EXISTS audit_log (
    entry_id    TEXT PRIMARY KEY,
    subject_id  TEXT NOT NULL,
    kind        TEXT NOT NULL,
    message     TEXT NOT NULL,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS timers_fire_idx         ON timers(fire_at);
CREATE INDEX IF NOT EXISTS beneficiaries_subj_idx  ON beneficiaries(subject_id);
CREATE INDEX IF NOT EXISTS deliveries_subj_idx     ON deliveries(subject_id, epoch);
CREATE INDEX IF NOT EXISTS deliveries_state_idx    ON deliveries(state);
CREATE INDEX IF NOT EXISTS audit_subject_idx       ON audit_log(subject_id);

PRAGMA user_version = 1;
";
