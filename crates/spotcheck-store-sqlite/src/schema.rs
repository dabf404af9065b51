//! SQL schema for the spot-check SQLite store.
//!
//! Executed once at connection startup. Content keys are stored as a kind
//! column plus the JSON-encoded key-map; the map is a `BTreeMap`, so equal keys
//! encode to equal strings and can be compared in SQL.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS reports (
    report_id          INTEGER PRIMARY KEY,
    reference_type     TEXT NOT NULL,
    reference_datetime TEXT NOT NULL,   -- RFC 3339 UTC, nanosecond precision
    report_datetime    TEXT NOT NULL,
    notes              TEXT,
    UNIQUE (reference_type, reference_datetime, report_datetime)
);

-- One row per checked key. observed_datetime is NULL for keys that were
-- checked without producing an observation.
CREATE TABLE IF NOT EXISTS observations (
    report_id          INTEGER NOT NULL REFERENCES reports(report_id) ON DELETE CASCADE,
    key_kind           TEXT NOT NULL,
    key_map            TEXT NOT NULL,
    reference_datetime TEXT NOT NULL,
    observed_datetime  TEXT,
    PRIMARY KEY (report_id, key_kind, key_map)
);

-- Denormalized mismatch records, open and closed.
CREATE TABLE IF NOT EXISTS mismatches (
    mismatch_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    report_id           INTEGER NOT NULL REFERENCES reports(report_id) ON DELETE CASCADE,
    reference_type      TEXT NOT NULL,
    reference_datetime  TEXT NOT NULL,
    key_kind            TEXT NOT NULL,
    key_map             TEXT NOT NULL,
    key_sort            TEXT NOT NULL,   -- ContentKey::sort_key
    mismatch_type       TEXT NOT NULL,
    state               TEXT NOT NULL,   -- 'OPEN' | 'CLOSED'
    ignore_status       TEXT NOT NULL,
    issue_ids           TEXT NOT NULL DEFAULT '[]',
    first_seen_datetime TEXT NOT NULL,
    observed_datetime   TEXT NOT NULL,
    report_datetime     TEXT NOT NULL,
    observed            TEXT NOT NULL,
    reference           TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scrape_files (
    file_name          TEXT PRIMARY KEY,
    file_path          TEXT NOT NULL,
    staged_datetime    TEXT NOT NULL,
    archived           INTEGER NOT NULL DEFAULT 0,
    pending_processing INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS scrape_queue (
    key_kind       TEXT NOT NULL,
    key_map        TEXT NOT NULL,
    priority       INTEGER NOT NULL,
    added_datetime TEXT NOT NULL,
    PRIMARY KEY (key_kind, key_map)
);

CREATE TABLE IF NOT EXISTS scrape_dead_letters (
    dead_letter_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    key_kind        TEXT NOT NULL,
    key_map         TEXT NOT NULL,
    priority        INTEGER NOT NULL,
    added_datetime  TEXT NOT NULL,
    attempts        INTEGER NOT NULL,
    last_error      TEXT NOT NULL,
    failed_datetime TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS mismatches_identity_idx
    ON mismatches(reference_type, key_kind, key_map, mismatch_type, report_datetime);
CREATE INDEX IF NOT EXISTS mismatches_report_idx   ON mismatches(report_id);
CREATE INDEX IF NOT EXISTS reports_type_run_idx    ON reports(reference_type, report_datetime);
CREATE INDEX IF NOT EXISTS scrape_files_staged_idx ON scrape_files(staged_datetime);
CREATE INDEX IF NOT EXISTS scrape_queue_head_idx   ON scrape_queue(priority DESC, added_datetime ASC);

PRAGMA user_version = 1;
";
