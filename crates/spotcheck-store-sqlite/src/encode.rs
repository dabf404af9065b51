//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with nanosecond precision, so
//! they sort lexicographically. Enumerations are stored by their
//! SCREAMING_SNAKE_CASE names. Content keys are a kind plus a JSON key-map.

use std::{path::PathBuf, str::FromStr};

use chrono::{DateTime, Datelike as _, SecondsFormat, Utc};
use spotcheck_core::{
  key::{ContentKey, KeyKind, KeyMap},
  mismatch::MismatchRecord,
  reference::{ReferenceId, ReferenceType},
  report::ReportId,
  scrape::{DeadLetter, ScrapeFile, ScrapeQueueEntry},
  store::{LimitOffset, SortOrder},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

/// Encode a range bound for comparison against stored timestamps. Only years
/// 0000 through 9999 encode with a fixed width, so bounds outside them are
/// clamped; `DateTime::<Utc>::MIN_UTC` would otherwise encode with a sign.
pub fn encode_bound(dt: DateTime<Utc>) -> String {
  match dt.year() {
    ..0 => "0000-01-01T00:00:00.000000000Z".to_owned(),
    10_000.. => "9999-12-31T23:59:59.999999999Z".to_owned(),
    _ => encode_dt(dt),
  }
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn decode_enum<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| spotcheck_core::Error::unknown_variant(kind, s).into())
}

pub fn encode_order(order: SortOrder) -> &'static str {
  match order {
    SortOrder::Asc => "ASC",
    SortOrder::Desc => "DESC",
  }
}

/// `LIMIT` and `OFFSET` values; SQLite treats a negative limit as unbounded.
pub fn encode_page(page: LimitOffset) -> (i64, i64) {
  (page.limit.map_or(-1, i64::from), i64::from(page.offset))
}

// ─── ContentKey ──────────────────────────────────────────────────────────────

pub fn encode_key(key: &ContentKey) -> Result<(String, String)> {
  Ok((key.kind().to_string(), serde_json::to_string(&key.to_key_map())?))
}

pub fn decode_key(kind: &str, map: &str) -> Result<ContentKey> {
  let kind: KeyKind = decode_enum("key kind", kind)?;
  let map: KeyMap = serde_json::from_str(map)?;
  Ok(ContentKey::from_key_map(kind, &map)?)
}

// ─── Issue ids ───────────────────────────────────────────────────────────────

pub fn encode_issue_ids(ids: &[String]) -> Result<String> { Ok(serde_json::to_string(ids)?) }

pub fn decode_issue_ids(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Columns read by [`RawMismatch::from_row`], for a `mismatches m` joined with
/// its `reports r`.
pub const MISMATCH_COLUMNS: &str = "
  m.mismatch_id, m.reference_type, m.reference_datetime, m.key_kind, m.key_map,
  m.mismatch_type, m.state, m.ignore_status, m.issue_ids, m.first_seen_datetime,
  m.observed_datetime, m.report_datetime, m.observed, m.reference,
  r.reference_datetime";

/// Raw strings read directly from a `mismatches` row joined with `reports`.
pub struct RawMismatch {
  pub mismatch_id:               i64,
  pub reference_type:            String,
  pub reference_datetime:        String,
  pub key_kind:                  String,
  pub key_map:                   String,
  pub mismatch_type:             String,
  pub state:                     String,
  pub ignore_status:             String,
  pub issue_ids:                 String,
  pub first_seen_datetime:       String,
  pub observed_datetime:         String,
  pub report_datetime:           String,
  pub observed:                  String,
  pub reference:                 String,
  // reports join
  pub report_reference_datetime: String,
}

impl RawMismatch {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      mismatch_id:               row.get(0)?,
      reference_type:            row.get(1)?,
      reference_datetime:        row.get(2)?,
      key_kind:                  row.get(3)?,
      key_map:                   row.get(4)?,
      mismatch_type:             row.get(5)?,
      state:                     row.get(6)?,
      ignore_status:             row.get(7)?,
      issue_ids:                 row.get(8)?,
      first_seen_datetime:       row.get(9)?,
      observed_datetime:         row.get(10)?,
      report_datetime:           row.get(11)?,
      observed:                  row.get(12)?,
      reference:                 row.get(13)?,
      report_reference_datetime: row.get(14)?,
    })
  }

  pub fn into_record(self) -> Result<MismatchRecord> {
    let reference_type: ReferenceType = decode_enum("reference type", &self.reference_type)?;
    let report_datetime = decode_dt(&self.report_datetime)?;
    Ok(MismatchRecord {
      mismatch_id: Some(self.mismatch_id),
      report_id: ReportId::new(
        reference_type,
        decode_dt(&self.report_reference_datetime)?,
        report_datetime,
      ),
      reference_id: ReferenceId::new(reference_type, decode_dt(&self.reference_datetime)?),
      key: decode_key(&self.key_kind, &self.key_map)?,
      mismatch_type: decode_enum("mismatch type", &self.mismatch_type)?,
      state: decode_enum("mismatch state", &self.state)?,
      ignore_status: decode_enum("ignore status", &self.ignore_status)?,
      issue_ids: decode_issue_ids(&self.issue_ids)?,
      first_seen_datetime: decode_dt(&self.first_seen_datetime)?,
      observed_datetime: decode_dt(&self.observed_datetime)?,
      report_datetime,
      observed: self.observed,
      reference: self.reference,
    })
  }
}

/// Raw strings read directly from a `scrape_files` row.
pub struct RawScrapeFile {
  pub file_name:          String,
  pub file_path:          String,
  pub staged_datetime:    String,
  pub archived:           bool,
  pub pending_processing: bool,
}

impl RawScrapeFile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      file_name:          row.get(0)?,
      file_path:          row.get(1)?,
      staged_datetime:    row.get(2)?,
      archived:           row.get(3)?,
      pending_processing: row.get(4)?,
    })
  }

  pub fn into_file(self) -> Result<ScrapeFile> {
    Ok(ScrapeFile {
      file_name:          self.file_name,
      file_path:          PathBuf::from(self.file_path),
      staged_datetime:    decode_dt(&self.staged_datetime)?,
      archived:           self.archived,
      pending_processing: self.pending_processing,
    })
  }
}

/// Raw strings read directly from a `scrape_queue` row.
pub struct RawQueueEntry {
  pub key_kind:       String,
  pub key_map:        String,
  pub priority:       i32,
  pub added_datetime: String,
}

impl RawQueueEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      key_kind:       row.get(0)?,
      key_map:        row.get(1)?,
      priority:       row.get(2)?,
      added_datetime: row.get(3)?,
    })
  }

  pub fn into_entry(self) -> Result<ScrapeQueueEntry> {
    Ok(ScrapeQueueEntry {
      key:            decode_key(&self.key_kind, &self.key_map)?,
      priority:       self.priority,
      added_datetime: decode_dt(&self.added_datetime)?,
    })
  }
}

/// Raw strings read directly from a `scrape_dead_letters` row.
pub struct RawDeadLetter {
  pub entry:           RawQueueEntry,
  pub attempts:        u32,
  pub last_error:      String,
  pub failed_datetime: String,
}

impl RawDeadLetter {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry:           RawQueueEntry::from_row(row)?,
      attempts:        row.get(4)?,
      last_error:      row.get(5)?,
      failed_datetime: row.get(6)?,
    })
  }

  pub fn into_letter(self) -> Result<DeadLetter> {
    Ok(DeadLetter {
      entry:           self.entry.into_entry()?,
      attempts:        self.attempts,
      last_error:      self.last_error,
      failed_datetime: decode_dt(&self.failed_datetime)?,
    })
  }
}
