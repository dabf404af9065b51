//! [`SqliteStore`], the SQLite implementation of [`ReportStore`].

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, types::Value};
use spotcheck_core::{
  key::ContentKey,
  mismatch::{self, IgnoreStatus, Mismatch, MismatchRecord, MismatchStatus},
  observation::Observation,
  reference::{DataSource, ReferenceId, ReferenceType},
  report::{Report, ReportId, ReportSummary},
  store::{
    LimitOffset, MismatchOrderBy, OpenMismatchQuery, Paginated, ReportStore, SortOrder,
  },
};
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{
    MISMATCH_COLUMNS, RawMismatch, decode_dt, decode_enum, decode_key, encode_bound,
    encode_dt, encode_issue_ids, encode_key, encode_order, encode_page,
  },
  reference::SqliteReferenceStore,
  schema::SCHEMA,
};

/// Restricts `mismatches m` to the latest record of each identity.
const LATEST: &str = "m.report_datetime = (
  SELECT MAX(l.report_datetime) FROM mismatches l
  WHERE l.reference_type = m.reference_type
    AND l.key_kind = m.key_kind
    AND l.key_map = m.key_map
    AND l.mismatch_type = m.mismatch_type)";

fn in_list(n: usize) -> String { vec!["?"; n].join(", ") }

fn text(s: impl Into<String>) -> Value { Value::Text(s.into()) }

// ─── Row encodings ───────────────────────────────────────────────────────────

/// The identifying columns of a `reports` row.
struct ReportKey {
  reference_type:     String,
  reference_datetime: String,
  report_datetime:    String,
}

impl ReportKey {
  fn new(id: ReportId) -> Self {
    Self {
      reference_type:     id.reference_type.to_string(),
      reference_datetime: encode_dt(id.reference_datetime),
      report_datetime:    encode_dt(id.report_datetime),
    }
  }

  fn find(&self, conn: &rusqlite::Connection) -> rusqlite::Result<Option<(i64, Option<String>)>> {
    conn
      .query_row(
        "SELECT report_id, notes FROM reports
         WHERE reference_type = ?1 AND reference_datetime = ?2 AND report_datetime = ?3",
        rusqlite::params![self.reference_type, self.reference_datetime, self.report_datetime],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
  }
}

struct ObservationRow {
  key_kind:           String,
  key_map:            String,
  reference_datetime: String,
  observed_datetime:  Option<String>,
}

struct MismatchRow {
  reference_type:      String,
  reference_datetime:  String,
  key_kind:            String,
  key_map:             String,
  key_sort:            String,
  mismatch_type:       String,
  state:               String,
  ignore_status:       String,
  issue_ids:           String,
  first_seen_datetime: String,
  observed_datetime:   String,
  report_datetime:     String,
  observed:            String,
  reference:           String,
}

impl MismatchRow {
  fn encode(record: &MismatchRecord) -> Result<Self> {
    let (key_kind, key_map) = encode_key(&record.key)?;
    Ok(Self {
      reference_type: record.reference_id.reference_type.to_string(),
      reference_datetime: encode_dt(record.reference_id.reference_datetime),
      key_kind,
      key_map,
      key_sort: record.key.sort_key(),
      mismatch_type: record.mismatch_type.to_string(),
      state: record.state.to_string(),
      ignore_status: record.ignore_status.to_string(),
      issue_ids: encode_issue_ids(&record.issue_ids)?,
      first_seen_datetime: encode_dt(record.first_seen_datetime),
      observed_datetime: encode_dt(record.observed_datetime),
      report_datetime: encode_dt(record.report_datetime),
      observed: record.observed.clone(),
      reference: record.reference.clone(),
    })
  }
}

/// A report header and its aggregate counts as read from the database.
struct RawSummary {
  reference_datetime: String,
  report_datetime:    String,
  notes:              Option<String>,
  checked_keys:       i64,
  observations:       i64,
  /// (mismatch type, state, ignore status, count)
  tallies:            Vec<(String, String, String, i64)>,
}

impl RawSummary {
  fn into_summary(self, reference_type: ReferenceType) -> Result<ReportSummary> {
    let id = ReportId::new(
      reference_type,
      decode_dt(&self.reference_datetime)?,
      decode_dt(&self.report_datetime)?,
    );
    let mut summary = ReportSummary::empty(id, self.notes);
    summary.checked_keys = u64::try_from(self.checked_keys).unwrap_or_default();
    summary.observations = u64::try_from(self.observations).unwrap_or_default();
    for (mismatch_type, state, ignore, n) in self.tallies {
      let ignore: IgnoreStatus = decode_enum("ignore status", &ignore)?;
      summary.tally(
        decode_enum("mismatch type", &mismatch_type)?,
        decode_enum("mismatch state", &state)?,
        ignore.is_ignored(),
        u64::try_from(n).unwrap_or_default(),
      );
    }
    Ok(summary)
  }
}

/// Everything stored for one report.
struct RawReport {
  notes:        Option<String>,
  observations: Vec<ObservationRow>,
  mismatches:   Vec<RawMismatch>,
}

fn json_failure(e: serde_json::Error) -> rusqlite::Error {
  rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Report repository backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// A reference store sharing this store's database.
  pub fn reference_store(
    &self,
    staging_dir: impl AsRef<Path>,
    archive_dir: impl AsRef<Path>,
  ) -> SqliteReferenceStore {
    SqliteReferenceStore::new(self.conn.clone(), staging_dir, archive_dir)
  }

  async fn select_mismatches(
    &self,
    where_clause: String,
    params: Vec<Value>,
  ) -> Result<Vec<MismatchRecord>> {
    let raws: Vec<RawMismatch> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {MISMATCH_COLUMNS}
           FROM mismatches m JOIN reports r ON r.report_id = m.report_id
           WHERE {where_clause}
           ORDER BY m.mismatch_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawMismatch::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawMismatch::into_record).collect()
  }

  /// Read-modify-write of one mismatch's issue ids.
  async fn update_issue_ids(
    &self,
    mismatch_id: i64,
    update: impl FnOnce(&mut Vec<String>) -> bool + Send + 'static,
  ) -> Result<()> {
    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let ids: Option<Vec<String>> = tx
          .query_row(
            "SELECT issue_ids FROM mismatches WHERE mismatch_id = ?1",
            [mismatch_id],
            |row| serde_json::from_str(&row.get::<_, String>(0)?).map_err(json_failure),
          )
          .optional()?;
        let Some(mut ids) = ids else { return Ok(false) };
        if update(&mut ids) {
          let encoded = serde_json::to_string(&ids).map_err(json_failure)?;
          tx.execute(
            "UPDATE mismatches SET issue_ids = ?1 WHERE mismatch_id = ?2",
            rusqlite::params![encoded, mismatch_id],
          )?;
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;
    if found { Ok(()) } else { Err(Error::MismatchNotFound(mismatch_id)) }
  }
}

// ─── ReportStore impl ────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  type Error = Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn save_report<'a>(&'a self, report: &'a Report) -> Result<()> {
    let key = ReportKey::new(report.id);
    let notes = report.notes.clone();

    let observations = report
      .checked_keys()
      .iter()
      .map(|k| {
        let (key_kind, key_map) = encode_key(k)?;
        let obs = report.observation(k);
        let reference_datetime =
          obs.map_or(report.id.reference_datetime, |o| o.reference_id.reference_datetime);
        Ok(ObservationRow {
          key_kind,
          key_map,
          reference_datetime: encode_dt(reference_datetime),
          observed_datetime: obs.map(|o| encode_dt(o.observed_datetime)),
        })
      })
      .collect::<Result<Vec<_>>>()?;
    let mismatches = report
      .to_records()
      .iter()
      .map(MismatchRow::encode)
      .collect::<Result<Vec<_>>>()?;
    let (n_keys, n_mismatches) = (observations.len(), mismatches.len());

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM reports
           WHERE reference_type = ?1 AND reference_datetime = ?2 AND report_datetime = ?3",
          rusqlite::params![key.reference_type, key.reference_datetime, key.report_datetime],
        )?;
        tx.execute(
          "INSERT INTO reports (reference_type, reference_datetime, report_datetime, notes)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![key.reference_type, key.reference_datetime, key.report_datetime, notes],
        )?;
        let report_id = tx.last_insert_rowid();

        {
          let mut stmt = tx.prepare(
            "INSERT INTO observations (
               report_id, key_kind, key_map, reference_datetime, observed_datetime
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for o in &observations {
            stmt.execute(rusqlite::params![
              report_id,
              o.key_kind,
              o.key_map,
              o.reference_datetime,
              o.observed_datetime,
            ])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO mismatches (
               report_id, reference_type, reference_datetime, key_kind, key_map, key_sort,
               mismatch_type, state, ignore_status, issue_ids, first_seen_datetime,
               observed_datetime, report_datetime, observed, reference
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
          )?;
          for m in &mismatches {
            stmt.execute(rusqlite::params![
              report_id,
              m.reference_type,
              m.reference_datetime,
              m.key_kind,
              m.key_map,
              m.key_sort,
              m.mismatch_type,
              m.state,
              m.ignore_status,
              m.issue_ids,
              m.first_seen_datetime,
              m.observed_datetime,
              m.report_datetime,
              m.observed,
              m.reference,
            ])?;
          }
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    info!(report = %report.id, checked_keys = n_keys, mismatches = n_mismatches, "saved report");
    Ok(())
  }

  async fn delete_report(&self, id: ReportId) -> Result<()> {
    let key = ReportKey::new(id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM reports
           WHERE reference_type = ?1 AND reference_datetime = ?2 AND report_datetime = ?3",
          rusqlite::params![key.reference_type, key.reference_datetime, key.report_datetime],
        )?)
      })
      .await?;
    if deleted == 0 {
      return Err(Error::ReportNotFound(id));
    }
    info!(report = %id, "deleted report");
    Ok(())
  }

  async fn clear(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(
          "BEGIN;
           DELETE FROM mismatches;
           DELETE FROM observations;
           DELETE FROM reports;
           COMMIT;",
        )?;
        Ok(())
      })
      .await?;
    info!("cleared all reports and mismatches");
    Ok(())
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn get_report(&self, id: ReportId) -> Result<Report> {
    let key = ReportKey::new(id);
    let raw: Option<RawReport> = self
      .conn
      .call(move |conn| {
        let Some((report_id, notes)) = key.find(conn)? else { return Ok(None) };

        let mut stmt = conn.prepare(
          "SELECT key_kind, key_map, reference_datetime, observed_datetime
           FROM observations WHERE report_id = ?1",
        )?;
        let observations = stmt
          .query_map([report_id], |row| {
            Ok(ObservationRow {
              key_kind:           row.get(0)?,
              key_map:            row.get(1)?,
              reference_datetime: row.get(2)?,
              observed_datetime:  row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(&format!(
          "SELECT {MISMATCH_COLUMNS}
           FROM mismatches m JOIN reports r ON r.report_id = m.report_id
           WHERE m.report_id = ?1 ORDER BY m.mismatch_id"
        ))?;
        let mismatches = stmt
          .query_map([report_id], RawMismatch::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(RawReport { notes, observations, mismatches }))
      })
      .await?;
    let raw = raw.ok_or(Error::ReportNotFound(id))?;

    let mut report = Report::new(id);
    report.notes = raw.notes;
    let mut observations: BTreeMap<ContentKey, Observation> = BTreeMap::new();
    for row in raw.observations {
      let key = decode_key(&row.key_kind, &row.key_map)?;
      match row.observed_datetime {
        Some(observed) => {
          let reference_id =
            ReferenceId::new(id.reference_type, decode_dt(&row.reference_datetime)?);
          let obs = Observation::new(reference_id, key.clone(), decode_dt(&observed)?);
          observations.insert(key, obs);
        }
        None => report.add_checked_key(key),
      }
    }
    for raw in raw.mismatches {
      let record = raw.into_record()?;
      let obs = observations.entry(record.key.clone()).or_insert_with(|| {
        Observation::new(record.reference_id, record.key.clone(), record.observed_datetime)
      });
      let mut m = Mismatch::new(record.mismatch_type, record.observed, record.reference);
      m.mismatch_id = record.mismatch_id;
      m.state = record.state;
      m.ignore_status = record.ignore_status;
      m.issue_ids = record.issue_ids;
      m.first_seen_datetime = Some(record.first_seen_datetime);
      obs.add_mismatch(m)?;
    }
    report.add_observations(observations.into_values())?;
    Ok(report)
  }

  async fn list_report_summaries(
    &self,
    reference_type: ReferenceType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    order: SortOrder,
    limit_offset: LimitOffset,
  ) -> Result<Paginated<ReportSummary>> {
    let type_str = reference_type.to_string();
    let (start, end) = (encode_bound(start), encode_bound(end));
    let (limit, offset) = encode_page(limit_offset);
    let direction = encode_order(order);

    let (total, raws): (i64, Vec<RawSummary>) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          "SELECT COUNT(*) FROM reports
           WHERE reference_type = ?1 AND report_datetime BETWEEN ?2 AND ?3",
          rusqlite::params![type_str, start, end],
          |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
          "SELECT report_id, reference_datetime, report_datetime, notes FROM reports
           WHERE reference_type = ?1 AND report_datetime BETWEEN ?2 AND ?3
           ORDER BY report_datetime {direction}
           LIMIT ?4 OFFSET ?5"
        ))?;
        let headers = stmt
          .query_map(rusqlite::params![type_str, start, end, limit, offset], |row| {
            Ok((
              row.get::<_, i64>(0)?,
              row.get::<_, String>(1)?,
              row.get::<_, String>(2)?,
              row.get::<_, Option<String>>(3)?,
            ))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = conn.prepare(
          "SELECT COUNT(*), COUNT(observed_datetime) FROM observations WHERE report_id = ?1",
        )?;
        let mut tallies = conn.prepare(
          "SELECT mismatch_type, state, ignore_status, COUNT(*) FROM mismatches
           WHERE report_id = ?1
           GROUP BY mismatch_type, state, ignore_status",
        )?;
        let mut raws = Vec::with_capacity(headers.len());
        for (report_id, reference_datetime, report_datetime, notes) in headers {
          let (checked_keys, observations): (i64, i64) =
            counts.query_row([report_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
          let tallies: Vec<(String, String, String, i64)> = tallies
            .query_map([report_id], |row| {
              Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          raws.push(RawSummary {
            reference_datetime,
            report_datetime,
            notes,
            checked_keys,
            observations,
            tallies,
          });
        }
        Ok((total, raws))
      })
      .await?;

    Ok(Paginated {
      total:        u64::try_from(total).unwrap_or_default(),
      limit_offset,
      items:        raws
        .into_iter()
        .map(|raw| raw.into_summary(reference_type))
        .collect::<Result<_>>()?,
    })
  }

  async fn current_mismatches(&self, data_source: DataSource) -> Result<Vec<MismatchRecord>> {
    let types = data_source.reference_types();
    let where_clause = format!("m.reference_type IN ({}) AND {LATEST}", in_list(types.len()));
    let params = types.iter().map(|t| text(t.to_string())).collect();
    let records = self.select_mismatches(where_clause, params).await?;
    debug!(%data_source, records = records.len(), "loaded current mismatches");
    Ok(records)
  }

  async fn query_open_mismatches<'a>(
    &'a self,
    query: &'a OpenMismatchQuery,
  ) -> Result<Paginated<MismatchRecord>> {
    let mut conds: Vec<String> = vec![LATEST.to_owned()];
    let mut params: Vec<Value> = Vec::new();

    if !query.reference_types.is_empty() {
      conds.push(format!("m.reference_type IN ({})", in_list(query.reference_types.len())));
      params.extend(query.reference_types.iter().map(|t| text(t.to_string())));
    }
    if let Some(after) = query.observed_after {
      conds.push("m.observed_datetime >= ?".to_owned());
      params.push(text(encode_bound(after)));
    }
    if !query.mismatch_types.is_empty() {
      conds.push(format!("m.mismatch_type IN ({})", in_list(query.mismatch_types.len())));
      params.extend(query.mismatch_types.iter().map(|t| text(t.to_string())));
    }
    if !query.ignore_statuses.is_empty() {
      conds.push(format!("m.ignore_status IN ({})", in_list(query.ignore_statuses.len())));
      params.extend(query.ignore_statuses.iter().map(|s| text(s.to_string())));
    }
    if !query.statuses.is_empty() {
      let statuses: Vec<&str> = query
        .statuses
        .iter()
        .map(|s| match s {
          MismatchStatus::New => {
            "(m.state = 'OPEN' AND m.first_seen_datetime >= m.observed_datetime)"
          }
          MismatchStatus::Existing => {
            "(m.state = 'OPEN' AND m.first_seen_datetime < m.observed_datetime)"
          }
          MismatchStatus::Resolved => "m.state = 'CLOSED'",
        })
        .collect();
      conds.push(format!("({})", statuses.join(" OR ")));
    }
    if let Some(keys) = &query.keys {
      if keys.is_empty() {
        conds.push("0".to_owned());
      } else {
        let mut key_conds = Vec::with_capacity(keys.len());
        for key in keys {
          let (kind, map) = encode_key(key)?;
          key_conds.push("(m.key_kind = ? AND m.key_map = ?)");
          params.push(text(kind));
          params.push(text(map));
        }
        conds.push(format!("({})", key_conds.join(" OR ")));
      }
    }

    let direction = encode_order(query.order);
    let order_by = match query.order_by {
      MismatchOrderBy::ObservedDate => format!("m.observed_datetime {direction}"),
      MismatchOrderBy::FirstSeenDate => format!("m.first_seen_datetime {direction}"),
      MismatchOrderBy::ReferenceDate => format!("m.reference_datetime {direction}"),
      MismatchOrderBy::ReportDate => format!("m.report_datetime {direction}"),
      MismatchOrderBy::MismatchType => format!("m.mismatch_type {direction}"),
      MismatchOrderBy::ContentKey => {
        format!("m.key_kind {direction}, m.key_sort {direction}")
      }
    };
    let where_clause = conds.join(" AND ");
    let (limit, offset) = encode_page(query.limit_offset);

    let (total, raws): (i64, Vec<RawMismatch>) = self
      .conn
      .call(move |conn| {
        let total: i64 = conn.query_row(
          &format!("SELECT COUNT(*) FROM mismatches m WHERE {where_clause}"),
          rusqlite::params_from_iter(params.iter()),
          |row| row.get(0),
        )?;

        let mut page_params = params;
        page_params.push(Value::Integer(limit));
        page_params.push(Value::Integer(offset));
        let mut stmt = conn.prepare(&format!(
          "SELECT {MISMATCH_COLUMNS}
           FROM mismatches m JOIN reports r ON r.report_id = m.report_id
           WHERE {where_clause}
           ORDER BY {order_by}, m.mismatch_id {direction}
           LIMIT ? OFFSET ?"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(page_params.iter()), RawMismatch::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    Ok(Paginated {
      total:        u64::try_from(total).unwrap_or_default(),
      limit_offset: query.limit_offset,
      items:        raws.into_iter().map(RawMismatch::into_record).collect::<Result<_>>()?,
    })
  }

  async fn get_mismatch(&self, mismatch_id: i64) -> Result<MismatchRecord> {
    self
      .select_mismatches("m.mismatch_id = ?".to_owned(), vec![Value::Integer(mismatch_id)])
      .await?
      .into_iter()
      .next()
      .ok_or(Error::MismatchNotFound(mismatch_id))
  }

  // ── Operator mutations ────────────────────────────────────────────────────

  async fn set_ignore_status(&self, mismatch_id: i64, status: IgnoreStatus) -> Result<()> {
    let status_str = status.to_string();
    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE mismatches SET ignore_status = ?1 WHERE mismatch_id = ?2",
          rusqlite::params![status_str, mismatch_id],
        )?)
      })
      .await?;
    if updated == 0 {
      return Err(Error::MismatchNotFound(mismatch_id));
    }
    debug!(mismatch_id, %status, "set ignore status");
    Ok(())
  }

  async fn add_issue_id(&self, mismatch_id: i64, issue_id: String) -> Result<()> {
    self
      .update_issue_ids(mismatch_id, move |ids| mismatch::add_issue_id(ids, &issue_id))
      .await
  }

  async fn remove_issue_id(&self, mismatch_id: i64, issue_id: String) -> Result<()> {
    self
      .update_issue_ids(mismatch_id, move |ids| mismatch::remove_issue_id(ids, &issue_id))
      .await
  }
}
