//! The `ReportStore` and `ReferenceStore` traits and supporting query types.
//!
//! The traits are implemented by storage backends (e.g.
//! `spotcheck-store-sqlite`). The engine and the command line depend on these
//! abstractions, not on a concrete backend.

use std::{collections::BTreeSet, future::Future};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{
  Error,
  key::{BaseBillId, ContentKey},
  mismatch::{IgnoreStatus, MismatchRecord, MismatchStatus, MismatchType},
  reference::{DataSource, ReferenceType},
  report::{Report, ReportId, ReportSummary},
  scrape::{DeadLetter, ScrapeFile, ScrapeQueueEntry},
};

// ─── Paging and ordering ─────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SortOrder {
  Asc,
  #[default]
  Desc,
}

impl SortOrder {
  pub fn opposite(self) -> Self {
    match self {
      Self::Asc => Self::Desc,
      Self::Desc => Self::Asc,
    }
  }
}

/// A page window. `limit: None` means everything after `offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitOffset {
  pub limit:  Option<u32>,
  pub offset: u32,
}

impl LimitOffset {
  pub const ALL: Self = Self { limit: None, offset: 0 };

  pub fn new(limit: u32, offset: u32) -> Self { Self { limit: Some(limit), offset } }

  pub fn next(self) -> Self {
    Self { limit: self.limit, offset: self.offset + self.limit.unwrap_or(0) }
  }
}

/// One page of results with the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginated<T> {
  pub total:        u64,
  pub limit_offset: LimitOffset,
  pub items:        Vec<T>,
}

// ─── Open mismatch query ─────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
  EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MismatchOrderBy {
  ObservedDate,
  FirstSeenDate,
  #[default]
  ReferenceDate,
  ReportDate,
  MismatchType,
  ContentKey,
}

/// Parameters for [`ReportStore::query_open_mismatches`].
///
/// Only the latest record of each mismatch identity is considered. Empty
/// `mismatch_types` means every type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenMismatchQuery {
  pub reference_types: BTreeSet<ReferenceType>,
  pub observed_after:  Option<DateTime<Utc>>,
  pub mismatch_types:  BTreeSet<MismatchType>,
  pub ignore_statuses: BTreeSet<IgnoreStatus>,
  pub statuses:        BTreeSet<MismatchStatus>,
  pub keys:            Option<BTreeSet<ContentKey>>,
  pub order_by:        MismatchOrderBy,
  pub order:           SortOrder,
  pub limit_offset:    LimitOffset,
}

impl OpenMismatchQuery {
  /// Open, non-ignored mismatches of `reference_types`, newest reference first.
  pub fn new(reference_types: impl IntoIterator<Item = ReferenceType>) -> Self {
    Self {
      reference_types: reference_types.into_iter().collect(),
      observed_after:  None,
      mismatch_types:  BTreeSet::new(),
      ignore_statuses: BTreeSet::from([IgnoreStatus::NotIgnored]),
      statuses:        BTreeSet::from([MismatchStatus::New, MismatchStatus::Existing]),
      keys:            None,
      order_by:        MismatchOrderBy::default(),
      order:           SortOrder::Desc,
      limit_offset:    LimitOffset::ALL,
    }
  }

  pub fn for_data_source(data_source: DataSource) -> Self {
    Self::new(data_source.reference_types())
  }

  pub fn observed_after(mut self, after: DateTime<Utc>) -> Self {
    self.observed_after = Some(after);
    self
  }

  pub fn mismatch_types(mut self, types: impl IntoIterator<Item = MismatchType>) -> Self {
    self.mismatch_types = types.into_iter().collect();
    self
  }

  pub fn ignore_statuses(mut self, statuses: impl IntoIterator<Item = IgnoreStatus>) -> Self {
    self.ignore_statuses = statuses.into_iter().collect();
    self
  }

  pub fn statuses(mut self, statuses: impl IntoIterator<Item = MismatchStatus>) -> Self {
    self.statuses = statuses.into_iter().collect();
    self
  }

  pub fn keys(mut self, keys: impl IntoIterator<Item = ContentKey>) -> Self {
    self.keys = Some(keys.into_iter().collect());
    self
  }

  pub fn order_by(mut self, order_by: MismatchOrderBy, order: SortOrder) -> Self {
    self.order_by = order_by;
    self.order = order;
    self
  }

  pub fn page(mut self, limit_offset: LimitOffset) -> Self {
    self.limit_offset = limit_offset;
    self
  }
}

// ─── Report store ────────────────────────────────────────────────────────────

/// Durable, queryable store of reports and their mismatch records.
///
/// Backend errors convert into [`Error`] so callers can match on the shared
/// error kinds (`ReportNotFound` and so on).
pub trait ReportStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<Error>;

  /// Persist the report header, its observations and every mismatch record in
  /// one transaction. Saving an existing report id overwrites it.
  fn save_report<'a>(
    &'a self,
    report: &'a Report,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The full report. Fails with `ReportNotFound`.
  fn get_report(
    &self,
    id: ReportId,
  ) -> impl Future<Output = Result<Report, Self::Error>> + Send + '_;

  /// Summaries of reports run within `[start, end]`, ordered by run datetime.
  fn list_report_summaries(
    &self,
    reference_type: ReferenceType,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    order: SortOrder,
    limit_offset: LimitOffset,
  ) -> impl Future<Output = Result<Paginated<ReportSummary>, Self::Error>> + Send + '_;

  /// The latest record of every mismatch identity of `data_source`, open or
  /// closed. This is the prior state a new report is reconciled against.
  fn current_mismatches(
    &self,
    data_source: DataSource,
  ) -> impl Future<Output = Result<Vec<MismatchRecord>, Self::Error>> + Send + '_;

  fn query_open_mismatches<'a>(
    &'a self,
    query: &'a OpenMismatchQuery,
  ) -> impl Future<Output = Result<Paginated<MismatchRecord>, Self::Error>> + Send + 'a;

  fn get_mismatch(
    &self,
    mismatch_id: i64,
  ) -> impl Future<Output = Result<MismatchRecord, Self::Error>> + Send + '_;

  /// Delete a report with its observations and mismatches. Fails with
  /// `ReportNotFound`.
  fn delete_report(
    &self,
    id: ReportId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn set_ignore_status(
    &self,
    mismatch_id: i64,
    status: IgnoreStatus,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn add_issue_id(
    &self,
    mismatch_id: i64,
    issue_id: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn remove_issue_id(
    &self,
    mismatch_id: i64,
    issue_id: String,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Administrative wipe of every report and mismatch.
  fn clear(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}

// ─── Reference store ─────────────────────────────────────────────────────────

/// Scraped reference files and the scrape queue.
pub trait ReferenceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static + Into<Error>;

  /// Write `content` to the staging directory, then record the staged row.
  fn save_content<'a>(
    &'a self,
    bill: &'a BaseBillId,
    content: &'a [u8],
  ) -> impl Future<Output = Result<ScrapeFile, Self::Error>> + Send + 'a;

  /// Staged files still pending processing, oldest first.
  fn list_incoming(&self) -> impl Future<Output = Result<Vec<ScrapeFile>, Self::Error>> + Send + '_;

  fn read_content<'a>(
    &'a self,
    file: &'a ScrapeFile,
  ) -> impl Future<Output = Result<String, Self::Error>> + Send + 'a;

  /// Move the file into the archive directory and mark it archived.
  fn archive(
    &self,
    file: ScrapeFile,
  ) -> impl Future<Output = Result<ScrapeFile, Self::Error>> + Send + '_;

  fn update_file_flags<'a>(
    &'a self,
    file: &'a ScrapeFile,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Insert, or overwrite priority and added time of an existing entry.
  fn enqueue<'a>(
    &'a self,
    key: &'a ContentKey,
    priority: i32,
  ) -> impl Future<Output = Result<ScrapeQueueEntry, Self::Error>> + Send + 'a;

  /// The highest-priority, oldest entry, left in place. Fails with
  /// `QueueEmpty`.
  fn dequeue_head(&self) -> impl Future<Output = Result<ScrapeQueueEntry, Self::Error>> + Send + '_;

  /// Idempotent. Returns whether an entry was removed.
  fn remove<'a>(
    &'a self,
    key: &'a ContentKey,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Queue listing ordered by priority, with added time in the opposite
  /// direction as tie-breaker.
  fn list_queue(
    &self,
    order: SortOrder,
    limit_offset: LimitOffset,
  ) -> impl Future<Output = Result<Paginated<ScrapeQueueEntry>, Self::Error>> + Send + '_;

  /// Remove the entry from the queue and record it as dead.
  fn dead_letter(
    &self,
    letter: DeadLetter,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_dead_letters(
    &self,
    limit_offset: LimitOffset,
  ) -> impl Future<Output = Result<Paginated<DeadLetter>, Self::Error>> + Send + '_;
}
