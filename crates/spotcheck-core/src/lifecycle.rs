//! Mismatch lifecycle: reconciling a new report against prior state.
//!
//! Every function here is pure. The caller fetches the current records for the
//! report's data source, runs [`reconcile`], and persists the report; the
//! reconciled lifecycle fields travel inside the report's observations.
//!
//! The current state may hold several records per identity (one per report
//! that touched it). Only the most recent record of each identity is
//! consulted.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  mismatch::{
    IgnoreStatus, Mismatch, MismatchIdentity, MismatchRecord, MismatchState,
    MismatchStatus, MismatchType,
  },
  reference::{DataSource, ReferenceType},
  report::Report,
};

type Index<'a> = HashMap<MismatchIdentity, &'a MismatchRecord>;

/// Latest record per identity, by report datetime.
fn index(current: &[MismatchRecord]) -> Index<'_> {
  let mut latest: Index<'_> = HashMap::with_capacity(current.len());
  for record in current {
    latest
      .entry(record.identity())
      .and_modify(|seen| {
        if record.report_datetime > seen.report_datetime {
          *seen = record;
        }
      })
      .or_insert(record);
  }
  latest
}

fn open_match<'a>(index: &Index<'a>, record: &MismatchRecord) -> Option<&'a MismatchRecord> {
  index
    .get(&record.identity())
    .copied()
    .filter(|prior| prior.state == MismatchState::Open)
}

// ─── Individual steps ────────────────────────────────────────────────────────

/// Copy first-seen from the matching open record; otherwise (no match, or the
/// match is closed) the mismatch is new and first-seen equals observed.
pub fn update_first_seen(report_mismatches: &mut [MismatchRecord], current: &[MismatchRecord]) {
  update_first_seen_indexed(report_mismatches, &index(current));
}

fn update_first_seen_indexed(report_mismatches: &mut [MismatchRecord], index: &Index<'_>) {
  for rm in report_mismatches {
    rm.first_seen_datetime = match open_match(index, rm) {
      Some(prior) => prior.first_seen_datetime,
      None => rm.observed_datetime,
    };
  }
}

/// Carry ignore statuses forward from matching open records.
pub fn copy_ignore_statuses(report_mismatches: &mut [MismatchRecord], current: &[MismatchRecord]) {
  copy_ignore_statuses_indexed(report_mismatches, &index(current));
}

fn copy_ignore_statuses_indexed(report_mismatches: &mut [MismatchRecord], index: &Index<'_>) {
  for rm in report_mismatches {
    if let Some(prior) = open_match(index, rm) {
      rm.ignore_status = prior.ignore_status;
    }
  }
}

/// Carry issue ids forward from matching open records, keeping any ids the
/// new record already has after the inherited ones.
pub fn copy_issue_ids(report_mismatches: &mut [MismatchRecord], current: &[MismatchRecord]) {
  copy_issue_ids_indexed(report_mismatches, &index(current));
}

fn copy_issue_ids_indexed(report_mismatches: &mut [MismatchRecord], index: &Index<'_>) {
  for rm in report_mismatches {
    if let Some(prior) = open_match(index, rm) {
      let own = std::mem::replace(&mut rm.issue_ids, prior.issue_ids.clone());
      for id in own {
        rm.add_issue_id(&id);
      }
    }
  }
}

/// The ignore status a record takes after one lifecycle pass.
pub fn next_ignore_status(state: MismatchState, ignore: IgnoreStatus) -> IgnoreStatus {
  match (state, ignore) {
    (MismatchState::Closed, IgnoreStatus::IgnorePermanently) => IgnoreStatus::IgnorePermanently,
    (MismatchState::Closed, _) => IgnoreStatus::NotIgnored,
    (MismatchState::Open, IgnoreStatus::IgnoreOnce) => IgnoreStatus::NotIgnored,
    (MismatchState::Open, other) => other,
  }
}

pub fn update_ignore_status(records: &mut [MismatchRecord]) {
  for r in records {
    r.ignore_status = next_ignore_status(r.state, r.ignore_status);
  }
}

/// Open records in `current` that `report` checked and no longer raises.
pub fn derive_closed(
  report_mismatches: &[MismatchRecord],
  current: &[MismatchRecord],
  report: &Report,
) -> Vec<MismatchRecord> {
  derive_closed_indexed(report_mismatches, &index(current), report)
}

fn derive_closed_indexed(
  report_mismatches: &[MismatchRecord],
  index: &Index<'_>,
  report: &Report,
) -> Vec<MismatchRecord> {
  let reference_type = report.reference_type();
  let raised: HashSet<MismatchIdentity> =
    report_mismatches.iter().map(MismatchRecord::identity).collect();

  let mut closed: Vec<MismatchRecord> = index
    .iter()
    .filter(|(_, m)| m.state == MismatchState::Open)
    .filter(|(_, m)| report.checked_keys().contains(&m.key))
    .filter(|(_, m)| reference_type.authorizes(m.mismatch_type))
    .filter(|(identity, _)| !raised.contains(*identity))
    .map(|(_, m)| close_with_report(m, report))
    .collect();
  closed.sort_by(|a, b| a.identity().cmp(&b.identity()));
  closed
}

/// A copy of `record` closed by `report`.
pub fn close_with_report(record: &MismatchRecord, report: &Report) -> MismatchRecord {
  let run = report.run_datetime();
  MismatchRecord {
    mismatch_id: None,
    report_id: report.id,
    reference_id: report.reference_id(),
    state: MismatchState::Closed,
    observed_datetime: run,
    report_datetime: run,
    ..record.clone()
  }
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

/// The derived record sets of one lifecycle pass.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
  pub report_mismatches: Vec<MismatchRecord>,
  pub closed_mismatches: Vec<MismatchRecord>,
}

impl Reconciliation {
  pub fn count(&self, status: MismatchStatus) -> usize {
    self
      .report_mismatches
      .iter()
      .chain(&self.closed_mismatches)
      .filter(|r| r.status() == status)
      .count()
  }
}

/// Reconcile `report` against the current records of its data source.
///
/// Open mismatches get their first-seen, ignore status and issue ids from the
/// matching open record. Records the report resolved are attached to their
/// key's observation as closed mismatches. The prior record of every
/// identity the report touched lands in the report's side table.
pub fn reconcile(report: &mut Report, current: &[MismatchRecord]) -> Result<Reconciliation> {
  let index = index(current);

  let mut report_mismatches: Vec<MismatchRecord> = report
    .to_records()
    .into_iter()
    .filter(|r| r.state == MismatchState::Open)
    .collect();
  for rm in &mut report_mismatches {
    rm.ignore_status = IgnoreStatus::NotIgnored;
    rm.issue_ids.clear();
  }

  update_first_seen_indexed(&mut report_mismatches, &index);
  copy_ignore_statuses_indexed(&mut report_mismatches, &index);
  copy_issue_ids_indexed(&mut report_mismatches, &index);
  update_ignore_status(&mut report_mismatches);

  let mut closed_mismatches = derive_closed_indexed(&report_mismatches, &index, report);
  update_ignore_status(&mut closed_mismatches);

  for rm in &report_mismatches {
    if let Some(m) = report
      .observation_mut(&rm.key)
      .and_then(|o| o.mismatch_mut(rm.mismatch_type))
    {
      m.state = MismatchState::Open;
      m.first_seen_datetime = Some(rm.first_seen_datetime);
      m.ignore_status = rm.ignore_status;
      m.issue_ids = rm.issue_ids.clone();
    }
  }

  for cm in &closed_mismatches {
    let mut m = Mismatch::new(cm.mismatch_type, cm.observed.clone(), cm.reference.clone());
    m.state = MismatchState::Closed;
    m.first_seen_datetime = Some(cm.first_seen_datetime);
    m.ignore_status = cm.ignore_status;
    m.issue_ids = cm.issue_ids.clone();
    report.observation_or_empty(&cm.key).add_mismatch(m)?;
  }

  for record in report_mismatches.iter().chain(&closed_mismatches) {
    let identity = record.identity();
    if let Some(prior) = index.get(&identity) {
      report.set_prior_mismatches(identity, vec![(*prior).clone()]);
    }
  }

  Ok(Reconciliation { report_mismatches, closed_mismatches })
}

// ─── Derived views ───────────────────────────────────────────────────────────

/// Counts for one reference type within an [`OpenMismatchSummary`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTypeSummary {
  /// Current open, non-ignored mismatches.
  pub open:          u64,
  /// Current open mismatches that are ignored.
  pub ignored:       u64,
  /// Non-ignored records observed since the summary's bound, by status.
  pub status_counts: BTreeMap<MismatchStatus, u64>,
  /// Current open, non-ignored mismatches by type.
  pub type_counts:   BTreeMap<MismatchType, u64>,
}

/// Overview of the current mismatch state of one data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenMismatchSummary {
  pub data_source:     DataSource,
  pub observed_after:  Option<DateTime<Utc>>,
  pub reference_types: BTreeMap<ReferenceType, ReferenceTypeSummary>,
}

impl OpenMismatchSummary {
  /// Summarise the latest record of each identity in `current`.
  pub fn from_records(
    data_source: DataSource,
    current: &[MismatchRecord],
    observed_after: Option<DateTime<Utc>>,
  ) -> Self {
    let mut reference_types: BTreeMap<ReferenceType, ReferenceTypeSummary> = data_source
      .reference_types()
      .into_iter()
      .map(|t| (t, ReferenceTypeSummary::default()))
      .collect();

    for record in index(current).into_values() {
      let reference_type = record.reference_id.reference_type;
      if reference_type.data_source() != data_source {
        continue;
      }
      let entry = reference_types.entry(reference_type).or_default();
      let open = record.state == MismatchState::Open;
      if open && record.is_ignored() {
        entry.ignored += 1;
      } else if open {
        entry.open += 1;
        *entry.type_counts.entry(record.mismatch_type).or_insert(0) += 1;
      }
      let recent = observed_after.is_none_or(|after| record.observed_datetime >= after);
      if recent && !record.is_ignored() {
        *entry.status_counts.entry(record.status()).or_insert(0) += 1;
      }
    }

    Self { data_source, observed_after, reference_types }
  }
}
