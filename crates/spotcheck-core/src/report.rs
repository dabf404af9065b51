//! Reports: all observations from one audit run for one reference type.

use std::{
  collections::{BTreeMap, BTreeSet},
  fmt,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  key::ContentKey,
  mismatch::{MismatchIdentity, MismatchRecord, MismatchState, MismatchType},
  observation::Observation,
  reference::{ReferenceId, ReferenceType},
};

// ─── Report id ───────────────────────────────────────────────────────────────

/// (reference type, reference datetime, run datetime). Unique per report and
/// the idempotency key for saves.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReportId {
  pub reference_type:     ReferenceType,
  pub reference_datetime: DateTime<Utc>,
  pub report_datetime:    DateTime<Utc>,
}

impl ReportId {
  pub fn new(
    reference_type: ReferenceType,
    reference_datetime: DateTime<Utc>,
    report_datetime: DateTime<Utc>,
  ) -> Self {
    Self { reference_type, reference_datetime, report_datetime }
  }

  pub fn reference_id(&self) -> ReferenceId {
    ReferenceId::new(self.reference_type, self.reference_datetime)
  }
}

impl fmt::Display for ReportId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{} ref={} run={}",
      self.reference_type,
      self.reference_datetime.to_rfc3339(),
      self.report_datetime.to_rfc3339()
    )
  }
}

// ─── Summaries ───────────────────────────────────────────────────────────────

/// Open/closed tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
  pub open:   u64,
  pub closed: u64,
}

impl StateCounts {
  pub fn add(&mut self, state: MismatchState, n: u64) {
    match state {
      MismatchState::Open => self.open += n,
      MismatchState::Closed => self.closed += n,
    }
  }

  pub fn total(&self) -> u64 { self.open + self.closed }
}

/// A report header with aggregated counts, without its observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
  pub report_id:         ReportId,
  pub notes:             Option<String>,
  pub checked_keys:      u64,
  pub observations:      u64,
  /// Non-ignored mismatches.
  pub counts:            StateCounts,
  pub ignored_counts:    StateCounts,
  /// Non-ignored mismatches by type.
  pub type_counts:       BTreeMap<MismatchType, StateCounts>,
}

impl ReportSummary {
  pub fn empty(report_id: ReportId, notes: Option<String>) -> Self {
    Self {
      report_id,
      notes,
      checked_keys: 0,
      observations: 0,
      counts: StateCounts::default(),
      ignored_counts: StateCounts::default(),
      type_counts: BTreeMap::new(),
    }
  }

  /// Fold `n` mismatches of one type, state and ignore flag into the totals.
  pub fn tally(&mut self, mismatch_type: MismatchType, state: MismatchState, ignored: bool, n: u64) {
    if ignored {
      self.ignored_counts.add(state, n);
    } else {
      self.counts.add(state, n);
      self.type_counts.entry(mismatch_type).or_default().add(state, n);
    }
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// One audit run's result.
///
/// Every observation's reference type equals the report's, and every key with
/// an observation is also a checked key. Both are enforced on insertion.
#[derive(Debug, Clone)]
pub struct Report {
  pub id:           ReportId,
  pub notes:        Option<String>,
  checked_keys:     BTreeSet<ContentKey>,
  observations:     BTreeMap<ContentKey, Observation>,
  /// Side table filled in by the lifecycle pass: the record each of this
  /// report's mismatches was matched against.
  prior_mismatches: BTreeMap<MismatchIdentity, Vec<MismatchRecord>>,
}

impl Report {
  pub fn new(id: ReportId) -> Self {
    Self {
      id,
      notes: None,
      checked_keys: BTreeSet::new(),
      observations: BTreeMap::new(),
      prior_mismatches: BTreeMap::new(),
    }
  }

  pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
    self.notes = Some(notes.into());
    self
  }

  pub fn reference_type(&self) -> ReferenceType { self.id.reference_type }

  pub fn reference_id(&self) -> ReferenceId { self.id.reference_id() }

  pub fn run_datetime(&self) -> DateTime<Utc> { self.id.report_datetime }

  pub fn add_checked_key(&mut self, key: ContentKey) { self.checked_keys.insert(key); }

  /// Attach an observation, marking its key as checked. Replaces any earlier
  /// observation for the same key.
  pub fn add_observation(&mut self, mut observation: Observation) -> Result<()> {
    if observation.reference_type() != self.reference_type() {
      return Err(Error::ObservationReferenceType {
        expected: self.reference_type(),
        observed: observation.reference_type(),
      });
    }
    observation.report_datetime = Some(self.run_datetime());
    self.checked_keys.insert(observation.key.clone());
    self.observations.insert(observation.key.clone(), observation);
    Ok(())
  }

  pub fn add_observations(
    &mut self,
    observations: impl IntoIterator<Item = Observation>,
  ) -> Result<()> {
    observations.into_iter().try_for_each(|o| self.add_observation(o))
  }

  /// Record `key` as published content the reference does not list.
  pub fn add_reference_missing(&mut self, key: ContentKey, at: DateTime<Utc>) -> Result<()> {
    self.add_observation(Observation::reference_missing(self.reference_id(), key, at))
  }

  /// Record `key` as checked without raising anything.
  pub fn add_empty_observation(&mut self, key: ContentKey, at: DateTime<Utc>) -> Result<()> {
    self.add_observation(Observation::new(self.reference_id(), key, at))
  }

  pub fn checked_keys(&self) -> &BTreeSet<ContentKey> { &self.checked_keys }

  pub fn observations(&self) -> impl Iterator<Item = &Observation> { self.observations.values() }

  pub fn observation(&self, key: &ContentKey) -> Option<&Observation> { self.observations.get(key) }

  pub fn observation_mut(&mut self, key: &ContentKey) -> Option<&mut Observation> {
    self.observations.get_mut(key)
  }

  /// The observation for `key`, creating an empty one observed at the run
  /// datetime when the key has none.
  pub fn observation_or_empty(&mut self, key: &ContentKey) -> &mut Observation {
    let reference_id = self.reference_id();
    let run = self.run_datetime();
    self.checked_keys.insert(key.clone());
    self.observations.entry(key.clone()).or_insert_with(|| {
      let mut obs = Observation::new(reference_id, key.clone(), run);
      obs.report_datetime = Some(run);
      obs
    })
  }

  pub fn observation_count(&self) -> usize { self.observations.len() }

  pub fn prior_mismatches(&self, identity: &MismatchIdentity) -> &[MismatchRecord] {
    self.prior_mismatches.get(identity).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn set_prior_mismatches(&mut self, identity: MismatchIdentity, records: Vec<MismatchRecord>) {
    if records.is_empty() {
      self.prior_mismatches.remove(&identity);
    } else {
      self.prior_mismatches.insert(identity, records);
    }
  }

  pub fn mismatch_count(&self) -> usize {
    self.observations.values().map(Observation::mismatch_count).sum()
  }

  /// Histogram of mismatch states across all observations.
  pub fn status_counts(&self, ignored: bool) -> BTreeMap<MismatchState, u64> {
    let mut counts = BTreeMap::new();
    for obs in self.observations.values() {
      for (state, n) in obs.status_counts(ignored) {
        *counts.entry(state).or_insert(0) += n;
      }
    }
    counts
  }

  /// Denormalize every mismatch into its persisted form.
  ///
  /// Open records take the observation's datetime; closed records take the
  /// run datetime. A missing first-seen falls back to the observed datetime.
  pub fn to_records(&self) -> Vec<MismatchRecord> {
    let run = self.run_datetime();
    let mut records = Vec::with_capacity(self.mismatch_count());
    for obs in self.observations.values() {
      for m in obs.mismatches() {
        let observed_datetime = match m.state {
          MismatchState::Open => obs.observed_datetime,
          MismatchState::Closed => run,
        };
        records.push(MismatchRecord {
          mismatch_id: m.mismatch_id,
          report_id: self.id,
          reference_id: obs.reference_id,
          key: obs.key.clone(),
          mismatch_type: m.mismatch_type,
          state: m.state,
          ignore_status: m.ignore_status,
          issue_ids: m.issue_ids.clone(),
          first_seen_datetime: m.first_seen_datetime.unwrap_or(observed_datetime),
          observed_datetime,
          report_datetime: run,
          observed: m.observed.clone(),
          reference: m.reference.clone(),
        });
      }
    }
    records
  }

  pub fn summary(&self) -> ReportSummary {
    let mut summary = ReportSummary::empty(self.id, self.notes.clone());
    summary.checked_keys = self.checked_keys.len() as u64;
    summary.observations = self.observations.len() as u64;
    for m in self.observations.values().flat_map(Observation::mismatches) {
      summary.tally(m.mismatch_type, m.state, m.is_ignored(), 1);
    }
    summary
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone as _};

  use super::*;
  use crate::{key::BillId, mismatch::Mismatch};

  fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap() }

  fn key(print_no: &str) -> ContentKey { BillId::parse(print_no, 2023).unwrap().into() }

  fn report() -> Report {
    Report::new(ReportId::new(ReferenceType::SenateSiteBills, t0(), t0() + Duration::hours(1)))
  }

  #[test]
  fn rejects_observation_of_other_reference_type() {
    let mut r = report();
    let obs = Observation::new(
      ReferenceId::new(ReferenceType::LbdcDaybreak, t0()),
      key("S1"),
      t0(),
    );
    assert!(matches!(
      r.add_observation(obs),
      Err(Error::ObservationReferenceType { .. })
    ));
    assert!(r.checked_keys().is_empty());
  }

  #[test]
  fn observed_keys_are_checked_keys() {
    let mut r = report();
    r.add_checked_key(key("S2"));
    r.add_reference_missing(key("S1"), t0()).unwrap();
    r.add_empty_observation(key("S3"), t0()).unwrap();

    assert_eq!(r.checked_keys().len(), 3);
    assert_eq!(r.observation_count(), 2);
    assert!(r.observations().all(|o| r.checked_keys().contains(&o.key)));
    assert!(r.observations().all(|o| o.report_datetime == Some(r.run_datetime())));
  }

  #[test]
  fn records_take_run_datetime_when_closed() {
    let mut r = report();
    let mut obs = Observation::new(r.reference_id(), key("S1"), t0());
    obs.add_mismatch(Mismatch::new(MismatchType::BillTitle, "BAR", "FOO")).unwrap();
    let mut closed = Mismatch::new(MismatchType::BillSummary, "x", "y");
    closed.state = MismatchState::Closed;
    closed.first_seen_datetime = Some(t0() - Duration::days(3));
    obs.add_mismatch(closed).unwrap();
    r.add_observation(obs).unwrap();

    let records = r.to_records();
    assert_eq!(records.len(), 2);
    let open = records.iter().find(|m| m.state == MismatchState::Open).unwrap();
    assert_eq!(open.first_seen_datetime, t0());
    assert_eq!(open.observed_datetime, t0());
    assert_eq!(open.report_datetime, r.run_datetime());
    let closed = records.iter().find(|m| m.state == MismatchState::Closed).unwrap();
    assert_eq!(closed.observed_datetime, r.run_datetime());
    assert_eq!(closed.first_seen_datetime, t0() - Duration::days(3));
  }

  #[test]
  fn summary_counts_by_type() {
    let mut r = report();
    let mut obs = Observation::new(r.reference_id(), key("S1"), t0());
    obs.add_mismatch(Mismatch::new(MismatchType::BillTitle, "BAR", "FOO")).unwrap();
    r.add_observation(obs).unwrap();
    r.add_reference_missing(key("S2"), t0()).unwrap();

    let s = r.summary();
    assert_eq!(s.checked_keys, 2);
    assert_eq!(s.counts.open, 2);
    assert_eq!(s.type_counts[&MismatchType::BillTitle].open, 1);
    assert_eq!(s.ignored_counts.total(), 0);
  }
}
