//! Observations: a checker's verdict for one content key against one
//! reference.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  key::ContentKey,
  mismatch::{Mismatch, MismatchState, MismatchType},
  reference::{ReferenceId, ReferenceType},
};

/// The comparison result for one content key, carrying at most one mismatch
/// per mismatch type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
  pub reference_id:      ReferenceId,
  pub key:               ContentKey,
  pub observed_datetime: DateTime<Utc>,
  /// Set once the observation is attached to a report.
  pub report_datetime:   Option<DateTime<Utc>>,
  mismatches:            BTreeMap<MismatchType, Mismatch>,
}

impl Observation {
  /// An observation with no mismatches. Also used to record a key as checked
  /// without raising anything.
  pub fn new(
    reference_id: ReferenceId,
    key: ContentKey,
    observed_datetime: DateTime<Utc>,
  ) -> Self {
    Self {
      reference_id,
      key,
      observed_datetime,
      report_datetime: None,
      mismatches: BTreeMap::new(),
    }
  }

  /// Content exists that the reference does not list.
  pub fn reference_missing(
    reference_id: ReferenceId,
    key: ContentKey,
    observed_datetime: DateTime<Utc>,
  ) -> Self {
    let mut obs = Self::new(reference_id, key, observed_datetime);
    let mismatch =
      Mismatch::new(MismatchType::ReferenceDataMissing, obs.key.to_string(), "");
    obs.mismatches.insert(mismatch.mismatch_type, mismatch);
    obs
  }

  /// The reference lists content that could not be loaded.
  pub fn observe_data_missing(
    reference_id: ReferenceId,
    key: ContentKey,
    observed_datetime: DateTime<Utc>,
  ) -> Self {
    let mut obs = Self::new(reference_id, key, observed_datetime);
    let mismatch =
      Mismatch::new(MismatchType::ObserveDataMissing, "", obs.key.to_string());
    obs.mismatches.insert(mismatch.mismatch_type, mismatch);
    obs
  }

  pub fn reference_type(&self) -> ReferenceType { self.reference_id.reference_type }

  /// Add a mismatch, replacing any existing mismatch of the same type.
  ///
  /// Fails with [`Error::InvalidMismatchForReferenceType`] when the reference
  /// type does not check that field.
  pub fn add_mismatch(&mut self, mismatch: Mismatch) -> Result<()> {
    let reference_type = self.reference_type();
    if !reference_type.authorizes(mismatch.mismatch_type) {
      return Err(Error::InvalidMismatchForReferenceType {
        reference_type,
        mismatch_type: mismatch.mismatch_type,
      });
    }
    self.mismatches.insert(mismatch.mismatch_type, mismatch);
    Ok(())
  }

  pub fn mismatch(&self, mismatch_type: MismatchType) -> Option<&Mismatch> {
    self.mismatches.get(&mismatch_type)
  }

  pub fn mismatch_mut(&mut self, mismatch_type: MismatchType) -> Option<&mut Mismatch> {
    self.mismatches.get_mut(&mismatch_type)
  }

  pub fn has_mismatch(&self, mismatch_type: MismatchType) -> bool {
    self.mismatches.contains_key(&mismatch_type)
  }

  pub fn mismatches(&self) -> impl Iterator<Item = &Mismatch> { self.mismatches.values() }

  pub fn mismatch_count(&self) -> usize { self.mismatches.len() }

  pub fn is_empty(&self) -> bool { self.mismatches.is_empty() }

  fn filtered(&self, ignored: bool) -> impl Iterator<Item = &Mismatch> {
    self.mismatches.values().filter(move |m| m.is_ignored() == ignored)
  }

  /// Histogram of mismatch states among ignored (or non-ignored) mismatches.
  pub fn status_counts(&self, ignored: bool) -> BTreeMap<MismatchState, u64> {
    let mut counts = BTreeMap::new();
    for m in self.filtered(ignored) {
      *counts.entry(m.state).or_insert(0) += 1;
    }
    counts
  }

  /// Mismatch type to state, among ignored (or non-ignored) mismatches.
  pub fn status_types(&self, ignored: bool) -> BTreeMap<MismatchType, MismatchState> {
    self.filtered(ignored).map(|m| (m.mismatch_type, m.state)).collect()
  }

  pub fn mismatch_types(&self, ignored: bool) -> BTreeSet<MismatchType> {
    self.filtered(ignored).map(|m| m.mismatch_type).collect()
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;
  use crate::{
    key::BillId,
    mismatch::IgnoreStatus,
  };

  fn obs(reference_type: ReferenceType) -> Observation {
    let at = Utc.with_ymd_and_hms(2023, 3, 1, 12, 0, 0).unwrap();
    Observation::new(
      ReferenceId::new(reference_type, at),
      BillId::parse("S100", 2023).unwrap().into(),
      at,
    )
  }

  #[test]
  fn rejects_unauthorized_mismatch_type() {
    let mut o = obs(ReferenceType::LbdcScrapedBill);
    let err = o
      .add_mismatch(Mismatch::new(MismatchType::BillTitle, "a", "b"))
      .unwrap_err();
    assert!(matches!(err, Error::InvalidMismatchForReferenceType { .. }));
    assert!(o.is_empty());
  }

  #[test]
  fn one_mismatch_per_type() {
    let mut o = obs(ReferenceType::SenateSiteBills);
    o.add_mismatch(Mismatch::new(MismatchType::BillTitle, "a", "b")).unwrap();
    o.add_mismatch(Mismatch::new(MismatchType::BillTitle, "c", "d")).unwrap();
    assert_eq!(o.mismatch_count(), 1);
    assert_eq!(o.mismatch(MismatchType::BillTitle).unwrap().observed, "c");
  }

  #[test]
  fn missing_data_observations_are_one_sided() {
    let base = obs(ReferenceType::SenateSiteBills);
    let r = Observation::reference_missing(base.reference_id, base.key.clone(), base.observed_datetime);
    let m = r.mismatch(MismatchType::ReferenceDataMissing).unwrap();
    assert_eq!(m.observed, "S100-2023");
    assert_eq!(m.reference, "");

    let o = Observation::observe_data_missing(base.reference_id, base.key, base.observed_datetime);
    let m = o.mismatch(MismatchType::ObserveDataMissing).unwrap();
    assert_eq!(m.observed, "");
    assert_eq!(m.reference, "S100-2023");
  }

  #[test]
  fn status_counts_split_by_ignore() {
    let mut o = obs(ReferenceType::SenateSiteBills);
    o.add_mismatch(Mismatch::new(MismatchType::BillTitle, "a", "b")).unwrap();
    let mut ignored = Mismatch::new(MismatchType::BillSummary, "a", "b");
    ignored.ignore_status = IgnoreStatus::IgnorePermanently;
    o.add_mismatch(ignored).unwrap();
    let mut closed = Mismatch::new(MismatchType::BillSponsor, "a", "b");
    closed.state = MismatchState::Closed;
    o.add_mismatch(closed).unwrap();

    let visible = o.status_counts(false);
    assert_eq!(visible.get(&MismatchState::Open), Some(&1));
    assert_eq!(visible.get(&MismatchState::Closed), Some(&1));
    assert_eq!(o.status_counts(true).get(&MismatchState::Open), Some(&1));

    assert_eq!(
      o.mismatch_types(true),
      BTreeSet::from([MismatchType::BillSummary])
    );
    assert_eq!(
      o.status_types(false).get(&MismatchType::BillSponsor),
      Some(&MismatchState::Closed)
    );
  }
}
