//! Field-level comparison of observed content against reference records.
//!
//! A [`Checker`] turns one (content, reference) pair into an
//! [`Observation`]. Checkers are pure: no I/O, no clocks. The observation
//! datetime is passed in by the caller. [`Comparison`] supplies the uniform
//! canonicalization rules every checker shares.

mod registry;

use std::fmt::Display;

use chrono::{DateTime, Utc};

pub use registry::{CheckerRegistry, CheckerRegistryBuilder};

use crate::{
  Result,
  key::ContentKey,
  mismatch::{Mismatch, MismatchType},
  observation::Observation,
  reference::{ReferenceId, ReferenceType},
};

/// Comparator for one reference type over content of type `C` and reference
/// records of type `R`.
pub trait Checker<C, R>: Send + Sync {
  fn reference_type(&self) -> ReferenceType;

  fn check(&self, content: &C, reference: &R, observed_at: DateTime<Utc>) -> Result<Observation>;
}

// ─── Canonicalization ────────────────────────────────────────────────────────

/// Trimmed value; absent and empty are the same.
pub fn canonical(value: Option<&str>) -> String {
  value.map(str::trim).unwrap_or_default().to_owned()
}

pub fn canonical_upper(value: Option<&str>) -> String { canonical(value).to_uppercase() }

/// Collapse every run of whitespace to a single space.
pub fn normalize_whitespace(value: &str) -> String {
  value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join rendered, trimmed elements with `separator`.
pub fn join_rendered<T>(
  items: impl IntoIterator<Item = T>,
  separator: &str,
  render: impl Fn(&T) -> String,
) -> String {
  items
    .into_iter()
    .map(|item| render(&item).trim().to_owned())
    .collect::<Vec<_>>()
    .join(separator)
}

pub fn yes_no(label: &str, value: bool) -> String {
  format!("{label}: {}", if value { "YES" } else { "NO" })
}

// ─── Comparison ──────────────────────────────────────────────────────────────

/// Accumulates mismatches for one observation.
///
/// Each `check_*` method canonicalizes both sides and records a mismatch of the
/// given type when they differ. Types the reference type does not authorize
/// are rejected.
#[derive(Debug)]
pub struct Comparison {
  observation: Observation,
}

impl Comparison {
  pub fn new(reference_id: ReferenceId, key: ContentKey, observed_at: DateTime<Utc>) -> Self {
    Self { observation: Observation::new(reference_id, key, observed_at) }
  }

  /// Record a mismatch if the already-canonical values differ.
  pub fn check_canonical(
    &mut self,
    mismatch_type: MismatchType,
    observed: String,
    reference: String,
  ) -> Result<()> {
    if observed != reference {
      self.observation.add_mismatch(Mismatch::new(mismatch_type, observed, reference))?;
    }
    Ok(())
  }

  pub fn check_string(
    &mut self,
    mismatch_type: MismatchType,
    observed: Option<&str>,
    reference: Option<&str>,
  ) -> Result<()> {
    self.check_canonical(mismatch_type, canonical(observed), canonical(reference))
  }

  pub fn check_string_upper(
    &mut self,
    mismatch_type: MismatchType,
    observed: Option<&str>,
    reference: Option<&str>,
  ) -> Result<()> {
    self.check_canonical(mismatch_type, canonical_upper(observed), canonical_upper(reference))
  }

  pub fn check_object<T: Display>(
    &mut self,
    mismatch_type: MismatchType,
    observed: Option<&T>,
    reference: Option<&T>,
  ) -> Result<()> {
    let render = |v: Option<&T>| v.map(|v| v.to_string().trim().to_owned()).unwrap_or_default();
    self.check_canonical(mismatch_type, render(observed), render(reference))
  }

  pub fn check_bool(
    &mut self,
    mismatch_type: MismatchType,
    label: &str,
    observed: bool,
    reference: bool,
  ) -> Result<()> {
    self.check_canonical(mismatch_type, yes_no(label, observed), yes_no(label, reference))
  }

  pub fn check_collection<T>(
    &mut self,
    mismatch_type: MismatchType,
    observed: impl IntoIterator<Item = T>,
    reference: impl IntoIterator<Item = T>,
    separator: &str,
    render: impl Fn(&T) -> String,
  ) -> Result<()> {
    let observed = join_rendered(observed, separator, &render);
    let reference = join_rendered(reference, separator, &render);
    self.check_canonical(mismatch_type, observed, reference)
  }

  /// Record a mismatch with no comparison, e.g. for presence gaps.
  pub fn add(&mut self, mismatch: Mismatch) -> Result<()> { self.observation.add_mismatch(mismatch) }

  pub fn finish(self) -> Observation { self.observation }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;
  use crate::{Error, key::BillId};

  fn comparison(reference_type: ReferenceType) -> Comparison {
    let at = Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).unwrap();
    Comparison::new(
      ReferenceId::new(reference_type, at),
      BillId::parse("S1", 2023).unwrap().into(),
      at,
    )
  }

  #[test]
  fn absent_and_blank_are_equal() {
    let mut c = comparison(ReferenceType::SenateSiteBills);
    c.check_string(MismatchType::BillTitle, None, Some("  ")).unwrap();
    c.check_string(MismatchType::BillSummary, Some(" x "), Some("x")).unwrap();
    assert!(c.finish().is_empty());
  }

  #[test]
  fn case_folding_is_opt_in() {
    let mut c = comparison(ReferenceType::SenateSiteBills);
    c.check_string_upper(MismatchType::BillSponsor, Some("smith"), Some("SMITH")).unwrap();
    c.check_string(MismatchType::BillTitle, Some("foo"), Some("FOO")).unwrap();
    let obs = c.finish();
    assert!(!obs.has_mismatch(MismatchType::BillSponsor));
    let m = obs.mismatch(MismatchType::BillTitle).unwrap();
    assert_eq!((m.observed.as_str(), m.reference.as_str()), ("foo", "FOO"));
  }

  #[test]
  fn collections_and_booleans_render_canonically() {
    let mut c = comparison(ReferenceType::SenateSiteBills);
    c.check_collection(
      MismatchType::BillCosponsor,
      vec!["A", " B"],
      vec!["A", "C"],
      ", ",
      |s| s.to_string(),
    )
    .unwrap();
    c.check_bool(MismatchType::BillIsAmended, "Is Amended", true, false).unwrap();
    let obs = c.finish();
    let m = obs.mismatch(MismatchType::BillCosponsor).unwrap();
    assert_eq!((m.observed.as_str(), m.reference.as_str()), ("A, B", "A, C"));
    let m = obs.mismatch(MismatchType::BillIsAmended).unwrap();
    assert_eq!(m.observed, "Is Amended: YES");
  }

  #[test]
  fn unauthorized_type_is_rejected() {
    let mut c = comparison(ReferenceType::LbdcScrapedBill);
    let err = c.check_string(MismatchType::BillTitle, Some("a"), Some("b")).unwrap_err();
    assert!(matches!(err, Error::InvalidMismatchForReferenceType { .. }));
  }

  #[test]
  fn whitespace_normalization() {
    assert_eq!(normalize_whitespace("  a\n\n b\tc "), "a b c");
  }
}
