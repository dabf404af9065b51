//! Mismatches and their denormalized, persisted form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{
  key::ContentKey,
  reference::{ContentType, ReferenceId, ReferenceType},
  report::ReportId,
};

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Every checkable field across every content type, plus the two one-sided
/// presence types.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MismatchType {
  /// Content exists but the reference has no record of it.
  ReferenceDataMissing,
  /// The reference has a record the content store cannot produce.
  ObserveDataMissing,

  BillActiveAmendment,
  BillAmendmentPublish,
  BillSponsor,
  BillCosponsor,
  BillMultisponsor,
  BillActions,
  BillActionsDaybreak,
  BillTitle,
  BillSummary,
  BillLawSection,
  BillLawCode,
  BillLastStatus,
  BillIsAmended,
  BillSameAs,
  BillText,
  BillMemo,

  CalendarEntryList,
  CalendarFloorDate,
  CalendarReleaseDatetime,

  AgendaBills,
  AgendaChair,
  AgendaLocation,
  AgendaMeetingTime,
  AgendaNotes,
}

impl MismatchType {
  /// The content type whose field this mismatch describes; `None` for the
  /// missing-data types, which apply to all content.
  pub fn content_type(self) -> Option<ContentType> {
    let name = self.as_ref();
    if name.starts_with("BILL_") {
      Some(ContentType::Bill)
    } else if name.starts_with("CALENDAR_") {
      Some(ContentType::Calendar)
    } else if name.starts_with("AGENDA_") {
      Some(ContentType::Agenda)
    } else {
      None
    }
  }

  pub fn is_missing_data(self) -> bool {
    matches!(self, Self::ReferenceDataMissing | Self::ObserveDataMissing)
  }
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MismatchState {
  #[default]
  Open,
  Closed,
}

#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize,
  Deserialize, Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum IgnoreStatus {
  #[default]
  NotIgnored,
  /// Suppressed until the next lifecycle pass.
  IgnoreOnce,
  IgnorePermanently,
}

impl IgnoreStatus {
  pub fn is_ignored(self) -> bool { self != Self::NotIgnored }
}

/// Operator-facing classification of a record relative to its history.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum MismatchStatus {
  /// Open and first seen in this record's report.
  New,
  /// Open and carried over from an earlier report.
  Existing,
  Resolved,
}

// ─── Mismatch ────────────────────────────────────────────────────────────────

/// One field-level disagreement inside an observation.
///
/// Checkers fill in the type and the two canonical values. The lifecycle
/// fields are populated by [`crate::lifecycle::reconcile`] and by the
/// repository on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mismatch {
  pub mismatch_id:         Option<i64>,
  pub mismatch_type:       MismatchType,
  pub observed:            String,
  pub reference:           String,
  pub state:               MismatchState,
  pub ignore_status:       IgnoreStatus,
  pub issue_ids:           Vec<String>,
  pub first_seen_datetime: Option<DateTime<Utc>>,
}

impl Mismatch {
  pub fn new(
    mismatch_type: MismatchType,
    observed: impl Into<String>,
    reference: impl Into<String>,
  ) -> Self {
    Self {
      mismatch_id: None,
      mismatch_type,
      observed: observed.into(),
      reference: reference.into(),
      state: MismatchState::Open,
      ignore_status: IgnoreStatus::NotIgnored,
      issue_ids: Vec::new(),
      first_seen_datetime: None,
    }
  }

  pub fn is_ignored(&self) -> bool { self.ignore_status.is_ignored() }
}

// ─── Identity and denormalized record ────────────────────────────────────────

/// The triple that recognises the same defect across reports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MismatchIdentity {
  pub reference_type: ReferenceType,
  pub key:            ContentKey,
  pub mismatch_type:  MismatchType,
}

/// The persisted form of a mismatch, flattened with its report and
/// observation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchRecord {
  /// Assigned by the repository; `None` until saved.
  pub mismatch_id:         Option<i64>,
  pub report_id:           ReportId,
  pub reference_id:        ReferenceId,
  pub key:                 ContentKey,
  pub mismatch_type:       MismatchType,
  pub state:               MismatchState,
  pub ignore_status:       IgnoreStatus,
  pub issue_ids:           Vec<String>,
  pub first_seen_datetime: DateTime<Utc>,
  pub observed_datetime:   DateTime<Utc>,
  pub report_datetime:     DateTime<Utc>,
  pub observed:            String,
  pub reference:           String,
}

impl MismatchRecord {
  pub fn identity(&self) -> MismatchIdentity {
    MismatchIdentity {
      reference_type: self.reference_id.reference_type,
      key:            self.key.clone(),
      mismatch_type:  self.mismatch_type,
    }
  }

  pub fn status(&self) -> MismatchStatus {
    match self.state {
      MismatchState::Closed => MismatchStatus::Resolved,
      MismatchState::Open if self.first_seen_datetime >= self.observed_datetime => {
        MismatchStatus::New
      }
      MismatchState::Open => MismatchStatus::Existing,
    }
  }

  pub fn is_ignored(&self) -> bool { self.ignore_status.is_ignored() }

  /// Append `issue_id` unless already present. Returns whether it was added.
  pub fn add_issue_id(&mut self, issue_id: &str) -> bool {
    add_issue_id(&mut self.issue_ids, issue_id)
  }

  /// Remove `issue_id`. Returns whether it was present.
  pub fn remove_issue_id(&mut self, issue_id: &str) -> bool {
    remove_issue_id(&mut self.issue_ids, issue_id)
  }
}

/// Insert into an insertion-ordered set of issue ids.
pub fn add_issue_id(issue_ids: &mut Vec<String>, issue_id: &str) -> bool {
  let issue_id = issue_id.trim();
  if issue_id.is_empty() || issue_ids.iter().any(|i| i == issue_id) {
    return false;
  }
  issue_ids.push(issue_id.to_owned());
  true
}

pub fn remove_issue_id(issue_ids: &mut Vec<String>, issue_id: &str) -> bool {
  let before = issue_ids.len();
  issue_ids.retain(|i| i != issue_id.trim());
  issue_ids.len() != before
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn content_type_follows_type_prefix() {
    assert_eq!(MismatchType::BillTitle.content_type(), Some(ContentType::Bill));
    assert_eq!(MismatchType::AgendaChair.content_type(), Some(ContentType::Agenda));
    assert_eq!(MismatchType::ObserveDataMissing.content_type(), None);
  }

  #[test]
  fn mismatch_type_names_are_screaming_snake() {
    assert_eq!(MismatchType::BillTitle.to_string(), "BILL_TITLE");
    assert_eq!(
      "reference_data_missing".parse::<MismatchType>().unwrap(),
      MismatchType::ReferenceDataMissing
    );
  }

  #[test]
  fn issue_ids_behave_as_ordered_set() {
    let mut ids = Vec::new();
    assert!(add_issue_id(&mut ids, "OL-2"));
    assert!(add_issue_id(&mut ids, "OL-1"));
    assert!(!add_issue_id(&mut ids, "OL-2"));
    assert!(!add_issue_id(&mut ids, "  "));
    assert_eq!(ids, vec!["OL-2", "OL-1"]);

    assert!(remove_issue_id(&mut ids, "OL-2"));
    assert!(!remove_issue_id(&mut ids, "OL-2"));
    assert_eq!(ids, vec!["OL-1"]);
  }
}
