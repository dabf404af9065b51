//! Reference types and identifiers.
//!
//! A reference is an authoritative external snapshot that the system compares
//! itself against. The set of reference types is closed; each advertises the
//! mismatch types it is authorized to raise.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator as _};

use crate::{Error, Result, mismatch::MismatchType};

// ─── Data sources and content types ──────────────────────────────────────────

/// The party that publishes a reference. Lifecycle state is tracked per
/// data source.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum DataSource {
  Lbdc,
  Nysenate,
  Openleg,
}

impl DataSource {
  pub fn reference_types(self) -> Vec<ReferenceType> {
    ReferenceType::iter().filter(|t| t.data_source() == self).collect()
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ContentType {
  Bill,
  Calendar,
  Agenda,
}

// ─── Reference type ──────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ReferenceType {
  /// Nightly daybreak report from LBDC.
  LbdcDaybreak,
  /// Bill pages scraped from LRS.
  LbdcScrapedBill,
  SenateSiteBills,
  SenateSiteCalendar,
  SenateSiteAgenda,
  /// JSON bill views served by a peer cluster.
  OpenlegBill,
}

use MismatchType as M;

const DAYBREAK_TYPES: &[MismatchType] = &[
  M::ReferenceDataMissing,
  M::ObserveDataMissing,
  M::BillActiveAmendment,
  M::BillAmendmentPublish,
  M::BillSponsor,
  M::BillCosponsor,
  M::BillMultisponsor,
  M::BillActionsDaybreak,
];

const SCRAPED_BILL_TYPES: &[MismatchType] = &[
  M::ReferenceDataMissing,
  M::ObserveDataMissing,
  M::BillText,
  M::BillMemo,
];

const SENATE_SITE_BILL_TYPES: &[MismatchType] = &[
  M::ReferenceDataMissing,
  M::ObserveDataMissing,
  M::BillTitle,
  M::BillSummary,
  M::BillSponsor,
  M::BillCosponsor,
  M::BillMultisponsor,
  M::BillLawSection,
  M::BillLawCode,
  M::BillActiveAmendment,
  M::BillActions,
  M::BillLastStatus,
  M::BillIsAmended,
  M::BillSameAs,
];

const SENATE_SITE_CALENDAR_TYPES: &[MismatchType] = &[
  M::ReferenceDataMissing,
  M::ObserveDataMissing,
  M::CalendarEntryList,
  M::CalendarFloorDate,
  M::CalendarReleaseDatetime,
];

const SENATE_SITE_AGENDA_TYPES: &[MismatchType] = &[
  M::ReferenceDataMissing,
  M::ObserveDataMissing,
  M::AgendaBills,
  M::AgendaChair,
  M::AgendaLocation,
  M::AgendaMeetingTime,
  M::AgendaNotes,
];

const OPENLEG_BILL_TYPES: &[MismatchType] = &[
  M::ReferenceDataMissing,
  M::ObserveDataMissing,
  M::BillTitle,
  M::BillSummary,
  M::BillSponsor,
  M::BillCosponsor,
  M::BillMultisponsor,
  M::BillLawSection,
  M::BillLawCode,
  M::BillActiveAmendment,
  M::BillActions,
  M::BillAmendmentPublish,
  M::BillSameAs,
  M::BillText,
  M::BillMemo,
];

impl ReferenceType {
  /// Short, human-facing name used in file names and on the command line.
  pub fn ref_name(self) -> &'static str {
    match self {
      Self::LbdcDaybreak => "daybreak",
      Self::LbdcScrapedBill => "scraped-bill",
      Self::SenateSiteBills => "senate-site-bills",
      Self::SenateSiteCalendar => "senate-site-calendar",
      Self::SenateSiteAgenda => "senate-site-agenda",
      Self::OpenlegBill => "openleg-bill",
    }
  }

  /// Accepts either the enumeration name (`SENATE_SITE_BILLS`) or the short
  /// name (`senate-site-bills`).
  pub fn from_name(name: &str) -> Result<Self> {
    name
      .parse::<Self>()
      .ok()
      .or_else(|| Self::iter().find(|t| t.ref_name().eq_ignore_ascii_case(name)))
      .ok_or_else(|| Error::unknown_variant("reference type", name))
  }

  pub fn data_source(self) -> DataSource {
    match self {
      Self::LbdcDaybreak | Self::LbdcScrapedBill => DataSource::Lbdc,
      Self::SenateSiteBills | Self::SenateSiteCalendar | Self::SenateSiteAgenda => {
        DataSource::Nysenate
      }
      Self::OpenlegBill => DataSource::Openleg,
    }
  }

  pub fn content_type(self) -> ContentType {
    match self {
      Self::SenateSiteCalendar => ContentType::Calendar,
      Self::SenateSiteAgenda => ContentType::Agenda,
      _ => ContentType::Bill,
    }
  }

  /// Every mismatch type this reference type may raise.
  pub fn checked_mismatch_types(self) -> &'static [MismatchType] {
    match self {
      Self::LbdcDaybreak => DAYBREAK_TYPES,
      Self::LbdcScrapedBill => SCRAPED_BILL_TYPES,
      Self::SenateSiteBills => SENATE_SITE_BILL_TYPES,
      Self::SenateSiteCalendar => SENATE_SITE_CALENDAR_TYPES,
      Self::SenateSiteAgenda => SENATE_SITE_AGENDA_TYPES,
      Self::OpenlegBill => OPENLEG_BILL_TYPES,
    }
  }

  pub fn authorizes(self, mismatch_type: MismatchType) -> bool {
    self.checked_mismatch_types().contains(&mismatch_type)
  }
}

// ─── Reference identifier ────────────────────────────────────────────────────

/// Identifies one reference artifact: its type and the moment it became
/// active (the dump time or scrape time).
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ReferenceId {
  pub reference_type:     ReferenceType,
  pub reference_datetime: DateTime<Utc>,
}

impl ReferenceId {
  pub fn new(reference_type: ReferenceType, reference_datetime: DateTime<Utc>) -> Self {
    Self { reference_type, reference_datetime }
  }
}

impl fmt::Display for ReferenceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.reference_type, self.reference_datetime.to_rfc3339())
  }
}
