//! Content keys: the minimal identifiers of comparable units.
//!
//! Keys are value objects with structural equality. Heterogeneous key types
//! share storage through the key-map: a flat mapping from short field names to
//! strings, with a per-variant [`ContentKey::to_key_map`] /
//! [`ContentKey::from_key_map`] bijection.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

/// The persisted form of a content key.
pub type KeyMap = BTreeMap<String, String>;

// ─── Session year ────────────────────────────────────────────────────────────

/// A two-year legislative session, identified by its (odd) starting year.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "i32", into = "i32")]
pub struct SessionYear(i32);

impl SessionYear {
  /// The session containing `year`.
  pub fn of(year: i32) -> Self {
    if year % 2 == 0 { Self(year - 1) } else { Self(year) }
  }

  pub fn year(self) -> i32 { self.0 }

  pub fn contains(self, year: i32) -> bool { year == self.0 || year == self.0 + 1 }
}

impl From<i32> for SessionYear {
  fn from(year: i32) -> Self { Self::of(year) }
}

impl From<SessionYear> for i32 {
  fn from(s: SessionYear) -> Self { s.0 }
}

impl fmt::Display for SessionYear {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

// ─── Bill ids ────────────────────────────────────────────────────────────────

/// Amendment version of a bill. The original print has no suffix.
#[derive(
  Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Version {
  #[default]
  Original,
  Amendment(char),
}

impl Version {
  /// Parse `""` / `"ORIGINAL"` or a single amendment letter.
  pub fn parse(s: &str) -> Result<Self> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("original") {
      return Ok(Self::Original);
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
      (Some(c), None) if c.is_ascii_alphabetic() => {
        Ok(Self::Amendment(c.to_ascii_uppercase()))
      }
      _ => Err(Error::InvalidKey(format!("bad amendment version {s:?}"))),
    }
  }

  /// The print number suffix: empty for the original.
  pub fn suffix(self) -> String {
    match self {
      Self::Original => String::new(),
      Self::Amendment(c) => c.to_string(),
    }
  }
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Original => f.write_str("ORIGINAL"),
      Self::Amendment(c) => write!(f, "{c}"),
    }
  }
}

impl From<Version> for String {
  fn from(v: Version) -> Self { v.suffix() }
}

impl TryFrom<String> for Version {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

/// Normalise a base print number: one chamber letter followed by digits
/// without leading zeros (`s00100` → `S100`).
fn normalize_print_no(print_no: &str) -> Result<String> {
  let print_no = print_no.trim();
  let mut chars = print_no.chars();
  let prefix = chars
    .next()
    .filter(char::is_ascii_alphabetic)
    .ok_or_else(|| Error::InvalidKey(format!("bad print number {print_no:?}")))?;
  let digits = chars.as_str();
  let number: u32 = digits
    .parse()
    .map_err(|_| Error::InvalidKey(format!("bad print number {print_no:?}")))?;
  Ok(format!("{}{number}", prefix.to_ascii_uppercase()))
}

/// A bill independent of amendment version, e.g. `S100-2023`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BaseBillId {
  pub print_no: String,
  pub session:  SessionYear,
}

impl BaseBillId {
  pub fn new(print_no: &str, session: impl Into<SessionYear>) -> Result<Self> {
    Ok(Self { print_no: normalize_print_no(print_no)?, session: session.into() })
  }

  pub fn with_version(&self, version: Version) -> BillId {
    BillId {
      base_print_no: self.print_no.clone(),
      session: self.session,
      version,
    }
  }
}

impl fmt::Display for BaseBillId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.print_no, self.session)
  }
}

/// A specific amendment of a bill, e.g. `S100A-2023`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BillId {
  pub base_print_no: String,
  pub session:       SessionYear,
  #[serde(default)]
  pub version:       Version,
}

impl BillId {
  pub fn new(
    base_print_no: &str,
    session: impl Into<SessionYear>,
    version: Version,
  ) -> Result<Self> {
    Ok(BaseBillId::new(base_print_no, session)?.with_version(version))
  }

  /// Parse a full print number such as `S100A` or `A2001`.
  pub fn parse(print_no: &str, session: impl Into<SessionYear>) -> Result<Self> {
    let print_no = print_no.trim();
    match print_no.chars().last() {
      Some(c) if c.is_ascii_alphabetic() && print_no.len() > 1 => {
        let base = &print_no[..print_no.len() - 1];
        Self::new(base, session, Version::Amendment(c.to_ascii_uppercase()))
      }
      _ => Self::new(print_no, session, Version::Original),
    }
  }

  pub fn print_no(&self) -> String {
    format!("{}{}", self.base_print_no, self.version.suffix())
  }

  pub fn base(&self) -> BaseBillId {
    BaseBillId { print_no: self.base_print_no.clone(), session: self.session }
  }
}

impl fmt::Display for BillId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.print_no(), self.session)
  }
}

// ─── Calendar and agenda ids ─────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum CalendarType {
  Active,
  Floor,
  Supplemental,
}

/// One entry list of a senate floor calendar.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CalendarEntryListId {
  pub cal_no:      i32,
  pub year:        i32,
  pub list_type:   CalendarType,
  pub sequence_no: Option<i32>,
}

impl fmt::Display for CalendarEntryListId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "cal-{}-{}-{}", self.cal_no, self.year, self.list_type)?;
    if let Some(seq) = self.sequence_no {
      write!(f, "-{seq}")?;
    }
    Ok(())
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Chamber {
  Senate,
  Assembly,
}

/// A committee's meeting within one agenda addendum.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CommitteeAgendaKey {
  pub agenda_no: i32,
  pub year:      i32,
  pub addendum:  String,
  pub committee: String,
  pub chamber:   Chamber,
}

impl fmt::Display for CommitteeAgendaKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "agenda-{}-{}", self.agenda_no, self.year)?;
    if !self.addendum.is_empty() {
      write!(f, "-{}", self.addendum)?;
    }
    write!(f, " {} ({})", self.committee, self.chamber)
  }
}

// ─── ContentKey ──────────────────────────────────────────────────────────────

/// Discriminant of a [`ContentKey`], stored alongside its key-map.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
  Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum KeyKind {
  Bill,
  BaseBill,
  Calendar,
  Agenda,
}

/// Identifier of one comparable unit of content.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentKey {
  Bill(BillId),
  BaseBill(BaseBillId),
  Calendar(CalendarEntryListId),
  Agenda(CommitteeAgendaKey),
}

impl ContentKey {
  pub fn kind(&self) -> KeyKind {
    match self {
      Self::Bill(_) => KeyKind::Bill,
      Self::BaseBill(_) => KeyKind::BaseBill,
      Self::Calendar(_) => KeyKind::Calendar,
      Self::Agenda(_) => KeyKind::Agenda,
    }
  }

  /// The key of the unit this key belongs to: amendments map to their base
  /// bill; every other key is its own base.
  pub fn base(&self) -> ContentKey {
    match self {
      Self::Bill(id) => Self::BaseBill(id.base()),
      other => other.clone(),
    }
  }

  /// A string whose byte order matches the natural order of keys of one
  /// kind: numeric parts are zero-padded, so `S20` sorts before `S100`.
  pub fn sort_key(&self) -> String {
    match self {
      Self::Bill(id) => {
        format!("{}-{}{}", id.session, padded_print_no(&id.base_print_no), id.version.suffix())
      }
      Self::BaseBill(id) => format!("{}-{}", id.session, padded_print_no(&id.print_no)),
      Self::Calendar(id) => format!(
        "{:04}-{:06}-{}-{:06}",
        id.year,
        id.cal_no,
        id.list_type,
        id.sequence_no.unwrap_or_default()
      ),
      Self::Agenda(id) => format!(
        "{:04}-{:06}-{}-{}-{}",
        id.year, id.agenda_no, id.addendum, id.committee, id.chamber
      ),
    }
  }

  pub fn bill_id(&self) -> Option<&BillId> {
    match self {
      Self::Bill(id) => Some(id),
      _ => None,
    }
  }

  pub fn base_bill_id(&self) -> Option<BaseBillId> {
    match self {
      Self::Bill(id) => Some(id.base()),
      Self::BaseBill(id) => Some(id.clone()),
      _ => None,
    }
  }

  pub fn to_key_map(&self) -> KeyMap {
    let mut map = KeyMap::new();
    let mut put = |k: &str, v: String| {
      map.insert(k.to_owned(), v);
    };
    match self {
      Self::Bill(id) => {
        put("printNo", id.base_print_no.clone());
        put("session", id.session.to_string());
        put("version", id.version.suffix());
      }
      Self::BaseBill(id) => {
        put("printNo", id.print_no.clone());
        put("session", id.session.to_string());
      }
      Self::Calendar(id) => {
        put("calNo", id.cal_no.to_string());
        put("year", id.year.to_string());
        put("type", id.list_type.to_string());
        if let Some(seq) = id.sequence_no {
          put("sequenceNo", seq.to_string());
        }
      }
      Self::Agenda(id) => {
        put("agendaNo", id.agenda_no.to_string());
        put("year", id.year.to_string());
        put("addendum", id.addendum.clone());
        put("committee", id.committee.clone());
        put("chamber", id.chamber.to_string());
      }
    }
    map
  }

  pub fn from_key_map(kind: KeyKind, map: &KeyMap) -> Result<Self> {
    let key = match kind {
      KeyKind::Bill => Self::Bill(BillId::new(
        field(map, "printNo")?,
        int_field(map, "session")?,
        Version::parse(field(map, "version")?)?,
      )?),
      KeyKind::BaseBill => Self::BaseBill(BaseBillId::new(
        field(map, "printNo")?,
        int_field(map, "session")?,
      )?),
      KeyKind::Calendar => {
        let list_type = field(map, "type")?;
        Self::Calendar(CalendarEntryListId {
          cal_no:      int_field(map, "calNo")?,
          year:        int_field(map, "year")?,
          list_type:   list_type
            .parse()
            .map_err(|_| Error::unknown_variant("calendar type", list_type))?,
          sequence_no: map
            .get("sequenceNo")
            .map(|s| parse_int("sequenceNo", s))
            .transpose()?,
        })
      }
      KeyKind::Agenda => {
        let chamber = field(map, "chamber")?;
        Self::Agenda(CommitteeAgendaKey {
          agenda_no: int_field(map, "agendaNo")?,
          year:      int_field(map, "year")?,
          addendum:  field(map, "addendum")?.to_owned(),
          committee: field(map, "committee")?.to_owned(),
          chamber:   chamber
            .parse()
            .map_err(|_| Error::unknown_variant("chamber", chamber))?,
        })
      }
    };
    Ok(key)
  }
}

impl fmt::Display for ContentKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Bill(id) => id.fmt(f),
      Self::BaseBill(id) => id.fmt(f),
      Self::Calendar(id) => id.fmt(f),
      Self::Agenda(id) => id.fmt(f),
    }
  }
}

impl From<BillId> for ContentKey {
  fn from(id: BillId) -> Self { Self::Bill(id) }
}

impl From<BaseBillId> for ContentKey {
  fn from(id: BaseBillId) -> Self { Self::BaseBill(id) }
}

impl From<CalendarEntryListId> for ContentKey {
  fn from(id: CalendarEntryListId) -> Self { Self::Calendar(id) }
}

impl From<CommitteeAgendaKey> for ContentKey {
  fn from(id: CommitteeAgendaKey) -> Self { Self::Agenda(id) }
}

/// `S100` becomes `S0000000100`; anything unexpected is returned as is.
fn padded_print_no(print_no: &str) -> String {
  let (prefix, digits) = print_no.split_at(print_no.len().min(1));
  match digits.parse::<u32>() {
    Ok(number) => format!("{prefix}{number:010}"),
    Err(_) => print_no.to_owned(),
  }
}

fn field<'a>(map: &'a KeyMap, name: &str) -> Result<&'a str> {
  map
    .get(name)
    .map(String::as_str)
    .ok_or_else(|| Error::InvalidKey(format!("key map is missing {name:?}")))
}

fn int_field(map: &KeyMap, name: &str) -> Result<i32> { parse_int(name, field(map, name)?) }

fn parse_int(name: &str, value: &str) -> Result<i32> {
  value
    .trim()
    .parse()
    .map_err(|_| Error::InvalidKey(format!("{name} is not a number: {value:?}")))
}
