use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use spotcheck_core::{
  check::{Checker, Comparison},
  content::{CalendarEntry, CalendarEntryList},
  key::{BillId, CalendarEntryListId, CalendarType, ContentKey},
  mismatch::MismatchType as M,
  observation::Observation,
  reference::{ReferenceId, ReferenceType},
  service::{DumpFragment, DumpId, FragmentParser, ReferenceRecord},
};

use crate::{Result, parse_nodes};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarNode {
  cal_no:           i32,
  year:             i32,
  list_type:        CalendarType,
  #[serde(default)]
  sequence_no:      Option<i32>,
  #[serde(default)]
  cal_date:         Option<NaiveDate>,
  #[serde(default)]
  release_datetime: Option<DateTime<Utc>>,
  #[serde(default)]
  entries:          Vec<EntryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryNode {
  cal_no:   u32,
  print_no: String,
  session:  i32,
}

/// One calendar entry list as published on the website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenateSiteCalendar {
  pub reference_id:     ReferenceId,
  pub id:               CalendarEntryListId,
  pub cal_date:         Option<NaiveDate>,
  pub release_datetime: Option<DateTime<Utc>>,
  pub entries:          Vec<CalendarEntry>,
}

impl SenateSiteCalendar {
  fn from_node(reference_id: ReferenceId, node: CalendarNode) -> Result<Self> {
    let entries = node
      .entries
      .into_iter()
      .map(|e| -> Result<CalendarEntry> {
        Ok(CalendarEntry { cal_no: e.cal_no, bill_id: BillId::parse(&e.print_no, e.session)? })
      })
      .collect::<Result<_>>()?;
    Ok(Self {
      reference_id,
      id: CalendarEntryListId {
        cal_no:      node.cal_no,
        year:        node.year,
        list_type:   node.list_type,
        sequence_no: node.sequence_no,
      },
      cal_date: node.cal_date,
      release_datetime: node.release_datetime,
      entries,
    })
  }
}

impl ReferenceRecord for SenateSiteCalendar {
  fn reference_id(&self) -> ReferenceId { self.reference_id }

  fn key(&self) -> ContentKey { ContentKey::Calendar(self.id.clone()) }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SenateSiteCalendarParser;

impl FragmentParser for SenateSiteCalendarParser {
  type Fragment = DumpFragment;
  type Reference = SenateSiteCalendar;

  fn parse(
    &self,
    dump: &DumpId,
    _fragment: &DumpFragment,
    content: &str,
  ) -> spotcheck_core::Result<Vec<SenateSiteCalendar>> {
    let reference_id = dump.reference_id();
    let calendars = parse_nodes::<CalendarNode>(content)?
      .into_iter()
      .map(|node| SenateSiteCalendar::from_node(reference_id, node))
      .collect::<Result<Vec<_>>>()?;
    Ok(calendars)
  }
}

/// Entries in calendar-number order, one per line.
fn render_entries(entries: &[CalendarEntry]) -> Vec<String> {
  let mut entries: Vec<_> = entries.iter().collect();
  entries.sort_by(|a, b| (a.cal_no, &a.bill_id).cmp(&(b.cal_no, &b.bill_id)));
  entries.iter().map(|e| format!("{} {}", e.cal_no, e.bill_id)).collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SenateSiteCalendarChecker;

impl Checker<CalendarEntryList, SenateSiteCalendar> for SenateSiteCalendarChecker {
  fn reference_type(&self) -> ReferenceType { ReferenceType::SenateSiteCalendar }

  fn check(
    &self,
    content: &CalendarEntryList,
    reference: &SenateSiteCalendar,
    observed_at: DateTime<Utc>,
  ) -> spotcheck_core::Result<Observation> {
    let mut c = Comparison::new(reference.reference_id, reference.key(), observed_at);
    c.check_collection(
      M::CalendarEntryList,
      render_entries(&content.entries),
      render_entries(&reference.entries),
      "\n",
      String::clone,
    )?;
    c.check_object(M::CalendarFloorDate, content.cal_date.as_ref(), reference.cal_date.as_ref())?;
    c.check_object(
      M::CalendarReleaseDatetime,
      content.release_datetime.as_ref(),
      reference.release_datetime.as_ref(),
    )?;
    Ok(c.finish())
  }
}
