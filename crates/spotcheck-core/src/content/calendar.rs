//! The canonical floor calendar model.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::key::{BillId, CalendarEntryListId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntry {
  pub cal_no:  u32,
  pub bill_id: BillId,
}

/// One active list, floor list or supplemental of a calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEntryList {
  pub id:               CalendarEntryListId,
  pub cal_date:         Option<NaiveDate>,
  pub release_datetime: Option<DateTime<Utc>>,
  #[serde(default)]
  pub entries:          Vec<CalendarEntry>,
}
