//! Observed content models: the system's own canonical view of each content
//! type, as produced by the content data service.

pub mod agenda;
pub mod bill;
pub mod calendar;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use agenda::{AgendaBill, CommitteeAgenda};
pub use bill::{Bill, BillAction, BillAmendment};
pub use calendar::{CalendarEntry, CalendarEntryList};

/// Whether a piece of content is visible to the public.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStatus {
  pub published:          bool,
  pub effective_datetime: Option<DateTime<Utc>>,
}

impl PublishStatus {
  pub fn published() -> Self { Self { published: true, effective_datetime: None } }

  pub fn unpublished() -> Self { Self::default() }
}
