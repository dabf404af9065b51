//! The canonical committee agenda model.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::key::{BillId, CommitteeAgendaKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgendaBill {
  pub bill_id: BillId,
  #[serde(default)]
  pub message: Option<String>,
}

/// A committee meeting as listed on one agenda addendum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeAgenda {
  pub key:              CommitteeAgendaKey,
  #[serde(default)]
  pub chair:            Option<String>,
  #[serde(default)]
  pub location:         Option<String>,
  pub meeting_datetime: Option<NaiveDateTime>,
  #[serde(default)]
  pub notes:            Option<String>,
  #[serde(default)]
  pub bills:            Vec<AgendaBill>,
}
