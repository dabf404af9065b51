//! The canonical bill model.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::PublishStatus;
use crate::key::{BaseBillId, BillId, Chamber, Version};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillAction {
  pub date:        NaiveDate,
  pub chamber:     Chamber,
  pub sequence_no: u32,
  pub text:        String,
  /// The amendment the action was recorded against.
  pub bill_id:     BillId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillAmendment {
  pub version:       Version,
  #[serde(default)]
  pub law_section:   Option<String>,
  #[serde(default)]
  pub law_code:      Option<String>,
  #[serde(default)]
  pub act_clause:    Option<String>,
  #[serde(default)]
  pub full_text:     String,
  #[serde(default)]
  pub memo:          String,
  #[serde(default)]
  pub cosponsors:    Vec<String>,
  #[serde(default)]
  pub multisponsors: Vec<String>,
  #[serde(default)]
  pub same_as:       BTreeSet<BillId>,
}

/// A bill with all of its amendments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bill {
  pub base_bill_id:     BaseBillId,
  #[serde(default)]
  pub title:            Option<String>,
  #[serde(default)]
  pub summary:          Option<String>,
  #[serde(default)]
  pub sponsor:          Option<String>,
  #[serde(default)]
  pub active_version:   Version,
  #[serde(default)]
  pub amendments:       BTreeMap<Version, BillAmendment>,
  #[serde(default)]
  pub publish_statuses: BTreeMap<Version, PublishStatus>,
  #[serde(default)]
  pub actions:          Vec<BillAction>,
  /// Description of the most recent status, e.g. "In Senate Committee".
  #[serde(default)]
  pub last_status:      Option<String>,
}

impl Bill {
  pub fn new(base_bill_id: BaseBillId) -> Self {
    Self {
      base_bill_id,
      title: None,
      summary: None,
      sponsor: None,
      active_version: Version::Original,
      amendments: BTreeMap::new(),
      publish_statuses: BTreeMap::new(),
      actions: Vec::new(),
      last_status: None,
    }
  }

  pub fn amendment(&self, version: Version) -> Option<&BillAmendment> {
    self.amendments.get(&version)
  }

  pub fn active_amendment(&self) -> Option<&BillAmendment> {
    self.amendment(self.active_version)
  }

  pub fn amendment_ids(&self) -> Vec<BillId> {
    self
      .amendments
      .keys()
      .map(|v| self.base_bill_id.with_version(*v))
      .collect()
  }

  pub fn is_published(&self, version: Version) -> bool {
    self.publish_statuses.get(&version).is_some_and(|s| s.published)
  }

  pub fn published_versions(&self) -> BTreeSet<Version> {
    self
      .publish_statuses
      .iter()
      .filter(|(_, s)| s.published)
      .map(|(v, _)| *v)
      .collect()
  }

  /// Whether any amendment beyond the original exists.
  pub fn is_amended(&self) -> bool {
    self.amendments.keys().any(|v| *v != Version::Original)
  }
}
