//! The LBDC daybreak report.
//!
//! Daybreak lists, per bill, the sponsors, the active amendment, the published
//! amendments and the floor actions as LBDC records them. The nightly files
//! arrive as a typed JSON rendition with one node per base bill.

use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use spotcheck_core::{
  check::{Checker, Comparison},
  content::Bill,
  key::{BaseBillId, Chamber, ContentKey, Version},
  mismatch::MismatchType as M,
  observation::Observation,
  reference::{ReferenceId, ReferenceType},
  service::{DumpFragment, DumpId, FragmentParser, ReferenceRecord},
};

use crate::{Result, parse_nodes, render_action};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DaybreakNode {
  base_print_no:      String,
  session:            i32,
  #[serde(default)]
  sponsor:            Option<String>,
  #[serde(default)]
  cosponsors:         Vec<String>,
  #[serde(default)]
  multisponsors:      Vec<String>,
  #[serde(default)]
  active_version:     String,
  #[serde(default)]
  published_versions: Vec<String>,
  #[serde(default)]
  actions:            Vec<DaybreakAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaybreakAction {
  pub date:    NaiveDate,
  pub chamber: Chamber,
  pub text:    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaybreakBill {
  pub reference_id:       ReferenceId,
  pub base_bill_id:       BaseBillId,
  pub sponsor:            Option<String>,
  pub cosponsors:         Vec<String>,
  pub multisponsors:      Vec<String>,
  pub active_version:     Version,
  pub published_versions: BTreeSet<Version>,
  pub actions:            Vec<DaybreakAction>,
}

impl DaybreakBill {
  fn from_node(reference_id: ReferenceId, node: DaybreakNode) -> Result<Self> {
    let published_versions = node
      .published_versions
      .iter()
      .map(|v| Version::parse(v))
      .collect::<spotcheck_core::Result<_>>()?;
    Ok(Self {
      reference_id,
      base_bill_id: BaseBillId::new(&node.base_print_no, node.session)?,
      sponsor: node.sponsor,
      cosponsors: node.cosponsors,
      multisponsors: node.multisponsors,
      active_version: Version::parse(&node.active_version)?,
      published_versions,
      actions: node.actions,
    })
  }
}

impl ReferenceRecord for DaybreakBill {
  fn reference_id(&self) -> ReferenceId { self.reference_id }

  fn key(&self) -> ContentKey { ContentKey::BaseBill(self.base_bill_id.clone()) }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DaybreakParser;

impl FragmentParser for DaybreakParser {
  type Fragment = DumpFragment;
  type Reference = DaybreakBill;

  fn parse(
    &self,
    dump: &DumpId,
    _fragment: &DumpFragment,
    content: &str,
  ) -> spotcheck_core::Result<Vec<DaybreakBill>> {
    let reference_id = dump.reference_id();
    let bills = parse_nodes::<DaybreakNode>(content)?
      .into_iter()
      .map(|node| DaybreakBill::from_node(reference_id, node))
      .collect::<Result<Vec<_>>>()?;
    Ok(bills)
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DaybreakChecker;

impl Checker<Bill, DaybreakBill> for DaybreakChecker {
  fn reference_type(&self) -> ReferenceType { ReferenceType::LbdcDaybreak }

  fn check(
    &self,
    content: &Bill,
    reference: &DaybreakBill,
    observed_at: DateTime<Utc>,
  ) -> spotcheck_core::Result<Observation> {
    let mut c = Comparison::new(reference.reference_id, reference.key(), observed_at);
    let (cosponsors, multisponsors) = content
      .active_amendment()
      .map_or((&[][..], &[][..]), |a| (a.cosponsors.as_slice(), a.multisponsors.as_slice()));

    c.check_string_upper(M::BillSponsor, content.sponsor.as_deref(), reference.sponsor.as_deref())?;
    c.check_collection(M::BillCosponsor, cosponsors, &reference.cosponsors, ", ", |s| {
      s.to_uppercase()
    })?;
    c.check_collection(M::BillMultisponsor, multisponsors, &reference.multisponsors, ", ", |s| {
      s.to_uppercase()
    })?;
    c.check_object(
      M::BillActiveAmendment,
      Some(&content.active_version),
      Some(&reference.active_version),
    )?;
    c.check_collection(
      M::BillAmendmentPublish,
      content.published_versions(),
      reference.published_versions.clone(),
      ", ",
      |v| v.to_string(),
    )?;

    let mut observed: Vec<_> = content.actions.iter().collect();
    observed.sort_by_key(|a| a.sequence_no);
    c.check_collection(
      M::BillActionsDaybreak,
      observed.iter().map(|a| render_action(a.date, a.chamber, &a.text)),
      reference.actions.iter().map(|a| render_action(a.date, a.chamber, &a.text)),
      "\n",
      String::clone,
    )?;
    Ok(c.finish())
  }
}

#[cfg(test)]
mod tests {
  use spotcheck_core::{content::PublishStatus, mismatch::MismatchType};

  use super::*;
  use crate::test_helpers::{at, sample_bill};

  fn mirror(bill: &Bill) -> DaybreakBill {
    let active = bill.active_amendment().unwrap();
    DaybreakBill {
      reference_id:       ReferenceId::new(ReferenceType::LbdcDaybreak, at(1)),
      base_bill_id:       bill.base_bill_id.clone(),
      sponsor:            bill.sponsor.clone(),
      cosponsors:         active.cosponsors.clone(),
      multisponsors:      active.multisponsors.clone(),
      active_version:     bill.active_version,
      published_versions: bill.published_versions(),
      actions:            bill
        .actions
        .iter()
        .map(|a| DaybreakAction { date: a.date, chamber: a.chamber, text: a.text.clone() })
        .collect(),
    }
  }

  #[test]
  fn identical_data_has_no_mismatches() {
    let bill = sample_bill();
    let obs = DaybreakChecker.check(&bill, &mirror(&bill), at(2)).unwrap();
    assert!(obs.is_empty(), "{:?}", obs.mismatch_types(false));
    assert_eq!(obs.key, ContentKey::BaseBill(bill.base_bill_id.clone()));
  }

  #[test]
  fn unpublished_amendment_is_reported() {
    let mut bill = sample_bill();
    let reference = mirror(&bill);
    bill.publish_statuses.insert(Version::Amendment('A'), PublishStatus::unpublished());

    let obs = DaybreakChecker.check(&bill, &reference, at(2)).unwrap();
    let m = obs.mismatch(MismatchType::BillAmendmentPublish).unwrap();
    assert_eq!(m.observed, "ORIGINAL");
    assert_eq!(m.reference, "ORIGINAL, A");
  }

  #[test]
  fn parses_fragment_nodes() {
    let dump = DumpId {
      reference_type: ReferenceType::LbdcDaybreak,
      dump_datetime:  at(1),
      scope:          spotcheck_core::service::DumpScope::Referenced,
      fragment_count: 1,
      notes:          Some("daybreak 2023-03-01".into()),
    };
    let content = r#"{"nodes": [{
      "basePrintNo": "S100", "session": 2024, "sponsor": "SMITH",
      "activeVersion": "A", "publishedVersions": ["", "A"],
      "actions": [{"date": "2023-01-04", "chamber": "SENATE", "text": "REFERRED TO FINANCE"}]
    }]}"#;
    let fragment = DumpFragment { seq_no: 1, path: "db.json".into() };
    let bills = DaybreakParser.parse(&dump, &fragment, content).unwrap();
    assert_eq!(bills[0].base_bill_id.to_string(), "S100-2023");
    assert_eq!(bills[0].published_versions.len(), 2);
    assert_eq!(bills[0].active_version, Version::Amendment('A'));
  }
}
