//! Bill views served by a peer OpenLeg cluster.
//!
//! The peer exports the same canonical [`Bill`] model this system produces, so
//! the comparison runs field for field over the whole bill and its active
//! amendment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use spotcheck_core::{
  check::{Checker, Comparison, normalize_whitespace},
  content::{Bill, BillAmendment},
  key::ContentKey,
  mismatch::MismatchType as M,
  observation::Observation,
  reference::{ReferenceId, ReferenceType},
  service::{DumpFragment, DumpId, FragmentParser, ReferenceRecord},
};

use crate::{parse_nodes, render_action};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenlegBill {
  pub reference_id: ReferenceId,
  pub bill:         Bill,
}

impl ReferenceRecord for OpenlegBill {
  fn reference_id(&self) -> ReferenceId { self.reference_id }

  fn key(&self) -> ContentKey { ContentKey::BaseBill(self.bill.base_bill_id.clone()) }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenlegBillParser;

impl FragmentParser for OpenlegBillParser {
  type Fragment = DumpFragment;
  type Reference = OpenlegBill;

  fn parse(
    &self,
    dump: &DumpId,
    _fragment: &DumpFragment,
    content: &str,
  ) -> spotcheck_core::Result<Vec<OpenlegBill>> {
    let reference_id = dump.reference_id();
    Ok(
      parse_nodes::<Bill>(content)?
        .into_iter()
        .map(|bill| OpenlegBill { reference_id, bill })
        .collect(),
    )
  }
}

fn actions(bill: &Bill) -> Vec<String> {
  let mut actions: Vec<_> = bill.actions.iter().collect();
  actions.sort_by_key(|a| a.sequence_no);
  actions
    .iter()
    .map(|a| format!("{} {}", a.bill_id.print_no(), render_action(a.date, a.chamber, &a.text)))
    .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenlegBillChecker;

impl Checker<Bill, OpenlegBill> for OpenlegBillChecker {
  fn reference_type(&self) -> ReferenceType { ReferenceType::OpenlegBill }

  fn check(
    &self,
    content: &Bill,
    reference: &OpenlegBill,
    observed_at: DateTime<Utc>,
  ) -> spotcheck_core::Result<Observation> {
    let peer = &reference.bill;
    let mut c = Comparison::new(reference.reference_id, reference.key(), observed_at);

    c.check_string(M::BillTitle, content.title.as_deref(), peer.title.as_deref())?;
    c.check_string(M::BillSummary, content.summary.as_deref(), peer.summary.as_deref())?;
    c.check_string_upper(M::BillSponsor, content.sponsor.as_deref(), peer.sponsor.as_deref())?;
    c.check_object(
      M::BillActiveAmendment,
      Some(&content.active_version),
      Some(&peer.active_version),
    )?;
    c.check_collection(
      M::BillAmendmentPublish,
      content.published_versions(),
      peer.published_versions(),
      ", ",
      |v| v.to_string(),
    )?;
    c.check_collection(M::BillActions, actions(content), actions(peer), "\n", String::clone)?;

    let ours = content.active_amendment();
    let theirs = peer.active_amendment();
    c.check_string(
      M::BillLawSection,
      ours.and_then(|a| a.law_section.as_deref()),
      theirs.and_then(|a| a.law_section.as_deref()),
    )?;
    c.check_string(
      M::BillLawCode,
      ours.and_then(|a| a.law_code.as_deref()),
      theirs.and_then(|a| a.law_code.as_deref()),
    )?;

    let empty = BillAmendment::default();
    let ours = ours.unwrap_or(&empty);
    let theirs = theirs.unwrap_or(&empty);
    c.check_collection(M::BillCosponsor, &ours.cosponsors, &theirs.cosponsors, ", ", |s| {
      s.to_uppercase()
    })?;
    c.check_collection(M::BillMultisponsor, &ours.multisponsors, &theirs.multisponsors, ", ", |s| {
      s.to_uppercase()
    })?;
    c.check_collection(M::BillSameAs, &ours.same_as, &theirs.same_as, ", ", |id| id.to_string())?;
    c.check_canonical(
      M::BillText,
      normalize_whitespace(&ours.full_text),
      normalize_whitespace(&theirs.full_text),
    )?;
    c.check_canonical(
      M::BillMemo,
      normalize_whitespace(&ours.memo),
      normalize_whitespace(&theirs.memo),
    )?;
    Ok(c.finish())
  }
}

#[cfg(test)]
mod tests {
  use spotcheck_core::{key::Version, mismatch::MismatchType};

  use super::*;
  use crate::test_helpers::{at, sample_bill};

  fn peer(bill: Bill) -> OpenlegBill {
    OpenlegBill { reference_id: ReferenceId::new(ReferenceType::OpenlegBill, at(1)), bill }
  }

  #[test]
  fn identical_bills_have_no_mismatches() {
    let bill = sample_bill();
    let obs = OpenlegBillChecker.check(&bill, &peer(bill.clone()), at(2)).unwrap();
    assert!(obs.is_empty(), "{:?}", obs.mismatch_types(false));
  }

  #[test]
  fn text_and_active_amendment_drift_is_reported() {
    let bill = sample_bill();
    let mut theirs = bill.clone();
    theirs.active_version = Version::Original;
    if let Some(a) = theirs.amendments.get_mut(&Version::Original) {
      a.full_text.push_str(" and repealed");
    }

    let obs = OpenlegBillChecker.check(&bill, &peer(theirs), at(2)).unwrap();
    assert_eq!(
      obs.mismatch_types(false),
      [MismatchType::BillActiveAmendment, MismatchType::BillText].into()
    );
  }

  #[test]
  fn parses_bill_nodes() {
    let bill = sample_bill();
    let content = serde_json::json!({ "nodes": [bill] }).to_string();
    let dump = DumpId {
      reference_type: ReferenceType::OpenlegBill,
      dump_datetime:  at(1),
      scope:          spotcheck_core::service::DumpScope::Referenced,
      fragment_count: 1,
      notes:          None,
    };
    let fragment = DumpFragment { seq_no: 1, path: "peer.json".into() };
    let bills = OpenlegBillParser.parse(&dump, &fragment, &content).unwrap();
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].bill, bill);
  }
}
