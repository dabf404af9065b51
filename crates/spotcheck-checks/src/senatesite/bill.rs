use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use spotcheck_core::{
  check::{Checker, Comparison},
  content::Bill,
  key::{BillId, Chamber, ContentKey, Version},
  mismatch::MismatchType as M,
  observation::Observation,
  reference::{ReferenceId, ReferenceType},
  service::{DumpFragment, DumpId, FragmentParser, ReferenceRecord},
};

use crate::{Result, parse_nodes, render_action};

// ─── Dump nodes ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillNode {
  base_print_no:  String,
  session:        i32,
  #[serde(default)]
  version:        String,
  #[serde(default)]
  active_version: String,
  #[serde(default)]
  title:          Option<String>,
  #[serde(default)]
  summary:        Option<String>,
  #[serde(default)]
  sponsor:        Option<String>,
  #[serde(default)]
  cosponsors:     Vec<String>,
  #[serde(default)]
  multisponsors:  Vec<String>,
  #[serde(default)]
  law_section:    Option<String>,
  #[serde(default)]
  law_code:       Option<String>,
  #[serde(default)]
  last_status:    Option<String>,
  #[serde(default)]
  is_amended:     bool,
  #[serde(default)]
  same_as:        Vec<BillRefNode>,
  #[serde(default)]
  actions:        Vec<ActionNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BillRefNode {
  print_no: String,
  session:  i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionNode {
  date:        NaiveDate,
  chamber:     Chamber,
  sequence_no: u32,
  text:        String,
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenateSiteBillAction {
  pub date:        NaiveDate,
  pub chamber:     Chamber,
  pub sequence_no: u32,
  pub text:        String,
}

/// One bill amendment as published on the website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenateSiteBill {
  pub reference_id:   ReferenceId,
  pub bill_id:        BillId,
  pub active_version: Version,
  pub title:          Option<String>,
  pub summary:        Option<String>,
  pub sponsor:        Option<String>,
  pub cosponsors:     Vec<String>,
  pub multisponsors:  Vec<String>,
  pub law_section:    Option<String>,
  pub law_code:       Option<String>,
  pub last_status:    Option<String>,
  pub is_amended:     bool,
  pub same_as:        BTreeSet<BillId>,
  pub actions:        Vec<SenateSiteBillAction>,
}

impl SenateSiteBill {
  fn from_node(reference_id: ReferenceId, node: BillNode) -> Result<Self> {
    let version = Version::parse(&node.version)?;
    let same_as = node
      .same_as
      .iter()
      .map(|id| BillId::parse(&id.print_no, id.session))
      .collect::<spotcheck_core::Result<_>>()?;
    Ok(Self {
      reference_id,
      bill_id: BillId::new(&node.base_print_no, node.session, version)?,
      active_version: Version::parse(&node.active_version)?,
      title: node.title,
      summary: node.summary,
      sponsor: node.sponsor,
      cosponsors: node.cosponsors,
      multisponsors: node.multisponsors,
      law_section: node.law_section,
      law_code: node.law_code,
      last_status: node.last_status,
      is_amended: node.is_amended,
      same_as,
      actions: node
        .actions
        .into_iter()
        .map(|a| SenateSiteBillAction {
          date:        a.date,
          chamber:     a.chamber,
          sequence_no: a.sequence_no,
          text:        a.text,
        })
        .collect(),
    })
  }
}

impl ReferenceRecord for SenateSiteBill {
  fn reference_id(&self) -> ReferenceId { self.reference_id }

  fn key(&self) -> ContentKey { ContentKey::Bill(self.bill_id.clone()) }
}

// ─── Parser ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SenateSiteBillParser;

impl FragmentParser for SenateSiteBillParser {
  type Fragment = DumpFragment;
  type Reference = SenateSiteBill;

  fn parse(
    &self,
    dump: &DumpId,
    _fragment: &DumpFragment,
    content: &str,
  ) -> spotcheck_core::Result<Vec<SenateSiteBill>> {
    let reference_id = dump.reference_id();
    let bills = parse_nodes::<BillNode>(content)?
      .into_iter()
      .map(|node| SenateSiteBill::from_node(reference_id, node))
      .collect::<Result<Vec<_>>>()?;
    Ok(bills)
  }
}

// ─── Checker ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SenateSiteBillChecker;

impl Checker<Bill, SenateSiteBill> for SenateSiteBillChecker {
  fn reference_type(&self) -> ReferenceType { ReferenceType::SenateSiteBills }

  fn check(
    &self,
    content: &Bill,
    reference: &SenateSiteBill,
    observed_at: DateTime<Utc>,
  ) -> spotcheck_core::Result<Observation> {
    let key = reference.key();
    let Some(amendment) = content.amendment(reference.bill_id.version) else {
      return Ok(Observation::observe_data_missing(reference.reference_id, key, observed_at));
    };

    let mut c = Comparison::new(reference.reference_id, key, observed_at);
    c.check_string(M::BillTitle, content.title.as_deref(), reference.title.as_deref())?;
    c.check_string(M::BillSummary, content.summary.as_deref(), reference.summary.as_deref())?;
    c.check_string_upper(M::BillSponsor, content.sponsor.as_deref(), reference.sponsor.as_deref())?;
    c.check_collection(
      M::BillCosponsor,
      &amendment.cosponsors,
      &reference.cosponsors,
      ", ",
      |s| s.to_uppercase(),
    )?;
    c.check_collection(
      M::BillMultisponsor,
      &amendment.multisponsors,
      &reference.multisponsors,
      ", ",
      |s| s.to_uppercase(),
    )?;
    c.check_string(
      M::BillLawSection,
      amendment.law_section.as_deref(),
      reference.law_section.as_deref(),
    )?;
    c.check_string(M::BillLawCode, amendment.law_code.as_deref(), reference.law_code.as_deref())?;
    c.check_object(
      M::BillActiveAmendment,
      Some(&content.active_version),
      Some(&reference.active_version),
    )?;

    let mut observed_actions: Vec<_> = content.actions.iter().collect();
    observed_actions.sort_by_key(|a| a.sequence_no);
    let mut reference_actions: Vec<_> = reference.actions.iter().collect();
    reference_actions.sort_by_key(|a| a.sequence_no);
    c.check_collection(
      M::BillActions,
      observed_actions.iter().map(|a| render_action(a.date, a.chamber, &a.text)),
      reference_actions.iter().map(|a| render_action(a.date, a.chamber, &a.text)),
      "\n",
      String::clone,
    )?;

    c.check_string_upper(
      M::BillLastStatus,
      content.last_status.as_deref(),
      reference.last_status.as_deref(),
    )?;
    c.check_bool(M::BillIsAmended, "Is Amended", content.is_amended(), reference.is_amended)?;
    c.check_collection(
      M::BillSameAs,
      &amendment.same_as,
      &reference.same_as,
      ", ",
      |id| id.to_string(),
    )?;
    Ok(c.finish())
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use spotcheck_core::{mismatch::MismatchType, service::DumpScope};

  use super::*;
  use crate::test_helpers::{at, sample_bill};

  /// The website's view of `bill`, agreeing on every field.
  fn mirror(bill: &Bill, version: Version) -> SenateSiteBill {
    let amendment = bill.amendment(version).unwrap();
    SenateSiteBill {
      reference_id:   ReferenceId::new(ReferenceType::SenateSiteBills, at(1)),
      bill_id:        bill.base_bill_id.with_version(version),
      active_version: bill.active_version,
      title:          bill.title.clone(),
      summary:        bill.summary.clone(),
      sponsor:        bill.sponsor.clone(),
      cosponsors:     amendment.cosponsors.clone(),
      multisponsors:  amendment.multisponsors.clone(),
      law_section:    amendment.law_section.clone(),
      law_code:       amendment.law_code.clone(),
      last_status:    bill.last_status.clone(),
      is_amended:     bill.is_amended(),
      same_as:        amendment.same_as.clone(),
      actions:        bill
        .actions
        .iter()
        .map(|a| SenateSiteBillAction {
          date:        a.date,
          chamber:     a.chamber,
          sequence_no: a.sequence_no,
          text:        a.text.clone(),
        })
        .collect(),
    }
  }

  #[test]
  fn identical_data_has_no_mismatches() {
    let bill = sample_bill();
    for version in [Version::Original, Version::Amendment('A')] {
      let obs = SenateSiteBillChecker.check(&bill, &mirror(&bill, version), at(2)).unwrap();
      assert!(obs.is_empty(), "{version}: {:?}", obs.mismatch_types(false));
    }
  }

  #[test]
  fn title_difference_is_reported() {
    let mut bill = sample_bill();
    let mut reference = mirror(&bill, Version::Amendment('A'));
    reference.title = Some("FOO".into());
    bill.title = Some("BAR".into());

    let obs = SenateSiteBillChecker.check(&bill, &reference, at(2)).unwrap();
    assert_eq!(obs.mismatch_count(), 1);
    let m = obs.mismatch(MismatchType::BillTitle).unwrap();
    assert_eq!((m.observed.as_str(), m.reference.as_str()), ("BAR", "FOO"));
    assert_eq!(obs.observed_datetime, at(2));
    assert_eq!(obs.key.to_string(), "S100A-2023");
  }

  #[test]
  fn sponsor_case_and_action_order_are_ignored() {
    let bill = sample_bill();
    let mut reference = mirror(&bill, Version::Original);
    reference.sponsor = Some(" smith ".into());
    reference.actions.reverse();
    reference.cosponsors = vec!["jones".into(), "lee".into()];
    let obs = SenateSiteBillChecker.check(&bill, &reference, at(2)).unwrap();
    assert!(obs.is_empty());
  }

  #[test]
  fn unknown_amendment_is_observe_data_missing() {
    let bill = sample_bill();
    let mut reference = mirror(&bill, Version::Original);
    reference.bill_id = bill.base_bill_id.with_version(Version::Amendment('B'));
    let obs = SenateSiteBillChecker.check(&bill, &reference, at(2)).unwrap();
    assert!(obs.has_mismatch(MismatchType::ObserveDataMissing));
    assert_eq!(obs.mismatch_count(), 1);
  }

  #[test]
  fn parses_fragment_nodes() {
    let dump = DumpId {
      reference_type: ReferenceType::SenateSiteBills,
      dump_datetime:  at(1),
      scope:          DumpScope::Session(2023.into()),
      fragment_count: 1,
      notes:          None,
    };
    let fragment = DumpFragment { seq_no: 1, path: PathBuf::from("f.json") };
    let content = r#"{"nodes": [{
      "basePrintNo": "S100", "session": 2023, "version": "A", "activeVersion": "A",
      "title": "Relates to widgets", "sponsor": "SMITH", "cosponsors": ["JONES"],
      "isAmended": true, "sameAs": [{"printNo": "A200", "session": 2023}],
      "actions": [{"date": "2023-01-04", "chamber": "SENATE", "sequenceNo": 1,
                   "text": "REFERRED TO CONSUMER PROTECTION"}]
    }]}"#;

    let bills = SenateSiteBillParser.parse(&dump, &fragment, content).unwrap();
    assert_eq!(bills.len(), 1);
    let bill = &bills[0];
    assert_eq!(bill.bill_id.to_string(), "S100A-2023");
    assert_eq!(bill.reference_id, dump.reference_id());
    assert_eq!(bill.same_as.len(), 1);
    assert_eq!(bill.actions[0].chamber, Chamber::Senate);
  }

  #[test]
  fn malformed_fragment_is_a_parse_error() {
    let dump = DumpId {
      reference_type: ReferenceType::SenateSiteBills,
      dump_datetime:  at(1),
      scope:          DumpScope::Referenced,
      fragment_count: 1,
      notes:          None,
    };
    let fragment = DumpFragment { seq_no: 1, path: PathBuf::from("f.json") };
    let err = SenateSiteBillParser
      .parse(&dump, &fragment, r#"{"nodes": [{"session": 2023}]}"#)
      .unwrap_err();
    assert!(matches!(err, spotcheck_core::Error::ParseError(_)));
  }
}
