use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use spotcheck_core::{
  check::{Checker, Comparison, canonical, normalize_whitespace},
  content::{AgendaBill, CommitteeAgenda},
  key::{BillId, Chamber, CommitteeAgendaKey, ContentKey},
  mismatch::MismatchType as M,
  observation::Observation,
  reference::{ReferenceId, ReferenceType},
  service::{DumpFragment, DumpId, FragmentParser, ReferenceRecord},
};

use crate::{Result, parse_nodes};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgendaNode {
  agenda_no:        i32,
  year:             i32,
  #[serde(default)]
  addendum:         String,
  committee:        String,
  chamber:          Chamber,
  #[serde(default)]
  chair:            Option<String>,
  #[serde(default)]
  location:         Option<String>,
  #[serde(default)]
  meeting_datetime: Option<NaiveDateTime>,
  #[serde(default)]
  notes:            Option<String>,
  #[serde(default)]
  bills:            Vec<AgendaBillNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgendaBillNode {
  print_no: String,
  session:  i32,
  #[serde(default)]
  message:  Option<String>,
}

/// One committee meeting of an agenda addendum as published on the website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenateSiteAgenda {
  pub reference_id:     ReferenceId,
  pub key:              CommitteeAgendaKey,
  pub chair:            Option<String>,
  pub location:         Option<String>,
  pub meeting_datetime: Option<NaiveDateTime>,
  pub notes:            Option<String>,
  pub bills:            Vec<AgendaBill>,
}

impl SenateSiteAgenda {
  fn from_node(reference_id: ReferenceId, node: AgendaNode) -> Result<Self> {
    let bills = node
      .bills
      .into_iter()
      .map(|b| -> Result<AgendaBill> {
        Ok(AgendaBill { bill_id: BillId::parse(&b.print_no, b.session)?, message: b.message })
      })
      .collect::<Result<_>>()?;
    Ok(Self {
      reference_id,
      key: CommitteeAgendaKey {
        agenda_no: node.agenda_no,
        year:      node.year,
        addendum:  node.addendum.trim().to_uppercase(),
        committee: node.committee.trim().to_owned(),
        chamber:   node.chamber,
      },
      chair: node.chair,
      location: node.location,
      meeting_datetime: node.meeting_datetime,
      notes: node.notes,
      bills,
    })
  }
}

impl ReferenceRecord for SenateSiteAgenda {
  fn reference_id(&self) -> ReferenceId { self.reference_id }

  fn key(&self) -> ContentKey { ContentKey::Agenda(self.key.clone()) }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SenateSiteAgendaParser;

impl FragmentParser for SenateSiteAgendaParser {
  type Fragment = DumpFragment;
  type Reference = SenateSiteAgenda;

  fn parse(
    &self,
    dump: &DumpId,
    _fragment: &DumpFragment,
    content: &str,
  ) -> spotcheck_core::Result<Vec<SenateSiteAgenda>> {
    let reference_id = dump.reference_id();
    let agendas = parse_nodes::<AgendaNode>(content)?
      .into_iter()
      .map(|node| SenateSiteAgenda::from_node(reference_id, node))
      .collect::<Result<Vec<_>>>()?;
    Ok(agendas)
  }
}

/// Bills in print number order; a bill's message follows it in brackets.
fn render_bills(bills: &[AgendaBill]) -> Vec<String> {
  let mut bills: Vec<_> = bills.iter().collect();
  bills.sort_by(|a, b| a.bill_id.cmp(&b.bill_id));
  bills
    .iter()
    .map(|b| match canonical(b.message.as_deref()) {
      message if message.is_empty() => b.bill_id.to_string(),
      message => format!("{} [{}]", b.bill_id, message.to_uppercase()),
    })
    .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SenateSiteAgendaChecker;

impl Checker<CommitteeAgenda, SenateSiteAgenda> for SenateSiteAgendaChecker {
  fn reference_type(&self) -> ReferenceType { ReferenceType::SenateSiteAgenda }

  fn check(
    &self,
    content: &CommitteeAgenda,
    reference: &SenateSiteAgenda,
    observed_at: DateTime<Utc>,
  ) -> spotcheck_core::Result<Observation> {
    let mut c = Comparison::new(reference.reference_id, reference.key(), observed_at);
    c.check_collection(
      M::AgendaBills,
      render_bills(&content.bills),
      render_bills(&reference.bills),
      "\n",
      String::clone,
    )?;
    c.check_string_upper(M::AgendaChair, content.chair.as_deref(), reference.chair.as_deref())?;
    c.check_string(M::AgendaLocation, content.location.as_deref(), reference.location.as_deref())?;
    c.check_object(
      M::AgendaMeetingTime,
      content.meeting_datetime.as_ref(),
      reference.meeting_datetime.as_ref(),
    )?;
    c.check_canonical(
      M::AgendaNotes,
      normalize_whitespace(content.notes.as_deref().unwrap_or_default()),
      normalize_whitespace(reference.notes.as_deref().unwrap_or_default()),
    )?;
    Ok(c.finish())
  }
}
