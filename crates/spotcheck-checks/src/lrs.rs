//! Bill pages scraped from LRS.
//!
//! A page carries the full text of one amendment and its sponsor memo. Two
//! special pages exist: a "not found" page for bills LRS does not know, and an
//! error page served during outages.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use spotcheck_core::{
  check::{Checker, Comparison, normalize_whitespace},
  content::Bill,
  key::{BillId, ContentKey, Version},
  mismatch::MismatchType as M,
  observation::Observation,
  reference::{ReferenceId, ReferenceType},
  scrape::ScrapeFile,
  service::{DumpId, FragmentParser, ReferenceRecord},
};

use crate::{Error, Result};

const OUTAGE_TEXT: &str = "404 - Processing Error";
const NOT_FOUND_TEXT: &str = "Bill Status Information Not Found";

static PRINT_NO: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(r"^([A-Za-z]\d+)(?:-([A-Za-z]))?$").expect("print number pattern should compile")
});

fn selector(css: &'static str) -> Result<Selector> {
  Selector::parse(css).map_err(|_| Error::Selector(css))
}

// ─── Page parsing ────────────────────────────────────────────────────────────

/// The reference content of one LRS page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LrsPage {
  /// Full print number (`S100A`), absent on "not found" pages.
  pub print_no: Option<String>,
  pub text:     String,
  pub memo:     String,
  pub missing:  bool,
}

/// Whether `html` is the error page LRS serves during an outage.
pub fn is_outage(html: &str) -> bool {
  let doc = Html::parse_document(html);
  let Ok(h2) = selector("h2") else { return false };
  doc
    .select(&h2)
    .next()
    .is_some_and(|e| e.text().collect::<String>().trim().starts_with(OUTAGE_TEXT))
}

/// Parse one LRS bill page. Fails with [`Error::SourceUnavailable`] on the
/// outage page.
pub fn parse_page(html: &str) -> Result<LrsPage> {
  if is_outage(html) {
    return Err(Error::SourceUnavailable(OUTAGE_TEXT.to_owned()));
  }
  let doc = Html::parse_document(html);
  let contents = doc
    .select(&selector("#nv_bot_contents")?)
    .next()
    .ok_or(Error::MissingElement("#nv_bot_contents"))?;

  let missing = contents
    .select(&selector(r#"font[color="red"]"#)?)
    .next()
    .is_some_and(|e| e.text().collect::<String>().trim() == NOT_FOUND_TEXT);
  if missing {
    return Ok(LrsPage { print_no: None, text: String::new(), memo: String::new(), missing });
  }

  Ok(LrsPage {
    print_no: Some(parse_print_no(&doc)?),
    text: parse_text(contents),
    memo: parse_memo(&doc)?,
    missing,
  })
}

fn parse_print_no(doc: &Html) -> Result<String> {
  let element = doc
    .select(&selector("span.nv_bot_info > strong")?)
    .next()
    .ok_or(Error::MissingElement("span.nv_bot_info > strong"))?;
  let raw = element.text().collect::<String>();
  let captures = PRINT_NO
    .captures(raw.trim())
    .ok_or_else(|| Error::invalid("print number", raw.trim()))?;
  let base = captures.get(1).map_or("", |m| m.as_str());
  let version = captures.get(2).map_or("", |m| m.as_str());
  Ok(format!("{base}{version}"))
}

/// The bill text is every `pre` under the contents before the first
/// `hr.noprint`.
fn parse_text(contents: ElementRef<'_>) -> String {
  let mut text = String::new();
  for child in contents.children().filter_map(ElementRef::wrap) {
    match child.value().name() {
      "pre" => collect_text(child, &mut text),
      "hr" if child.value().classes().any(|c| c == "noprint") => break,
      _ => {}
    }
  }
  text
}

fn parse_memo(doc: &Html) -> Result<String> {
  let mut memo = String::new();
  if let Some(pre) = doc.select(&selector("pre:last-of-type")?).next() {
    collect_text(pre, &mut memo);
  }
  Ok(memo)
}

/// Text of `element` and its descendants. Underlined text is upper-cased to
/// match the convention of the bill text feed.
fn collect_text(element: ElementRef<'_>, out: &mut String) {
  for child in element.children() {
    match child.value() {
      Node::Text(text) => out.push_str(text),
      Node::Element(e) => {
        if let Some(child) = ElementRef::wrap(child) {
          if e.name() == "u" {
            out.push_str(&child.text().collect::<String>().to_uppercase());
          } else {
            collect_text(child, out);
          }
        }
      }
      _ => {}
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One amendment's text and memo as scraped from LRS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedBill {
  pub reference_id: ReferenceId,
  pub bill_id:      BillId,
  pub text:         String,
  pub memo:         String,
  /// LRS reported the bill as not found.
  pub missing:      bool,
}

impl ReferenceRecord for ScrapedBill {
  fn reference_id(&self) -> ReferenceId { self.reference_id }

  fn key(&self) -> ContentKey { ContentKey::Bill(self.bill_id.clone()) }
}

/// Parses a staged scrape file. The session and scrape time come from the file
/// name, the amendment from the page.
#[derive(Debug, Clone, Copy, Default)]
pub struct LrsBillParser;

impl FragmentParser for LrsBillParser {
  type Fragment = ScrapeFile;
  type Reference = ScrapedBill;

  fn parse(
    &self,
    _dump: &DumpId,
    file: &ScrapeFile,
    content: &str,
  ) -> spotcheck_core::Result<Vec<ScrapedBill>> {
    let (base, scraped_at) = file.bill_and_time()?;
    let page = parse_page(content)?;
    let bill_id = match &page.print_no {
      Some(print_no) => {
        let id = BillId::parse(print_no, base.session)?;
        if id.base() != base {
          return Err(
            Error::invalid("print number", format!("{print_no} in {}", file.file_name)).into(),
          );
        }
        id
      }
      None => base.with_version(Version::Original),
    };
    Ok(vec![ScrapedBill {
      reference_id: ReferenceId::new(ReferenceType::LbdcScrapedBill, scraped_at),
      bill_id,
      text: page.text,
      memo: page.memo,
      missing: page.missing,
    }])
  }
}

// ─── Checker ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ScrapedBillChecker;

impl Checker<Bill, ScrapedBill> for ScrapedBillChecker {
  fn reference_type(&self) -> ReferenceType { ReferenceType::LbdcScrapedBill }

  fn check(
    &self,
    content: &Bill,
    reference: &ScrapedBill,
    observed_at: DateTime<Utc>,
  ) -> spotcheck_core::Result<Observation> {
    let key = reference.key();
    if reference.missing {
      return Ok(Observation::reference_missing(reference.reference_id, key, observed_at));
    }
    let Some(amendment) = content.amendment(reference.bill_id.version) else {
      return Ok(Observation::observe_data_missing(reference.reference_id, key, observed_at));
    };

    let mut c = Comparison::new(reference.reference_id, key, observed_at);
    c.check_canonical(
      M::BillText,
      normalize_whitespace(&amendment.full_text),
      normalize_whitespace(&reference.text),
    )?;
    c.check_canonical(
      M::BillMemo,
      normalize_whitespace(&amendment.memo),
      normalize_whitespace(&reference.memo),
    )?;
    Ok(c.finish())
  }
}

#[cfg(test)]
mod tests {
  use std::path::PathBuf;

  use spotcheck_core::{
    key::BaseBillId,
    mismatch::MismatchType,
    scrape::scrape_file_name,
    service::DumpScope,
  };

  use super::*;
  use crate::test_helpers::{at, sample_bill};

  const PAGE: &str = r#"<html><body>
    <span class="nv_bot_info"><strong>S100-A</strong></span>
    <div id="nv_bot_contents">
      <pre>  Section 1.  The <u>general</u> business law
is amended </pre>
      <hr class="noprint">
      <pre>PURPOSE:   widgets</pre>
    </div>
  </body></html>"#;

  const NOT_FOUND: &str = r#"<html><body><div id="nv_bot_contents">
    <font color="red">Bill Status Information Not Found</font>
  </div></body></html>"#;

  const OUTAGE: &str = "<html><body><h2>404 - Processing Error</h2></body></html>";

  fn dump() -> DumpId {
    DumpId {
      reference_type: ReferenceType::LbdcScrapedBill,
      dump_datetime:  at(1),
      scope:          DumpScope::Referenced,
      fragment_count: 1,
      notes:          None,
    }
  }

  fn file() -> ScrapeFile {
    let base = BaseBillId::new("S100", 2023).unwrap();
    ScrapeFile {
      file_name:          scrape_file_name(&base, at(1)),
      file_path:          PathBuf::from("/staging"),
      staged_datetime:    at(1),
      archived:           false,
      pending_processing: true,
    }
  }

  #[test]
  fn parses_text_memo_and_print_no() {
    let page = parse_page(PAGE).unwrap();
    assert_eq!(page.print_no.as_deref(), Some("S100A"));
    assert!(!page.missing);
    assert_eq!(normalize_whitespace(&page.text), "Section 1. The GENERAL business law is amended");
    assert_eq!(normalize_whitespace(&page.memo), "PURPOSE: widgets");
  }

  #[test]
  fn detects_not_found_and_outage_pages() {
    let page = parse_page(NOT_FOUND).unwrap();
    assert!(page.missing);
    assert!(page.print_no.is_none());

    assert!(is_outage(OUTAGE));
    assert!(!is_outage(PAGE));
    assert!(matches!(parse_page(OUTAGE), Err(Error::SourceUnavailable(_))));
  }

  #[test]
  fn outage_maps_to_source_unavailable() {
    let err = LrsBillParser.parse(&dump(), &file(), OUTAGE).unwrap_err();
    assert!(matches!(err, spotcheck_core::Error::ReferenceSourceUnavailable(_)));
  }

  #[test]
  fn record_takes_session_and_time_from_file_name() {
    let bills = LrsBillParser.parse(&dump(), &file(), PAGE).unwrap();
    assert_eq!(bills.len(), 1);
    assert_eq!(bills[0].bill_id.to_string(), "S100A-2023");
    assert_eq!(bills[0].reference_id.reference_datetime, at(1));
  }

  #[test]
  fn identical_text_has_no_mismatches() {
    let bill = sample_bill();
    let amendment = bill.amendment(Version::Amendment('A')).unwrap();
    let reference = ScrapedBill {
      reference_id: ReferenceId::new(ReferenceType::LbdcScrapedBill, at(1)),
      bill_id:      bill.base_bill_id.with_version(Version::Amendment('A')),
      text:         format!("\n{}\n", amendment.full_text),
      memo:         amendment.memo.clone(),
      missing:      false,
    };
    let obs = ScrapedBillChecker.check(&bill, &reference, at(2)).unwrap();
    assert!(obs.is_empty());

    let mut changed = reference.clone();
    changed.memo = "PURPOSE: gadgets".into();
    let obs = ScrapedBillChecker.check(&bill, &changed, at(2)).unwrap();
    assert_eq!(obs.mismatch_types(false), [MismatchType::BillMemo].into());
  }

  #[test]
  fn missing_page_is_reference_data_missing() {
    let bill = sample_bill();
    let reference = ScrapedBill {
      reference_id: ReferenceId::new(ReferenceType::LbdcScrapedBill, at(1)),
      bill_id:      bill.base_bill_id.with_version(Version::Original),
      text:         String::new(),
      memo:         String::new(),
      missing:      true,
    };
    let obs = ScrapedBillChecker.check(&bill, &reference, at(2)).unwrap();
    assert!(obs.has_mismatch(MismatchType::ReferenceDataMissing));
  }
}
