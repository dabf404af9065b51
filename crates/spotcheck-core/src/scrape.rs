//! Scrape queue entries and scrape file metadata.

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  key::{BaseBillId, ContentKey},
};

/// `yyyyMMdd'T'HHmmss`, the timestamp embedded in scrape file names.
pub const SCRAPED_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// A content key awaiting a fresh reference fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeQueueEntry {
  pub key:            ContentKey,
  pub priority:       i32,
  pub added_datetime: DateTime<Utc>,
}

/// A queue entry that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
  pub entry:           ScrapeQueueEntry,
  pub attempts:        u32,
  pub last_error:      String,
  pub failed_datetime: DateTime<Utc>,
}

/// Metadata of one scraped reference file. The row, not the filesystem, is
/// the authority on the file's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeFile {
  pub file_name:          String,
  /// Directory currently holding the file.
  pub file_path:          PathBuf,
  pub staged_datetime:    DateTime<Utc>,
  pub archived:           bool,
  pub pending_processing: bool,
}

impl ScrapeFile {
  pub fn path(&self) -> PathBuf { self.file_path.join(&self.file_name) }

  /// The bill and scrape time encoded in the file name.
  pub fn bill_and_time(&self) -> Result<(BaseBillId, DateTime<Utc>)> {
    parse_scrape_file_name(&self.file_name)
  }
}

/// `<session>-<printNo>-<scrapedTime>.html`
pub fn scrape_file_name(bill: &BaseBillId, scraped_at: DateTime<Utc>) -> String {
  format!(
    "{}-{}-{}.html",
    bill.session,
    bill.print_no,
    scraped_at.format(SCRAPED_TIME_FORMAT)
  )
}

pub fn parse_scrape_file_name(file_name: &str) -> Result<(BaseBillId, DateTime<Utc>)> {
  let bad = || Error::ParseError(format!("not a scrape file name: {file_name:?}"));
  let stem = file_name.strip_suffix(".html").ok_or_else(bad)?;
  let mut parts = stem.splitn(3, '-');
  let (Some(session), Some(print_no), Some(time)) = (parts.next(), parts.next(), parts.next())
  else {
    return Err(bad());
  };
  let session: i32 = session.parse().map_err(|_| bad())?;
  let bill = BaseBillId::new(print_no, session).map_err(|_| bad())?;
  let time = NaiveDateTime::parse_from_str(time, SCRAPED_TIME_FORMAT).map_err(|_| bad())?;
  Ok((bill, time.and_utc()))
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn file_name_format() {
    let bill = BaseBillId::new("S100", 2023).unwrap();
    let at = Utc.with_ymd_and_hms(2023, 3, 1, 14, 5, 9).unwrap();
    let name = scrape_file_name(&bill, at);
    assert_eq!(name, "2023-S100-20230301T140509.html");
    assert_eq!(parse_scrape_file_name(&name).unwrap(), (bill, at));
  }

  #[test]
  fn rejects_foreign_names() {
    assert!(parse_scrape_file_name("notes.txt").is_err());
    assert!(parse_scrape_file_name("2023-S100.html").is_err());
    assert!(parse_scrape_file_name("2023-S100-yesterday.html").is_err());
  }
}
