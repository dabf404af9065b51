//! Error type for `spotcheck-store-sqlite`.

use spotcheck_core::report::ReportId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] spotcheck_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("report not found: {0}")]
  ReportNotFound(ReportId),

  #[error("mismatch not found: {0}")]
  MismatchNotFound(i64),

  #[error("scrape queue is empty")]
  QueueEmpty,
}

impl From<Error> for spotcheck_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(e) => e,
      Error::ReportNotFound(id) => Self::ReportNotFound(id.to_string()),
      Error::QueueEmpty => Self::QueueEmpty,
      other => Self::Storage(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
