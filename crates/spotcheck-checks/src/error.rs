//! Error types for the reference parsers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid {field}: {value:?}")]
  InvalidField { field: &'static str, value: String },

  #[error("missing element: {0}")]
  MissingElement(&'static str),

  #[error("invalid selector {0:?}")]
  Selector(&'static str),

  #[error("source outage detected: {0}")]
  SourceUnavailable(String),

  #[error(transparent)]
  Core(#[from] spotcheck_core::Error),
}

impl Error {
  pub(crate) fn invalid(field: &'static str, value: impl Into<String>) -> Self {
    Self::InvalidField { field, value: value.into() }
  }
}

impl From<Error> for spotcheck_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::SourceUnavailable(detail) => Self::ReferenceSourceUnavailable(detail),
      other => Self::ParseError(other.to_string()),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
