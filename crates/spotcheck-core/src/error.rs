//! Error types for `spotcheck-core`.
//!
//! The variants double as the error kinds shared by every crate in the
//! workspace: backends and collaborators convert into [`Error`] so callers can
//! match on one set of kinds.

use thiserror::Error;

use crate::{mismatch::MismatchType, reference::ReferenceType};

/// A type-erased error raised by a collaborator or backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("no reference data found for {reference_type}: {detail}")]
  ReferenceDataNotFound {
    reference_type: ReferenceType,
    detail:         String,
  },

  #[error("report not found: {0}")]
  ReportNotFound(String),

  #[error("mismatch type {mismatch_type} is not checked by {reference_type}")]
  InvalidMismatchForReferenceType {
    reference_type: ReferenceType,
    mismatch_type:  MismatchType,
  },

  #[error("observation for {observed} cannot be added to a {expected} report")]
  ObservationReferenceType {
    expected: ReferenceType,
    observed: ReferenceType,
  },

  #[error("scrape queue is empty")]
  QueueEmpty,

  #[error("reference data could not be parsed: {0}")]
  ParseError(String),

  #[error("reference source unavailable: {0}")]
  ReferenceSourceUnavailable(String),

  #[error("pipeline failed: {0}")]
  PipelineFailure(#[source] BoxError),

  #[error("run was cancelled")]
  Cancelled,

  #[error("no checker registered for {0}")]
  CheckerNotRegistered(ReferenceType),

  #[error("checker for {0} does not accept the requested content/reference types")]
  CheckerTypeMismatch(ReferenceType),

  #[error("a checker is already registered for {0}")]
  DuplicateChecker(ReferenceType),

  #[error("invalid content key: {0}")]
  InvalidKey(String),

  #[error("unknown {kind} discriminant: {value:?}")]
  UnknownVariant { kind: &'static str, value: String },

  #[error("storage error: {0}")]
  Storage(#[source] BoxError),

  #[error("collaborator error: {0}")]
  Collaborator(#[source] BoxError),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn unknown_variant(kind: &'static str, value: impl Into<String>) -> Self {
    Self::UnknownVariant { kind, value: value.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
