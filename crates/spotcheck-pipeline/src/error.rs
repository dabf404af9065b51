//! Error type for `spotcheck-pipeline`.

use thiserror::Error;

/// Error type accepted from task implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PipelineError {
  /// A task returned an error. Only the first failure is kept.
  #[error("stage {stage:?} failed: {source}")]
  Failed {
    stage:  String,
    #[source]
    source: BoxError,
  },

  #[error("a worker in stage {stage:?} panicked")]
  Panicked { stage: String },

  #[error("pipeline was cancelled")]
  Cancelled,
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
