//! Error type for the engine's filesystem and HTTP adapters.

use spotcheck_core::key::ContentKey;
use spotcheck_pipeline::PipelineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{0} is not a bill key")]
  NotABill(ContentKey),

  #[error(transparent)]
  Core(#[from] spotcheck_core::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for spotcheck_core::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Core(e) => e,
      other => Self::Collaborator(Box::new(other)),
    }
  }
}

/// Map a pipeline failure onto the shared error kinds.
///
/// Parse and source-outage errors raised by a stage keep their kind; anything
/// else becomes [`spotcheck_core::Error::PipelineFailure`].
pub(crate) fn from_pipeline(err: PipelineError) -> spotcheck_core::Error {
  match err {
    PipelineError::Cancelled => spotcheck_core::Error::Cancelled,
    PipelineError::Failed { stage, source } => match source.downcast::<spotcheck_core::Error>() {
      Ok(core) => match *core {
        e @ (spotcheck_core::Error::ParseError(_)
        | spotcheck_core::Error::ReferenceSourceUnavailable(_)) => e,
        other => spotcheck_core::Error::PipelineFailure(Box::new(PipelineError::Failed {
          stage,
          source: Box::new(other),
        })),
      },
      Err(source) => {
        spotcheck_core::Error::PipelineFailure(Box::new(PipelineError::Failed { stage, source }))
      }
    },
    panicked @ PipelineError::Panicked { .. } => {
      spotcheck_core::Error::PipelineFailure(Box::new(panicked))
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn stage_parse_errors_keep_their_kind() {
    let err = from_pipeline(PipelineError::Failed {
      stage:  "parse".into(),
      source: Box::new(spotcheck_core::Error::ParseError("bad json".into())),
    });
    assert!(matches!(err, spotcheck_core::Error::ParseError(_)));

    let err = from_pipeline(PipelineError::Failed {
      stage:  "load".into(),
      source: "disk on fire".into(),
    });
    assert!(matches!(err, spotcheck_core::Error::PipelineFailure(_)));
    assert!(matches!(from_pipeline(PipelineError::Cancelled), spotcheck_core::Error::Cancelled));
  }
}
