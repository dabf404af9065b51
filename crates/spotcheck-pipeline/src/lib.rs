//! A generic multi-stage executor over bounded tokio channels.
//!
//! A pipeline is a linear chain of asynchronous tasks. Each task has its own
//! worker pool and a bounded input queue; a full queue suspends its producers.
//! The head ingests a finite input collection and the tail's output is
//! collected into a `Vec` returned through a [`PipelineHandle`].
//!
//! ```ignore
//! let handle = PipelineBuilder::new()
//!   .add_task(TaskConfig::new("parse").queue_size(16), parse)
//!   .add_task(TaskConfig::new("load").queue_size(64).workers(4), load)
//!   .add_task(TaskConfig::new("check"), check)
//!   .build()
//!   .run(fragments);
//! let observations = handle.join().await?;
//! ```

mod error;
mod pipeline;

pub use error::{BoxError, PipelineError, Result};
pub use pipeline::{
  DEFAULT_QUEUE_SIZE, Pipeline, PipelineBuilder, PipelineHandle, TaskConfig,
};
