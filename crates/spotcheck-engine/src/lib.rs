//! Runtime of the spot-check subsystem.
//!
//! Ties the pure pieces together: [`ReportEngine`] runs a reference dump
//! through the parse, load and check pipeline; [`SpotcheckRunService`]
//! reconciles and persists the result; [`Scheduler`] and [`ScrapeDispatcher`]
//! drive runs and scrapes in the background. The filesystem and HTTP adapters
//! ([`FsDumpSource`], [`ScrapeDumpSource`], [`FsContentService`],
//! [`LrsScraper`]) implement the collaborator traits of
//! [`spotcheck_core::service`].

pub mod config;
pub mod content;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod scheduler;
pub mod scraper;
pub mod service;
pub mod source;

pub use config::{ScrapeConfig, SpotcheckConfig};
pub use content::{ContentModel, FsContentService};
pub use dispatch::{DispatchConfig, DispatchOutcome, ScrapeDispatcher};
pub use engine::{Audit, EngineConfig, PendingReport, ReportEngine, RunWindow};
pub use error::{Error, Result};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use scraper::LrsScraper;
pub use service::{RunOutcome, RunSummary, SpotcheckRunService};
pub use source::{FsDumpSource, ScrapeDumpSource};
