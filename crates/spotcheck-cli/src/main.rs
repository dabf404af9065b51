//! `spotcheck`: run audits, serve the scheduler and scrape dispatcher, and
//! query the report repository.
//!
//! # Usage
//!
//! ```text
//! spotcheck --config spotcheck.toml run senate-site-bills
//! spotcheck daemon
//! spotcheck mismatches query --source NYSENATE --status NEW --limit 20
//! spotcheck queue add S100 2023 --priority 5
//! ```
//!
//! Query commands print JSON to stdout. The exit code names the failure kind
//! (see [`exit_code`]).

mod app;

use std::{
  path::{Path, PathBuf},
  process::ExitCode,
};

use anyhow::Context as _;
use app::App;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use spotcheck_core::{
  mismatch::{IgnoreStatus, MismatchStatus, MismatchType},
  reference::{DataSource, ReferenceType},
  store::{LimitOffset, MismatchOrderBy, SortOrder},
};
use spotcheck_engine::SpotcheckConfig;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(author, version, about = "Spot-check audits of legislative content")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "spotcheck.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Audit one reference type now and print the run summary.
  Run {
    #[arg(value_parser = reference_type)]
    reference_type: ReferenceType,
    /// Earliest reference datetime to consider (RFC 3339).
    #[arg(long)]
    from:           Option<DateTime<Utc>>,
    /// Latest reference datetime to consider (RFC 3339).
    #[arg(long)]
    to:             Option<DateTime<Utc>>,
  },
  /// Run scheduled audits and the scrape dispatcher until interrupted.
  Daemon,
  #[command(subcommand)]
  Reports(ReportsCommand),
  #[command(subcommand)]
  Mismatches(MismatchesCommand),
  #[command(subcommand)]
  Issues(IssuesCommand),
  #[command(subcommand)]
  Queue(QueueCommand),
  #[command(subcommand)]
  Admin(AdminCommand),
}

/// Saved reports.
#[derive(Subcommand)]
enum ReportsCommand {
  /// Summaries of reports run within a window.
  List {
    #[arg(value_parser = reference_type)]
    reference_type: ReferenceType,
    #[arg(long)]
    from:           Option<DateTime<Utc>>,
    #[arg(long)]
    to:             Option<DateTime<Utc>>,
    #[arg(long, default_value_t = SortOrder::Desc)]
    order:          SortOrder,
    #[command(flatten)]
    page:           Page,
  },
  /// One report with all of its observations.
  Show(ReportArgs),
  /// Delete a report with its observations and mismatches.
  Delete(ReportArgs),
}

#[derive(Args)]
struct ReportArgs {
  #[arg(value_parser = reference_type)]
  reference_type:     ReferenceType,
  reference_datetime: DateTime<Utc>,
  run_datetime:       DateTime<Utc>,
}

/// Mismatch records.
#[derive(Subcommand)]
enum MismatchesCommand {
  /// Current mismatches of a data source, filtered, ordered and paged.
  Query(QueryArgs),
  /// Per reference type counts of the current mismatches.
  Summary {
    #[arg(long)]
    source:         DataSource,
    #[arg(long)]
    observed_after: Option<DateTime<Utc>>,
  },
  /// Set the ignore status of a mismatch.
  Ignore { mismatch_id: i64, status: IgnoreStatus },
}

#[derive(Args)]
pub(crate) struct QueryArgs {
  #[arg(long)]
  source:         DataSource,
  /// Mismatch types to include; every type when omitted.
  #[arg(long = "type")]
  types:          Vec<MismatchType>,
  /// Defaults to NEW and EXISTING.
  #[arg(long = "status")]
  statuses:       Vec<MismatchStatus>,
  /// Defaults to NOT_IGNORED.
  #[arg(long = "ignore")]
  ignores:        Vec<IgnoreStatus>,
  /// Restrict to these bill print numbers of `--session`.
  #[arg(long = "bill", requires = "session")]
  bills:          Vec<String>,
  #[arg(long)]
  session:        Option<i32>,
  #[arg(long)]
  observed_after: Option<DateTime<Utc>>,
  #[arg(long, default_value_t = MismatchOrderBy::ReferenceDate)]
  order_by:       MismatchOrderBy,
  #[arg(long, default_value_t = SortOrder::Desc)]
  order:          SortOrder,
  #[command(flatten)]
  page:           Page,
}

/// Issue tracker ids attached to mismatches.
#[derive(Subcommand)]
enum IssuesCommand {
  Add { mismatch_id: i64, issue_id: String },
  Remove { mismatch_id: i64, issue_id: String },
}

/// The scrape queue.
#[derive(Subcommand)]
enum QueueCommand {
  /// Queue a bill for scraping, or update its priority.
  Add {
    print_no: String,
    session:  i32,
    #[arg(long, default_value_t = 0)]
    priority: i32,
  },
  Remove { print_no: String, session: i32 },
  List {
    #[arg(long, default_value_t = SortOrder::Desc)]
    order: SortOrder,
    #[command(flatten)]
    page:  Page,
  },
  /// Entries that exhausted their scrape attempts.
  Dead {
    #[command(flatten)]
    page: Page,
  },
}

#[derive(Subcommand)]
enum AdminCommand {
  /// Delete every report and mismatch.
  Clear {
    #[arg(long)]
    yes: bool,
  },
}

#[derive(Args, Clone, Copy)]
struct Page {
  #[arg(long)]
  limit:  Option<u32>,
  #[arg(long, default_value_t = 0)]
  offset: u32,
}

impl From<Page> for LimitOffset {
  fn from(page: Page) -> Self { LimitOffset { limit: page.limit, offset: page.offset } }
}

fn reference_type(name: &str) -> Result<ReferenceType, String> {
  ReferenceType::from_name(name).map_err(|e| e.to_string())
}

// ─── Entry point ─────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  match run(cli).await {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      tracing::error!("{e:#}");
      ExitCode::from(exit_code(&e))
    }
  }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("SPOTCHECK").separator("__"))
    .build()
    .context("failed to read config file")?;
  let mut cfg: SpotcheckConfig = settings
    .try_deserialize()
    .context("failed to deserialise SpotcheckConfig")?;
  for path in [
    &mut cfg.database_path,
    &mut cfg.scraped_staging_dir,
    &mut cfg.archive_dir,
    &mut cfg.senate_site_dump_dir,
    &mut cfg.content_dir,
  ] {
    *path = expand_tilde(path);
  }

  let app = App::open(cfg).await?;

  match cli.command {
    Command::Run { reference_type, from, to } => app.run(reference_type, from, to).await,
    Command::Daemon => app.daemon().await,
    Command::Reports(ReportsCommand::List { reference_type, from, to, order, page }) => {
      app.list_reports(reference_type, from, to, order, page.into()).await
    }
    Command::Reports(ReportsCommand::Show(r)) => {
      app.show_report(r.reference_type, r.reference_datetime, r.run_datetime).await
    }
    Command::Reports(ReportsCommand::Delete(r)) => {
      app.delete_report(r.reference_type, r.reference_datetime, r.run_datetime).await
    }
    Command::Mismatches(MismatchesCommand::Query(q)) => app.query_mismatches(q).await,
    Command::Mismatches(MismatchesCommand::Summary { source, observed_after }) => {
      app.summary(source, observed_after).await
    }
    Command::Mismatches(MismatchesCommand::Ignore { mismatch_id, status }) => {
      app.set_ignore_status(mismatch_id, status).await
    }
    Command::Issues(IssuesCommand::Add { mismatch_id, issue_id }) => {
      app.add_issue(mismatch_id, issue_id).await
    }
    Command::Issues(IssuesCommand::Remove { mismatch_id, issue_id }) => {
      app.remove_issue(mismatch_id, issue_id).await
    }
    Command::Queue(QueueCommand::Add { print_no, session, priority }) => {
      app.enqueue(&print_no, session, priority).await
    }
    Command::Queue(QueueCommand::Remove { print_no, session }) => {
      app.dequeue(&print_no, session).await
    }
    Command::Queue(QueueCommand::List { order, page }) => app.list_queue(order, page.into()).await,
    Command::Queue(QueueCommand::Dead { page }) => app.list_dead_letters(page.into()).await,
    Command::Admin(AdminCommand::Clear { yes }) => {
      anyhow::ensure!(yes, "refusing to clear the repository without --yes");
      app.clear().await
    }
  }
}

/// Process exit code for a failed command.
///
/// | code | failure                         |
/// |------|---------------------------------|
/// | 2    | no reference data               |
/// | 3    | report not found                |
/// | 4    | scrape queue empty              |
/// | 5    | reference data unparseable      |
/// | 6    | reference source unavailable    |
/// | 7    | pipeline failure or cancelled   |
/// | 1    | anything else                   |
fn exit_code(err: &anyhow::Error) -> u8 {
  use spotcheck_core::Error as E;
  match err.downcast_ref::<E>() {
    Some(E::ReferenceDataNotFound { .. }) => 2,
    Some(E::ReportNotFound(_)) => 3,
    Some(E::QueueEmpty) => 4,
    Some(E::ParseError(_)) => 5,
    Some(E::ReferenceSourceUnavailable(_)) => 6,
    Some(E::PipelineFailure(_) | E::Cancelled) => 7,
    _ => 1,
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
