//! Command implementations over the SQLite stores and the run service.

use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use spotcheck_checks::{
  daybreak::DaybreakParser,
  default_registry,
  lrs::LrsBillParser,
  openleg::OpenlegBillParser,
  senatesite::{SenateSiteAgendaParser, SenateSiteBillParser, SenateSiteCalendarParser},
};
use spotcheck_core::{
  content::{Bill, CalendarEntryList, CommitteeAgenda},
  key::{BaseBillId, BillId, ContentKey},
  lifecycle::OpenMismatchSummary,
  mismatch::IgnoreStatus,
  reference::{DataSource, ReferenceType},
  report::ReportId,
  store::{LimitOffset, OpenMismatchQuery, ReferenceStore, ReportStore, SortOrder},
};
use spotcheck_engine::{
  FsContentService, FsDumpSource, LrsScraper, ReportEngine, RunWindow, Scheduler,
  ScrapeDispatcher, ScrapeDumpSource, SpotcheckConfig, SpotcheckRunService,
};
use spotcheck_store_sqlite::{SqliteReferenceStore, SqliteStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::QueryArgs;

/// Convert a backend error into the shared error kinds so the exit code can
/// be derived from it.
fn kind<E: Into<spotcheck_core::Error>>(err: E) -> spotcheck_core::Error { err.into() }

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

pub struct App {
  config:     SpotcheckConfig,
  store:      SqliteStore,
  references: SqliteReferenceStore,
}

impl App {
  pub async fn open(config: SpotcheckConfig) -> anyhow::Result<Self> {
    let store = SqliteStore::open(&config.database_path)
      .await
      .with_context(|| format!("failed to open store at {:?}", config.database_path))?;
    let references = store.reference_store(&config.scraped_staging_dir, &config.archive_dir);
    Ok(Self { config, store, references })
  }

  /// The run service with an audit registered for every reference type.
  fn run_service(
    &self,
    shutdown: CancellationToken,
  ) -> anyhow::Result<SpotcheckRunService<SqliteStore>> {
    let cfg = &self.config;
    let registry = Arc::new(default_registry()?);
    let engine = cfg.engine_config();
    let archive = cfg.archive_dir.join("senate-site");
    let dumps = Arc::new(FsDumpSource::new(&cfg.senate_site_dump_dir, archive));
    let scraped = Arc::new(ScrapeDumpSource::new(self.references.clone(), LrsBillParser));
    let bills = Arc::new(FsContentService::<Bill>::new(&cfg.content_dir));
    let calendars = Arc::new(FsContentService::<CalendarEntryList>::new(&cfg.content_dir));
    let agendas = Arc::new(FsContentService::<CommitteeAgenda>::new(&cfg.content_dir));

    use ReferenceType as T;
    Ok(
      SpotcheckRunService::builder(self.store.clone())
        .register(ReportEngine::new(
          T::SenateSiteBills,
          dumps.clone(),
          SenateSiteBillParser,
          bills.clone(),
          registry.clone(),
          engine,
        ))
        .register(ReportEngine::new(
          T::SenateSiteCalendar,
          dumps.clone(),
          SenateSiteCalendarParser,
          calendars,
          registry.clone(),
          engine,
        ))
        .register(ReportEngine::new(
          T::SenateSiteAgenda,
          dumps.clone(),
          SenateSiteAgendaParser,
          agendas,
          registry.clone(),
          engine,
        ))
        .register(ReportEngine::new(
          T::LbdcDaybreak,
          dumps.clone(),
          DaybreakParser,
          bills.clone(),
          registry.clone(),
          engine,
        ))
        .register(ReportEngine::new(
          T::OpenlegBill,
          dumps,
          OpenlegBillParser,
          bills.clone(),
          registry.clone(),
          engine,
        ))
        .register(ReportEngine::new(
          T::LbdcScrapedBill,
          scraped,
          LrsBillParser,
          bills,
          registry,
          engine,
        ))
        .deadline(cfg.run_deadline())
        .shutdown(shutdown)
        .build(),
    )
  }

  // ── Runs ──────────────────────────────────────────────────────────────────

  pub async fn run(
    &self,
    reference_type: ReferenceType,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
  ) -> anyhow::Result<()> {
    let all = RunWindow::all();
    let window = RunWindow::new(from.unwrap_or(all.from), to.unwrap_or(all.to));
    let outcome = self.run_service(CancellationToken::new())?.run(reference_type, window).await?;
    print_json(&outcome)
  }

  pub async fn daemon(&self) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let service = self.run_service(shutdown.clone())?;
    let scheduler = Scheduler::new(service, self.config.scheduler_config());
    let scraper = LrsScraper::new(&self.config.scrape.lrs_url_template)?;
    let dispatcher =
      ScrapeDispatcher::new(self.references.clone(), scraper, self.config.dispatch_config());

    tokio::spawn({
      let shutdown = shutdown.clone();
      async move {
        match tokio::signal::ctrl_c().await {
          Ok(()) => info!("interrupt received, shutting down"),
          Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
        }
        shutdown.cancel();
      }
    });

    tokio::join!(scheduler.run(shutdown.clone()), dispatcher.run(shutdown.clone()));
    Ok(())
  }

  // ── Reports ───────────────────────────────────────────────────────────────

  pub async fn list_reports(
    &self,
    reference_type: ReferenceType,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    order: SortOrder,
    page: LimitOffset,
  ) -> anyhow::Result<()> {
    let all = RunWindow::all();
    let summaries = self
      .store
      .list_report_summaries(
        reference_type,
        from.unwrap_or(all.from),
        to.unwrap_or(all.to),
        order,
        page,
      )
      .await
      .map_err(kind)?;
    print_json(&summaries)
  }

  pub async fn show_report(
    &self,
    reference_type: ReferenceType,
    reference_datetime: DateTime<Utc>,
    run_datetime: DateTime<Utc>,
  ) -> anyhow::Result<()> {
    let id = ReportId::new(reference_type, reference_datetime, run_datetime);
    let report = self.store.get_report(id).await.map_err(kind)?;
    print_json(&json!({
      "id": report.id,
      "notes": report.notes,
      "checked_keys": report.checked_keys(),
      "observations": report.observations().collect::<Vec<_>>(),
    }))
  }

  pub async fn delete_report(
    &self,
    reference_type: ReferenceType,
    reference_datetime: DateTime<Utc>,
    run_datetime: DateTime<Utc>,
  ) -> anyhow::Result<()> {
    let id = ReportId::new(reference_type, reference_datetime, run_datetime);
    self.store.delete_report(id).await.map_err(kind)?;
    info!(report = %id, "report deleted");
    Ok(())
  }

  // ── Mismatches ────────────────────────────────────────────────────────────

  pub async fn query_mismatches(&self, args: QueryArgs) -> anyhow::Result<()> {
    let mut query = OpenMismatchQuery::for_data_source(args.source)
      .order_by(args.order_by, args.order)
      .page(args.page.into());
    if !args.types.is_empty() {
      query = query.mismatch_types(args.types);
    }
    if !args.statuses.is_empty() {
      query = query.statuses(args.statuses);
    }
    if !args.ignores.is_empty() {
      query = query.ignore_statuses(args.ignores);
    }
    if let Some(after) = args.observed_after {
      query = query.observed_after(after);
    }
    if let Some(session) = args.session
      && !args.bills.is_empty()
    {
      let keys = args
        .bills
        .iter()
        .map(|p| BillId::parse(p, session).map(ContentKey::from))
        .collect::<spotcheck_core::Result<Vec<_>>>()?;
      query = query.keys(keys);
    }
    let page = self.store.query_open_mismatches(&query).await.map_err(kind)?;
    print_json(&page)
  }

  pub async fn summary(
    &self,
    source: DataSource,
    observed_after: Option<DateTime<Utc>>,
  ) -> anyhow::Result<()> {
    let current = self.store.current_mismatches(source).await.map_err(kind)?;
    print_json(&OpenMismatchSummary::from_records(source, &current, observed_after))
  }

  pub async fn set_ignore_status(
    &self,
    mismatch_id: i64,
    status: IgnoreStatus,
  ) -> anyhow::Result<()> {
    self.store.set_ignore_status(mismatch_id, status).await.map_err(kind)?;
    info!(mismatch_id, %status, "ignore status updated");
    Ok(())
  }

  pub async fn add_issue(&self, mismatch_id: i64, issue_id: String) -> anyhow::Result<()> {
    self.store.add_issue_id(mismatch_id, issue_id).await.map_err(kind)?;
    Ok(())
  }

  pub async fn remove_issue(&self, mismatch_id: i64, issue_id: String) -> anyhow::Result<()> {
    self.store.remove_issue_id(mismatch_id, issue_id).await.map_err(kind)?;
    Ok(())
  }

  // ── Scrape queue ──────────────────────────────────────────────────────────

  pub async fn enqueue(&self, print_no: &str, session: i32, priority: i32) -> anyhow::Result<()> {
    let key = ContentKey::from(BaseBillId::new(print_no, session)?);
    let entry = self.references.enqueue(&key, priority).await.map_err(kind)?;
    print_json(&entry)
  }

  pub async fn dequeue(&self, print_no: &str, session: i32) -> anyhow::Result<()> {
    let key = ContentKey::from(BaseBillId::new(print_no, session)?);
    let removed = self.references.remove(&key).await.map_err(kind)?;
    print_json(&json!({ "key": key, "removed": removed }))
  }

  pub async fn list_queue(&self, order: SortOrder, page: LimitOffset) -> anyhow::Result<()> {
    print_json(&self.references.list_queue(order, page).await.map_err(kind)?)
  }

  pub async fn list_dead_letters(&self, page: LimitOffset) -> anyhow::Result<()> {
    print_json(&self.references.list_dead_letters(page).await.map_err(kind)?)
  }

  // ── Admin ─────────────────────────────────────────────────────────────────

  pub async fn clear(&self) -> anyhow::Result<()> {
    self.store.clear().await.map_err(kind)?;
    info!("report repository cleared");
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;

  async fn app(dir: &TempDir) -> App {
    let config = SpotcheckConfig {
      database_path: dir.path().join("spotcheck.db"),
      scraped_staging_dir: dir.path().join("staging"),
      archive_dir: dir.path().join("archive"),
      senate_site_dump_dir: dir.path().join("dumps"),
      content_dir: dir.path().join("content"),
      ..Default::default()
    };
    App::open(config).await.unwrap()
  }

  #[tokio::test]
  async fn every_reference_type_has_an_audit() {
    let dir = TempDir::new().unwrap();
    let service = app(&dir).await.run_service(CancellationToken::new()).unwrap();
    let registered = service.reference_types();
    for reference_type in [
      ReferenceType::LbdcDaybreak,
      ReferenceType::LbdcScrapedBill,
      ReferenceType::SenateSiteBills,
      ReferenceType::SenateSiteCalendar,
      ReferenceType::SenateSiteAgenda,
      ReferenceType::OpenlegBill,
    ] {
      assert!(registered.contains(&reference_type), "{reference_type} not registered");
    }
  }

  #[tokio::test]
  async fn runs_without_dumps_report_missing_reference_data() {
    let dir = TempDir::new().unwrap();
    let err = app(&dir)
      .await
      .run(ReferenceType::SenateSiteBills, None, None)
      .await
      .unwrap_err();
    assert_eq!(crate::exit_code(&err), 2);
  }

  #[tokio::test]
  async fn missing_reports_exit_with_not_found() {
    let dir = TempDir::new().unwrap();
    let now = Utc::now();
    let err = app(&dir)
      .await
      .show_report(ReferenceType::SenateSiteBills, now, now)
      .await
      .unwrap_err();
    assert_eq!(crate::exit_code(&err), 3);
  }
}
