//! [`ReportEngine`], one audit run over the newest complete reference dump.
//!
//! A run reads the dump's fragments through a three-stage pipeline:
//!
//! 1. `parse`: fragment content into reference records.
//! 2. `load`: each record's observed content from the content service.
//! 3. `check`: the pair through the registered checker.
//!
//! Keys of the dump's session that no record covered are reported after the
//! pipeline drains: published content the reference omits is
//! `REFERENCE_DATA_MISSING`, unpublished content is recorded as checked.

use std::{
  collections::BTreeSet,
  convert::Infallible,
  future::Future,
  sync::{Arc, Mutex, PoisonError},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use spotcheck_core::{
  Error, Result,
  check::CheckerRegistry,
  key::ContentKey,
  observation::Observation,
  reference::ReferenceType,
  report::{Report, ReportId},
  service::{ContentDataService, Dump, DumpScope, DumpSource, FragmentParser, ReferenceRecord},
  store::LimitOffset,
};
use spotcheck_pipeline::{PipelineBuilder, TaskConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::from_pipeline;

/// Page size used when listing the keys of a session.
const KEY_PAGE_SIZE: u32 = 1_000;

// ─── Run window ──────────────────────────────────────────────────────────────

/// Inclusive range of reference datetimes a run may pick a dump from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunWindow {
  pub from: DateTime<Utc>,
  pub to:   DateTime<Utc>,
}

impl RunWindow {
  pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self { Self { from, to } }

  pub fn all() -> Self { Self::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC) }

  /// The `days` days up to `now`.
  pub fn last_days(days: u32, now: DateTime<Utc>) -> Self {
    Self::new(now - chrono::Duration::days(i64::from(days)), now)
  }

  pub fn contains(&self, dt: DateTime<Utc>) -> bool { self.from <= dt && dt <= self.to }
}

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
  /// Bound of the queue between the parse and load stages.
  pub ref_queue_size:  usize,
  /// Bound of the queue between the load and check stages.
  pub data_queue_size: usize,
  pub loader_workers:  usize,
}

impl Default for EngineConfig {
  fn default() -> Self { Self { ref_queue_size: 100, data_queue_size: 100, loader_workers: 2 } }
}

// ─── Audit ───────────────────────────────────────────────────────────────────

/// A generated report that is not yet persisted, plus the step that marks its
/// reference artifact consumed once it is.
pub struct PendingReport {
  pub report: Report,
  finish:     BoxFuture<'static, Result<()>>,
}

impl PendingReport {
  pub fn new(report: Report, finish: impl Future<Output = Result<()>> + Send + 'static) -> Self {
    Self { report, finish: Box::pin(finish) }
  }

  pub fn into_parts(self) -> (Report, BoxFuture<'static, Result<()>>) { (self.report, self.finish) }
}

/// Object-safe view of a report engine, so engines over different content and
/// reference types can be registered side by side.
#[async_trait]
pub trait Audit: Send + Sync {
  fn reference_type(&self) -> ReferenceType;

  /// Build the report for the newest complete dump inside `window`.
  async fn generate(&self, window: RunWindow, cancel: CancellationToken) -> Result<PendingReport>;
}

// ─── Unchecked set ───────────────────────────────────────────────────────────

/// Keys the run is expected to cover and has not checked yet.
#[derive(Debug, Default)]
struct Unchecked {
  keys:     BTreeSet<ContentKey>,
  /// Base keys whose child keys were already added.
  expanded: BTreeSet<ContentKey>,
  checked:  BTreeSet<ContentKey>,
}

impl Unchecked {
  fn new(keys: BTreeSet<ContentKey>) -> Self { Self { keys, ..Default::default() } }

  /// On the first check of a base, replace it with its children.
  fn mark_checked(
    &mut self,
    key: &ContentKey,
    children: impl FnOnce() -> Option<Vec<ContentKey>>,
  ) {
    let base = key.base();
    if base != *key && !self.expanded.contains(&base) {
      if let Some(children) = children() {
        self.expanded.insert(base.clone());
        if self.keys.remove(&base) {
          self
            .keys
            .extend(children.into_iter().filter(|c| !self.checked.contains(c)));
        }
      }
    }
    self.keys.remove(key);
    self.checked.insert(key.clone());
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// A reference record with the observed content loaded for its key.
struct Loaded<R, C> {
  reference: R,
  key:       ContentKey,
  content:   Result<Option<C>, String>,
}

/// The check stage's verdict. `observation` is `None` when the checker's
/// output was dropped.
struct Checked {
  key:         ContentKey,
  observation: Option<Observation>,
}

/// Audits one reference type: dumps from `D`, parsed by `P`, compared against
/// content from `S`.
pub struct ReportEngine<D, P, S> {
  reference_type: ReferenceType,
  source:         Arc<D>,
  parser:         Arc<P>,
  content:        Arc<S>,
  registry:       Arc<CheckerRegistry>,
  config:         EngineConfig,
}

impl<D, P, S> ReportEngine<D, P, S>
where
  D: DumpSource + 'static,
  P: FragmentParser<Fragment = D::Fragment> + 'static,
  S: ContentDataService + 'static,
{
  pub fn new(
    reference_type: ReferenceType,
    source: Arc<D>,
    parser: P,
    content: Arc<S>,
    registry: Arc<CheckerRegistry>,
    config: EngineConfig,
  ) -> Self {
    Self { reference_type, source, parser: Arc::new(parser), content, registry, config }
  }

  /// The newest complete dump whose datetime falls in `window`.
  pub async fn select_dump(&self, window: RunWindow) -> Result<Dump<D::Fragment>> {
    let dumps = self
      .source
      .pending_dumps(self.reference_type)
      .await
      .map_err(Error::Collaborator)?;
    let pending = dumps.len();
    dumps
      .into_iter()
      .filter(|d| d.is_complete() && window.contains(d.id.dump_datetime))
      .max_by_key(|d| d.id.dump_datetime)
      .ok_or_else(|| Error::ReferenceDataNotFound {
        reference_type: self.reference_type,
        detail:         format!(
          "no complete dump between {} and {} ({pending} pending)",
          window.from, window.to
        ),
      })
  }

  /// Every base key the dump is expected to cover.
  async fn universe(&self, scope: DumpScope) -> Result<BTreeSet<ContentKey>> {
    let DumpScope::Session(session) = scope else {
      return Ok(BTreeSet::new());
    };
    let mut keys = BTreeSet::new();
    let mut page = LimitOffset::new(KEY_PAGE_SIZE, 0);
    loop {
      let batch = self
        .content
        .list_keys(session, page)
        .await
        .map_err(Error::Collaborator)?;
      let full = batch.len() >= KEY_PAGE_SIZE as usize;
      keys.extend(batch);
      if !full {
        break;
      }
      page = page.next();
    }
    Ok(keys)
  }

  /// Unit keys still owed an observation after the pipeline: unexpanded bases
  /// are replaced by their children, or kept when they have none.
  async fn remaining_keys(&self, unchecked: Unchecked) -> BTreeSet<ContentKey> {
    let mut remaining = BTreeSet::new();
    for key in unchecked.keys {
      if key.base() != key {
        remaining.insert(key);
        continue;
      }
      let children = match self.content.get_content(&key).await {
        Ok(Some(content)) => self.content.child_keys(&content),
        Ok(None) => Vec::new(),
        Err(e) => {
          warn!(%key, error = %e, "failed to expand unchecked key");
          Vec::new()
        }
      };
      if children.is_empty() {
        remaining.insert(key);
      } else {
        remaining.extend(children);
      }
    }
    remaining.retain(|k| !unchecked.checked.contains(k));
    remaining
  }

  /// Run the audit and return the report with the dump it was built from.
  pub async fn run(
    &self,
    window: RunWindow,
    cancel: CancellationToken,
  ) -> Result<(Report, Dump<D::Fragment>)> {
    let reference_type = self.reference_type;
    let dump = self.select_dump(window).await?;
    let checker = self.registry.get::<S::Content, P::Reference>(reference_type)?;
    let universe = self.universe(dump.id.scope).await?;
    info!(
      %reference_type,
      dump = %dump.id.dump_datetime,
      fragments = dump.fragments.len(),
      universe = universe.len(),
      "starting spotcheck run"
    );

    let tracker = Arc::new(Mutex::new(Unchecked::new(universe)));
    let dump_id = Arc::new(dump.id.clone());

    let parse = {
      let (source, parser) = (self.source.clone(), self.parser.clone());
      move |fragment: D::Fragment| {
        let (source, parser, dump_id) = (source.clone(), parser.clone(), dump_id.clone());
        async move {
          let content = source.read_fragment(&fragment).await.map_err(Error::Collaborator)?;
          let records = parser.parse(&dump_id, &fragment, &content)?;
          debug!(records = records.len(), "parsed fragment");
          Ok::<_, Error>(records)
        }
      }
    };

    let load = {
      let content = self.content.clone();
      move |reference: P::Reference| {
        let content = content.clone();
        async move {
          let key = reference.key();
          let loaded = content.get_content(&key).await.map_err(|e| {
            warn!(%key, error = %e, "failed to load observed content");
            e.to_string()
          });
          Ok::<_, Infallible>(vec![Loaded { reference, key, content: loaded }])
        }
      }
    };

    let check = {
      let (content, tracker) = (self.content.clone(), tracker.clone());
      move |loaded: Loaded<P::Reference, S::Content>| {
        let (checker, content, tracker) = (checker.clone(), content.clone(), tracker.clone());
        async move {
          let Loaded { reference, key, content: observed } = loaded;
          tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mark_checked(&key, || match &observed {
              Ok(Some(c)) => Some(content.child_keys(c)),
              _ => None,
            });

          let observed_at = Utc::now();
          let observation = match observed {
            Ok(Some(c)) => match checker.check(&c, &reference, observed_at) {
              Ok(observation) => Some(observation),
              Err(e @ Error::InvalidMismatchForReferenceType { .. }) => {
                warn!(%key, error = %e, "dropping observation");
                None
              }
              Err(e) => return Err(e),
            },
            Ok(None) | Err(_) => Some(Observation::observe_data_missing(
              reference.reference_id(),
              key.clone(),
              observed_at,
            )),
          };
          Ok(vec![Checked { key, observation }])
        }
      }
    };

    let handle = PipelineBuilder::new()
      .add_task(TaskConfig::new("parse"), parse)
      .add_task(
        TaskConfig::new("load")
          .queue_size(self.config.ref_queue_size)
          .workers(self.config.loader_workers),
        load,
      )
      .add_task(TaskConfig::new("check").queue_size(self.config.data_queue_size), check)
      .build()
      .run_with_cancel(dump.fragments.clone(), cancel.clone());
    let checked = handle.join().await.map_err(from_pipeline)?;

    let unchecked = std::mem::take(&mut *tracker.lock().unwrap_or_else(PoisonError::into_inner));
    let remaining = self.remaining_keys(unchecked).await;

    let reference_id = dump.id.reference_id();
    let mut observations = Vec::with_capacity(checked.len() + remaining.len());
    let mut dropped = Vec::new();
    for Checked { key, observation } in checked {
      match observation {
        Some(observation) => observations.push(observation),
        None => dropped.push(key),
      }
    }

    let observed_at = Utc::now();
    for key in remaining {
      if cancel.is_cancelled() {
        return Err(Error::Cancelled);
      }
      let status = self
        .content
        .publish_status(&key)
        .await
        .map_err(Error::Collaborator)?;
      observations.push(if status.published {
        Observation::reference_missing(reference_id, key, observed_at)
      } else {
        Observation::new(reference_id, key, observed_at)
      });
    }

    let mut report = Report::new(ReportId::new(reference_type, dump.id.dump_datetime, Utc::now()));
    report.notes = dump.id.notes.clone();
    for key in dropped {
      report.add_checked_key(key);
    }
    report.add_observations(observations)?;

    info!(
      %reference_type,
      checked_keys = report.checked_keys().len(),
      observations = report.observation_count(),
      mismatches = report.mismatch_count(),
      "spotcheck run finished"
    );
    Ok((report, dump))
  }
}

#[async_trait]
impl<D, P, S> Audit for ReportEngine<D, P, S>
where
  D: DumpSource + 'static,
  P: FragmentParser<Fragment = D::Fragment> + 'static,
  S: ContentDataService + 'static,
{
  fn reference_type(&self) -> ReferenceType { self.reference_type }

  async fn generate(&self, window: RunWindow, cancel: CancellationToken) -> Result<PendingReport> {
    let (report, dump) = self.run(window, cancel).await?;
    let source = self.source.clone();
    Ok(PendingReport::new(report, async move {
      source.set_processed(&dump).await.map_err(Error::Collaborator)
    }))
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use std::collections::BTreeMap;

  use chrono::TimeZone as _;
  use spotcheck_core::{
    BoxError,
    check::{Checker, Comparison},
    content::PublishStatus,
    key::{BaseBillId, BillId, SessionYear},
    mismatch::MismatchType,
    reference::ReferenceId,
    service::DumpId,
  };

  use super::*;

  pub(crate) fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 3, day, 12, 0, 0).unwrap()
  }

  pub(crate) fn bill(print_no: &str) -> ContentKey { BillId::parse(print_no, 2023).unwrap().into() }

  pub(crate) fn base(print_no: &str) -> ContentKey {
    BaseBillId::new(print_no, 2023).unwrap().into()
  }

  // ── Fakes ─────────────────────────────────────────────────────────────────

  /// Dumps whose fragments are their own content: `print_no|title` lines.
  #[derive(Default)]
  pub(crate) struct MemDumps {
    pub(crate) dumps:     Mutex<Vec<Dump<String>>>,
    pub(crate) processed: Mutex<Vec<DateTime<Utc>>>,
  }

  impl MemDumps {
    pub(crate) fn with(dumps: Vec<Dump<String>>) -> Arc<Self> {
      Arc::new(Self { dumps: Mutex::new(dumps), ..Default::default() })
    }
  }

  pub(crate) fn dump(dt: DateTime<Utc>, fragment_count: usize, fragments: &[&str]) -> Dump<String> {
    Dump {
      id:        DumpId {
        reference_type: ReferenceType::SenateSiteBills,
        dump_datetime: dt,
        scope: DumpScope::Session(SessionYear::of(2023)),
        fragment_count,
        notes: None,
      },
      fragments: fragments.iter().map(|f| f.to_string()).collect(),
    }
  }

  impl DumpSource for MemDumps {
    type Fragment = String;

    async fn pending_dumps(
      &self,
      _reference_type: ReferenceType,
    ) -> Result<Vec<Dump<String>>, BoxError> {
      let processed = self.processed.lock().unwrap().clone();
      Ok(
        self
          .dumps
          .lock()
          .unwrap()
          .iter()
          .filter(|d| !processed.contains(&d.id.dump_datetime))
          .cloned()
          .collect(),
      )
    }

    async fn read_fragment<'a>(&'a self, fragment: &'a String) -> Result<String, BoxError> {
      Ok(fragment.clone())
    }

    async fn set_processed<'a>(&'a self, dump: &'a Dump<String>) -> Result<(), BoxError> {
      self.processed.lock().unwrap().push(dump.id.dump_datetime);
      Ok(())
    }
  }

  pub(crate) struct Line {
    reference_id: ReferenceId,
    key:          ContentKey,
    title:        String,
  }

  impl ReferenceRecord for Line {
    fn reference_id(&self) -> ReferenceId { self.reference_id }

    fn key(&self) -> ContentKey { self.key.clone() }
  }

  pub(crate) struct LineParser;

  impl FragmentParser for LineParser {
    type Fragment = String;
    type Reference = Line;

    fn parse(&self, dump: &DumpId, _fragment: &String, content: &str) -> Result<Vec<Line>> {
      content
        .lines()
        .map(|line| {
          let (print_no, title) = line
            .split_once('|')
            .ok_or_else(|| Error::ParseError(format!("bad line {line:?}")))?;
          Ok(Line {
            reference_id: dump.reference_id(),
            key:          BillId::parse(print_no, 2023)?.into(),
            title:        title.to_owned(),
          })
        })
        .collect()
    }
  }

  #[derive(Clone)]
  pub(crate) struct Doc {
    pub(crate) title:     String,
    pub(crate) children:  Vec<ContentKey>,
    pub(crate) published: bool,
  }

  /// Content keyed by base key. Keys in `failing` error on load.
  #[derive(Default)]
  pub(crate) struct Docs {
    pub(crate) docs:    BTreeMap<ContentKey, Doc>,
    pub(crate) failing: BTreeSet<ContentKey>,
  }

  impl Docs {
    pub(crate) fn add(&mut self, print_no: &str, title: &str, versions: &[&str], published: bool) {
      self.docs.insert(base(print_no), Doc {
        title: title.to_owned(),
        children: versions.iter().map(|v| bill(&format!("{print_no}{v}"))).collect(),
        published,
      });
    }
  }

  impl ContentDataService for Docs {
    type Content = Doc;

    async fn get_content<'a>(&'a self, key: &'a ContentKey) -> Result<Option<Doc>, BoxError> {
      if self.failing.contains(key) {
        return Err("content store unreachable".into());
      }
      Ok(self.docs.get(&key.base()).cloned())
    }

    async fn list_keys(
      &self,
      _session: SessionYear,
      page: LimitOffset,
    ) -> Result<Vec<ContentKey>, BoxError> {
      Ok(
        self
          .docs
          .keys()
          .skip(page.offset as usize)
          .take(page.limit.map_or(usize::MAX, |l| l as usize))
          .cloned()
          .collect(),
      )
    }

    async fn publish_status<'a>(&'a self, key: &'a ContentKey) -> Result<PublishStatus, BoxError> {
      Ok(match self.docs.get(&key.base()) {
        Some(doc) if doc.published => PublishStatus::published(),
        _ => PublishStatus::unpublished(),
      })
    }

    fn child_keys(&self, content: &Doc) -> Vec<ContentKey> { content.children.clone() }
  }

  /// Compares titles. A reference title of `!` raises a mismatch type the
  /// reference type does not check.
  pub(crate) struct TitleChecker;

  impl Checker<Doc, Line> for TitleChecker {
    fn reference_type(&self) -> ReferenceType { ReferenceType::SenateSiteBills }

    fn check(&self, doc: &Doc, line: &Line, observed_at: DateTime<Utc>) -> Result<Observation> {
      let mut c = Comparison::new(line.reference_id, line.key.clone(), observed_at);
      if line.title == "!" {
        c.check_string(MismatchType::CalendarFloorDate, Some("a"), Some("b"))?;
      }
      c.check_string(MismatchType::BillTitle, Some(&doc.title), Some(&line.title))?;
      Ok(c.finish())
    }
  }

  pub(crate) fn registry() -> Arc<CheckerRegistry> {
    Arc::new(CheckerRegistry::builder().register(TitleChecker).unwrap().build())
  }

  pub(crate) type TestEngine = ReportEngine<MemDumps, LineParser, Docs>;

  pub(crate) fn engine(dumps: Arc<MemDumps>, docs: Docs) -> TestEngine {
    ReportEngine::new(
      ReferenceType::SenateSiteBills,
      dumps,
      LineParser,
      Arc::new(docs),
      registry(),
      EngineConfig { ref_queue_size: 2, data_queue_size: 2, loader_workers: 3 },
    )
  }

  fn types(report: &Report, key: &ContentKey) -> BTreeSet<MismatchType> {
    report.observation(key).unwrap().mismatch_types(false)
  }

  // ── Tests ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn unlisted_keys_are_reference_missing_or_quietly_checked() {
    let mut docs = Docs::default();
    docs.add("S100", "FOO", &[""], true);
    docs.add("S200", "X", &[], true);
    docs.add("S300", "Y", &[], false);
    let engine = engine(MemDumps::with(vec![dump(at(1), 1, &["S100|FOO"])]), docs);

    let (report, _) = engine.run(RunWindow::all(), CancellationToken::new()).await.unwrap();

    assert!(types(&report, &bill("S100")).is_empty());
    assert_eq!(
      types(&report, &base("S200")),
      BTreeSet::from([MismatchType::ReferenceDataMissing])
    );
    assert!(types(&report, &base("S300")).is_empty());
    assert_eq!(
      report.checked_keys(),
      &BTreeSet::from([bill("S100"), base("S200"), base("S300")])
    );
  }

  #[tokio::test]
  async fn first_check_of_a_base_expands_its_amendments() {
    let mut docs = Docs::default();
    docs.add("S100", "FOO", &["", "A"], true);
    let engine = engine(MemDumps::with(vec![dump(at(1), 1, &["S100|FOO"])]), docs);

    let (report, _) = engine.run(RunWindow::all(), CancellationToken::new()).await.unwrap();

    assert_eq!(report.checked_keys(), &BTreeSet::from([bill("S100"), bill("S100A")]));
    assert_eq!(
      types(&report, &bill("S100A")),
      BTreeSet::from([MismatchType::ReferenceDataMissing])
    );
    assert!(report.observation(&base("S100")).is_none());
  }

  #[tokio::test]
  async fn mismatches_and_load_failures_are_observed() {
    let mut docs = Docs::default();
    docs.add("S100", "BAR", &[""], true);
    docs.add("S200", "X", &[""], true);
    docs.failing.insert(bill("S200"));
    let engine = engine(
      MemDumps::with(vec![dump(at(1), 2, &["S100|FOO", "S200|X\nS999|Z"])]),
      docs,
    );

    let (report, _) = engine.run(RunWindow::all(), CancellationToken::new()).await.unwrap();

    let m = report
      .observation(&bill("S100"))
      .and_then(|o| o.mismatch(MismatchType::BillTitle))
      .unwrap();
    assert_eq!((m.observed.as_str(), m.reference.as_str()), ("BAR", "FOO"));
    for key in [bill("S200"), bill("S999")] {
      assert_eq!(types(&report, &key), BTreeSet::from([MismatchType::ObserveDataMissing]));
    }
    for obs in report.observations() {
      assert_eq!(obs.reference_type(), ReferenceType::SenateSiteBills);
      assert!(obs.observed_datetime <= report.run_datetime());
    }
  }

  #[tokio::test]
  async fn invalid_mismatches_are_dropped_but_the_key_is_checked() {
    let mut docs = Docs::default();
    docs.add("S100", "FOO", &[""], true);
    let engine = engine(MemDumps::with(vec![dump(at(1), 1, &["S100|!"])]), docs);

    let (report, _) = engine.run(RunWindow::all(), CancellationToken::new()).await.unwrap();
    assert!(report.observation(&bill("S100")).is_none());
    assert!(report.checked_keys().contains(&bill("S100")));
  }

  #[tokio::test]
  async fn newest_complete_dump_in_window_is_selected() {
    let dumps = MemDumps::with(vec![
      dump(at(1), 1, &["S100|OLD"]),
      dump(at(3), 1, &["S100|NEW"]),
      dump(at(5), 2, &["S100|PARTIAL"]),
      dump(at(9), 1, &["S100|LATER"]),
    ]);
    let mut docs = Docs::default();
    docs.add("S100", "NEW", &[""], true);
    let engine = engine(dumps, docs);

    let (report, dump) = engine
      .run(RunWindow::new(at(1), at(6)), CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(dump.id.dump_datetime, at(3));
    assert_eq!(report.id.reference_datetime, at(3));
    assert!(types(&report, &bill("S100")).is_empty());
  }

  #[tokio::test]
  async fn missing_reference_data_fails_the_run() {
    let engine = engine(MemDumps::with(vec![dump(at(1), 3, &["S100|FOO"])]), Docs::default());
    let err = engine.run(RunWindow::all(), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::ReferenceDataNotFound { .. }));
  }

  #[tokio::test]
  async fn parse_errors_abort_the_run() {
    let engine = engine(MemDumps::with(vec![dump(at(1), 1, &["garbage"])]), Docs::default());
    let err = engine.run(RunWindow::all(), CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::ParseError(_)));
  }

  #[tokio::test]
  async fn cancelled_runs_return_nothing() {
    let mut docs = Docs::default();
    docs.add("S100", "FOO", &[""], true);
    let engine = engine(MemDumps::with(vec![dump(at(1), 1, &["S100|FOO"])]), docs);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine.run(RunWindow::all(), cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
  }

  #[tokio::test]
  async fn dumps_are_marked_processed_only_when_finished() {
    let dumps = MemDumps::with(vec![dump(at(1), 1, &["S100|FOO"])]);
    let mut docs = Docs::default();
    docs.add("S100", "FOO", &[""], true);
    let engine = engine(dumps.clone(), docs);

    let pending = engine.generate(RunWindow::all(), CancellationToken::new()).await.unwrap();
    assert!(dumps.processed.lock().unwrap().is_empty());

    let (_, finish) = pending.into_parts();
    finish.await.unwrap();
    assert_eq!(*dumps.processed.lock().unwrap(), vec![at(1)]);
  }
}
