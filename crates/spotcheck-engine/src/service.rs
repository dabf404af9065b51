//! [`SpotcheckRunService`], the entry point for one audit of a reference type.
//!
//! A run generates the report, reconciles it against the current mismatch
//! records of its data source, persists it, and only then marks the
//! reference dump processed. A failed run persists nothing.

use std::{
  collections::{BTreeMap, HashSet},
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use serde::Serialize;
use spotcheck_core::{
  Error, Result,
  lifecycle::reconcile,
  mismatch::MismatchStatus,
  reference::ReferenceType,
  report::ReportId,
  store::ReportStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::{Audit, RunWindow};

/// Counts describing a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
  pub report_id:    ReportId,
  pub checked_keys: usize,
  pub observations: usize,
  pub new:          usize,
  pub existing:     usize,
  pub resolved:     usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
  Completed(RunSummary),
  /// A run of the same reference type was already in flight; no second run
  /// was started.
  Coalesced,
}

// ─── In-flight guard ─────────────────────────────────────────────────────────

struct InFlight<'a> {
  running:        &'a Mutex<HashSet<ReferenceType>>,
  reference_type: ReferenceType,
}

impl<'a> InFlight<'a> {
  fn acquire(
    running: &'a Mutex<HashSet<ReferenceType>>,
    reference_type: ReferenceType,
  ) -> Option<Self> {
    let inserted = running.lock().unwrap_or_else(PoisonError::into_inner).insert(reference_type);
    inserted.then_some(Self { running, reference_type })
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) {
    self.running.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.reference_type);
  }
}

// ─── Service ─────────────────────────────────────────────────────────────────

struct Inner<R> {
  store:     R,
  audits:    BTreeMap<ReferenceType, Arc<dyn Audit>>,
  in_flight: Mutex<HashSet<ReferenceType>>,
  deadline:  Option<Duration>,
  shutdown:  CancellationToken,
}

pub struct SpotcheckRunService<R> {
  inner: Arc<Inner<R>>,
}

impl<R> Clone for SpotcheckRunService<R> {
  fn clone(&self) -> Self { Self { inner: self.inner.clone() } }
}

pub struct SpotcheckRunServiceBuilder<R> {
  store:    R,
  audits:   BTreeMap<ReferenceType, Arc<dyn Audit>>,
  deadline: Option<Duration>,
  shutdown: CancellationToken,
}

impl<R: ReportStore> SpotcheckRunServiceBuilder<R> {
  /// Register the audit for its reference type, replacing any earlier one.
  pub fn register(mut self, audit: impl Audit + 'static) -> Self {
    self.audits.insert(audit.reference_type(), Arc::new(audit));
    self
  }

  /// Runs still generating after `deadline` are cancelled.
  pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
    self.deadline = deadline;
    self
  }

  /// Cancelling `token` cancels every run in flight.
  pub fn shutdown(mut self, token: CancellationToken) -> Self {
    self.shutdown = token;
    self
  }

  pub fn build(self) -> SpotcheckRunService<R> {
    SpotcheckRunService {
      inner: Arc::new(Inner {
        store:     self.store,
        audits:    self.audits,
        in_flight: Mutex::new(HashSet::new()),
        deadline:  self.deadline,
        shutdown:  self.shutdown,
      }),
    }
  }
}

impl<R: ReportStore> SpotcheckRunService<R> {
  pub fn builder(store: R) -> SpotcheckRunServiceBuilder<R> {
    SpotcheckRunServiceBuilder {
      store,
      audits: BTreeMap::new(),
      deadline: None,
      shutdown: CancellationToken::new(),
    }
  }

  pub fn store(&self) -> &R { &self.inner.store }

  pub fn reference_types(&self) -> Vec<ReferenceType> {
    self.inner.audits.keys().copied().collect()
  }

  pub fn handles(&self, reference_type: ReferenceType) -> bool {
    self.inner.audits.contains_key(&reference_type)
  }

  /// Audit `reference_type` against the newest complete dump in `window`.
  ///
  /// Concurrent calls for one reference type coalesce: the later call returns
  /// [`RunOutcome::Coalesced`] without running.
  pub async fn run(&self, reference_type: ReferenceType, window: RunWindow) -> Result<RunOutcome> {
    let audit = self
      .inner
      .audits
      .get(&reference_type)
      .cloned()
      .ok_or(Error::CheckerNotRegistered(reference_type))?;
    let Some(_guard) = InFlight::acquire(&self.inner.in_flight, reference_type) else {
      info!(%reference_type, "run already in flight, coalescing");
      return Ok(RunOutcome::Coalesced);
    };

    let cancel = self.inner.shutdown.child_token();
    let generate = audit.generate(window, cancel.clone());
    let pending = match self.inner.deadline {
      Some(deadline) => match tokio::time::timeout(deadline, generate).await {
        Ok(pending) => pending?,
        Err(_) => {
          cancel.cancel();
          warn!(%reference_type, ?deadline, "run exceeded its deadline");
          return Err(Error::Cancelled);
        }
      },
      None => generate.await?,
    };
    let (mut report, finish) = pending.into_parts();

    let current = self
      .inner
      .store
      .current_mismatches(reference_type.data_source())
      .await
      .map_err(Into::<Error>::into)?;
    let reconciliation = reconcile(&mut report, &current)?;
    self.inner.store.save_report(&report).await.map_err(Into::<Error>::into)?;
    finish.await?;

    let summary = RunSummary {
      report_id:    report.id,
      checked_keys: report.checked_keys().len(),
      observations: report.observation_count(),
      new:          reconciliation.count(MismatchStatus::New),
      existing:     reconciliation.count(MismatchStatus::Existing),
      resolved:     reconciliation.count(MismatchStatus::Resolved),
    };
    info!(
      %reference_type,
      report = %summary.report_id,
      new = summary.new,
      existing = summary.existing,
      resolved = summary.resolved,
      "report saved"
    );
    Ok(RunOutcome::Completed(summary))
  }
}
