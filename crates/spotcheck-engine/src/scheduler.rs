//! Periodic audits.
//!
//! Each tick audits every configured reference type over the trailing window,
//! concurrently. The enabled flag is shared so it can be flipped at runtime;
//! a disabled scheduler ticks without running anything.

use std::{
  collections::BTreeSet,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Duration,
};

use chrono::Utc;
use futures::future::join_all;
use spotcheck_core::{Error, Result, reference::ReferenceType, store::ReportStore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
  engine::RunWindow,
  service::{RunOutcome, SpotcheckRunService},
};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  pub enabled:         Arc<AtomicBool>,
  pub interval:        Duration,
  /// Days of reference data each scheduled run may draw from.
  pub window_days:     u32,
  pub reference_types: BTreeSet<ReferenceType>,
}

pub struct Scheduler<R> {
  service: SpotcheckRunService<R>,
  config:  SchedulerConfig,
}

impl<R: ReportStore> Scheduler<R> {
  pub fn new(service: SpotcheckRunService<R>, config: SchedulerConfig) -> Self {
    Self { service, config }
  }

  pub fn is_enabled(&self) -> bool { self.config.enabled.load(Ordering::SeqCst) }

  pub fn set_enabled(&self, enabled: bool) {
    self.config.enabled.store(enabled, Ordering::SeqCst);
    info!(enabled, "scheduled audits toggled");
  }

  /// Run one round of audits. Returns each attempted reference type with its
  /// outcome; nothing is attempted while disabled.
  pub async fn tick(&self) -> Vec<(ReferenceType, Result<RunOutcome>)> {
    if !self.is_enabled() {
      debug!("scheduled audits disabled, skipping tick");
      return Vec::new();
    }
    let window = RunWindow::last_days(self.config.window_days, Utc::now());
    let types: Vec<ReferenceType> = self
      .config
      .reference_types
      .iter()
      .copied()
      .filter(|rt| {
        let handled = self.service.handles(*rt);
        if !handled {
          debug!(reference_type = %rt, "no audit registered, skipping");
        }
        handled
      })
      .collect();

    let outcomes = join_all(types.iter().map(|rt| self.service.run(*rt, window))).await;
    let results: Vec<_> = types.into_iter().zip(outcomes).collect();
    for (reference_type, outcome) in &results {
      match outcome {
        Ok(RunOutcome::Completed(summary)) => {
          info!(%reference_type, report = %summary.report_id, "scheduled audit complete")
        }
        Ok(RunOutcome::Coalesced) => {}
        Err(Error::ReferenceDataNotFound { .. }) => {
          debug!(%reference_type, "no new reference data")
        }
        Err(e) => error!(%reference_type, error = %e, "scheduled audit failed"),
      }
    }
    results
  }

  /// Tick every interval until `cancel` fires. The first tick is immediate.
  pub async fn run(&self, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(self.config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(interval = ?self.config.interval, "scheduler started");
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = interval.tick() => {
          self.tick().await;
        }
      }
    }
    info!("scheduler stopped");
  }
}
