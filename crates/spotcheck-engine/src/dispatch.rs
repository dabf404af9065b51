//! [`ScrapeDispatcher`], the worker draining the scrape queue.
//!
//! The head of the queue is peeked, fetched and staged; only a staged entry is
//! removed. Fetch failures are retried with capped exponential backoff and
//! jitter. An entry that exhausts its attempts is moved to the dead-letter
//! table so it cannot block the queue. Cancellation interrupts a fetch or a
//! backoff wait and leaves the entry queued.

use std::time::Duration;

use chrono::Utc;
use rand_core::{OsRng, RngCore};
use spotcheck_checks::lrs;
use spotcheck_core::{
  BoxError, Error, Result,
  key::ContentKey,
  scrape::{DeadLetter, ScrapeFile, ScrapeQueueEntry},
  service::Scraper,
  store::ReferenceStore,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
  /// Wait between polls of an empty queue.
  pub poll_interval: Duration,
  pub max_attempts:  u32,
  pub base_backoff:  Duration,
  pub max_backoff:   Duration,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self {
      poll_interval: Duration::from_secs(5),
      max_attempts:  3,
      base_backoff:  Duration::from_secs(1),
      max_backoff:   Duration::from_secs(60),
    }
  }
}

/// Delay before retry number `attempt` (from 1): `base * 2^(attempt-1)`
/// capped at `max`, of which the upper half is random.
pub fn backoff(config: &DispatchConfig, attempt: u32) -> Duration {
  let shift = attempt.saturating_sub(1).min(16);
  let capped = config.base_backoff.saturating_mul(1 << shift).min(config.max_backoff);
  let half = capped / 2;
  let spread = u64::try_from(half.as_millis()).unwrap_or(u64::MAX);
  let jitter = if spread == 0 { 0 } else { OsRng.next_u64() % (spread + 1) };
  half + Duration::from_millis(jitter)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
  /// The queue was empty.
  Idle,
  Scraped(ScrapeFile),
  DeadLettered(DeadLetter),
  /// Cancelled mid-fetch or mid-backoff; the entry is still queued.
  Cancelled,
}

pub struct ScrapeDispatcher<R, S> {
  store:   R,
  scraper: S,
  config:  DispatchConfig,
}

fn store_err<E: Into<Error>>(err: E) -> Error { err.into() }

impl<R: ReferenceStore, S: Scraper> ScrapeDispatcher<R, S> {
  pub fn new(store: R, scraper: S, config: DispatchConfig) -> Self {
    Self { store, scraper, config }
  }

  /// Process the head of the queue, if any.
  pub async fn dispatch_once(&self, cancel: &CancellationToken) -> Result<DispatchOutcome> {
    let entry = match self.store.dequeue_head().await.map_err(store_err) {
      Ok(entry) => entry,
      Err(Error::QueueEmpty) => return Ok(DispatchOutcome::Idle),
      Err(e) => return Err(e),
    };
    let Some(bill) = entry.key.base_bill_id() else {
      let reason = format!("{} is not a bill key", entry.key);
      return self.dead_letter(entry, 0, reason).await;
    };

    let mut last_error = String::new();
    for attempt in 1..=self.config.max_attempts {
      let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(self.interrupted(&entry)),
        fetched = self.fetch(&entry.key) => fetched,
      };
      match fetched {
        Ok(content) => {
          let file = self.store.save_content(&bill, &content).await.map_err(store_err)?;
          self.store.remove(&entry.key).await.map_err(store_err)?;
          info!(key = %entry.key, file = %file.file_name, attempt, "scraped reference page");
          return Ok(DispatchOutcome::Scraped(file));
        }
        Err(e) => {
          warn!(key = %entry.key, attempt, error = %e, "scrape attempt failed");
          last_error = e.to_string();
          if attempt < self.config.max_attempts {
            tokio::select! {
              biased;
              _ = cancel.cancelled() => return Ok(self.interrupted(&entry)),
              _ = tokio::time::sleep(backoff(&self.config, attempt)) => {}
            }
          }
        }
      }
    }
    self.dead_letter(entry, self.config.max_attempts, last_error).await
  }

  async fn fetch(&self, key: &ContentKey) -> Result<Vec<u8>, BoxError> {
    let content = self.scraper.fetch(key).await?;
    if lrs::is_outage(&String::from_utf8_lossy(&content)) {
      return Err(Box::new(Error::ReferenceSourceUnavailable("LRS served its error page".into())));
    }
    Ok(content)
  }

  fn interrupted(&self, entry: &ScrapeQueueEntry) -> DispatchOutcome {
    info!(key = %entry.key, "scrape interrupted, entry left queued");
    DispatchOutcome::Cancelled
  }

  async fn dead_letter(
    &self,
    entry: ScrapeQueueEntry,
    attempts: u32,
    last_error: String,
  ) -> Result<DispatchOutcome> {
    let letter = DeadLetter { entry, attempts, last_error, failed_datetime: Utc::now() };
    self.store.dead_letter(letter.clone()).await.map_err(store_err)?;
    error!(key = %letter.entry.key, attempts, error = %letter.last_error, "scrape dead-lettered");
    Ok(DispatchOutcome::DeadLettered(letter))
  }

  /// Drain the queue until `cancel` fires, polling while it is empty.
  pub async fn run(&self, cancel: CancellationToken) {
    info!("scrape dispatcher started");
    loop {
      let wait = match self.dispatch_once(&cancel).await {
        Ok(DispatchOutcome::Cancelled) => break,
        Ok(DispatchOutcome::Idle) => self.config.poll_interval,
        Ok(_) => Duration::ZERO,
        Err(e) => {
          error!(error = %e, "scrape dispatch failed");
          self.config.poll_interval
        }
      };
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = tokio::time::sleep(wait) => {}
      }
    }
    info!("scrape dispatcher stopped");
  }
}
