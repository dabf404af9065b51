//! Runtime configuration, deserialized by the binary from TOML and the
//! environment.
//!
//! Keys are snake_case; the camelCase names used by earlier deployments
//! (`scrapedStagingDir`, `spotcheckScheduled`, ...) are accepted as aliases.

use std::{
  collections::BTreeSet,
  path::PathBuf,
  sync::{Arc, atomic::AtomicBool},
  time::Duration,
};

use serde::Deserialize;
use spotcheck_core::reference::ReferenceType;

use crate::{dispatch::DispatchConfig, engine::EngineConfig, scheduler::SchedulerConfig};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpotcheckConfig {
  #[serde(alias = "databasePath")]
  pub database_path:                PathBuf,
  #[serde(alias = "scrapedStagingDir")]
  pub scraped_staging_dir:          PathBuf,
  #[serde(alias = "archiveDir")]
  pub archive_dir:                  PathBuf,
  #[serde(alias = "senateSiteDumpDir")]
  pub senate_site_dump_dir:         PathBuf,
  #[serde(alias = "contentDir")]
  pub content_dir:                  PathBuf,
  #[serde(alias = "sensiteBillRefQueueSize")]
  pub sensite_bill_ref_queue_size:  usize,
  #[serde(alias = "sensiteBillDataQueueSize")]
  pub sensite_bill_data_queue_size: usize,
  #[serde(alias = "loaderWorkers")]
  pub loader_workers:               usize,
  #[serde(alias = "spotcheckScheduled")]
  pub spotcheck_scheduled:          bool,
  #[serde(alias = "referenceTypes")]
  pub reference_types:              BTreeSet<ReferenceType>,
  #[serde(alias = "auditIntervalSecs")]
  pub audit_interval_secs:          u64,
  #[serde(alias = "auditWindowDays")]
  pub audit_window_days:            u32,
  #[serde(alias = "runDeadlineSecs")]
  pub run_deadline_secs:            Option<u64>,
  pub scrape:                       ScrapeConfig,
}

impl Default for SpotcheckConfig {
  fn default() -> Self {
    Self {
      database_path:                PathBuf::from("spotcheck.db"),
      scraped_staging_dir:          PathBuf::from("data/staging"),
      archive_dir:                  PathBuf::from("data/archive"),
      senate_site_dump_dir:         PathBuf::from("data/senate-site"),
      content_dir:                  PathBuf::from("data/content"),
      sensite_bill_ref_queue_size:  100,
      sensite_bill_data_queue_size: 100,
      loader_workers:               2,
      spotcheck_scheduled:          true,
      reference_types:              BTreeSet::from([
        ReferenceType::SenateSiteBills,
        ReferenceType::SenateSiteCalendar,
        ReferenceType::SenateSiteAgenda,
        ReferenceType::LbdcScrapedBill,
      ]),
      audit_interval_secs:          7 * 24 * 60 * 60,
      audit_window_days:            7,
      run_deadline_secs:            None,
      scrape:                       ScrapeConfig::default(),
    }
  }
}

impl SpotcheckConfig {
  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig {
      ref_queue_size:  self.sensite_bill_ref_queue_size,
      data_queue_size: self.sensite_bill_data_queue_size,
      loader_workers:  self.loader_workers,
    }
  }

  pub fn run_deadline(&self) -> Option<Duration> {
    self.run_deadline_secs.map(Duration::from_secs)
  }

  pub fn scheduler_config(&self) -> SchedulerConfig {
    SchedulerConfig {
      enabled:         Arc::new(AtomicBool::new(self.spotcheck_scheduled)),
      interval:        Duration::from_secs(self.audit_interval_secs.max(1)),
      window_days:     self.audit_window_days,
      reference_types: self.reference_types.clone(),
    }
  }

  pub fn dispatch_config(&self) -> DispatchConfig {
    DispatchConfig {
      poll_interval: Duration::from_millis(self.scrape.poll_interval_ms),
      max_attempts:  self.scrape.max_attempts.max(1),
      base_backoff:  Duration::from_millis(self.scrape.base_backoff_ms),
      max_backoff:   Duration::from_millis(self.scrape.max_backoff_ms),
    }
  }
}

/// Scrape dispatch settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
  #[serde(alias = "pollIntervalMs")]
  pub poll_interval_ms: u64,
  #[serde(alias = "maxAttempts")]
  pub max_attempts:     u32,
  #[serde(alias = "baseBackoffMs")]
  pub base_backoff_ms:  u64,
  #[serde(alias = "maxBackoffMs")]
  pub max_backoff_ms:   u64,
  /// Page URL with `{printNo}` and `{session}` placeholders.
  #[serde(alias = "lrsUrlTemplate")]
  pub lrs_url_template: String,
}

impl Default for ScrapeConfig {
  fn default() -> Self {
    Self {
      poll_interval_ms: 5_000,
      max_attempts:     3,
      base_backoff_ms:  1_000,
      max_backoff_ms:   60_000,
      lrs_url_template: "https://public.leginfo.state.ny.us/navigate.cgi?NVDTO:=&QUERYDATA=\
                         {printNo}&QUERYTYPE=BILLNO+&SESSYR={session}&CBTEXT=Y&CBSPONMEMO=Y"
        .to_owned(),
    }
  }
}
