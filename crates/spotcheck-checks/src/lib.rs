//! Reference parsers and checkers for every spot-check reference type.
//!
//! Each module owns the typed records of one reference source, the parser that
//! turns a dump fragment into those records, and the [`Checker`]
//! implementations comparing them against the canonical content models of
//! [`spotcheck_core::content`]. Pure and synchronous; no file or network I/O.
//!
//! # Quick start
//!
//! ```no_run
//! use spotcheck_checks::default_registry;
//! use spotcheck_core::reference::ReferenceType;
//!
//! let registry = default_registry().unwrap();
//! assert!(registry.contains(ReferenceType::SenateSiteBills));
//! ```
//!
//! [`Checker`]: spotcheck_core::check::Checker

pub mod daybreak;
pub mod error;
pub mod lrs;
pub mod openleg;
pub mod senatesite;

use chrono::NaiveDate;
use serde::{Deserialize, de::DeserializeOwned};
use spotcheck_core::{check::CheckerRegistry, key::Chamber};

pub use error::{Error, Result};

// ─── JSON fragments ──────────────────────────────────────────────────────────

/// Every JSON dump fragment wraps its records in a `nodes` array.
#[derive(Deserialize)]
struct Nodes<T> {
  #[serde(default = "Vec::new")]
  nodes: Vec<T>,
}

/// Decode the `nodes` of one JSON dump fragment.
pub(crate) fn parse_nodes<T: DeserializeOwned>(content: &str) -> Result<Vec<T>> {
  let fragment: Nodes<T> = serde_json::from_str(content)?;
  Ok(fragment.nodes)
}

/// `2023-01-04 SENATE REFERRED TO FINANCE`
pub(crate) fn render_action(date: NaiveDate, chamber: Chamber, text: &str) -> String {
  format!("{date} {chamber} {}", text.trim().to_uppercase())
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// A registry holding the checker of every reference type.
pub fn default_registry() -> spotcheck_core::Result<CheckerRegistry> {
  Ok(
    CheckerRegistry::builder()
      .register(daybreak::DaybreakChecker)?
      .register(lrs::ScrapedBillChecker)?
      .register(senatesite::SenateSiteBillChecker)?
      .register(senatesite::SenateSiteCalendarChecker)?
      .register(senatesite::SenateSiteAgendaChecker)?
      .register(openleg::OpenlegBillChecker)?
      .build(),
  )
}


// ─── Shared test helpers ──────────────────────────────────────────────────────
