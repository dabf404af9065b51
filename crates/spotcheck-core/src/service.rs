//! Collaborators consumed by the report engine and the scrape dispatcher.
//!
//! Implementations live outside this crate: reference dump readers and
//! scrapers in `spotcheck-engine`, parsers in `spotcheck-checks`.

use std::{future::Future, path::PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  BoxError, Result,
  content::PublishStatus,
  key::{ContentKey, SessionYear},
  reference::{ReferenceId, ReferenceType},
  store::LimitOffset,
};

// ─── Content data ────────────────────────────────────────────────────────────

/// The system's canonical content.
pub trait ContentDataService: Send + Sync {
  type Content: Send + Sync + 'static;

  /// Content for `key`, or `None` when it does not exist.
  fn get_content<'a>(
    &'a self,
    key: &'a ContentKey,
  ) -> impl Future<Output = Result<Option<Self::Content>, BoxError>> + Send + 'a;

  /// One page of the base keys belonging to `session`.
  fn list_keys(
    &self,
    session: SessionYear,
    page: LimitOffset,
  ) -> impl Future<Output = Result<Vec<ContentKey>, BoxError>> + Send + '_;

  fn publish_status<'a>(
    &'a self,
    key: &'a ContentKey,
  ) -> impl Future<Output = Result<PublishStatus, BoxError>> + Send + 'a;

  /// Keys of the units that make up `content` (a bill's amendments). Empty
  /// when the content is checked as a whole.
  fn child_keys(&self, content: &Self::Content) -> Vec<ContentKey>;
}

// ─── Scraper ─────────────────────────────────────────────────────────────────

/// Fetches a fresh reference page for a key. Failures may be transient.
pub trait Scraper: Send + Sync {
  fn fetch<'a>(
    &'a self,
    key: &'a ContentKey,
  ) -> impl Future<Output = Result<Vec<u8>, BoxError>> + Send + 'a;
}

// ─── Reference dumps ─────────────────────────────────────────────────────────

/// Which content keys a dump is expected to cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "session", rename_all = "snake_case")]
pub enum DumpScope {
  /// Every key of the session; keys the dump omits are reported.
  Session(SessionYear),
  /// Only the keys the dump itself lists.
  Referenced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpId {
  pub reference_type: ReferenceType,
  pub dump_datetime:  DateTime<Utc>,
  pub scope:          DumpScope,
  /// Fragments the dump declares. The dump is complete once all are present.
  pub fragment_count: usize,
  pub notes:          Option<String>,
}

impl DumpId {
  pub fn reference_id(&self) -> ReferenceId {
    ReferenceId::new(self.reference_type, self.dump_datetime)
  }
}

/// One file of a multi-fragment dump, numbered from 1.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DumpFragment {
  pub seq_no: usize,
  pub path:   PathBuf,
}

/// A multi-fragment reference artifact.
#[derive(Debug, Clone)]
pub struct Dump<F> {
  pub id:        DumpId,
  pub fragments: Vec<F>,
}

impl<F> Dump<F> {
  pub fn is_complete(&self) -> bool { self.fragments.len() >= self.id.fragment_count }
}

/// Enumerates reference dumps and their fragments.
///
/// Fragments are lightweight handles; their content is read lazily by the
/// parse stage.
pub trait DumpSource: Send + Sync {
  type Fragment: Clone + Send + Sync + 'static;

  /// Dumps not yet processed, complete or still accumulating.
  fn pending_dumps(
    &self,
    reference_type: ReferenceType,
  ) -> impl Future<Output = Result<Vec<Dump<Self::Fragment>>, BoxError>> + Send + '_;

  fn read_fragment<'a>(
    &'a self,
    fragment: &'a Self::Fragment,
  ) -> impl Future<Output = Result<String, BoxError>> + Send + 'a;

  /// Mark a dump consumed so it is not selected again.
  fn set_processed<'a>(
    &'a self,
    dump: &'a Dump<Self::Fragment>,
  ) -> impl Future<Output = Result<(), BoxError>> + Send + 'a;
}

/// A parsed reference record.
pub trait ReferenceRecord {
  fn reference_id(&self) -> ReferenceId;

  fn key(&self) -> ContentKey;
}

/// Turns one fragment's content into reference records. Pure.
pub trait FragmentParser: Send + Sync {
  type Fragment;
  type Reference: ReferenceRecord + Send + Sync + 'static;

  fn parse(
    &self,
    dump: &DumpId,
    fragment: &Self::Fragment,
    content: &str,
  ) -> Result<Vec<Self::Reference>>;
}
