//! Filesystem-backed content data service.
//!
//! Each unit of content is one JSON document under
//! `<content_dir>/<model dir>/`, wrapped with its publish flag:
//!
//! ```json
//! { "published": true, "content": { ... } }
//! ```

use std::{
  collections::BTreeSet,
  marker::PhantomData,
  path::{Path, PathBuf},
};

use serde::{Deserialize, de::DeserializeOwned};
use spotcheck_core::{
  BoxError,
  content::{Bill, CalendarEntryList, CommitteeAgenda, PublishStatus},
  key::{ContentKey, SessionYear},
  service::ContentDataService,
  store::LimitOffset,
};
use tracing::warn;

use crate::Result;

// ─── Content models ──────────────────────────────────────────────────────────

/// A content type the filesystem service can serve.
pub trait ContentModel: DeserializeOwned + Send + Sync + 'static {
  /// Subdirectory of the content directory holding this type.
  const DIR: &'static str;

  fn key(&self) -> ContentKey;

  fn in_session(&self, session: SessionYear) -> bool;

  fn child_keys(&self) -> Vec<ContentKey> { Vec::new() }

  /// Publish status of `key`, a key of this content, given the document's
  /// own flag.
  fn publish_status(&self, _key: &ContentKey, published: bool) -> PublishStatus {
    if published { PublishStatus::published() } else { PublishStatus::unpublished() }
  }
}

impl ContentModel for Bill {
  const DIR: &'static str = "bills";

  fn key(&self) -> ContentKey { self.base_bill_id.clone().into() }

  fn in_session(&self, session: SessionYear) -> bool { self.base_bill_id.session == session }

  fn child_keys(&self) -> Vec<ContentKey> {
    self.amendment_ids().into_iter().map(ContentKey::from).collect()
  }

  /// Amendments with a recorded status use it; otherwise the document flag
  /// applies.
  fn publish_status(&self, key: &ContentKey, published: bool) -> PublishStatus {
    if !published {
      return PublishStatus::unpublished();
    }
    match key.bill_id().and_then(|id| self.publish_statuses.get(&id.version)) {
      Some(status) => *status,
      None => PublishStatus::published(),
    }
  }
}

impl ContentModel for CalendarEntryList {
  const DIR: &'static str = "calendars";

  fn key(&self) -> ContentKey { self.id.clone().into() }

  fn in_session(&self, session: SessionYear) -> bool { session.contains(self.id.year) }
}

impl ContentModel for CommitteeAgenda {
  const DIR: &'static str = "agendas";

  fn key(&self) -> ContentKey { self.key.clone().into() }

  fn in_session(&self, session: SessionYear) -> bool { session.contains(self.key.year) }
}

#[derive(Debug, Deserialize)]
struct Document<T> {
  #[serde(default = "published_by_default")]
  published: bool,
  content:   T,
}

fn published_by_default() -> bool { true }

/// File stem for a base key: its display form with anything outside
/// `[A-Za-z0-9-]` replaced by `_`.
pub fn file_stem(key: &ContentKey) -> String {
  key
    .base()
    .to_string()
    .chars()
    .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
    .collect()
}

// ─── Service ─────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct FsContentService<T> {
  dir:     PathBuf,
  _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for FsContentService<T> {
  fn clone(&self) -> Self { Self { dir: self.dir.clone(), _marker: PhantomData } }
}

impl<T: ContentModel> FsContentService<T> {
  /// Serve `T` from `<content_dir>/<T::DIR>`.
  pub fn new(content_dir: impl AsRef<Path>) -> Self {
    Self { dir: content_dir.as_ref().join(T::DIR), _marker: PhantomData }
  }

  pub fn dir(&self) -> &Path { &self.dir }

  fn path_of(&self, key: &ContentKey) -> PathBuf {
    self.dir.join(format!("{}.json", file_stem(key)))
  }

  async fn read(&self, path: &Path) -> Result<Option<Document<T>>> {
    match tokio::fs::read(path).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(e) => Err(e.into()),
    }
  }

  async fn load(&self, key: &ContentKey) -> Result<Option<Document<T>>> {
    self.read(&self.path_of(key)).await
  }

  async fn session_keys(&self, session: SessionYear) -> Result<BTreeSet<ContentKey>> {
    let mut keys = BTreeSet::new();
    let mut entries = match tokio::fs::read_dir(&self.dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
      Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
      let path = entry.path();
      if path.extension().is_none_or(|ext| ext != "json") {
        continue;
      }
      match self.read(&path).await {
        Ok(Some(doc)) if doc.content.in_session(session) => {
          keys.insert(doc.content.key());
        }
        Ok(_) => {}
        Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable content file"),
      }
    }
    Ok(keys)
  }
}

impl<T: ContentModel> ContentDataService for FsContentService<T> {
  type Content = T;

  async fn get_content<'a>(&'a self, key: &'a ContentKey) -> Result<Option<T>, BoxError> {
    Ok(self.load(key).await?.map(|doc| doc.content))
  }

  async fn list_keys(
    &self,
    session: SessionYear,
    page: LimitOffset,
  ) -> Result<Vec<ContentKey>, BoxError> {
    let keys = self.session_keys(session).await?;
    let take = page.limit.map_or(usize::MAX, |l| l as usize);
    Ok(keys.into_iter().skip(page.offset as usize).take(take).collect())
  }

  async fn publish_status<'a>(&'a self, key: &'a ContentKey) -> Result<PublishStatus, BoxError> {
    Ok(match self.load(key).await? {
      Some(doc) => doc.content.publish_status(key, doc.published),
      None => PublishStatus::unpublished(),
    })
  }

  fn child_keys(&self, content: &T) -> Vec<ContentKey> { content.child_keys() }
}

#[cfg(test)]
mod tests {
  use spotcheck_core::key::{BaseBillId, BillId, Version};
  use tempfile::TempDir;

  use super::*;

  fn write_bill(dir: &Path, bill: &Bill, published: bool) {
    let dir = dir.join(Bill::DIR);
    std::fs::create_dir_all(&dir).unwrap();
    let doc = serde_json::json!({ "published": published, "content": bill });
    std::fs::write(
      dir.join(format!("{}.json", file_stem(&bill.key()))),
      serde_json::to_vec(&doc).unwrap(),
    )
    .unwrap();
  }

  fn amended_bill(print_no: &str, session: i32) -> Bill {
    let mut bill = Bill::new(BaseBillId::new(print_no, session).unwrap());
    bill.amendments.insert(Version::Original, Default::default());
    bill.amendments.insert(Version::Amendment('A'), Default::default());
    bill.publish_statuses.insert(Version::Original, PublishStatus::published());
    bill.publish_statuses.insert(Version::Amendment('A'), PublishStatus::unpublished());
    bill
  }

  #[tokio::test]
  async fn bills_are_served_with_their_amendments() {
    let dir = TempDir::new().unwrap();
    write_bill(dir.path(), &amended_bill("S100", 2023), true);
    let service = FsContentService::<Bill>::new(dir.path());

    let amendment: ContentKey = BillId::parse("S100A", 2023).unwrap().into();
    let bill = service.get_content(&amendment).await.unwrap().unwrap();
    assert_eq!(service.child_keys(&bill).len(), 2);

    let original: ContentKey = BillId::parse("S100", 2023).unwrap().into();
    assert!(service.publish_status(&original).await.unwrap().published);
    assert!(!service.publish_status(&amendment).await.unwrap().published);

    let missing: ContentKey = BillId::parse("S999", 2023).unwrap().into();
    assert!(service.get_content(&missing).await.unwrap().is_none());
    assert!(!service.publish_status(&missing).await.unwrap().published);
  }

  #[tokio::test]
  async fn unpublished_documents_hide_every_amendment() {
    let dir = TempDir::new().unwrap();
    write_bill(dir.path(), &amended_bill("S100", 2023), false);
    let service = FsContentService::<Bill>::new(dir.path());
    let original: ContentKey = BillId::parse("S100", 2023).unwrap().into();
    assert!(!service.publish_status(&original).await.unwrap().published);
  }

  #[tokio::test]
  async fn keys_are_listed_by_session_in_pages() {
    let dir = TempDir::new().unwrap();
    for print_no in ["S300", "S100", "S200"] {
      write_bill(dir.path(), &amended_bill(print_no, 2023), true);
    }
    write_bill(dir.path(), &amended_bill("S100", 2021), true);
    std::fs::write(dir.path().join(Bill::DIR).join("README"), "not content").unwrap();
    let service = FsContentService::<Bill>::new(dir.path());

    let all = service.list_keys(SessionYear::of(2024), LimitOffset::ALL).await.unwrap();
    assert_eq!(all.len(), 3);
    let page = service.list_keys(SessionYear::of(2023), LimitOffset::new(2, 1)).await.unwrap();
    assert_eq!(page, all[1..3].to_vec());
  }

  #[tokio::test]
  async fn missing_content_directory_lists_nothing() {
    let dir = TempDir::new().unwrap();
    let service = FsContentService::<CalendarEntryList>::new(dir.path());
    assert!(service.list_keys(SessionYear::of(2023), LimitOffset::ALL).await.unwrap().is_empty());
  }
}
