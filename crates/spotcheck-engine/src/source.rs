//! Reference dump sources.
//!
//! [`FsDumpSource`] reads multi-fragment JSON dumps from a directory.
//! [`ScrapeDumpSource`] presents the reference store's staged, parseable
//! scrape files as a single dump.

use std::{
  collections::BTreeMap,
  path::{Path, PathBuf},
  sync::LazyLock,
};

use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use spotcheck_core::{
  BoxError,
  key::SessionYear,
  reference::ReferenceType,
  scrape::{DeadLetter, ScrapeFile, ScrapeQueueEntry},
  service::{Dump, DumpFragment, DumpId, DumpScope, DumpSource, FragmentParser},
  store::ReferenceStore,
};
use tracing::{debug, info, warn};

use crate::Result;

const DUMP_TIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// `<refname>-<session>-<dumpTime>-<n>-of-<total>.json`
static DUMP_FILE: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r"^(?P<name>[a-z][a-z-]*?)-(?P<session>\d{4})-(?P<time>\d{8}T\d{6})-(?P<seq>\d+)-of-(?P<total>\d+)\.json$",
  )
  .expect("dump file pattern should compile")
});

// ─── Filesystem dumps ────────────────────────────────────────────────────────

/// A parsed dump fragment file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFileName {
  pub reference_name: String,
  pub session:        SessionYear,
  pub dump_datetime:  DateTime<Utc>,
  pub seq_no:         usize,
  pub total:          usize,
}

impl DumpFileName {
  pub fn parse(file_name: &str) -> Option<Self> {
    let caps = DUMP_FILE.captures(file_name)?;
    let time = NaiveDateTime::parse_from_str(&caps["time"], DUMP_TIME_FORMAT).ok()?;
    Some(Self {
      reference_name: caps["name"].to_owned(),
      session:        SessionYear::of(caps["session"].parse().ok()?),
      dump_datetime:  time.and_utc(),
      seq_no:         caps["seq"].parse().ok()?,
      total:          caps["total"].parse().ok()?,
    })
  }

  pub fn render(&self) -> String {
    format!(
      "{}-{}-{}-{}-of-{}.json",
      self.reference_name,
      self.session,
      self.dump_datetime.format(DUMP_TIME_FORMAT),
      self.seq_no,
      self.total
    )
  }
}

/// Dumps stored as fragment files in one directory. Processed dumps move to
/// `<archive>/<refname>/`.
#[derive(Debug, Clone)]
pub struct FsDumpSource {
  dump_dir:    PathBuf,
  archive_dir: PathBuf,
}

impl FsDumpSource {
  pub fn new(dump_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
    Self { dump_dir: dump_dir.into(), archive_dir: archive_dir.into() }
  }

  pub fn dump_dir(&self) -> &Path { &self.dump_dir }

  async fn scan(&self, reference_type: ReferenceType) -> Result<Vec<Dump<DumpFragment>>> {
    let mut dumps: BTreeMap<(SessionYear, DateTime<Utc>), Dump<DumpFragment>> = BTreeMap::new();
    let mut entries = match tokio::fs::read_dir(&self.dump_dir).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
      let file_name = entry.file_name().to_string_lossy().into_owned();
      let Some(name) = DumpFileName::parse(&file_name) else {
        debug!(file = %file_name, "skipping non-dump file");
        continue;
      };
      if name.reference_name != reference_type.ref_name() {
        continue;
      }
      let dump = dumps.entry((name.session, name.dump_datetime)).or_insert_with(|| Dump {
        id:        DumpId {
          reference_type,
          dump_datetime: name.dump_datetime,
          scope: DumpScope::Session(name.session),
          fragment_count: name.total,
          notes: None,
        },
        fragments: Vec::new(),
      });
      if dump.id.fragment_count != name.total {
        warn!(file = %file_name, expected = dump.id.fragment_count, "fragment total disagrees");
      }
      dump.fragments.push(DumpFragment { seq_no: name.seq_no, path: entry.path() });
    }

    Ok(
      dumps
        .into_values()
        .map(|mut dump| {
          dump.fragments.sort();
          dump.fragments.dedup_by_key(|f| f.seq_no);
          dump
        })
        .collect(),
    )
  }

  async fn archive(&self, dump: &Dump<DumpFragment>) -> Result<()> {
    let dir = self.archive_dir.join(dump.id.reference_type.ref_name());
    tokio::fs::create_dir_all(&dir).await?;
    for fragment in &dump.fragments {
      let Some(file_name) = fragment.path.file_name() else { continue };
      let dest = dir.join(file_name);
      if tokio::fs::rename(&fragment.path, &dest).await.is_err() {
        tokio::fs::copy(&fragment.path, &dest).await?;
        tokio::fs::remove_file(&fragment.path).await?;
      }
    }
    info!(
      reference_type = %dump.id.reference_type,
      dump = %dump.id.dump_datetime,
      fragments = dump.fragments.len(),
      "archived dump"
    );
    Ok(())
  }
}

impl DumpSource for FsDumpSource {
  type Fragment = DumpFragment;

  async fn pending_dumps(
    &self,
    reference_type: ReferenceType,
  ) -> Result<Vec<Dump<DumpFragment>>, BoxError> {
    Ok(self.scan(reference_type).await?)
  }

  async fn read_fragment<'a>(&'a self, fragment: &'a DumpFragment) -> Result<String, BoxError> {
    Ok(tokio::fs::read_to_string(&fragment.path).await?)
  }

  async fn set_processed<'a>(&'a self, dump: &'a Dump<DumpFragment>) -> Result<(), BoxError> {
    Ok(self.archive(dump).await?)
  }
}

// ─── Scrape files ────────────────────────────────────────────────────────────

/// The reference store's incoming scrape files, as one dump of the scraped
/// bill reference type covering only the bills it lists.
///
/// Files the parser rejects are archived and recorded as dead letters before
/// the dump is assembled, so the dump holds only parseable pages.
#[derive(Debug, Clone)]
pub struct ScrapeDumpSource<R, P> {
  store:  R,
  parser: P,
}

impl<R, P> ScrapeDumpSource<R, P> {
  pub fn new(store: R, parser: P) -> Self { Self { store, parser } }
}

impl<R, P> ScrapeDumpSource<R, P>
where
  R: ReferenceStore + Send + Sync,
  R::Error: Into<spotcheck_core::Error>,
{
  async fn quarantine(
    &self,
    file: ScrapeFile,
    error: spotcheck_core::Error,
  ) -> Result<(), BoxError> {
    warn!(file = %file.file_name, error = %error, "quarantining unparseable scrape file");
    if let Ok((bill, _)) = file.bill_and_time() {
      let letter = DeadLetter {
        entry:           ScrapeQueueEntry {
          key:            bill.into(),
          priority:       0,
          added_datetime: file.staged_datetime,
        },
        attempts:        0,
        last_error:      format!("{}: {error}", file.file_name),
        failed_datetime: Utc::now(),
      };
      self.store.dead_letter(letter).await.map_err(boxed)?;
    }
    self.store.archive(file).await.map_err(boxed)?;
    Ok(())
  }
}

impl<R, P> DumpSource for ScrapeDumpSource<R, P>
where
  R: ReferenceStore + Send + Sync,
  R::Error: Into<spotcheck_core::Error>,
  P: FragmentParser<Fragment = ScrapeFile>,
{
  type Fragment = ScrapeFile;

  async fn pending_dumps(
    &self,
    reference_type: ReferenceType,
  ) -> Result<Vec<Dump<ScrapeFile>>, BoxError> {
    if reference_type != ReferenceType::LbdcScrapedBill {
      return Ok(Vec::new());
    }
    let files = self.store.list_incoming().await.map_err(boxed)?;
    let Some(latest) = files.iter().map(|f| f.staged_datetime).max() else {
      return Ok(Vec::new());
    };
    let mut id = DumpId {
      reference_type,
      dump_datetime: latest,
      scope: DumpScope::Referenced,
      fragment_count: files.len(),
      notes: None,
    };

    let mut fragments = Vec::with_capacity(files.len());
    for file in files {
      let content = self.store.read_content(&file).await.map_err(boxed)?;
      match self.parser.parse(&id, &file, &content) {
        Ok(_) => fragments.push(file),
        Err(e) => self.quarantine(file, e).await?,
      }
    }
    let Some(latest) = fragments.iter().map(|f| f.staged_datetime).max() else {
      return Ok(Vec::new());
    };
    id.dump_datetime = latest;
    id.fragment_count = fragments.len();
    id.notes = Some(format!("{} scraped bill pages", fragments.len()));
    Ok(vec![Dump { id, fragments }])
  }

  async fn read_fragment<'a>(&'a self, file: &'a ScrapeFile) -> Result<String, BoxError> {
    self.store.read_content(file).await.map_err(boxed)
  }

  async fn set_processed<'a>(&'a self, dump: &'a Dump<ScrapeFile>) -> Result<(), BoxError> {
    for file in &dump.fragments {
      self.store.archive(file.clone()).await.map_err(boxed)?;
    }
    Ok(())
  }
}

fn boxed<E: Into<spotcheck_core::Error>>(err: E) -> BoxError { Box::new(err.into()) }

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;
  use spotcheck_checks::lrs::LrsBillParser;
  use spotcheck_core::{
    key::{BaseBillId, ContentKey},
    store::LimitOffset,
  };
  use spotcheck_store_sqlite::SqliteStore;
  use tempfile::TempDir;

  use super::*;

  fn name(seq_no: usize, total: usize) -> DumpFileName {
    DumpFileName {
      reference_name: "senate-site-bills".into(),
      session:        SessionYear::of(2023),
      dump_datetime:  Utc.with_ymd_and_hms(2023, 3, 1, 9, 30, 0).unwrap(),
      seq_no,
      total,
    }
  }

  #[test]
  fn file_names_parse_with_hyphenated_reference_names() {
    let n = name(2, 3);
    assert_eq!(n.render(), "senate-site-bills-2023-20230301T093000-2-of-3.json");
    assert_eq!(DumpFileName::parse(&n.render()), Some(n));
    assert_eq!(DumpFileName::parse("notes.txt"), None);
  }

  #[tokio::test]
  async fn fragments_group_into_dumps_and_archive() {
    let dir = TempDir::new().unwrap();
    let dumps = dir.path().join("dumps");
    std::fs::create_dir_all(&dumps).unwrap();
    for n in [name(2, 2), name(1, 2)] {
      std::fs::write(dumps.join(n.render()), r#"{"nodes": []}"#).unwrap();
    }
    let other = DumpFileName { reference_name: "senate-site-agenda".into(), ..name(1, 1) };
    std::fs::write(dumps.join(other.render()), "{}").unwrap();

    let source = FsDumpSource::new(&dumps, dir.path().join("archive"));
    let pending = source.pending_dumps(ReferenceType::SenateSiteBills).await.unwrap();
    assert_eq!(pending.len(), 1);
    let dump = &pending[0];
    assert!(dump.is_complete());
    assert_eq!(dump.id.scope, DumpScope::Session(SessionYear::of(2023)));
    assert_eq!(dump.fragments.iter().map(|f| f.seq_no).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(source.read_fragment(&dump.fragments[0]).await.unwrap(), r#"{"nodes": []}"#);

    source.set_processed(dump).await.unwrap();
    assert!(source.pending_dumps(ReferenceType::SenateSiteBills).await.unwrap().is_empty());
    assert!(dir.path().join("archive/senate-site-bills").join(name(1, 2).render()).exists());
    assert_eq!(source.pending_dumps(ReferenceType::SenateSiteAgenda).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn partial_dumps_are_incomplete() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(name(1, 3).render()), "{}").unwrap();
    let source = FsDumpSource::new(dir.path(), dir.path().join("archive"));
    let pending = source.pending_dumps(ReferenceType::SenateSiteBills).await.unwrap();
    assert!(!pending[0].is_complete());
  }

  // ── Scrape files ──

  const NOT_FOUND: &str = r#"<html><body><div id="nv_bot_contents">
    <font color="red">Bill Status Information Not Found</font>
  </div></body></html>"#;

  #[tokio::test]
  async fn unparseable_scrape_files_are_quarantined() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_in_memory()
      .await
      .unwrap()
      .reference_store(dir.path().join("staging"), dir.path().join("archive"));
    let at = |h| Utc.with_ymd_and_hms(2023, 3, 1, h, 0, 0).unwrap();
    let good = BaseBillId::new("S100", 2023).unwrap();
    let bad = BaseBillId::new("S200", 2023).unwrap();
    let good_file = store.save_content_at(&good, NOT_FOUND.as_bytes(), at(9)).await.unwrap();
    store.save_content_at(&bad, b"<html><body>nothing</body></html>", at(10)).await.unwrap();

    let source = ScrapeDumpSource::new(store.clone(), LrsBillParser);
    assert!(source.pending_dumps(ReferenceType::SenateSiteBills).await.unwrap().is_empty());
    let pending = source.pending_dumps(ReferenceType::LbdcScrapedBill).await.unwrap();
    assert_eq!(pending.len(), 1);
    let dump = &pending[0];
    assert!(dump.is_complete());
    assert_eq!(dump.fragments, vec![good_file]);
    assert_eq!(dump.id.dump_datetime, at(9));

    let dead = store.list_dead_letters(LimitOffset::ALL).await.unwrap();
    assert_eq!(dead.total, 1);
    assert_eq!(dead.items[0].entry.key, ContentKey::from(bad));
    assert!(dead.items[0].last_error.starts_with("2023-S200-"));

    source.set_processed(dump).await.unwrap();
    assert!(store.list_incoming().await.unwrap().is_empty());
    assert!(source.pending_dumps(ReferenceType::LbdcScrapedBill).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn missing_dump_directory_has_no_dumps() {
    let dir = TempDir::new().unwrap();
    let source = FsDumpSource::new(dir.path().join("absent"), dir.path().join("archive"));
    assert!(source.pending_dumps(ReferenceType::SenateSiteBills).await.unwrap().is_empty());
  }
}
