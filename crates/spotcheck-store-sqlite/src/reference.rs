//! [`SqliteReferenceStore`], scrape files on disk indexed in SQLite, and the
//! scrape queue.
//!
//! Files are written before their row and moved before their row is updated,
//! so after a crash `list_incoming` still names every file awaiting
//! processing.

use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, SubsecRound as _, Utc};
use rusqlite::OptionalExtension as _;
use spotcheck_core::{
  key::{BaseBillId, ContentKey},
  scrape::{DeadLetter, ScrapeFile, ScrapeQueueEntry, scrape_file_name},
  store::{LimitOffset, Paginated, ReferenceStore, SortOrder},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
  Error, Result,
  encode::{
    RawDeadLetter, RawQueueEntry, RawScrapeFile, encode_dt, encode_key, encode_order,
    encode_page,
  },
};

const BILL_DIR: &str = "bill";

/// Reference store for scraped LRS pages.
///
/// New files land in `<staging>/bill/`; archived files move to
/// `<archive>/scraped/bill/`.
#[derive(Clone)]
pub struct SqliteReferenceStore {
  conn:         tokio_rusqlite::Connection,
  staging_dir:  PathBuf,
  archive_dir:  PathBuf,
  /// Serializes archive moves.
  archive_lock: Arc<Mutex<()>>,
}

impl SqliteReferenceStore {
  pub(crate) fn new(
    conn: tokio_rusqlite::Connection,
    staging_dir: impl AsRef<Path>,
    archive_dir: impl AsRef<Path>,
  ) -> Self {
    Self {
      conn,
      staging_dir: staging_dir.as_ref().join(BILL_DIR),
      archive_dir: archive_dir.as_ref().join("scraped").join(BILL_DIR),
      archive_lock: Arc::new(Mutex::new(())),
    }
  }

  pub fn staging_dir(&self) -> &Path { &self.staging_dir }

  pub fn archive_dir(&self) -> &Path { &self.archive_dir }

  /// [`ReferenceStore::save_content`] with an explicit scrape time.
  pub async fn save_content_at(
    &self,
    bill: &BaseBillId,
    content: &[u8],
    scraped_at: DateTime<Utc>,
  ) -> Result<ScrapeFile> {
    let scraped_at = scraped_at.trunc_subsecs(0);
    let file = ScrapeFile {
      file_name:          scrape_file_name(bill, scraped_at),
      file_path:          self.staging_dir.clone(),
      staged_datetime:    scraped_at,
      archived:           false,
      pending_processing: true,
    };

    tokio::fs::create_dir_all(&self.staging_dir).await?;
    tokio::fs::write(file.path(), content).await?;

    let name = file.file_name.clone();
    let dir = file.file_path.to_string_lossy().into_owned();
    let staged = encode_dt(file.staged_datetime);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO scrape_files (
             file_name, file_path, staged_datetime, archived, pending_processing
           ) VALUES (?1, ?2, ?3, 0, 1)",
          rusqlite::params![name, dir, staged],
        )?;
        Ok(())
      })
      .await?;

    info!(file = %file.file_name, bytes = content.len(), "staged scrape file");
    Ok(file)
  }

  /// [`ReferenceStore::enqueue`] with an explicit added time.
  ///
  /// An insert that collides with an existing entry is retried as an update.
  pub async fn enqueue_at(
    &self,
    key: &ContentKey,
    priority: i32,
    added_at: DateTime<Utc>,
  ) -> Result<ScrapeQueueEntry> {
    let (kind, map) = encode_key(key)?;
    let added = encode_dt(added_at);
    let updated = self
      .conn
      .call(move |conn| {
        let inserted = conn.execute(
          "INSERT INTO scrape_queue (key_kind, key_map, priority, added_datetime)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![kind, map, priority, added],
        );
        match inserted {
          Ok(_) => Ok(false),
          Err(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
          {
            conn.execute(
              "UPDATE scrape_queue SET priority = ?3, added_datetime = ?4
               WHERE key_kind = ?1 AND key_map = ?2",
              rusqlite::params![kind, map, priority, added],
            )?;
            Ok(true)
          }
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    debug!(%key, priority, updated, "enqueued scrape");
    Ok(ScrapeQueueEntry { key: key.clone(), priority, added_datetime: added_at })
  }

  async fn move_file(from: &Path, to: &Path) -> Result<()> {
    match tokio::fs::remove_file(to).await {
      Ok(()) => {}
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => return Err(e.into()),
    }
    if tokio::fs::rename(from, to).await.is_err() {
      // Rename fails across filesystems.
      tokio::fs::copy(from, to).await?;
      tokio::fs::remove_file(from).await?;
    }
    Ok(())
  }
}

// ─── ReferenceStore impl ─────────────────────────────────────────────────────

impl ReferenceStore for SqliteReferenceStore {
  type Error = Error;

  // ── Files ─────────────────────────────────────────────────────────────────

  async fn save_content<'a>(&'a self, bill: &'a BaseBillId, content: &'a [u8]) -> Result<ScrapeFile> {
    self.save_content_at(bill, content, Utc::now()).await
  }

  async fn list_incoming(&self) -> Result<Vec<ScrapeFile>> {
    let raws: Vec<RawScrapeFile> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT file_name, file_path, staged_datetime, archived, pending_processing
           FROM scrape_files
           WHERE pending_processing = 1 AND archived = 0
           ORDER BY staged_datetime ASC, file_name ASC",
        )?;
        let rows = stmt
          .query_map([], RawScrapeFile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawScrapeFile::into_file).collect()
  }

  async fn read_content<'a>(&'a self, file: &'a ScrapeFile) -> Result<String> {
    Ok(tokio::fs::read_to_string(file.path()).await?)
  }

  async fn archive(&self, file: ScrapeFile) -> Result<ScrapeFile> {
    let archived = ScrapeFile {
      file_path: self.archive_dir.clone(),
      archived: true,
      pending_processing: false,
      ..file.clone()
    };
    {
      let _guard = self.archive_lock.lock().await;
      tokio::fs::create_dir_all(&self.archive_dir).await?;
      Self::move_file(&file.path(), &archived.path()).await?;
    }
    self.update_file_flags(&archived).await?;
    debug!(file = %archived.file_name, "archived scrape file");
    Ok(archived)
  }

  async fn update_file_flags<'a>(&'a self, file: &'a ScrapeFile) -> Result<()> {
    let name = file.file_name.clone();
    let dir = file.file_path.to_string_lossy().into_owned();
    let (archived, pending) = (file.archived, file.pending_processing);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE scrape_files SET file_path = ?2, archived = ?3, pending_processing = ?4
           WHERE file_name = ?1",
          rusqlite::params![name, dir, archived, pending],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Queue ─────────────────────────────────────────────────────────────────

  async fn enqueue<'a>(&'a self, key: &'a ContentKey, priority: i32) -> Result<ScrapeQueueEntry> {
    self.enqueue_at(key, priority, Utc::now()).await
  }

  async fn dequeue_head(&self) -> Result<ScrapeQueueEntry> {
    let raw: Option<RawQueueEntry> = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT key_kind, key_map, priority, added_datetime FROM scrape_queue
               ORDER BY priority DESC, added_datetime ASC
               LIMIT 1",
              [],
              RawQueueEntry::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.ok_or(Error::QueueEmpty)?.into_entry()
  }

  async fn remove<'a>(&'a self, key: &'a ContentKey) -> Result<bool> {
    let (kind, map) = encode_key(key)?;
    let removed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM scrape_queue WHERE key_kind = ?1 AND key_map = ?2",
          rusqlite::params![kind, map],
        )?)
      })
      .await?;
    debug!(%key, removed, "removed from scrape queue");
    Ok(removed > 0)
  }

  async fn list_queue(
    &self,
    order: SortOrder,
    limit_offset: LimitOffset,
  ) -> Result<Paginated<ScrapeQueueEntry>> {
    let sql = format!(
      "SELECT key_kind, key_map, priority, added_datetime FROM scrape_queue
       ORDER BY priority {}, added_datetime {}
       LIMIT ?1 OFFSET ?2",
      encode_order(order),
      encode_order(order.opposite()),
    );
    let (limit, offset) = encode_page(limit_offset);
    let (total, raws): (i64, Vec<RawQueueEntry>) = self
      .conn
      .call(move |conn| {
        let total = conn.query_row("SELECT COUNT(*) FROM scrape_queue", [], |row| row.get(0))?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![limit, offset], RawQueueEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    Ok(Paginated {
      total:        u64::try_from(total).unwrap_or_default(),
      limit_offset,
      items:        raws.into_iter().map(RawQueueEntry::into_entry).collect::<Result<_>>()?,
    })
  }

  async fn dead_letter(&self, letter: DeadLetter) -> Result<()> {
    let (kind, map) = encode_key(&letter.entry.key)?;
    let added = encode_dt(letter.entry.added_datetime);
    let failed = encode_dt(letter.failed_datetime);
    let (priority, attempts) = (letter.entry.priority, letter.attempts);
    let last_error = letter.last_error.clone();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "DELETE FROM scrape_queue WHERE key_kind = ?1 AND key_map = ?2",
          rusqlite::params![kind, map],
        )?;
        tx.execute(
          "INSERT INTO scrape_dead_letters (
             key_kind, key_map, priority, added_datetime, attempts, last_error, failed_datetime
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![kind, map, priority, added, attempts, last_error, failed],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    info!(key = %letter.entry.key, attempts = letter.attempts, "scrape moved to dead letters");
    Ok(())
  }

  async fn list_dead_letters(&self, limit_offset: LimitOffset) -> Result<Paginated<DeadLetter>> {
    let (limit, offset) = encode_page(limit_offset);
    let (total, raws): (i64, Vec<RawDeadLetter>) = self
      .conn
      .call(move |conn| {
        let total =
          conn.query_row("SELECT COUNT(*) FROM scrape_dead_letters", [], |row| row.get(0))?;
        let mut stmt = conn.prepare(
          "SELECT key_kind, key_map, priority, added_datetime, attempts, last_error,
                  failed_datetime
           FROM scrape_dead_letters
           ORDER BY failed_datetime DESC, dead_letter_id DESC
           LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit, offset], RawDeadLetter::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((total, rows))
      })
      .await?;

    Ok(Paginated {
      total:        u64::try_from(total).unwrap_or_default(),
      limit_offset,
      items:        raws.into_iter().map(RawDeadLetter::into_letter).collect::<Result<_>>()?,
    })
  }
}
