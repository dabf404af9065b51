//! Integration tests for the SQLite stores against an in-memory database.

use chrono::{DateTime, Duration, TimeZone as _, Utc};
use spotcheck_core::{
  key::{BaseBillId, BillId, ContentKey},
  lifecycle::reconcile,
  mismatch::{IgnoreStatus, Mismatch, MismatchState, MismatchStatus, MismatchType},
  observation::Observation,
  reference::{DataSource, ReferenceType},
  report::{Report, ReportId},
  scrape::{DeadLetter, ScrapeQueueEntry},
  store::{
    LimitOffset, MismatchOrderBy, OpenMismatchQuery, ReferenceStore, ReportStore, SortOrder,
  },
};
use tempfile::TempDir;

use crate::{Error, SqliteReferenceStore, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn t(day: u32) -> DateTime<Utc> { Utc.with_ymd_and_hms(2023, 3, day, 12, 0, 0).unwrap() }

fn bill(print_no: &str) -> ContentKey { BillId::parse(print_no, 2023).unwrap().into() }

/// A senate-site bill report observing S100 at `at`, with a title mismatch
/// when `title_differs`.
fn bill_report(at: DateTime<Utc>, title_differs: bool) -> Report {
  let mut report = Report::new(ReportId::new(ReferenceType::SenateSiteBills, at, at));
  let mut obs = Observation::new(report.reference_id(), bill("S100"), at);
  if title_differs {
    obs
      .add_mismatch(Mismatch::new(MismatchType::BillTitle, "BAR", "FOO"))
      .unwrap();
  }
  report.add_observation(obs).unwrap();
  report
}

/// Reconcile against the store's current state, then save.
async fn save_reconciled(s: &SqliteStore, mut report: Report) -> Report {
  let current = s.current_mismatches(DataSource::Nysenate).await.unwrap();
  reconcile(&mut report, &current).unwrap();
  s.save_report(&report).await.unwrap();
  report
}

// ─── Reports and lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn detection_persistence_and_resolution() {
  let s = store().await;

  save_reconciled(&s, bill_report(t(1), true)).await;
  let current = s.current_mismatches(DataSource::Nysenate).await.unwrap();
  assert_eq!(current.len(), 1);
  let first = &current[0];
  assert_eq!(first.state, MismatchState::Open);
  assert_eq!(first.observed, "BAR");
  assert_eq!(first.reference, "FOO");
  assert_eq!(first.first_seen_datetime, t(1));
  assert_eq!(first.observed_datetime, t(1));
  assert_eq!(first.report_datetime, t(1));
  assert_eq!(first.ignore_status, IgnoreStatus::NotIgnored);
  assert_eq!(first.status(), MismatchStatus::New);

  save_reconciled(&s, bill_report(t(2), true)).await;
  let current = s.current_mismatches(DataSource::Nysenate).await.unwrap();
  assert_eq!(current.len(), 1);
  assert_eq!(current[0].first_seen_datetime, t(1));
  assert_eq!(current[0].observed_datetime, t(2));
  assert_eq!(current[0].report_datetime, t(2));
  assert_eq!(current[0].status(), MismatchStatus::Existing);

  save_reconciled(&s, bill_report(t(3), false)).await;
  let current = s.current_mismatches(DataSource::Nysenate).await.unwrap();
  assert_eq!(current.len(), 1);
  let closed = &current[0];
  assert_eq!(closed.state, MismatchState::Closed);
  assert_eq!(closed.report_datetime, t(3));
  assert_eq!(closed.observed_datetime, t(3));
  assert_eq!(closed.first_seen_datetime, t(1));

  for record in &current {
    assert!(record.first_seen_datetime <= record.observed_datetime);
    assert!(record.observed_datetime <= record.report_datetime);
  }

  let open = s
    .query_open_mismatches(&OpenMismatchQuery::for_data_source(DataSource::Nysenate))
    .await
    .unwrap();
  assert_eq!(open.total, 0);
}

#[tokio::test]
async fn ignore_once_decays_through_the_store() {
  let s = store().await;
  save_reconciled(&s, bill_report(t(1), true)).await;
  let id = s.current_mismatches(DataSource::Nysenate).await.unwrap()[0]
    .mismatch_id
    .unwrap();
  s.set_ignore_status(id, IgnoreStatus::IgnoreOnce).await.unwrap();

  save_reconciled(&s, bill_report(t(2), true)).await;
  let current = s.current_mismatches(DataSource::Nysenate).await.unwrap();
  assert_eq!(current[0].state, MismatchState::Open);
  assert_eq!(current[0].ignore_status, IgnoreStatus::NotIgnored);
}

#[tokio::test]
async fn get_report_restores_observations_and_checked_keys() {
  let s = store().await;
  let mut report = bill_report(t(1), true);
  report.add_checked_key(bill("S200"));
  let report = save_reconciled(&s, report.with_notes("nightly")).await;

  let loaded = s.get_report(report.id).await.unwrap();
  assert_eq!(loaded.id, report.id);
  assert_eq!(loaded.notes.as_deref(), Some("nightly"));
  assert_eq!(loaded.checked_keys(), report.checked_keys());
  assert_eq!(loaded.observation_count(), 1);

  let m = loaded
    .observation(&bill("S100"))
    .and_then(|o| o.mismatch(MismatchType::BillTitle))
    .unwrap();
  assert!(m.mismatch_id.is_some());
  assert_eq!(m.first_seen_datetime, Some(t(1)));
  assert_eq!(loaded.to_records().len(), 1);
}

#[tokio::test]
async fn resaving_a_report_overwrites_it() {
  let s = store().await;
  let report = save_reconciled(&s, bill_report(t(1), true)).await;
  s.save_report(&report).await.unwrap();

  let summaries = s
    .list_report_summaries(
      ReferenceType::SenateSiteBills,
      t(1) - Duration::days(1),
      t(1) + Duration::days(1),
      SortOrder::Desc,
      LimitOffset::ALL,
    )
    .await
    .unwrap();
  assert_eq!(summaries.total, 1);
  assert_eq!(s.current_mismatches(DataSource::Nysenate).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unbounded_windows_list_every_report() {
  let s = store().await;
  save_reconciled(&s, bill_report(t(1), true)).await;

  let summaries = s
    .list_report_summaries(
      ReferenceType::SenateSiteBills,
      DateTime::<Utc>::MIN_UTC,
      DateTime::<Utc>::MAX_UTC,
      SortOrder::Asc,
      LimitOffset::ALL,
    )
    .await
    .unwrap();
  assert_eq!(summaries.total, 1);
  assert_eq!(summaries.items.len(), 1);

  let query = OpenMismatchQuery::for_data_source(DataSource::Nysenate)
    .observed_after(DateTime::<Utc>::MIN_UTC);
  assert_eq!(s.query_open_mismatches(&query).await.unwrap().total, 1);
}

#[tokio::test]
async fn summaries_are_windowed_ordered_and_counted() {
  let s = store().await;
  for day in 1..=3 {
    save_reconciled(&s, bill_report(t(day), day < 3)).await;
  }

  let page = s
    .list_report_summaries(
      ReferenceType::SenateSiteBills,
      t(1),
      t(3),
      SortOrder::Asc,
      LimitOffset::new(2, 0),
    )
    .await
    .unwrap();
  assert_eq!(page.total, 3);
  assert_eq!(page.items.len(), 2);
  assert_eq!(page.items[0].report_id.report_datetime, t(1));
  assert_eq!(page.items[0].counts.open, 1);
  assert_eq!(page.items[0].type_counts[&MismatchType::BillTitle].open, 1);
  assert_eq!(page.items[0].checked_keys, 1);

  let last = s
    .list_report_summaries(
      ReferenceType::SenateSiteBills,
      t(1),
      t(3),
      SortOrder::Desc,
      LimitOffset::new(1, 0),
    )
    .await
    .unwrap();
  assert_eq!(last.items[0].report_id.report_datetime, t(3));
  assert_eq!(last.items[0].counts.closed, 1);
  assert_eq!(last.items[0].counts.open, 0);

  let other = s
    .list_report_summaries(
      ReferenceType::LbdcDaybreak,
      t(1),
      t(3),
      SortOrder::Desc,
      LimitOffset::ALL,
    )
    .await
    .unwrap();
  assert_eq!(other.total, 0);
}

#[tokio::test]
async fn delete_cascades_to_mismatches() {
  let s = store().await;
  let report = save_reconciled(&s, bill_report(t(1), true)).await;
  let id = s.current_mismatches(DataSource::Nysenate).await.unwrap()[0]
    .mismatch_id
    .unwrap();

  s.delete_report(report.id).await.unwrap();
  assert!(matches!(s.get_report(report.id).await, Err(Error::ReportNotFound(_))));
  assert!(matches!(s.get_mismatch(id).await, Err(Error::MismatchNotFound(_))));
  assert!(s.current_mismatches(DataSource::Nysenate).await.unwrap().is_empty());

  let err = s.delete_report(report.id).await.unwrap_err();
  assert!(matches!(
    spotcheck_core::Error::from(err),
    spotcheck_core::Error::ReportNotFound(_)
  ));
}

#[tokio::test]
async fn clear_removes_everything() {
  let s = store().await;
  save_reconciled(&s, bill_report(t(1), true)).await;
  save_reconciled(&s, bill_report(t(2), true)).await;
  s.clear().await.unwrap();
  assert!(s.current_mismatches(DataSource::Nysenate).await.unwrap().is_empty());
}

// ─── Open mismatch queries ───────────────────────────────────────────────────

async fn seeded() -> SqliteStore {
  let s = store().await;
  let mut report = Report::new(ReportId::new(ReferenceType::SenateSiteBills, t(1), t(1)));
  for (print_no, mismatch_type) in [
    ("S100", MismatchType::BillTitle),
    ("S200", MismatchType::BillSponsor),
    ("S300", MismatchType::BillTitle),
  ] {
    let mut obs = Observation::new(report.reference_id(), bill(print_no), t(1));
    obs.add_mismatch(Mismatch::new(mismatch_type, "a", "b")).unwrap();
    report.add_observation(obs).unwrap();
  }
  save_reconciled(&s, report).await;
  s
}

#[tokio::test]
async fn query_filters_by_type_and_key() {
  let s = seeded().await;
  let base = OpenMismatchQuery::for_data_source(DataSource::Nysenate);

  let all = s.query_open_mismatches(&base).await.unwrap();
  assert_eq!(all.total, 3);

  let titles = base.clone().mismatch_types([MismatchType::BillTitle]);
  assert_eq!(s.query_open_mismatches(&titles).await.unwrap().total, 2);

  let keyed = base.clone().keys([bill("S200"), bill("S999")]);
  let page = s.query_open_mismatches(&keyed).await.unwrap();
  assert_eq!(page.total, 1);
  assert_eq!(page.items[0].key, bill("S200"));

  let none = base.clone().keys([]);
  assert_eq!(s.query_open_mismatches(&none).await.unwrap().total, 0);

  let daybreak = OpenMismatchQuery::for_data_source(DataSource::Lbdc);
  assert_eq!(s.query_open_mismatches(&daybreak).await.unwrap().total, 0);
}

#[tokio::test]
async fn query_orders_and_pages() {
  let s = seeded().await;
  let query = OpenMismatchQuery::for_data_source(DataSource::Nysenate)
    .order_by(MismatchOrderBy::ContentKey, SortOrder::Asc)
    .page(LimitOffset::new(2, 1));
  let page = s.query_open_mismatches(&query).await.unwrap();
  assert_eq!(page.total, 3);
  let keys: Vec<_> = page.items.iter().map(|m| m.key.clone()).collect();
  assert_eq!(keys, vec![bill("S200"), bill("S300")]);
}

#[tokio::test]
async fn content_key_order_is_numeric() {
  let s = store().await;
  let mut report = Report::new(ReportId::new(ReferenceType::SenateSiteBills, t(1), t(1)));
  for print_no in ["S100", "S20", "S3", "S20A"] {
    let mut obs = Observation::new(report.reference_id(), bill(print_no), t(1));
    obs.add_mismatch(Mismatch::new(MismatchType::BillTitle, "a", "b")).unwrap();
    report.add_observation(obs).unwrap();
  }
  save_reconciled(&s, report).await;

  let query = OpenMismatchQuery::for_data_source(DataSource::Nysenate)
    .order_by(MismatchOrderBy::ContentKey, SortOrder::Asc);
  let keys: Vec<_> =
    s.query_open_mismatches(&query).await.unwrap().items.into_iter().map(|m| m.key).collect();
  assert_eq!(keys, vec![bill("S3"), bill("S20"), bill("S20A"), bill("S100")]);

  let query = query.order_by(MismatchOrderBy::ContentKey, SortOrder::Desc);
  let first = s.query_open_mismatches(&query).await.unwrap().items[0].key.clone();
  assert_eq!(first, bill("S100"));
}

#[tokio::test]
async fn ignored_mismatches_leave_the_default_query() {
  let s = seeded().await;
  let query = OpenMismatchQuery::for_data_source(DataSource::Nysenate);
  let id = s.query_open_mismatches(&query).await.unwrap().items[0]
    .mismatch_id
    .unwrap();
  s.set_ignore_status(id, IgnoreStatus::IgnorePermanently).await.unwrap();

  assert_eq!(s.query_open_mismatches(&query).await.unwrap().total, 2);
  let ignored = query.clone().ignore_statuses([IgnoreStatus::IgnorePermanently]);
  let page = s.query_open_mismatches(&ignored).await.unwrap();
  assert_eq!(page.total, 1);
  assert_eq!(page.items[0].mismatch_id, Some(id));

  assert!(matches!(
    s.set_ignore_status(-1, IgnoreStatus::IgnoreOnce).await,
    Err(Error::MismatchNotFound(-1))
  ));
}

#[tokio::test]
async fn issue_ids_are_an_ordered_set() {
  let s = seeded().await;
  let id = s.current_mismatches(DataSource::Nysenate).await.unwrap()[0]
    .mismatch_id
    .unwrap();

  s.add_issue_id(id, "OL-7".into()).await.unwrap();
  s.add_issue_id(id, "OL-3".into()).await.unwrap();
  s.add_issue_id(id, "OL-7".into()).await.unwrap();
  assert_eq!(s.get_mismatch(id).await.unwrap().issue_ids, vec!["OL-7", "OL-3"]);

  s.remove_issue_id(id, "OL-7".into()).await.unwrap();
  s.remove_issue_id(id, "OL-7".into()).await.unwrap();
  assert_eq!(s.get_mismatch(id).await.unwrap().issue_ids, vec!["OL-3"]);

  assert!(matches!(
    s.add_issue_id(-1, "OL-1".into()).await,
    Err(Error::MismatchNotFound(-1))
  ));
}

// ─── Scrape queue ────────────────────────────────────────────────────────────

async fn references(dir: &TempDir) -> SqliteReferenceStore {
  store()
    .await
    .reference_store(dir.path().join("staging"), dir.path().join("archive"))
}

#[tokio::test]
async fn queue_head_is_highest_priority_then_oldest() {
  let dir = TempDir::new().unwrap();
  let r = references(&dir).await;
  let (a, b, c) = (bill("A1"), bill("B2"), bill("C3"));
  r.enqueue_at(&a, 1, t(1)).await.unwrap();
  r.enqueue_at(&b, 2, t(2)).await.unwrap();
  r.enqueue_at(&c, 2, t(3)).await.unwrap();

  for expected in [&b, &c, &a] {
    let head = r.dequeue_head().await.unwrap();
    assert_eq!(&head.key, expected);
    assert!(r.remove(&head.key).await.unwrap());
  }
  assert!(matches!(r.dequeue_head().await, Err(Error::QueueEmpty)));
  assert!(!r.remove(&a).await.unwrap());
}

#[tokio::test]
async fn queue_listing_breaks_ties_by_opposite_order() {
  let dir = TempDir::new().unwrap();
  let r = references(&dir).await;
  let (a, b, c) = (bill("A1"), bill("B2"), bill("C3"));
  r.enqueue_at(&a, 1, t(1)).await.unwrap();
  r.enqueue_at(&b, 2, t(2)).await.unwrap();
  r.enqueue_at(&c, 2, t(3)).await.unwrap();

  let keys = |entries: Vec<ScrapeQueueEntry>| -> Vec<ContentKey> {
    entries.into_iter().map(|e| e.key).collect()
  };
  let desc = r.list_queue(SortOrder::Desc, LimitOffset::ALL).await.unwrap();
  assert_eq!(desc.total, 3);
  assert_eq!(keys(desc.items), vec![b.clone(), c.clone(), a.clone()]);
  let asc = r.list_queue(SortOrder::Asc, LimitOffset::new(2, 0)).await.unwrap();
  assert_eq!(keys(asc.items), vec![a, c]);
}

#[tokio::test]
async fn enqueue_twice_keeps_one_entry_with_latest_values() {
  let dir = TempDir::new().unwrap();
  let r = references(&dir).await;
  let key = bill("S100");
  r.enqueue_at(&key, 1, t(1)).await.unwrap();
  r.enqueue_at(&key, 5, t(2)).await.unwrap();

  let queue = r.list_queue(SortOrder::Desc, LimitOffset::ALL).await.unwrap();
  assert_eq!(queue.total, 1);
  assert_eq!(queue.items[0].priority, 5);
  assert_eq!(queue.items[0].added_datetime, t(2));
}

#[tokio::test]
async fn dead_letters_leave_the_queue() {
  let dir = TempDir::new().unwrap();
  let r = references(&dir).await;
  let entry = r.enqueue_at(&bill("S100"), 3, t(1)).await.unwrap();
  r.dead_letter(DeadLetter {
    entry,
    attempts: 3,
    last_error: "connection reset".into(),
    failed_datetime: t(2),
  })
  .await
  .unwrap();

  assert!(matches!(r.dequeue_head().await, Err(Error::QueueEmpty)));
  let dead = r.list_dead_letters(LimitOffset::ALL).await.unwrap();
  assert_eq!(dead.total, 1);
  assert_eq!(dead.items[0].attempts, 3);
  assert_eq!(dead.items[0].entry.key, bill("S100"));
  assert_eq!(dead.items[0].last_error, "connection reset");
}

// ─── Scrape files ────────────────────────────────────────────────────────────

#[tokio::test]
async fn staged_files_are_listed_read_and_archived() {
  let dir = TempDir::new().unwrap();
  let r = references(&dir).await;
  let s100 = BaseBillId::new("S100", 2023).unwrap();
  let s200 = BaseBillId::new("S200", 2023).unwrap();

  let later = r.save_content_at(&s100, b"<html>later</html>", t(2)).await.unwrap();
  let earlier = r.save_content_at(&s200, b"<html>earlier</html>", t(1)).await.unwrap();
  assert_eq!(later.file_name, "2023-S100-20230302T120000.html");
  assert!(later.path().starts_with(r.staging_dir()));
  assert!(later.path().exists());

  let incoming = r.list_incoming().await.unwrap();
  assert_eq!(incoming, vec![earlier.clone(), later.clone()]);
  assert_eq!(r.read_content(&earlier).await.unwrap(), "<html>earlier</html>");

  let archived = r.archive(earlier.clone()).await.unwrap();
  assert!(archived.archived);
  assert!(!archived.pending_processing);
  assert!(!earlier.path().exists());
  assert!(archived.path().starts_with(r.archive_dir()));
  assert_eq!(r.read_content(&archived).await.unwrap(), "<html>earlier</html>");
  assert_eq!(r.list_incoming().await.unwrap(), vec![later]);
}

#[tokio::test]
async fn archiving_replaces_an_existing_archive_file() {
  let dir = TempDir::new().unwrap();
  let r = references(&dir).await;
  let bill = BaseBillId::new("S100", 2023).unwrap();

  let first = r.save_content_at(&bill, b"first", t(1)).await.unwrap();
  r.archive(first).await.unwrap();
  let second = r.save_content_at(&bill, b"second", t(1)).await.unwrap();
  let archived = r.archive(second).await.unwrap();

  assert_eq!(r.read_content(&archived).await.unwrap(), "second");
  assert!(r.list_incoming().await.unwrap().is_empty());
}

#[tokio::test]
async fn file_flags_are_the_authority_on_pending_work() {
  let dir = TempDir::new().unwrap();
  let r = references(&dir).await;
  let bill = BaseBillId::new("S100", 2023).unwrap();
  let mut file = r.save_content_at(&bill, b"page", t(1)).await.unwrap();

  file.pending_processing = false;
  r.update_file_flags(&file).await.unwrap();
  assert!(r.list_incoming().await.unwrap().is_empty());
  assert!(file.path().exists());
}
