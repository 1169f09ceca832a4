// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Supervisor behaviour: fatal persistence, cleaning, push updates, resume,
//! and the caller-facing control operations.

use std::sync::Arc;
use std::time::Duration;

use chanfetch_core::{
    ChanfetchError, Download, DownloadStatus, DownloadStore, FileId, Item, NewDownload,
    SourceUpdate, Source,
};
use chanfetch_engine::{Engine, EngineSettings};
use chanfetch_test_utils::{SourceOp, TestHarness, text_message, video_message};
use tokio_util::sync::CancellationToken;

const CHANNEL: i64 = -1002;

fn settings() -> EngineSettings {
    EngineSettings {
        stale_after: Duration::ZERO,
        file_mode: 0o755,
        max_parallel_download: 2,
        ..EngineSettings::default()
    }
}

fn engine_over(h: &TestHarness, store: Arc<dyn DownloadStore>, settings: EngineSettings) -> Engine {
    Engine::new(Arc::clone(&h.source) as Arc<dyn Source>, store, settings)
}

fn engine(h: &TestHarness) -> Engine {
    engine_over(h, Arc::clone(&h.sqlite) as Arc<dyn DownloadStore>, settings())
}

/// An item with one queued download per `(message id, file id)`.
async fn seed(h: &TestHarness, messages: &[(i64, &str)]) -> (Item, Vec<Download>) {
    let item = h.sqlite.create_item(&h.item(CHANNEL)).await.unwrap();
    let mut rows = Vec::new();
    for &(id, file) in messages {
        let message = video_message(CHANNEL, id, 100 + id, &format!("S01E{id:02}"), file, 8);
        h.source.add_message(message.clone());
        rows.push(NewDownload::from_message(item.id, 5, &message).unwrap());
    }
    let rows = h.sqlite.create_downloads(&rows).await.unwrap();
    (item, rows)
}

#[tokio::test]
async fn missing_video_is_fatal_and_persisted_once_the_store_recovers() {
    let h = TestHarness::new().await.unwrap();
    let item = h.sqlite.create_item(&h.item(CHANNEL)).await.unwrap();
    h.source.add_message(text_message(CHANNEL, 1, 100, "no video here"));
    let row = h
        .sqlite
        .create_downloads(&[NewDownload {
            item_id: item.id,
            msg_id: 1,
            text: String::new(),
            size: 0,
            date: 100,
            priority: 5,
        }])
        .await
        .unwrap()
        .remove(0);

    h.flaky.set_fail_mark_fatal(true);
    let engine = engine_over(&h, Arc::clone(&h.flaky) as Arc<dyn DownloadStore>, settings());

    engine.reconcile_once().await;
    let task = engine.registry().load(row.id).unwrap();
    assert!(task.is_fatal(), "no video is fatal without retries");
    assert_eq!(task.log().error_count(), 0);

    engine.reconcile_once().await;
    assert_eq!(h.flaky.mark_fatal_calls(), 1);
    assert!(engine.registry().load(row.id).is_some(), "kept until the write succeeds");

    h.flaky.set_fail_mark_fatal(false);
    engine.reconcile_once().await;
    assert_eq!(h.flaky.mark_fatal_calls(), 2);
    assert!(engine.registry().is_empty());
    let row = h.sqlite.get_download(row.id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(DownloadStatus::Fatal));
    assert!(row.error.contains("does not contain a video"));
}

#[tokio::test]
async fn stale_fatal_task_does_not_override_a_reset() {
    let h = TestHarness::new().await.unwrap();
    let item = h.sqlite.create_item(&h.item(CHANNEL)).await.unwrap();
    h.source.add_message(text_message(CHANNEL, 1, 100, "no video here"));
    let row = h
        .sqlite
        .create_downloads(&[NewDownload {
            item_id: item.id,
            msg_id: 1,
            text: String::new(),
            size: 0,
            date: 100,
            priority: 5,
        }])
        .await
        .unwrap()
        .remove(0);
    h.flaky.set_fail_mark_fatal(true);
    let engine = engine_over(&h, Arc::clone(&h.flaky) as Arc<dyn DownloadStore>, settings());

    engine.reconcile_once().await;
    let stale = engine.registry().load(row.id).unwrap();
    assert!(stale.is_fatal());

    // A reset lands while the sweep still holds the fatal task.
    assert!(h.sqlite.reset_download(row.id).await.unwrap());
    h.flaky.set_fail_mark_fatal(false);
    engine.reconcile_once().await;

    assert_eq!(h.flaky.mark_fatal_calls(), 2);
    let stored = h.sqlite.get_download(row.id).await.unwrap().unwrap();
    assert_ne!(stored.status(), Some(DownloadStatus::Fatal));
    assert_eq!(stored.status(), Some(DownloadStatus::Active), "re-admitted after the reset");
    let fresh = engine.registry().load(row.id).unwrap();
    assert!(!Arc::ptr_eq(&stale, &fresh));
}

#[tokio::test]
async fn failed_error_persistence_does_not_block_escalation() {
    let h = TestHarness::new().await.unwrap();
    let (_, rows) = seed(&h, &[(1, "f1")]).await;
    h.flaky.set_fail_record_error(true);
    let engine = engine_over(
        &h,
        Arc::clone(&h.flaky) as Arc<dyn DownloadStore>,
        EngineSettings {
            max_download_error: 1,
            ..settings()
        },
    );
    h.source.fail_next(SourceOp::GetMessage, 1);

    engine.reconcile_once().await;
    assert!(engine.registry().load(rows[0].id).unwrap().is_fatal());
}

#[tokio::test]
async fn clean_runs_once_per_empty_stretch() {
    let h = TestHarness::new().await.unwrap();
    let engine = engine(&h);

    let outcome = engine.reconcile_once().await;
    assert!(outcome.idle);
    assert_eq!(h.source.calls(SourceOp::RemoveAll), 1);
    assert_eq!(h.source.calls(SourceOp::CleanDirectory), 1);

    assert!(engine.reconcile_once().await.idle);
    assert_eq!(h.source.calls(SourceOp::RemoveAll), 1, "no second clean while empty");

    let (_, rows) = seed(&h, &[(1, "f1")]).await;
    let outcome = engine.reconcile_once().await;
    assert_eq!(outcome.admitted, 1);
    assert!(!outcome.idle);

    engine.delete_download(rows[0].id).await.unwrap();
    assert!(engine.reconcile_once().await.idle);
    assert_eq!(h.source.calls(SourceOp::RemoveAll), 2);
}

#[tokio::test]
async fn failed_clean_is_retried() {
    let h = TestHarness::new().await.unwrap();
    let engine = engine(&h);
    h.source.fail_next(SourceOp::RemoveAll, 1);

    engine.reconcile_once().await;
    assert_eq!(h.source.calls(SourceOp::CleanDirectory), 0);
    engine.reconcile_once().await;
    assert_eq!(h.source.calls(SourceOp::RemoveAll), 2);
    assert_eq!(h.source.calls(SourceOp::CleanDirectory), 1);
}

#[tokio::test]
async fn sweep_backfills_the_slot_freed_by_completion() {
    let h = TestHarness::new().await.unwrap();
    let (_, rows) = seed(&h, &[(1, "f1"), (2, "f2")]).await;
    let engine = engine_over(
        &h,
        Arc::clone(&h.sqlite) as Arc<dyn DownloadStore>,
        EngineSettings {
            max_parallel_download: 1,
            ..settings()
        },
    );

    engine.reconcile_once().await;
    let first = engine.registry().range().remove(0);
    let file = first.file_id().unwrap();
    h.source.complete_file(&file, b"one").await.unwrap();

    let outcome = engine.reconcile_once().await;
    assert_eq!(outcome.admitted, 1, "completed slot refilled in the same pass");
    assert!(engine.registry().load(first.id()).is_none());
    let ids: Vec<_> = engine.registry().range().iter().map(|t| t.id()).collect();
    let other = rows.iter().find(|r| r.id != first.id()).unwrap().id;
    assert_eq!(ids, vec![other]);
}

#[tokio::test]
async fn progress_update_completes_the_task_inline() {
    let h = TestHarness::new().await.unwrap();
    let (_, rows) = seed(&h, &[(3, "f3")]).await;
    let engine = engine(&h);
    engine.reconcile_once().await;

    let done = h.source.complete_file(&FileId::from("f3"), b"video").await.unwrap();
    engine.handle_update(SourceUpdate::FileProgress(done)).await;

    assert!(engine.registry().is_empty());
    assert_eq!(std::fs::read(h.target_dir().join("ep01.mp4")).unwrap(), b"video");
    let row = h.sqlite.get_download(rows[0].id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(DownloadStatus::Completed));
}

#[tokio::test]
async fn empty_file_name_is_a_conflict_not_a_hidden_file() {
    let h = TestHarness::new().await.unwrap();
    let mut new = h.item(CHANNEL);
    new.pattern = "$9".into();
    let item = h.sqlite.create_item(&new).await.unwrap();
    let message = video_message(CHANNEL, 1, item.date_start + 1, "S01E01", "e1", 4);
    h.source.add_message(message.clone());
    let row = h
        .sqlite
        .create_downloads(&[NewDownload::from_message(item.id, 5, &message).unwrap()])
        .await
        .unwrap()
        .remove(0);
    let engine = engine(&h);
    engine.reconcile_once().await;

    let done = h.source.complete_file(&FileId::from("e1"), b"video").await.unwrap();
    engine.handle_update(SourceUpdate::FileProgress(done)).await;

    let task = engine.registry().load(row.id).expect("task stays registered");
    let last = task.log().last_error().unwrap();
    assert!(last.message.contains("empty file name"), "{}", last.message);
    assert!(!h.target_dir().join(".mp4").exists());
}

#[tokio::test]
async fn progress_for_unknown_file_is_ignored() {
    let h = TestHarness::new().await.unwrap();
    seed(&h, &[(1, "f1")]).await;
    let engine = engine(&h);
    engine.reconcile_once().await;

    let mut other = h.source.file(&FileId::from("f1")).unwrap();
    other.id = FileId::from("elsewhere");
    other.is_downloading_completed = true;
    engine.handle_update(SourceUpdate::FileProgress(other)).await;
    assert_eq!(engine.registry().len(), 1);
}

#[tokio::test]
async fn new_message_triggers_a_scoped_scan() {
    let h = TestHarness::new().await.unwrap();
    let item = h.sqlite.create_item(&h.item(CHANNEL)).await.unwrap();
    let engine = engine(&h);

    h.source.add_message(video_message(CHANNEL, 7, item.date_start + 1, "S02E01", "n7", 1));
    engine
        .handle_update(SourceUpdate::NewMessage {
            channel_id: CHANNEL,
            message_id: 7,
        })
        .await;
    let rows = h.sqlite.list_item_downloads(item.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].msg_id, 7);

    engine
        .handle_update(SourceUpdate::NewMessage {
            channel_id: CHANNEL,
            message_id: 7,
        })
        .await;
    assert_eq!(h.source.calls(SourceOp::GetHistory), 2, "second notice filtered out");
}

#[tokio::test]
async fn resume_registers_active_rows() {
    let h = TestHarness::new().await.unwrap();
    let (_, rows) = seed(&h, &[(1, "f1"), (2, "f2"), (3, "f3")]).await;
    h.sqlite.set_downloading(rows[0].id).await.unwrap();
    h.sqlite.set_downloading(rows[2].id).await.unwrap();

    let engine = engine(&h);
    assert_eq!(engine.resume().await.unwrap(), 2);
    let ids: Vec<_> = engine.registry().range().iter().map(|t| t.id()).collect();
    assert_eq!(ids, vec![rows[0].id, rows[2].id]);
}

#[tokio::test]
async fn start_runs_loops_until_cancelled() {
    let h = TestHarness::new().await.unwrap();
    let item = h.sqlite.create_item(&h.item(CHANNEL)).await.unwrap();
    h.source.add_message(video_message(CHANNEL, 1, item.date_start + 1, "S01E01", "f1", 1));
    let engine = engine(&h);
    let cancel = CancellationToken::new();

    engine.start(cancel.clone()).await.unwrap();
    assert_eq!(h.sqlite.list_item_downloads(item.id).await.unwrap().len(), 1, "startup scan");
    assert!(matches!(
        engine.start(cancel.clone()).await,
        Err(ChanfetchError::Internal(_))
    ));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), engine.wait())
        .await
        .expect("loops stop on cancel");
}

#[tokio::test]
async fn create_item_rejects_messages_without_video() {
    let h = TestHarness::new().await.unwrap();
    h.source.add_message(video_message(CHANNEL, 1, 100, "S01E01", "f1", 1));
    h.source.add_message(text_message(CHANNEL, 2, 101, "text"));
    let engine = engine(&h);

    let err = engine.create_item(h.item(CHANNEL), &[1, 2]).await.unwrap_err();
    assert!(matches!(err, ChanfetchError::NoVideo { message_id: 2 }));
    assert!(h.sqlite.list_items(-1).await.unwrap().is_empty());

    let (item, downloads) = engine.create_item(h.item(CHANNEL), &[1]).await.unwrap();
    assert_eq!(downloads.len(), 1);
    assert_eq!(downloads[0].item_id, item.id);

    let mut bad = h.item(CHANNEL);
    bad.regexp = "(".into();
    assert!(matches!(
        engine.create_item(bad, &[]).await,
        Err(ChanfetchError::InvalidPattern { .. })
    ));
}

#[tokio::test]
async fn add_download_rejects_duplicates() {
    let h = TestHarness::new().await.unwrap();
    let (item, _) = seed(&h, &[(1, "f1")]).await;
    h.source.add_message(video_message(CHANNEL, 9, 109, "S01E09", "f9", 1));
    let engine = engine(&h);

    let added = engine.add_download_for_message(item.id, 9, Some(20)).await.unwrap();
    assert_eq!(added.priority, 20);
    assert!(matches!(
        engine.add_download_for_message(item.id, 9, None).await,
        Err(ChanfetchError::Conflict(_))
    ));
    assert!(matches!(
        engine.add_download_for_message(item.id + 1, 9, None).await,
        Err(ChanfetchError::NotFound { kind: "item", .. })
    ));
}

#[tokio::test]
async fn priority_change_reissues_the_transfer() {
    let h = TestHarness::new().await.unwrap();
    let (_, rows) = seed(&h, &[(1, "f1")]).await;
    let engine = engine(&h);
    engine.reconcile_once().await;

    engine.update_priority(rows[0].id, 30).await.unwrap();
    assert_eq!(
        h.source.download_requests().last(),
        Some(&(FileId::from("f1"), 30))
    );
    assert_eq!(h.sqlite.get_download(rows[0].id).await.unwrap().unwrap().priority, 30);
    assert!(matches!(
        engine.update_priority(rows[0].id, 0).await,
        Err(ChanfetchError::Invalid(_))
    ));
}

#[tokio::test]
async fn force_start_bypasses_the_cap() {
    let h = TestHarness::new().await.unwrap();
    let (_, rows) = seed(&h, &[(1, "f1"), (2, "f2")]).await;
    let engine = engine_over(
        &h,
        Arc::clone(&h.sqlite) as Arc<dyn DownloadStore>,
        EngineSettings {
            max_parallel_download: 1,
            ..settings()
        },
    );
    engine.reconcile_once().await;
    let waiting = rows
        .iter()
        .find(|r| engine.registry().load(r.id).is_none())
        .unwrap()
        .id;

    engine.force_start(waiting).await.unwrap();
    assert_eq!(engine.registry().len(), 2);
    let row = h.sqlite.get_download(waiting).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(DownloadStatus::Active));
}

#[tokio::test]
async fn force_reset_requeues_a_fatal_download() {
    let h = TestHarness::new().await.unwrap();
    let (_, rows) = seed(&h, &[(1, "f1")]).await;
    let id = rows[0].id;
    assert!(h.sqlite.set_downloading(id).await.unwrap());
    assert!(h.sqlite.mark_fatal(id, "boom", 5).await.unwrap());
    let engine = engine(&h);

    engine.force_reset(id).await.unwrap();
    let row = h.sqlite.get_download(id).await.unwrap().unwrap();
    assert_eq!(row.status(), Some(DownloadStatus::Queued));
    assert!(row.error.is_empty());

    assert_eq!(engine.reconcile_once().await.admitted, 1);
    assert!(matches!(
        engine.force_reset(id + 100).await,
        Err(ChanfetchError::NotFound { .. })
    ));
}

#[tokio::test]
async fn delete_item_stops_its_transfers() {
    let h = TestHarness::new().await.unwrap();
    let (item, rows) = seed(&h, &[(1, "f1"), (2, "f2")]).await;
    let engine = engine(&h);
    engine.reconcile_once().await;
    assert_eq!(engine.registry().len(), 2);

    let removed = engine.delete_item(item.id).await.unwrap();
    assert_eq!(removed.len(), rows.len());
    assert!(engine.registry().is_empty());
    assert_eq!(h.source.calls(SourceOp::CancelDownload), 2);
    assert_eq!(h.source.calls(SourceOp::RemoveFile), 2);
    assert!(h.sqlite.get_item(item.id).await.unwrap().is_none());
}

#[tokio::test]
async fn listings_merge_live_state() {
    let h = TestHarness::new().await.unwrap();
    let (item, rows) = seed(&h, &[(1, "f1"), (2, "f2"), (3, "f3")]).await;
    let engine = engine(&h);
    engine.reconcile_once().await;

    let active = engine.list_active().await.unwrap();
    assert_eq!(active.len(), 2);
    let live = active[0].live.as_ref().unwrap();
    assert!(live.file.as_ref().unwrap().is_downloading_active);
    assert!(!live.fatal);

    let all = engine.list_item_downloads(item.id).await.unwrap();
    assert_eq!(all.len(), rows.len());
    assert_eq!(all.iter().filter(|v| v.live.is_some()).count(), 2);
}
