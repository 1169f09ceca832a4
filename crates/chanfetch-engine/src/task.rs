// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-download task state and its error accumulator.
//!
//! A [`TaskState`] mirrors one active Download row. Its file snapshot and
//! last error are immutable values swapped atomically, so readers on other
//! loops never observe a half-updated state.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tracing::{debug, error, warn};

use chanfetch_core::{
    ChanfetchError, ChannelId, DownloadId, FileHandle, FileId, ItemId, MessageId, QueuedDownload,
};

use crate::context::{unix_now, EngineContext};

/// The source's view of a file at the moment it was observed.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub file: FileHandle,
    pub updated_at: Instant,
}

/// Last recorded failure of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorState {
    pub message: String,
    /// Unix seconds.
    pub at: i64,
}

/// Error accumulator: last error, counted failures, and the fatal flag.
pub struct TaskLog {
    last: ArcSwapOption<ErrorState>,
    count: AtomicU32,
    fatal: AtomicBool,
    max_errors: u32,
}

impl TaskLog {
    pub fn new(max_errors: u32) -> Self {
        Self {
            last: ArcSwapOption::empty(),
            count: AtomicU32::new(0),
            fatal: AtomicBool::new(false),
            max_errors,
        }
    }

    pub fn error_count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal.load(Ordering::Acquire)
    }

    pub fn last_error(&self) -> Option<Arc<ErrorState>> {
        self.last.load_full()
    }

    /// Stores the failure and, if `counted`, bumps the counter. Returns `true`
    /// when this call made the task fatal.
    pub fn record(&self, message: String, at: i64, counted: bool) -> bool {
        self.last.store(Some(Arc::new(ErrorState { message, at })));
        if !counted {
            return false;
        }
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        count >= self.max_errors && !self.fatal.swap(true, Ordering::AcqRel)
    }

    /// Records the failure and marks fatal regardless of the counter.
    pub fn record_fatal(&self, message: String, at: i64) {
        self.last.store(Some(Arc::new(ErrorState { message, at })));
        self.fatal.store(true, Ordering::Release);
    }
}

/// In-memory state of one admitted download.
pub struct TaskState {
    download_id: DownloadId,
    item_id: ItemId,
    channel_id: ChannelId,
    message_id: MessageId,
    file: ArcSwapOption<FileSnapshot>,
    priority: AtomicI32,
    completed: AtomicBool,
    completing: tokio::sync::Mutex<()>,
    log: TaskLog,
}

impl std::fmt::Debug for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskState")
            .field("download_id", &self.download_id)
            .field("item_id", &self.item_id)
            .field("priority", &self.priority())
            .field("completed", &self.is_completed())
            .field("fatal", &self.is_fatal())
            .finish()
    }
}

impl TaskState {
    pub fn new(queued: &QueuedDownload, max_errors: u32) -> Self {
        Self {
            download_id: queued.download.id,
            item_id: queued.download.item_id,
            channel_id: queued.channel_id,
            message_id: queued.download.msg_id,
            file: ArcSwapOption::empty(),
            priority: AtomicI32::new(queued.download.priority),
            completed: AtomicBool::new(false),
            completing: tokio::sync::Mutex::new(()),
            log: TaskLog::new(max_errors),
        }
    }

    pub fn id(&self) -> DownloadId {
        self.download_id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Release);
    }

    pub fn log(&self) -> &TaskLog {
        &self.log
    }

    pub fn is_fatal(&self) -> bool {
        self.log.is_fatal()
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_completed(&self) {
        self.completed.store(true, Ordering::Release);
    }

    /// Non-blocking acquisition of the completion latch.
    pub(crate) fn try_begin_completion(&self) -> Option<tokio::sync::MutexGuard<'_, ()>> {
        self.completing.try_lock().ok()
    }

    pub fn file(&self) -> Option<Arc<FileSnapshot>> {
        self.file.load_full()
    }

    pub fn file_id(&self) -> Option<FileId> {
        self.file.load().as_ref().map(|s| s.file.id.clone())
    }

    /// Replaces the file snapshot with a freshly observed state.
    pub fn set_file(&self, file: FileHandle) {
        self.file.store(Some(Arc::new(FileSnapshot {
            file,
            updated_at: Instant::now(),
        })));
    }

    /// No snapshot yet, or one older than `after`.
    pub fn is_stale(&self, after: Duration) -> bool {
        match self.file.load().as_ref() {
            Some(snapshot) => snapshot.updated_at.elapsed() >= after,
            None => true,
        }
    }

    /// The last observed state reports a finished transfer.
    pub fn transfer_done(&self) -> bool {
        self.file
            .load()
            .as_ref()
            .is_some_and(|s| s.file.is_downloading_completed)
    }

    /// Brings the transfer forward: resolve the file on first run, otherwise
    /// refresh it, and (re)issue the download when it is neither running nor
    /// finished. Failures are recorded on the task, never returned.
    pub async fn update_or_download(&self, ctx: &EngineContext) {
        if self.is_fatal() || self.is_completed() {
            return;
        }
        if let Err(err) = self.try_update_or_download(ctx).await {
            match err {
                ChanfetchError::NoVideo { .. } => self.fail_fatal(ctx, &err),
                _ => self.fail(ctx, &err, true),
            }
        }
    }

    async fn try_update_or_download(&self, ctx: &EngineContext) -> Result<(), ChanfetchError> {
        let file = match self.file() {
            None => self.resolve(ctx).await?,
            Some(snapshot) => ctx.call(ctx.source.get_file(&snapshot.file.id)).await?,
        };
        self.set_file(file.clone());

        if file.is_downloading_completed || file.is_downloading_active {
            return Ok(());
        }

        let priority = self.priority();
        debug!(task = self.download_id, file_id = %file.id, priority, "requesting download");
        let file = ctx
            .call(ctx.source.download_file(&file.id, priority))
            .await?;
        self.set_file(file);
        Ok(())
    }

    /// Looks up the message and returns its video file.
    async fn resolve(&self, ctx: &EngineContext) -> Result<FileHandle, ChanfetchError> {
        let message = ctx
            .call(ctx.source.get_message(self.channel_id, self.message_id))
            .await?;
        ctx.source
            .video_attachment(&message)
            .map(|video| video.file.clone())
            .ok_or(ChanfetchError::NoVideo {
                message_id: self.message_id,
            })
    }

    /// Re-issues the transfer at the current priority, if one is known and unfinished.
    pub async fn reprioritize(&self, ctx: &EngineContext) {
        if self.is_fatal() || self.is_completed() {
            return;
        }
        let Some(snapshot) = self.file() else {
            return;
        };
        if snapshot.file.is_downloading_completed {
            return;
        }
        match ctx
            .call(ctx.source.download_file(&snapshot.file.id, self.priority()))
            .await
        {
            Ok(file) => self.set_file(file),
            Err(err) => self.fail(ctx, &err, true),
        }
    }

    /// Stops the transfer at the source and forgets the file. No-op when fatal.
    pub async fn terminate(&self, ctx: &EngineContext) {
        if self.is_fatal() {
            return;
        }
        let Some(snapshot) = self.file() else {
            return;
        };
        let file_id = &snapshot.file.id;
        if !snapshot.file.is_downloading_completed
            && let Err(err) = ctx.call(ctx.source.cancel_download_file(file_id)).await
        {
            warn!(task = self.download_id, %file_id, error = %err, "failed to cancel transfer");
        }
        if let Err(err) = ctx.call(ctx.source.remove_file_from_downloads(file_id)).await {
            warn!(task = self.download_id, %file_id, error = %err, "failed to remove file from downloads");
        }
    }

    /// Records a failure and persists it in the background.
    pub(crate) fn fail(&self, ctx: &EngineContext, err: &ChanfetchError, counted: bool) {
        let message = err.to_string();
        let at = unix_now();
        error!(task = self.download_id, item = self.item_id, error = %message, "task error");
        if self.log.record(message.clone(), at, counted) {
            error!(
                task = self.download_id,
                errors = self.log.error_count(),
                "error limit reached, task is fatal"
            );
        }
        self.persist_error(ctx, message, at);
    }

    /// Records a permanent failure: the task turns fatal on this call.
    pub(crate) fn fail_fatal(&self, ctx: &EngineContext, err: &ChanfetchError) {
        let message = err.to_string();
        let at = unix_now();
        error!(task = self.download_id, item = self.item_id, error = %message, "task is fatal");
        self.log.record_fatal(message.clone(), at);
        self.persist_error(ctx, message, at);
    }

    fn persist_error(&self, ctx: &EngineContext, message: String, at: i64) {
        let store = Arc::clone(&ctx.store);
        let limit = ctx.settings.persist_timeout;
        let id = self.download_id;
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(task = id, "no runtime to persist task error");
            return;
        };
        runtime.spawn(async move {
            match tokio::time::timeout(limit, store.record_error(id, &message, at)).await {
                Ok(Ok(true)) => {}
                Ok(Ok(false)) => debug!(task = id, "row no longer active, error not stored"),
                Ok(Err(err)) => warn!(task = id, error = %err, "failed to persist task error"),
                Err(_) => warn!(task = id, "persisting task error timed out"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::queued;

    #[test]
    fn log_turns_fatal_on_the_threshold_call() {
        let log = TaskLog::new(3);
        assert!(!log.record("a".into(), 1, true));
        assert!(!log.record("b".into(), 2, true));
        assert!(!log.is_fatal());
        assert!(log.record("c".into(), 3, true), "third error reaches the limit");
        assert!(log.is_fatal());
        assert!(!log.record("d".into(), 4, true), "fatal is reported once");
        assert_eq!(log.last_error().unwrap().message, "d");
    }

    #[test]
    fn uncounted_errors_do_not_escalate() {
        let log = TaskLog::new(1);
        assert!(!log.record("transient".into(), 1, false));
        assert_eq!(log.error_count(), 0);
        assert!(!log.is_fatal());
        assert_eq!(log.last_error().unwrap().at, 1);
    }

    #[test]
    fn fresh_task_is_stale_until_observed() {
        let task = TaskState::new(&queued(1, 5), 5);
        assert!(task.is_stale(Duration::from_secs(3600)));
        assert!(!task.transfer_done());
        task.set_file(FileHandle::remote(FileId::from("f"), 10));
        assert!(!task.is_stale(Duration::from_secs(3600)));
        assert!(task.is_stale(Duration::ZERO));
        assert_eq!(task.file_id(), Some(FileId::from("f")));
    }

    #[test]
    fn completion_latch_is_exclusive() {
        let task = TaskState::new(&queued(1, 5), 5);
        let first = task.try_begin_completion();
        assert!(first.is_some());
        assert!(task.try_begin_completion().is_none());
        drop(first);
        assert!(task.try_begin_completion().is_some());
    }

    #[test]
    fn priority_is_mutable() {
        let task = TaskState::new(&queued(1, 5), 5);
        assert_eq!(task.priority(), 5);
        task.set_priority(20);
        assert_eq!(task.priority(), 20);
    }
}
