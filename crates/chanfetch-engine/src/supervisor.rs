// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The two supervisor loops.
//!
//! The reconciliation loop sweeps the registry, backfills free slots from the
//! queue, and cleans the source once the system runs dry. The listener loop
//! applies the source's push updates as they arrive. Both mutate task state
//! only through the registry and the tasks' own atomics.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chanfetch_core::{FileHandle, ScanFilter, SourceUpdate};

use crate::completion::{self, Completion};
use crate::engine::Shared;
use crate::task::TaskState;

/// What one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassOutcome {
    pub admitted: usize,
    /// Nothing registered and nothing queued: poll slowly.
    pub idle: bool,
}

pub(crate) async fn run_reconcile(
    shared: Arc<Shared>,
    mut wake_rx: mpsc::Receiver<()>,
    cancel: CancellationToken,
) {
    info!("reconciliation loop started");
    loop {
        let outcome = reconcile_pass(&shared).await;
        let delay = if outcome.idle {
            shared.ctx.settings.idle_interval
        } else {
            shared.ctx.settings.tick_interval
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(()) = wake_rx.recv() => debug!("reconciliation woken"),
            _ = tokio::time::sleep(delay) => {}
        }
    }
    info!("reconciliation loop stopped");
}

pub(crate) async fn run_listener(
    shared: Arc<Shared>,
    mut updates: mpsc::Receiver<SourceUpdate>,
    cancel: CancellationToken,
) {
    info!("update listener started");
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            update = updates.recv() => match update {
                Some(update) => handle_update(&shared, update).await,
                None => {
                    warn!("source update stream closed");
                    break;
                }
            },
        }
    }
    info!("update listener stopped");
}

/// One pass: sweep every registered task, then admit into the freed slots.
pub(crate) async fn reconcile_pass(shared: &Shared) -> PassOutcome {
    for task in shared.registry.range() {
        sweep(shared, &task).await;
    }

    let admitted = admit(shared).await;
    if admitted > 0 || !shared.registry.is_empty() {
        return PassOutcome {
            admitted,
            idle: false,
        };
    }

    let guard = shared.registry.lock_admission().await;
    if !guard.is_empty() {
        return PassOutcome::default();
    }
    match guard.clean(shared.ctx.source.as_ref()).await {
        Ok(true) => debug!("queue drained"),
        Ok(false) => {}
        Err(err) => warn!(error = %err, "failed to clean source downloads"),
    }
    PassOutcome {
        admitted: 0,
        idle: true,
    }
}

async fn sweep(shared: &Shared, task: &Arc<TaskState>) {
    let ctx = &shared.ctx;
    if task.is_fatal() {
        persist_fatal(shared, task).await;
        return;
    }
    if task.is_completed() {
        shared.registry.delete_task(task);
        return;
    }
    if task.is_stale(ctx.settings.stale_after) {
        task.update_or_download(ctx).await;
    }
    if task.transfer_done() && !task.is_fatal() {
        finish(shared, task).await;
    }
}

/// Writes the fatal state; the task leaves the registry only once it is durable.
async fn persist_fatal(shared: &Shared, task: &Arc<TaskState>) {
    let ctx = &shared.ctx;
    let (message, at) = match task.log().last_error() {
        Some(state) => (state.message.clone(), state.at),
        None => ("fatal".to_owned(), crate::context::unix_now()),
    };
    if !shared
        .registry
        .load(task.id())
        .is_some_and(|current| Arc::ptr_eq(&current, task))
    {
        debug!(task = task.id(), "fatal task was replaced, skipping write");
        return;
    }
    let write = ctx.store.mark_fatal(task.id(), &message, at);
    match tokio::time::timeout(ctx.settings.persist_timeout, write).await {
        Ok(Ok(true)) => {
            shared.registry.delete_task(task);
            info!(task = task.id(), item = task.item_id(), "fatal download retired");
        }
        Ok(Ok(false)) => {
            shared.registry.delete_task(task);
            debug!(task = task.id(), "row left the active state, fatal state dropped");
        }
        Ok(Err(err)) => {
            warn!(task = task.id(), error = %err, "failed to persist fatal state, will retry");
        }
        Err(_) => warn!(task = task.id(), "persisting fatal state timed out, will retry"),
    }
}

/// Returns `true` once the task has left the registry.
async fn finish(shared: &Shared, task: &Arc<TaskState>) -> bool {
    match completion::complete(&shared.ctx, task).await {
        Ok(Completion::Done) => {
            shared.registry.delete_task(task);
            true
        }
        Ok(Completion::InProgress) => {
            debug!(task = task.id(), "completion already running");
            false
        }
        Err(err) => {
            debug!(task = task.id(), error = %err, "completion deferred");
            false
        }
    }
}

/// Promotes queued rows into the free slots. Returns the number admitted.
async fn admit(shared: &Shared) -> usize {
    let ctx = &shared.ctx;
    let guard = shared.registry.lock_admission().await;
    let free = ctx
        .settings
        .max_parallel_download
        .saturating_sub(guard.len());
    if free == 0 {
        return 0;
    }

    let queued = match ctx.store.next_queued(free).await {
        Ok(queued) => queued,
        Err(err) => {
            warn!(error = %err, "failed to read the download queue");
            return 0;
        }
    };

    let mut admitted = Vec::with_capacity(queued.len());
    for row in &queued {
        match ctx.store.set_downloading(row.download.id).await {
            Ok(true) => {
                let task = Arc::new(TaskState::new(row, ctx.settings.max_download_error));
                guard.admit(Arc::clone(&task));
                admitted.push(task);
            }
            Ok(false) => debug!(task = row.download.id, "queued row changed before admission"),
            Err(err) => {
                warn!(task = row.download.id, error = %err, "failed to admit download");
                break;
            }
        }
    }
    drop(guard);

    for task in &admitted {
        info!(task = task.id(), item = task.item_id(), priority = task.priority(), "download admitted");
        task.update_or_download(ctx).await;
    }
    admitted.len()
}

pub(crate) async fn handle_update(shared: &Shared, update: SourceUpdate) {
    match update {
        SourceUpdate::FileProgress(file) => apply_progress(shared, &file).await,
        SourceUpdate::NewMessage {
            channel_id,
            message_id,
        } => {
            let filter = ScanFilter::for_new_message(channel_id, message_id);
            match shared.scanner.scan(filter).await {
                Ok(0) => {}
                Ok(created) => {
                    debug!(channel = channel_id, message = message_id, created, "new message matched");
                    shared.wake();
                }
                Err(err) => warn!(channel = channel_id, error = %err, "scan for new message failed"),
            }
        }
    }
}

/// Applies a file state to every task sharing the file.
async fn apply_progress(shared: &Shared, file: &FileHandle) {
    for task in shared.registry.range() {
        if task.file_id().as_ref() != Some(&file.id) {
            continue;
        }
        task.set_file(file.clone());
        if file.is_downloading_completed && !task.is_fatal() && finish(shared, &task).await {
            shared.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chanfetch_core::{DownloadStore, NewDownload, Source};
    use chanfetch_test_utils::{TestHarness, text_message};
    use tracing_test::traced_test;

    use crate::{Engine, EngineSettings};

    #[tokio::test]
    #[traced_test]
    async fn failed_fatal_write_is_logged() {
        let h = TestHarness::new().await.unwrap();
        let item = h.sqlite.create_item(&h.item(-5)).await.unwrap();
        h.source.add_message(text_message(-5, 1, 10, "plain"));
        h.sqlite
            .create_downloads(&[NewDownload {
                item_id: item.id,
                msg_id: 1,
                text: String::new(),
                size: 0,
                date: 10,
                priority: 5,
            }])
            .await
            .unwrap();
        h.flaky.set_fail_mark_fatal(true);

        let engine = Engine::new(
            h.source.clone() as std::sync::Arc<dyn Source>,
            h.flaky.clone() as std::sync::Arc<dyn DownloadStore>,
            EngineSettings {
                stale_after: Duration::ZERO,
                ..EngineSettings::default()
            },
        );
        engine.reconcile_once().await;
        engine.reconcile_once().await;

        assert!(logs_contain("task is fatal"));
        assert!(logs_contain("failed to persist fatal state, will retry"));
        assert_eq!(engine.registry().len(), 1);
    }
}
