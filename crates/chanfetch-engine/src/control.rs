// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caller-facing operations on items and downloads.
//!
//! These are what an API or the CLI calls. Every mutation of the queue
//! ends with a wakeup so the supervisor reacts without waiting for a tick.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use chanfetch_core::pattern;
use chanfetch_core::{
    ChanfetchError, Download, DownloadId, FileHandle, Item, ItemId, ItemPatch, MAX_PRIORITY,
    MIN_PRIORITY, MessageId, NewDownload, NewItem, ScanFilter,
};

use crate::engine::Engine;
use crate::task::TaskState;

/// Live state of a registered task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveState {
    pub file: Option<FileHandle>,
    pub priority: i32,
    pub error_count: u32,
    pub fatal: bool,
    pub completed: bool,
    pub last_error: Option<String>,
    pub last_error_at: Option<i64>,
}

impl LiveState {
    pub fn of(task: &TaskState) -> Self {
        let last = task.log().last_error();
        Self {
            file: task.file().map(|snapshot| snapshot.file.clone()),
            priority: task.priority(),
            error_count: task.log().error_count(),
            fatal: task.is_fatal(),
            completed: task.is_completed(),
            last_error: last.as_ref().map(|e| e.message.clone()),
            last_error_at: last.as_ref().map(|e| e.at),
        }
    }
}

/// A download row merged with its task, if one is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadView {
    #[serde(flatten)]
    pub download: Download,
    pub live: Option<LiveState>,
}

fn check_priority(priority: i32) -> Result<(), ChanfetchError> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(())
    } else {
        Err(ChanfetchError::Invalid(format!(
            "priority {priority} is outside {MIN_PRIORITY}..={MAX_PRIORITY}"
        )))
    }
}

impl Engine {
    /// Creates an item and queues the given messages of its channel.
    ///
    /// Every message must carry a video; nothing is written otherwise.
    pub async fn create_item(
        &self,
        new: NewItem,
        messages: &[MessageId],
    ) -> Result<(Item, Vec<Download>), ChanfetchError> {
        pattern::compile(&new.regexp)?;
        check_priority(new.priority)?;

        let ctx = &self.shared.ctx;
        let mut resolved = Vec::with_capacity(messages.len());
        for &message_id in messages {
            let message = ctx
                .call(ctx.source.get_message(new.channel_id, message_id))
                .await?;
            if ctx.source.video_attachment(&message).is_none() {
                return Err(ChanfetchError::NoVideo { message_id });
            }
            resolved.push(message);
        }

        let item = ctx.store.create_item(&new).await?;
        let rows: Vec<NewDownload> = resolved
            .iter()
            .filter_map(|message| NewDownload::from_message(item.id, item.priority, message))
            .collect();
        let downloads = if rows.is_empty() {
            Vec::new()
        } else {
            ctx.store.create_downloads(&rows).await?
        };

        info!(item = item.id, channel = item.channel_id, downloads = downloads.len(), "item created");
        self.wake();
        Ok((item, downloads))
    }

    pub async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<(), ChanfetchError> {
        if let Some(regexp) = &patch.regexp {
            pattern::compile(regexp)?;
        }
        if !self.shared.ctx.store.update_item(id, patch).await? {
            return Err(ChanfetchError::NotFound { kind: "item", id });
        }
        Ok(())
    }

    /// Deletes an item with its downloads and stops their transfers.
    /// Returns the ids of the removed downloads.
    pub async fn delete_item(&self, id: ItemId) -> Result<Vec<DownloadId>, ChanfetchError> {
        let removed = self
            .shared
            .ctx
            .store
            .delete_item(id)
            .await?
            .ok_or(ChanfetchError::NotFound { kind: "item", id })?;
        for &download_id in &removed {
            self.unregister(download_id).await;
        }
        info!(item = id, downloads = removed.len(), "item deleted");
        self.wake();
        Ok(removed)
    }

    pub async fn list_items(&self, active_after: i64) -> Result<Vec<Item>, ChanfetchError> {
        self.shared.ctx.store.list_items(active_after).await
    }

    /// Queues one message of the item's channel. The item's priority is used
    /// unless `priority` is given.
    pub async fn add_download_for_message(
        &self,
        item_id: ItemId,
        message_id: MessageId,
        priority: Option<i32>,
    ) -> Result<Download, ChanfetchError> {
        let ctx = &self.shared.ctx;
        let item = ctx.store.get_item(item_id).await?.ok_or(ChanfetchError::NotFound {
            kind: "item",
            id: item_id,
        })?;
        let priority = priority.unwrap_or(item.priority);
        check_priority(priority)?;

        let message = ctx
            .call(ctx.source.get_message(item.channel_id, message_id))
            .await?;
        let new = NewDownload::from_message(item.id, priority, &message)
            .ok_or(ChanfetchError::NoVideo { message_id })?;
        let download = ctx
            .store
            .create_downloads(std::slice::from_ref(&new))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ChanfetchError::Internal("insert returned no row".into()))?;

        info!(task = download.id, item = item_id, message = message_id, "download added");
        self.wake();
        Ok(download)
    }

    /// Drives a registered task now, or admits a queued download past the
    /// parallelism cap.
    pub async fn force_start(&self, id: DownloadId) -> Result<(), ChanfetchError> {
        let ctx = &self.shared.ctx;
        if let Some(task) = self.shared.registry.load(id) {
            task.update_or_download(ctx).await;
            return Ok(());
        }

        let row = ctx
            .store
            .get_queued_download(id)
            .await?
            .ok_or(ChanfetchError::NotFound { kind: "download", id })?;
        if row.download.downloaded {
            return Err(ChanfetchError::Conflict(format!(
                "download {id} is terminal, reset it first"
            )));
        }

        let task = {
            let guard = self.shared.registry.lock_admission().await;
            if let Some(task) = self.shared.registry.load(id) {
                task
            } else {
                if !ctx.store.set_downloading(id).await? {
                    return Err(ChanfetchError::Conflict(format!(
                        "download {id} changed state before it could start"
                    )));
                }
                let task = Arc::new(TaskState::new(&row, ctx.settings.max_download_error));
                guard.admit(Arc::clone(&task));
                info!(task = id, "download force-started");
                task
            }
        };
        task.update_or_download(ctx).await;
        Ok(())
    }

    /// Stops any transfer and puts the download back in the queue with its
    /// error cleared.
    pub async fn force_reset(&self, id: DownloadId) -> Result<(), ChanfetchError> {
        self.unregister(id).await;
        if !self.shared.ctx.store.reset_download(id).await? {
            return Err(ChanfetchError::NotFound { kind: "download", id });
        }
        info!(task = id, "download reset");
        self.wake();
        Ok(())
    }

    /// Persists the new priority and re-issues a live transfer at it.
    pub async fn update_priority(&self, id: DownloadId, priority: i32) -> Result<(), ChanfetchError> {
        check_priority(priority)?;
        let ctx = &self.shared.ctx;
        if !ctx.store.update_priority(id, priority).await? {
            return Err(ChanfetchError::NotFound { kind: "download", id });
        }
        if let Some(task) = self.shared.registry.load(id) {
            task.set_priority(priority);
            task.reprioritize(ctx).await;
        }
        Ok(())
    }

    pub async fn delete_download(&self, id: DownloadId) -> Result<(), ChanfetchError> {
        self.unregister(id).await;
        if !self.shared.ctx.store.delete_download(id).await? {
            return Err(ChanfetchError::NotFound { kind: "download", id });
        }
        info!(task = id, "download deleted");
        self.wake();
        Ok(())
    }

    /// Registered tasks merged with their rows, ordered by id.
    pub async fn list_active(&self) -> Result<Vec<DownloadView>, ChanfetchError> {
        let store = &self.shared.ctx.store;
        let mut views = Vec::new();
        for task in self.shared.registry.range() {
            if let Some(download) = store.get_download(task.id()).await? {
                views.push(DownloadView {
                    download,
                    live: Some(LiveState::of(&task)),
                });
            }
        }
        Ok(views)
    }

    pub async fn list_item_downloads(
        &self,
        item_id: ItemId,
    ) -> Result<Vec<DownloadView>, ChanfetchError> {
        let rows = self.shared.ctx.store.list_item_downloads(item_id).await?;
        Ok(rows
            .into_iter()
            .map(|download| {
                let live = self
                    .shared
                    .registry
                    .load(download.id)
                    .map(|task| LiveState::of(&task));
                DownloadView { download, live }
            })
            .collect())
    }

    /// Runs a scan and returns the number of downloads it created.
    pub async fn scan(&self, filter: ScanFilter) -> Result<usize, ChanfetchError> {
        let created = self.shared.scanner.scan(filter).await?;
        if created > 0 {
            self.wake();
        }
        Ok(created)
    }

    /// Removes a task from the registry and stops its transfer.
    async fn unregister(&self, id: DownloadId) {
        if let Some(task) = self.shared.registry.load_and_delete(id) {
            task.terminate(&self.shared.ctx).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_bounds() {
        assert!(check_priority(MIN_PRIORITY).is_ok());
        assert!(check_priority(MAX_PRIORITY).is_ok());
        assert!(matches!(check_priority(0), Err(ChanfetchError::Invalid(_))));
        assert!(matches!(check_priority(33), Err(ChanfetchError::Invalid(_))));
    }

    #[test]
    fn view_flattens_the_row() {
        let download = crate::testing::queued(3, 7).download;
        let view = DownloadView {
            download,
            live: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["priority"], 7);
        assert!(json["live"].is_null());
    }
}
