// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background file transfers from Telegram servers into the staging area.
//!
//! Each transfer runs on its own task: it resolves the file path with
//! `getFile`, streams the content into `temp/<name>.part`, and renames the
//! finished file into `videos/<name>`. Progress and the final state are
//! pushed on the source's update stream.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::StreamExt;
use teloxide::net::Download;
use teloxide::prelude::*;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use chanfetch_core::{ChanfetchError, FileHandle, FileId, SourceUpdate};

use crate::flood::with_flood_retry;

/// Bytes between two progress pushes.
const PROGRESS_STEP: i64 = 1 << 20;

struct Entry {
    state: FileHandle,
    name: String,
    abort: Option<AbortHandle>,
    /// Bumped on every (re)start and cancel so a stale job cannot write back.
    generation: u64,
}

pub(crate) struct Transfers {
    bot: Bot,
    staging: PathBuf,
    max_flood_retries: u32,
    updates: mpsc::Sender<SourceUpdate>,
    entries: DashMap<FileId, Entry>,
    generations: AtomicU64,
}

/// File name used in the staging area: the file id reduced to safe
/// characters plus the original extension (`mp4` when unknown).
pub(crate) fn staged_name(id: &FileId, original: Option<&str>) -> String {
    let mut stem: String = id
        .0
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if stem.is_empty() {
        stem.push_str("file");
    }
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("mp4");
    format!("{stem}.{ext}")
}

fn source_err(context: &str, err: impl std::error::Error + Send + Sync + 'static) -> ChanfetchError {
    ChanfetchError::Source {
        message: format!("{context}: {err}"),
        source: Some(Box::new(err)),
    }
}

async fn remove_if_present(path: &Path) -> Result<(), ChanfetchError> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(ChanfetchError::file(path, e)),
        _ => Ok(()),
    }
}

async fn remove_dir_if_present(path: &Path) -> Result<(), ChanfetchError> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(ChanfetchError::file(path, e)),
        _ => Ok(()),
    }
}

impl Transfers {
    pub(crate) fn new(
        bot: Bot,
        staging: PathBuf,
        max_flood_retries: u32,
        updates: mpsc::Sender<SourceUpdate>,
    ) -> Self {
        Self {
            bot,
            staging,
            max_flood_retries,
            updates,
            entries: DashMap::new(),
            generations: AtomicU64::new(0),
        }
    }

    fn videos_dir(&self) -> PathBuf {
        self.staging.join("videos")
    }

    fn temp_path(&self, name: &str) -> PathBuf {
        self.staging.join("temp").join(format!("{name}.part"))
    }

    /// Current state of a tracked file.
    pub(crate) fn state(&self, id: &FileId) -> Option<FileHandle> {
        self.entries.get(id).map(|entry| entry.state.clone())
    }

    /// Starts a transfer, replacing any earlier entry for the file.
    pub(crate) fn start(self: &Arc<Self>, id: FileId, size: i64, name: String) -> FileHandle {
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = FileHandle::remote(id.clone(), size);
        state.is_downloading_active = true;
        self.entries.insert(
            id.clone(),
            Entry {
                state: state.clone(),
                name: name.clone(),
                abort: None,
                generation,
            },
        );

        let job = tokio::spawn(Arc::clone(self).run(id.clone(), name, generation));
        if let Some(mut entry) = self.entries.get_mut(&id)
            && entry.generation == generation
        {
            entry.abort = Some(job.abort_handle());
        }
        debug!(file_id = %id, size, "transfer started");
        state
    }

    async fn run(self: Arc<Self>, id: FileId, name: String, generation: u64) {
        let result = self.fetch(&id, &name, generation).await;
        let state = {
            let Some(mut entry) = self.entries.get_mut(&id) else {
                return;
            };
            if entry.generation != generation {
                return;
            }
            entry.abort = None;
            entry.state.is_downloading_active = false;
            match result {
                Ok((path, written)) => {
                    entry.state.local_path = path.to_string_lossy().into_owned();
                    entry.state.downloaded_size = written;
                    entry.state.is_downloading_completed = true;
                    info!(file_id = %id, bytes = written, "transfer finished");
                }
                Err(err) => warn!(file_id = %id, error = %err, "transfer failed"),
            }
            entry.state.clone()
        };
        if self
            .updates
            .send(SourceUpdate::FileProgress(state))
            .await
            .is_err()
        {
            debug!(file_id = %id, "update stream closed");
        }
    }

    async fn fetch(
        &self,
        id: &FileId,
        name: &str,
        generation: u64,
    ) -> Result<(PathBuf, i64), ChanfetchError> {
        let tg_id = teloxide::types::FileId(id.0.clone());
        let file = with_flood_retry(self.max_flood_retries, || {
            let bot = self.bot.clone();
            let tg_id = tg_id.clone();
            async move { bot.get_file(tg_id).await }
        })
        .await
        .map_err(|e| source_err("failed to get file info", e))?;

        let temp = self.temp_path(name);
        let target = self.videos_dir().join(name);
        for dir in [temp.parent(), target.parent()].into_iter().flatten() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ChanfetchError::file(dir, e))?;
        }

        let mut out = tokio::fs::File::create(&temp)
            .await
            .map_err(|e| ChanfetchError::file(&temp, e))?;
        let mut stream = self.bot.download_file_stream(&file.path);
        let mut written: i64 = 0;
        let mut reported: i64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| source_err("failed to download file", e))?;
            out.write_all(&chunk)
                .await
                .map_err(|e| ChanfetchError::file(&temp, e))?;
            written += chunk.len() as i64;
            if written - reported >= PROGRESS_STEP {
                reported = written;
                self.report(id, written, generation);
            }
        }
        out.sync_all()
            .await
            .map_err(|e| ChanfetchError::file(&temp, e))?;
        drop(out);

        tokio::fs::rename(&temp, &target)
            .await
            .map_err(|e| ChanfetchError::file(&target, e))?;
        Ok((target, written))
    }

    fn report(&self, id: &FileId, written: i64, generation: u64) {
        let state = match self.entries.get_mut(id) {
            Some(mut entry) if entry.generation == generation => {
                entry.state.downloaded_size = written;
                entry.state.clone()
            }
            _ => return,
        };
        // Progress is advisory; a full stream drops it.
        let _ = self.updates.try_send(SourceUpdate::FileProgress(state));
    }

    /// Stops a transfer and discards its partial data.
    pub(crate) async fn cancel(&self, id: &FileId) -> Result<(), ChanfetchError> {
        let name = {
            let Some(mut entry) = self.entries.get_mut(id) else {
                return Ok(());
            };
            if let Some(abort) = entry.abort.take() {
                abort.abort();
            }
            entry.generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
            entry.state.is_downloading_active = false;
            entry.name.clone()
        };
        debug!(file_id = %id, "transfer cancelled");
        remove_if_present(&self.temp_path(&name)).await
    }

    /// Cancels a transfer, forgets the file, and deletes its staged copy.
    pub(crate) async fn remove(&self, id: &FileId) -> Result<(), ChanfetchError> {
        self.cancel(id).await?;
        let Some((_, entry)) = self.entries.remove(id) else {
            return Ok(());
        };
        if !entry.state.local_path.is_empty() {
            remove_if_present(Path::new(&entry.state.local_path)).await?;
        }
        Ok(())
    }

    pub(crate) async fn cancel_all(&self) -> Result<(), ChanfetchError> {
        let ids: Vec<FileId> = self.entries.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            self.cancel(id).await?;
        }
        Ok(())
    }

    pub(crate) async fn remove_all(&self) -> Result<(), ChanfetchError> {
        let ids: Vec<FileId> = self.entries.iter().map(|e| e.key().clone()).collect();
        for id in &ids {
            self.remove(id).await?;
        }
        Ok(())
    }

    /// Wipes the staged and partial files.
    pub(crate) async fn clean(&self) -> Result<(), ChanfetchError> {
        remove_dir_if_present(&self.videos_dir()).await?;
        remove_dir_if_present(&self.staging.join("temp")).await
    }
}
