// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Finishing a transfer: name the target, move the file, commit the row.

use std::path::PathBuf;

use tracing::{info, warn};

use chanfetch_core::pattern;
use chanfetch_core::ChanfetchError;

use crate::context::EngineContext;
use crate::files;
use crate::task::TaskState;

/// Result of a completion attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The file is at its target and the row is terminal.
    Done,
    /// Another caller holds the latch; try again later.
    InProgress,
}

/// Completes `task` once. Concurrent callers get [`Completion::InProgress`]
/// without waiting. Failures are recorded on the task and returned; the task
/// stays registered so a later pass can retry.
pub async fn complete(ctx: &EngineContext, task: &TaskState) -> Result<Completion, ChanfetchError> {
    if task.is_completed() {
        return Ok(Completion::Done);
    }
    let Some(_latch) = task.try_begin_completion() else {
        return Ok(Completion::InProgress);
    };
    if task.is_completed() {
        return Ok(Completion::Done);
    }

    match finish(ctx, task).await {
        Ok(target) => {
            task.mark_completed();
            info!(task = task.id(), item = task.item_id(), target = %target.display(), "download completed");
            Ok(Completion::Done)
        }
        Err(err) => {
            if err.is_not_found() {
                task.fail_fatal(ctx, &err);
            } else {
                task.fail(ctx, &err, counts_toward_fatal(&err));
            }
            Err(err)
        }
    }
}

/// Hard completion failures that will not heal on retry.
fn counts_toward_fatal(err: &ChanfetchError) -> bool {
    matches!(
        err,
        ChanfetchError::InvalidPattern { .. } | ChanfetchError::Conflict(_)
    )
}

async fn finish(ctx: &EngineContext, task: &TaskState) -> Result<PathBuf, ChanfetchError> {
    let snapshot = task
        .file()
        .filter(|s| s.file.is_downloading_completed && !s.file.local_path.is_empty())
        .ok_or_else(|| {
            ChanfetchError::Internal(format!("download {} has no finished transfer", task.id()))
        })?;

    let download = ctx
        .store
        .get_download(task.id())
        .await?
        .ok_or(ChanfetchError::NotFound {
            kind: "download",
            id: task.id(),
        })?;
    let item = ctx
        .store
        .get_item(download.item_id)
        .await?
        .ok_or(ChanfetchError::NotFound {
            kind: "item",
            id: download.item_id,
        })?;

    let regex = pattern::compile(&item.regexp)?;
    let staged = PathBuf::from(&snapshot.file.local_path);
    let mut name = pattern::expand(&download.text, &regex, &item.pattern);
    if name.is_empty() {
        return Err(ChanfetchError::Conflict(format!(
            "pattern `{}` yields an empty file name for download {}",
            item.pattern,
            task.id()
        )));
    }
    if let Some(ext) = staged.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }

    let target_dir = PathBuf::from(&item.target_path);
    let mode = ctx.settings.file_mode;
    files::ensure_dir(&target_dir, mode).await?;
    let target = target_dir.join(&name);
    files::move_file(&staged, &target, mode).await?;

    if !ctx.store.complete_download(task.id()).await? {
        warn!(task = task.id(), "download row was not active when completing");
    }
    Ok(target)
}
