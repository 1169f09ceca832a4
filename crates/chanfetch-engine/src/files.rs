// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Moving finished transfers from staging to their target directory.

use std::io;
use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use chanfetch_core::ChanfetchError;

/// How a file reached its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Renamed,
    Copied,
}

/// Creates `dir` (and parents) with `mode` if it does not exist.
///
/// An existing non-directory at `dir` is a [`ChanfetchError::Conflict`].
pub async fn ensure_dir(dir: &Path, mode: u32) -> Result<(), ChanfetchError> {
    match fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(ChanfetchError::Conflict(format!(
            "{} exists and is not a directory",
            dir.display()
        ))),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true);
            #[cfg(unix)]
            builder.mode(mode);
            #[cfg(not(unix))]
            let _ = mode;
            builder
                .create(dir)
                .await
                .map_err(|e| ChanfetchError::file(dir, e))?;
            debug!(dir = %dir.display(), mode = %format!("{mode:o}"), "target directory created");
            Ok(())
        }
        Err(err) => Err(ChanfetchError::file(dir, err)),
    }
}

/// Renames `from` to `to`, falling back to copy-and-remove (e.g. across
/// devices). A failure to remove the staged copy only warns.
pub async fn move_file(from: &Path, to: &Path, mode: u32) -> Result<MoveOutcome, ChanfetchError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(MoveOutcome::Renamed),
        Err(err) => {
            debug!(from = %from.display(), to = %to.display(), error = %err, "rename failed, copying");
            copy_file(from, to, mode).await?;
            if let Err(err) = fs::remove_file(from).await {
                warn!(path = %from.display(), error = %err, "failed to remove staged file after copy");
            }
            Ok(MoveOutcome::Copied)
        }
    }
}

async fn copy_file(from: &Path, to: &Path, mode: u32) -> Result<u64, ChanfetchError> {
    let source = fs::File::open(from)
        .await
        .map_err(|e| ChanfetchError::file(from, e))?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    let mut target = options
        .open(to)
        .await
        .map_err(|e| ChanfetchError::file(to, e))?;

    let mut reader = BufReader::new(source);
    let copied = tokio::io::copy_buf(&mut reader, &mut target)
        .await
        .map_err(|e| ChanfetchError::file(to, e))?;
    target.flush().await.map_err(|e| ChanfetchError::file(to, e))?;
    target
        .sync_all()
        .await
        .map_err(|e| ChanfetchError::file(to, e))?;
    Ok(copied)
}
