// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Download rows and their lifecycle transitions.
//!
//! Each transition is a single guarded UPDATE, so a row can only move along
//! legal edges even when several callers race on it.

use chanfetch_core::{ChanfetchError, Download, DownloadId, ItemId, NewDownload, QueuedDownload};
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{is_foreign_key_violation, is_unique_violation, map_tr_err, Database};

const DOWNLOAD_COLUMNS: &str = "d.id, d.item_id, d.msg_id, d.text, d.size, d.date, d.priority, \
     d.downloading, d.downloaded, d.fatal_error, d.error, d.error_at";

fn download_from_row(row: &Row<'_>) -> rusqlite::Result<Download> {
    Ok(Download {
        id: row.get(0)?,
        item_id: row.get(1)?,
        msg_id: row.get(2)?,
        text: row.get(3)?,
        size: row.get(4)?,
        date: row.get(5)?,
        priority: row.get(6)?,
        downloading: row.get(7)?,
        downloaded: row.get(8)?,
        fatal_error: row.get(9)?,
        error: row.get(10)?,
        error_at: row.get(11)?,
    })
}

fn queued_from_row(row: &Row<'_>) -> rusqlite::Result<QueuedDownload> {
    Ok(QueuedDownload {
        download: download_from_row(row)?,
        channel_id: row.get(12)?,
    })
}

/// Inserts all rows or none. Duplicates yield [`ChanfetchError::Conflict`],
/// a missing item [`ChanfetchError::NotFound`].
pub async fn create_downloads(
    db: &Database,
    downloads: &[NewDownload],
) -> Result<Vec<Download>, ChanfetchError> {
    let downloads = downloads.to_vec();
    let first = downloads.first().map(|d| (d.item_id, d.msg_id));
    db.connection()
        .call(move |conn| -> Result<Vec<Download>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let mut created = Vec::with_capacity(downloads.len());
            for d in &downloads {
                tx.execute(
                    "INSERT INTO downloads (item_id, msg_id, text, size, date, priority)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![d.item_id, d.msg_id, d.text, d.size, d.date, d.priority],
                )?;
                let id = tx.last_insert_rowid();
                created.push(tx.query_row(
                    &format!("SELECT {DOWNLOAD_COLUMNS} FROM downloads d WHERE d.id = ?1"),
                    params![id],
                    download_from_row,
                )?);
            }
            tx.commit()?;
            Ok(created)
        })
        .await
        .map_err(|e| match e {
            tokio_rusqlite::Error::Error(ref inner) if is_unique_violation(inner) => {
                let (item_id, msg_id) = first.unwrap_or_default();
                ChanfetchError::Conflict(format!(
                    "item {item_id} already tracks message {msg_id}"
                ))
            }
            tokio_rusqlite::Error::Error(ref inner) if is_foreign_key_violation(inner) => {
                ChanfetchError::NotFound {
                    kind: "item",
                    id: first.map(|(item_id, _)| item_id).unwrap_or_default(),
                }
            }
            other => map_tr_err(other),
        })
}

pub async fn get_download(db: &Database, id: DownloadId) -> Result<Option<Download>, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<Option<Download>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {DOWNLOAD_COLUMNS} FROM downloads d WHERE d.id = ?1"),
                params![id],
                download_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// A download joined with its item's channel.
pub async fn get_queued_download(
    db: &Database,
    id: DownloadId,
) -> Result<Option<QueuedDownload>, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<Option<QueuedDownload>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {DOWNLOAD_COLUMNS}, i.channel_id
                     FROM downloads d JOIN items i ON i.id = d.item_id
                     WHERE d.id = ?1"
                ),
                params![id],
                queued_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_item_downloads(
    db: &Database,
    item_id: ItemId,
) -> Result<Vec<Download>, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Download>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DOWNLOAD_COLUMNS} FROM downloads d WHERE d.item_id = ?1
                 ORDER BY d.date DESC, d.id DESC"
            ))?;
            let rows = stmt.query_map(params![item_id], download_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Rows currently marked as downloading.
pub async fn list_active(db: &Database) -> Result<Vec<QueuedDownload>, ChanfetchError> {
    db.connection()
        .call(|conn| -> Result<Vec<QueuedDownload>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DOWNLOAD_COLUMNS}, i.channel_id
                 FROM downloads d JOIN items i ON i.id = d.item_id
                 WHERE d.downloading = 1
                 ORDER BY d.id"
            ))?;
            let rows = stmt.query_map([], queued_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Queue order: priority desc, then oldest message, then id.
pub async fn next_queued(db: &Database, limit: usize) -> Result<Vec<QueuedDownload>, ChanfetchError> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    db.connection()
        .call(move |conn| -> Result<Vec<QueuedDownload>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {DOWNLOAD_COLUMNS}, i.channel_id
                 FROM downloads d JOIN items i ON i.id = d.item_id
                 WHERE d.downloaded = 0 AND d.downloading = 0
                 ORDER BY d.priority DESC, d.date ASC, d.id ASC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], queued_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_downloading(db: &Database, id: DownloadId) -> Result<bool, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE downloads SET downloading = 1 WHERE id = ?1 AND downloaded = 0",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Only touches an active row, so a late write cannot undo a reset.
pub async fn record_error(
    db: &Database,
    id: DownloadId,
    message: &str,
    at: i64,
) -> Result<bool, ChanfetchError> {
    let message = message.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE downloads SET error = ?2, error_at = ?3
                 WHERE id = ?1 AND downloading = 1",
                params![id, message, at],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Active -> terminal-fatal. Returns `false` if the row is not active.
pub async fn mark_fatal(
    db: &Database,
    id: DownloadId,
    message: &str,
    at: i64,
) -> Result<bool, ChanfetchError> {
    let message = message.to_string();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE downloads
                 SET downloading = 0, downloaded = 1, fatal_error = 1, error = ?2, error_at = ?3
                 WHERE id = ?1 AND downloading = 1",
                params![id, message, at],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Only an active row can complete; anything else reports `false`.
pub async fn complete_download(db: &Database, id: DownloadId) -> Result<bool, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE downloads SET downloading = 0, downloaded = 1, fatal_error = 0
                 WHERE id = ?1 AND downloading = 1",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn reset_download(db: &Database, id: DownloadId) -> Result<bool, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE downloads
                 SET downloading = 0, downloaded = 0, fatal_error = 0, error = '', error_at = 0
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn update_priority(
    db: &Database,
    id: DownloadId,
    priority: i32,
) -> Result<bool, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE downloads SET priority = ?2 WHERE id = ?1",
                params![id, priority],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_download(db: &Database, id: DownloadId) -> Result<bool, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute("DELETE FROM downloads WHERE id = ?1", params![id])?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}
