// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Item CRUD and the scan bookkeeping (watermark, matched downloads).

use chanfetch_core::types::ItemPatch;
use chanfetch_core::{ChanfetchError, DownloadId, Item, ItemId, MessageId, NewDownload, NewItem, ScanFilter};
use rusqlite::{params, OptionalExtension, Row};

use crate::database::{map_tr_err, Database};

const ITEM_COLUMNS: &str = "id, channel_id, name, regexp, pattern, match_pattern, match_content, \
     date_start, date_end, process, priority, target_path";

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        name: row.get(2)?,
        regexp: row.get(3)?,
        pattern: row.get(4)?,
        match_pattern: row.get(5)?,
        match_content: row.get(6)?,
        date_start: row.get(7)?,
        date_end: row.get(8)?,
        process: row.get(9)?,
        priority: row.get(10)?,
        target_path: row.get(11)?,
    })
}

/// Insert a new item. `date_end` starts at `date_start` and `process` at zero.
pub async fn create_item(db: &Database, item: &NewItem) -> Result<Item, ChanfetchError> {
    let item = item.clone();
    db.connection()
        .call(move |conn| -> Result<Item, rusqlite::Error> {
            conn.execute(
                "INSERT INTO items (channel_id, name, regexp, pattern, match_pattern,
                                    match_content, date_start, date_end, process, priority, target_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0, ?8, ?9)",
                params![
                    item.channel_id,
                    item.name,
                    item.regexp,
                    item.pattern,
                    item.match_pattern,
                    item.match_content,
                    item.date_start,
                    item.priority,
                    item.target_path,
                ],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id],
                item_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_item(db: &Database, id: ItemId) -> Result<Option<Item>, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<Option<Item>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1"),
                params![id],
                item_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Items whose last match is strictly after `active_after`.
pub async fn list_items(db: &Database, active_after: i64) -> Result<Vec<Item>, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<Vec<Item>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM items WHERE date_end > ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![active_after], item_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Applies the set fields of `patch`. Returns `false` when the item is missing.
pub async fn update_item(
    db: &Database,
    id: ItemId,
    patch: &ItemPatch,
) -> Result<bool, ChanfetchError> {
    let patch = patch.clone();
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(
                "UPDATE items SET
                    name          = COALESCE(?2, name),
                    regexp        = COALESCE(?3, regexp),
                    pattern       = COALESCE(?4, pattern),
                    match_pattern = COALESCE(?5, match_pattern),
                    match_content = COALESCE(?6, match_content),
                    target_path   = COALESCE(?7, target_path)
                 WHERE id = ?1",
                params![
                    id,
                    patch.name,
                    patch.regexp,
                    patch.pattern,
                    patch.match_pattern,
                    patch.match_content,
                    patch.target_path,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_tr_err)
}

/// Deletes an item together with its downloads.
///
/// Returns the ids of the removed downloads, or `None` if the item is missing.
pub async fn delete_item(
    db: &Database,
    id: ItemId,
) -> Result<Option<Vec<DownloadId>>, ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<Option<Vec<DownloadId>>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let ids = {
                let mut stmt = tx.prepare("SELECT id FROM downloads WHERE item_id = ?1")?;
                let rows = stmt.query_map(params![id], |row| row.get(0))?;
                rows.collect::<rusqlite::Result<Vec<DownloadId>>>()?
            };
            tx.execute("DELETE FROM downloads WHERE item_id = ?1", params![id])?;
            let removed = tx.execute("DELETE FROM items WHERE id = ?1", params![id])?;
            if removed == 0 {
                tx.rollback()?;
                return Ok(None);
            }
            tx.commit()?;
            Ok(Some(ids))
        })
        .await
        .map_err(map_tr_err)
}

/// Items eligible for a scan, ordered by id.
pub async fn scan_candidates(
    db: &Database,
    filter: &ScanFilter,
    date_end_from: i64,
) -> Result<Vec<Item>, ChanfetchError> {
    let filter = *filter;
    db.connection()
        .call(move |conn| -> Result<Vec<Item>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM items
                 WHERE date_end >= ?1
                   AND (?2 IS NULL OR channel_id = ?2)
                   AND (?3 IS NULL OR process < ?3)
                 ORDER BY id"
            ))?;
            let rows = stmt.query_map(
                params![date_end_from, filter.channel_id, filter.processed_before],
                item_from_row,
            )?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Raises the watermark. `MAX` keeps it monotonic under concurrent writers.
pub async fn advance_watermark(
    db: &Database,
    item_id: ItemId,
    process: MessageId,
) -> Result<(), ChanfetchError> {
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "UPDATE items SET process = MAX(process, ?2) WHERE id = ?1",
                params![item_id, process],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Raises `date_end` and inserts the matched downloads in one transaction.
///
/// Messages the item already has are skipped. Returns the inserted count.
pub async fn commit_matches(
    db: &Database,
    item_id: ItemId,
    date_end: Option<i64>,
    downloads: &[NewDownload],
) -> Result<usize, ChanfetchError> {
    let downloads = downloads.to_vec();
    db.connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            let tx = conn.transaction()?;
            if let Some(date_end) = date_end {
                tx.execute(
                    "UPDATE items SET date_end = MAX(date_end, ?2) WHERE id = ?1",
                    params![item_id, date_end],
                )?;
            }
            let mut created = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO downloads (item_id, msg_id, text, size, date, priority)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(item_id, msg_id) DO NOTHING",
                )?;
                for d in &downloads {
                    created += stmt.execute(params![
                        item_id, d.msg_id, d.text, d.size, d.date, d.priority
                    ])?;
                }
            }
            tx.commit()?;
            Ok(created)
        })
        .await
        .map_err(map_tr_err)
}
