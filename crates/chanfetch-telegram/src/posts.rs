// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log of channel posts seen by the bot.
//!
//! The Bot API only pushes new posts, so channel history is served from this
//! table. It lives in the same database as the download store.

use rusqlite::{params, OptionalExtension};

use chanfetch_core::{
    ChanfetchError, ChannelId, FileHandle, FileId, MessageContent, MessageId, SourceMessage,
    VideoAttachment,
};
use chanfetch_storage::{map_tr_err, Database};

/// The video file attached to a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostFile {
    pub id: String,
    pub unique_id: String,
    pub size: i64,
    pub name: Option<String>,
}

/// A channel post as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPost {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
    pub date: i64,
    pub caption: String,
    pub file: Option<PostFile>,
}

impl StoredPost {
    fn into_message(self) -> SourceMessage {
        let content = match self.file {
            Some(file) => MessageContent::Video(VideoAttachment {
                caption: self.caption,
                file: FileHandle::remote(FileId(file.id), file.size),
            }),
            None if self.caption.is_empty() => MessageContent::Other,
            None => MessageContent::Text(self.caption),
        };
        SourceMessage {
            id: self.message_id,
            channel_id: self.channel_id,
            date: self.date,
            content,
        }
    }
}

const POST_COLUMNS: &str =
    "channel_id, message_id, date, caption, file_id, file_unique_id, file_size, file_name";

fn row_to_post(row: &rusqlite::Row<'_>) -> Result<StoredPost, rusqlite::Error> {
    let file_id: Option<String> = row.get(4)?;
    let file = match file_id {
        Some(id) => Some(PostFile {
            id,
            unique_id: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            size: row.get(6)?,
            name: row.get(7)?,
        }),
        None => None,
    };
    Ok(StoredPost {
        channel_id: row.get(0)?,
        message_id: row.get(1)?,
        date: row.get(2)?,
        caption: row.get(3)?,
        file,
    })
}

/// Reads and writes the `channel_posts` table.
#[derive(Clone)]
pub struct PostLog {
    db: Database,
}

impl PostLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records a post. Edited posts overwrite the earlier version.
    pub async fn record(&self, post: &StoredPost) -> Result<(), ChanfetchError> {
        let post = post.clone();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let file = post.file.as_ref();
                conn.execute(
                    "INSERT INTO channel_posts (channel_id, message_id, date, caption, \
                     file_id, file_unique_id, file_size, file_name) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT(channel_id, message_id) DO UPDATE SET \
                     caption = excluded.caption, file_id = excluded.file_id, \
                     file_unique_id = excluded.file_unique_id, \
                     file_size = excluded.file_size, file_name = excluded.file_name",
                    params![
                        post.channel_id,
                        post.message_id,
                        post.date,
                        post.caption,
                        file.map(|f| f.id.as_str()),
                        file.map(|f| f.unique_id.as_str()),
                        file.map_or(0, |f| f.size),
                        file.and_then(|f| f.name.as_deref()),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)
    }

    /// Up to `limit` posts of a channel, newest first, older than
    /// `from_message_id` (`0` starts at the newest post).
    pub async fn history(
        &self,
        channel_id: ChannelId,
        from_message_id: MessageId,
        limit: u32,
    ) -> Result<Vec<SourceMessage>, ChanfetchError> {
        let upper = if from_message_id <= 0 {
            MessageId::MAX
        } else {
            from_message_id
        };
        let posts = self
            .db
            .connection()
            .call(move |conn| -> Result<Vec<StoredPost>, rusqlite::Error> {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {POST_COLUMNS} FROM channel_posts \
                     WHERE channel_id = ?1 AND message_id < ?2 \
                     ORDER BY message_id DESC LIMIT ?3"
                ))?;
                let rows = stmt.query_map(params![channel_id, upper, limit], row_to_post)?;
                rows.collect()
            })
            .await
            .map_err(map_tr_err)?;
        Ok(posts.into_iter().map(StoredPost::into_message).collect())
    }

    /// One post, if the bot has seen it.
    pub async fn get(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<Option<SourceMessage>, ChanfetchError> {
        let post = self
            .db
            .connection()
            .call(move |conn| -> Result<Option<StoredPost>, rusqlite::Error> {
                conn.query_row(
                    &format!(
                        "SELECT {POST_COLUMNS} FROM channel_posts \
                         WHERE channel_id = ?1 AND message_id = ?2"
                    ),
                    params![channel_id, message_id],
                    row_to_post,
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)?;
        Ok(post.map(StoredPost::into_message))
    }

    /// Size and original name of a file, from the most recent post carrying it.
    pub async fn file_info(
        &self,
        file_id: &FileId,
    ) -> Result<Option<(i64, Option<String>)>, ChanfetchError> {
        let file_id = file_id.0.clone();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<(i64, Option<String>)>, rusqlite::Error> {
                conn.query_row(
                    "SELECT file_size, file_name FROM channel_posts \
                     WHERE file_id = ?1 ORDER BY date DESC LIMIT 1",
                    params![file_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn log() -> (tempfile::TempDir, PostLog) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("posts.db");
        let db = Database::open(path.to_str().unwrap()).await.unwrap();
        (dir, PostLog::new(db))
    }

    fn post(message_id: MessageId, caption: &str, file: Option<&str>) -> StoredPost {
        StoredPost {
            channel_id: -10,
            message_id,
            date: 1_700_000_000 + message_id,
            caption: caption.into(),
            file: file.map(|id| PostFile {
                id: id.into(),
                unique_id: format!("u-{id}"),
                size: 100 * message_id,
                name: Some(format!("{id}.mkv")),
            }),
        }
    }

    #[tokio::test]
    async fn history_pages_newest_first() {
        let (_dir, log) = log().await;
        for id in 1..=5 {
            log.record(&post(id, &format!("S01E0{id}"), Some(&format!("f{id}"))))
                .await
                .unwrap();
        }

        let first = log.history(-10, 0, 2).await.unwrap();
        assert_eq!(first.iter().map(|m| m.id).collect::<Vec<_>>(), vec![5, 4]);

        let next = log.history(-10, 4, 10).await.unwrap();
        assert_eq!(next.iter().map(|m| m.id).collect::<Vec<_>>(), vec![3, 2, 1]);

        assert!(log.history(-10, 1, 10).await.unwrap().is_empty());
        assert!(log.history(-99, 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn posts_map_to_message_content() {
        let (_dir, log) = log().await;
        log.record(&post(1, "S01E01", Some("f1"))).await.unwrap();
        log.record(&post(2, "announcement", None)).await.unwrap();
        log.record(&post(3, "", None)).await.unwrap();

        let video = log.get(-10, 1).await.unwrap().unwrap();
        let attachment = video.video().unwrap();
        assert_eq!(attachment.caption, "S01E01");
        assert_eq!(attachment.file.id, FileId::from("f1"));
        assert_eq!(attachment.file.size, 100);

        let text = log.get(-10, 2).await.unwrap().unwrap();
        assert_eq!(text.content, MessageContent::Text("announcement".into()));

        let other = log.get(-10, 3).await.unwrap().unwrap();
        assert_eq!(other.content, MessageContent::Other);

        assert!(log.get(-10, 4).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn edits_overwrite_the_post() {
        let (_dir, log) = log().await;
        log.record(&post(1, "S01E01", None)).await.unwrap();
        log.record(&post(1, "S01E01 fixed", Some("f1"))).await.unwrap();

        let message = log.get(-10, 1).await.unwrap().unwrap();
        assert_eq!(message.video().unwrap().caption, "S01E01 fixed");
        assert_eq!(
            log.file_info(&FileId::from("f1")).await.unwrap(),
            Some((100, Some("f1.mkv".into())))
        );
        assert!(log.file_info(&FileId::from("nope")).await.unwrap().is_none());
    }
}
