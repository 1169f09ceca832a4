// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel-post filtering and extraction.
//!
//! Decides whether a post from a channel is recorded and reduces it to the
//! [`StoredPost`] kept in the post log.

use teloxide::prelude::*;

use crate::posts::{PostFile, StoredPost};

/// Whether posts from `chat_id` are recorded. An empty allow-list records
/// every channel the bot is a member of.
pub fn is_allowed(chat_id: i64, channels: &[i64]) -> bool {
    channels.is_empty() || channels.contains(&chat_id)
}

/// Checks whether the message was posted in a channel.
pub fn is_channel(msg: &Message) -> bool {
    msg.chat.is_channel()
}

/// Reduces a channel post to what the post log stores.
///
/// Videos and documents with a `video/*` MIME type carry a file; every
/// other post is stored with its text only so that history stays gapless.
pub fn post_from_message(msg: &Message) -> StoredPost {
    let caption = msg.caption().or_else(|| msg.text()).unwrap_or_default();
    StoredPost {
        channel_id: msg.chat.id.0,
        message_id: i64::from(msg.id.0),
        date: msg.date.timestamp(),
        caption: caption.to_owned(),
        file: video_file(msg),
    }
}

fn video_file(msg: &Message) -> Option<PostFile> {
    if let Some(video) = msg.video() {
        return Some(PostFile {
            id: video.file.id.to_string(),
            unique_id: video.file.unique_id.to_string(),
            size: i64::from(video.file.size),
            name: video.file_name.clone(),
        });
    }
    let doc = msg.document()?;
    let is_video = doc
        .mime_type
        .as_ref()
        .is_some_and(|mime| mime.type_().as_str() == "video");
    is_video.then(|| PostFile {
        id: doc.file.id.to_string(),
        unique_id: doc.file.unique_id.to_string(),
        size: i64::from(doc.file.size),
        name: doc.file_name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel_post(extra: serde_json::Value) -> Message {
        let mut json = serde_json::json!({
            "message_id": 42,
            "date": 1700000000i64,
            "chat": {
                "id": -1001234i64,
                "type": "channel",
                "title": "Shows",
            },
        });
        if let (Some(base), Some(extra)) = (json.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        serde_json::from_value(json).expect("failed to deserialize mock channel post")
    }

    #[test]
    fn empty_allow_list_records_everything() {
        assert!(is_allowed(-1, &[]));
        assert!(is_allowed(-1, &[-1, -2]));
        assert!(!is_allowed(-3, &[-1, -2]));
    }

    #[test]
    fn video_post_keeps_file_and_caption() {
        let msg = channel_post(serde_json::json!({
            "caption": "S01E02",
            "video": {
                "file_id": "vid-1",
                "file_unique_id": "u-1",
                "width": 1280,
                "height": 720,
                "duration": 60,
                "file_name": "episode.mkv",
                "file_size": 2048,
            },
        }));
        assert!(is_channel(&msg));

        let post = post_from_message(&msg);
        assert_eq!(post.channel_id, -1001234);
        assert_eq!(post.message_id, 42);
        assert_eq!(post.date, 1700000000);
        assert_eq!(post.caption, "S01E02");
        let file = post.file.unwrap();
        assert_eq!(file.id, "vid-1");
        assert_eq!(file.size, 2048);
        assert_eq!(file.name.as_deref(), Some("episode.mkv"));
    }

    #[test]
    fn video_document_counts_as_video() {
        let msg = channel_post(serde_json::json!({
            "caption": "S02E01",
            "document": {
                "file_id": "doc-1",
                "file_unique_id": "u-2",
                "file_name": "s02e01.mp4",
                "mime_type": "video/mp4",
                "file_size": 10,
            },
        }));
        assert_eq!(post_from_message(&msg).file.unwrap().id, "doc-1");
    }

    #[test]
    fn text_post_has_no_file() {
        let msg = channel_post(serde_json::json!({ "text": "coming soon" }));
        let post = post_from_message(&msg);
        assert_eq!(post.caption, "coming soon");
        assert!(post.file.is_none());
    }

    #[test]
    fn other_documents_have_no_file() {
        let msg = channel_post(serde_json::json!({
            "document": {
                "file_id": "doc-2",
                "file_unique_id": "u-3",
                "mime_type": "application/pdf",
            },
        }));
        assert!(post_from_message(&msg).file.is_none());
    }
}
