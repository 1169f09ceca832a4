// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for chanfetch.

use std::path::PathBuf;

use thiserror::Error;

/// The primary error type used across all chanfetch adapter traits and core operations.
#[derive(Debug, Error)]
pub enum ChanfetchError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, constraint violation).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Source adapter errors (network failure, rate limiting, unknown message or file).
    #[error("source error: {message}")]
    Source {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A persisted record does not exist.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    /// A record with the same identity already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A caller supplied an argument outside its accepted range.
    #[error("invalid request: {0}")]
    Invalid(String),

    /// A subscription regexp failed to compile.
    #[error("invalid regexp `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        source: regex::Error,
    },

    /// The message carries no video attachment. Permanent for a given message.
    #[error("message {message_id} does not contain a video")]
    NoVideo { message_id: i64 },

    /// Local file system errors while staging or moving a transfer.
    #[error("file error at {}: {source}", path.display())]
    File {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChanfetchError {
    /// Shorthand for a [`ChanfetchError::Source`] without an underlying cause.
    pub fn source_msg(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an I/O error with the path it concerns.
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// Whether the error reports a missing record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
