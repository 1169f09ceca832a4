// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment failures rendered as miette diagnostics.
//!
//! A misspelled key is matched against the keys of its own table, and a
//! misspelled table against the five top-level sections, using Jaro-Winkler
//! similarity. Type errors carry a hint for keys whose expected shape is easy
//! to get wrong, such as the octal `files.file_perm`.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Top-level tables of `chanfetch.toml`.
pub const SECTIONS: [&str; 5] = ["app", "queue", "files", "storage", "telegram"];

/// Name under which an in-memory TOML string is reported.
pub const INLINE_SOURCE: &str = "<inline>";

const MIN_SIMILARITY: f64 = 0.75;

/// A configuration problem, ready for miette to render.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A table that is not one of [`SECTIONS`].
    #[error("unknown section `{name}`")]
    #[diagnostic(
        code(chanfetch::config::unknown_section),
        help("{}", section_help(suggestion.as_deref()))
    )]
    UnknownSection {
        name: String,
        suggestion: Option<String>,
        #[label("not a chanfetch section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A key its table does not define.
    #[error("unknown key `{key}` in [{section}]")]
    #[diagnostic(
        code(chanfetch::config::unknown_key),
        help("{}", key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        section: String,
        key: String,
        /// Closest key of the same table, if any is similar enough.
        suggestion: Option<String>,
        /// Comma-separated keys of the table.
        valid_keys: String,
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A value that does not deserialize into its key's type.
    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(code(chanfetch::config::invalid_type), help("{hint}"))]
    InvalidType {
        key: String,
        found: String,
        hint: String,
    },

    /// A value that parsed but breaks a semantic rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(chanfetch::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(chanfetch::config::other))]
    Other(String),
}

fn section_help(suggestion: Option<&str>) -> String {
    let sections = SECTIONS.join("], [");
    match suggestion {
        Some(name) => format!("did you mean [{name}]? Sections: [{sections}]"),
        None => format!("sections: [{sections}]"),
    }
}

fn key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(key) => format!("did you mean `{key}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Help text for a type error on `key`.
fn type_hint(key: &str, expected: &str) -> String {
    match key {
        "files.file_perm" => {
            "write the mode as a quoted octal string, e.g. file_perm = \"0755\"".to_string()
        }
        "telegram.channels" => {
            "a list of numeric chat ids, e.g. channels = [-1001234567890]".to_string()
        }
        "telegram.bot_token" => "the token as a quoted string, e.g. bot_token = \"123:ABC\"".to_string(),
        k if k.ends_with("_secs") => format!("expected {expected} (whole seconds)"),
        k if k.ends_with("_days") => format!("expected {expected} (whole days)"),
        _ => format!("expected {expected}"),
    }
}

/// Converts every error inside `err` into a [`ConfigError`].
///
/// `sources` pairs a file path (or [`INLINE_SOURCE`]) with its TOML text and
/// is used to point labels at the offending line.
pub fn figment_to_config_errors(
    err: figment::Error,
    sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let source = source_of(&error, sources);
            match &error.kind {
                Kind::UnknownField(name, _) if error.path.is_empty() => {
                    let (span, src) = locate(source, None, name);
                    ConfigError::UnknownSection {
                        name: name.clone(),
                        suggestion: suggest_key(name, &SECTIONS),
                        span,
                        src,
                    }
                }
                Kind::UnknownField(key, expected) => {
                    let section = error.path.join(".");
                    let (span, src) = locate(source, Some(&section), key);
                    ConfigError::UnknownKey {
                        suggestion: suggest_key(key, expected),
                        valid_keys: expected.join(", "),
                        key: key.clone(),
                        section,
                        span,
                        src,
                    }
                }
                Kind::InvalidType(found, expected) | Kind::InvalidValue(found, expected) => {
                    let key = error.path.join(".");
                    ConfigError::InvalidType {
                        hint: type_hint(&key, expected),
                        found: found.to_string(),
                        key,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// The TOML text the error was read from, when it is among `sources`.
fn source_of<'a>(
    error: &figment::Error,
    sources: &'a [(String, String)],
) -> Option<&'a (String, String)> {
    let Some(metadata) = error.metadata.as_ref() else {
        return sources.first().filter(|_| sources.len() == 1);
    };
    let name = match &metadata.source {
        Some(figment::Source::File(path)) => path.display().to_string(),
        // String providers carry no source, only a descriptive name.
        None if metadata.name.ends_with("source string") => INLINE_SOURCE.to_string(),
        _ => return None,
    };
    sources.iter().find(|(path, _)| *path == name)
}

fn locate(
    source: Option<&(String, String)>,
    section: Option<&str>,
    key: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Some((path, content)) = source else {
        return (None, None);
    };
    let offset = match section {
        Some(section) => find_key_offset(content, Some(section), key),
        None => find_header_offset(content, key).or_else(|| find_key_offset(content, None, key)),
    };
    match offset {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), key.len())),
            Some(NamedSource::new(path, content.clone())),
        ),
        None => (None, None),
    }
}

/// Name of the table a header line opens, e.g. `queue` for `[queue]`.
fn header_name(line: &str) -> Option<&str> {
    let inner = line.trim().strip_prefix('[')?;
    inner.split(']').next().map(str::trim)
}

/// Byte offset of `key` inside the table `section`, or among the top-level
/// keys when `section` is `None`. Only the table's own lines are searched.
pub fn find_key_offset(content: &str, section: Option<&str>, key: &str) -> Option<usize> {
    let mut table = None;
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(name) = header_name(trimmed) {
            table = Some(name);
        } else if table == section
            && trimmed
                .strip_prefix(key)
                .is_some_and(|rest| rest.trim_start().starts_with('='))
        {
            return Some(offset + line.len() - trimmed.len());
        }
        offset += line.len();
    }
    None
}

/// Byte offset of the name inside the `[name]` header.
pub fn find_header_offset(content: &str, name: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if header_name(line) == Some(name) {
            return line.find(name).map(|at| offset + at);
        }
        offset += line.len();
    }
    None
}

/// The candidate most similar to `unknown`, if any clears the threshold.
pub fn suggest_key(unknown: &str, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .map(|candidate| (strsim::jaro_winkler(unknown, candidate), *candidate))
        .filter(|(score, _)| *score > MIN_SIMILARITY)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.to_string())
}

/// Prints each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut report = String::new();
        match handler.render_report(&mut report, error) {
            Ok(()) => eprint!("{report}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
    if errors.len() > 1 {
        eprintln!("{} problems found in the configuration", errors.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggests_close_queue_key() {
        let valid = &["max_parallel_download", "max_download_error", "tick_interval_secs"];
        assert_eq!(
            suggest_key("max_paralel_download", valid),
            Some("max_parallel_download".to_string())
        );
    }

    #[test]
    fn suggests_section_for_misspelled_table() {
        assert_eq!(suggest_key("telegarm", &SECTIONS), Some("telegram".to_string()));
        assert_eq!(suggest_key("zzzzzz", &SECTIONS), None);
    }

    #[test]
    fn key_offset_stays_inside_its_table() {
        let content = "[app]\nlog_level = \"info\"\n[queue]\nlog_level = 3\n";
        let offset = find_key_offset(content, Some("queue"), "log_level").unwrap();
        assert_eq!(offset, content.rfind("log_level").unwrap());
        assert_eq!(find_key_offset(content, Some("files"), "log_level"), None);
    }

    #[test]
    fn key_offset_requires_an_assignment() {
        let content = "[files]\nfile_perm_extra = 1\nfile_perm= \"0755\"\n";
        let offset = find_key_offset(content, Some("files"), "file_perm").unwrap();
        assert_eq!(&content[offset..offset + 10], "file_perm=");
    }

    #[test]
    fn header_offset_points_at_the_name() {
        let content = "[app]\n [ queu ]\n";
        let offset = find_header_offset(content, "queu").unwrap();
        assert_eq!(&content[offset..offset + 4], "queu");
    }

    #[test]
    fn type_hints_know_octal_permissions() {
        assert!(type_hint("files.file_perm", "a string").contains("octal"));
        assert!(type_hint("queue.tick_interval_secs", "u64").contains("seconds"));
        assert_eq!(type_hint("app.log_level", "a string"), "expected a string");
    }
}
