// SPDX-FileCopyrightText: 2026 Chanfetch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Caption templates driven by regexp capture groups.
//!
//! A template references capture groups as `$N` (one digit) or `${N}` (any
//! index). Reference syntax follows shell expansion: `$` takes either a braced
//! name, a single special character (`*#$@!?-` or a digit), or a run of ASCII
//! letters, digits and underscores. Names that are not group indexes resolve to
//! the empty string, as do all groups when the regexp does not match.
//!
//! A `$` that starts no name (trailing, or before a space or punctuation) is
//! kept. Malformed braces are dropped: `${}` entirely, and an unterminated
//! `${` loses only those two characters.

use regex::Regex;

use crate::error::ChanfetchError;

/// Compiles a subscription regexp.
pub fn compile(pattern: &str) -> Result<Regex, ChanfetchError> {
    Regex::new(pattern).map_err(|source| ChanfetchError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Expands `template` against the captures of `regex` on `text`.
pub fn expand(text: &str, regex: &Regex, template: &str) -> String {
    let groups: Vec<&str> = match regex.captures(text) {
        Some(caps) => caps
            .iter()
            .map(|m| m.map(|m| m.as_str()).unwrap_or(""))
            .collect(),
        None => Vec::new(),
    };
    let group = |name: &str| -> &str {
        name.parse::<usize>()
            .ok()
            .and_then(|i| groups.get(i).copied())
            .unwrap_or("")
    };

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        if after.is_empty() {
            out.push('$');
            rest = after;
            break;
        }
        match reference(after) {
            Reference::Name(name, width) => {
                out.push_str(group(name));
                rest = &after[width..];
            }
            Reference::Malformed(width) => rest = &after[width..],
            Reference::None => {
                out.push('$');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// What follows a `$`.
enum Reference<'a> {
    /// A name and the number of bytes it occupies.
    Name(&'a str, usize),
    /// Bad brace syntax; the given number of bytes is dropped.
    Malformed(usize),
    /// No name at all; the `$` is literal.
    None,
}

fn is_special(b: u8) -> bool {
    matches!(b, b'*' | b'#' | b'$' | b'@' | b'!' | b'?' | b'-') || b.is_ascii_digit()
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Reads the reference at the start of `s`, which must not be empty.
fn reference(s: &str) -> Reference<'_> {
    let bytes = s.as_bytes();
    if bytes[0] == b'{' {
        if bytes.len() > 2 && is_special(bytes[1]) && bytes[2] == b'}' {
            return Reference::Name(&s[1..2], 3);
        }
        return match s[1..].find('}') {
            Some(0) => Reference::Malformed(2),
            Some(end) => Reference::Name(&s[1..end + 1], end + 2),
            None => Reference::Malformed(1),
        };
    }
    if is_special(bytes[0]) {
        return Reference::Name(&s[..1], 1);
    }
    let len = bytes.iter().take_while(|&&b| is_name_byte(b)).count();
    if len == 0 {
        Reference::None
    } else {
        Reference::Name(&s[..len], len)
    }
}

/// Compiles `pattern` and expands `template` against `text` in one step.
pub fn expand_str(text: &str, pattern: &str, template: &str) -> Result<String, ChanfetchError> {
    let regex = compile(pattern)?;
    Ok(expand(text, &regex, template))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn re(p: &str) -> Regex {
        compile(p).unwrap()
    }

    #[test]
    fn expands_single_digit_groups() {
        assert_eq!(expand("S01E02", &re(r"S(\d+)E(\d+)"), "ep$2"), "ep02");
        assert_eq!(expand("S01E02", &re(r"S(\d+)E(\d+)"), "$1x$2"), "01x02");
    }

    #[test]
    fn single_digit_reference_stops_after_one_digit() {
        // `$12` is group 1 followed by a literal 2.
        assert_eq!(expand("S01E02", &re(r"S(\d+)E(\d+)"), "$12"), "012");
    }

    #[test]
    fn braced_reference_reads_full_index() {
        let regex = re(r"(a)(b)(c)(d)(e)(f)(g)(h)(i)(j)(k)");
        assert_eq!(expand("abcdefghijk", &regex, "${11}-${0}"), "k-abcdefghijk");
    }

    #[test]
    fn unmatched_text_expands_groups_to_empty() {
        assert_eq!(expand("nothing", &re(r"S(\d+)"), "ep$1"), "ep");
    }

    #[test]
    fn names_and_missing_groups_are_empty() {
        assert_eq!(expand("S01", &re(r"S(\d+)"), "[$name][$9][${x}]"), "[][][]");
    }

    #[test]
    fn trailing_dollar_is_literal() {
        assert_eq!(expand("S01", &re(r"S(\d+)"), "cost$"), "cost$");
    }

    #[test]
    fn dollar_before_punctuation_is_literal() {
        let regex = re(r"S(\d+)E(\d+)");
        assert_eq!(expand("S01E02", &regex, "ep$1 $ .x"), "ep01 $ .x");
        assert_eq!(expand("S01E02", &regex, "$.mp4"), "$.mp4");
        assert_eq!(expand("S01E02", &regex, "a$-b"), "ab");
    }

    #[test]
    fn doubled_dollar_is_a_special_name() {
        assert_eq!(expand("S01", &re(r"S(\d+)"), "x$$y"), "xy");
    }

    #[test]
    fn malformed_braces_drop_only_the_opening() {
        let regex = re(r"S(\d+)E(\d+)");
        assert_eq!(expand("S01E02", &regex, "ep${1"), "ep1");
        assert_eq!(expand("S01E02", &regex, "ep${}2"), "ep2");
        assert_eq!(expand("S01E02", &regex, "${2}-${1}"), "02-01");
    }

    #[test]
    fn empty_template_expands_to_empty() {
        assert_eq!(expand("anything", &re(r"S(\d+)E(\d+)"), ""), "");
    }

    #[test]
    fn expand_str_reports_bad_regexp() {
        let err = expand_str("x", "(", "$1").unwrap_err();
        assert!(matches!(err, ChanfetchError::InvalidPattern { .. }));
    }

    proptest! {
        #[test]
        fn templates_without_dollar_are_identity(t in "[^$]{0,40}") {
            prop_assert_eq!(expand("S01E02", &re(r"S(\d+)E(\d+)"), &t), t);
        }
    }
}
