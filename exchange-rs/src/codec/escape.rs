//! Backslash escaping for free-text fields
//!
//! Subject and body may contain newlines, the field delimiter and the record
//! marker. All of them are escaped so one record always fits on one line and
//! splitting on a delimiter never cuts through a field.

use super::{FIELD_DELIMITER, RECORD_MARKER};

const ESCAPE: char = '\\';

/// Escape a free-text field for the wire or the storage file
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            ESCAPE => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            FIELD_DELIMITER | RECORD_MARKER => {
                out.push(ESCAPE);
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Reverse [`escape`]; an unknown escape yields the escaped character
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != ESCAPE {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            // Trailing lone backslash
            None => out.push(ESCAPE),
        }
    }
    out
}

/// Split on `delimiter`, skipping escaped occurrences
///
/// Segments are returned still escaped.
pub fn split_unescaped(text: &str, delimiter: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == ESCAPE {
            escaped = true;
        } else if c == delimiter {
            parts.push(&text[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&text[start..]);
    parts
}
