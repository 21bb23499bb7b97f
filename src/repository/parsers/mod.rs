// src/repository/parsers/mod.rs

//! APT control-file grammar
//!
//! Release and Packages files share the same RFC 822-like layout: blocks of
//! `Key: value` lines, separated by blank lines, where a line without a
//! `key: value` shape continues the previous field. This module provides the block splitter
//! and the field parser; [`debian`] layers the Release/Packages views on top.

pub mod debian;

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

pub use debian::{PACKAGE_KEYS, PackageRecord, PackagesInfo, RELEASE_KEYS, ReleaseMetadata};

/// Parsed fields of one control block, ordered by key
pub type ControlFields = BTreeMap<String, String>;

static FIELD_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?): (.*)$").expect("field line pattern is valid"));

/// Parse one control block, keeping only keys listed in `allowed`
///
/// The parser is total: lines it cannot make sense of are folded into the
/// previous field or dropped, never reported. Keys outside `allowed` are
/// still tracked so their continuation lines are not misattributed.
/// Duplicate keys keep the last occurrence.
pub fn parse_block(text: &str, allowed: &[&str]) -> ControlFields {
    let mut fields = ControlFields::new();
    let mut continuing: Option<String> = None;

    for line in text.lines() {
        if line.is_empty() {
            continue;
        }

        // Any line of the form "key: value" starts a field, indented or not
        if let Some(caps) = FIELD_LINE.captures(line) {
            let key = caps[1].to_string();
            let value = caps[2].trim_end().to_string();
            start_field(&mut fields, allowed, &key, value);
            continuing = Some(key);
            continue;
        }

        // A bare unindented "Key:" starts a field with an empty value
        if !line.starts_with([' ', '\t']) {
            if let Some(key) = line.trim_end().strip_suffix(':') {
                if !key.is_empty() && !key.contains(": ") {
                    start_field(&mut fields, allowed, key, String::new());
                    continuing = Some(key.to_string());
                    continue;
                }
            }
        }

        let trimmed = line.trim_end();
        if trimmed.trim_start().is_empty() {
            continuing = None;
            continue;
        }

        if let Some(value) = continuing.as_ref().and_then(|key| fields.get_mut(key)) {
            if !value.is_empty() {
                value.push('\n');
            }
            value.push_str(trimmed);
        }
    }

    fields
}

fn start_field(fields: &mut ControlFields, allowed: &[&str], key: &str, value: String) {
    if allowed.contains(&key) {
        fields.insert(key.to_string(), value);
    }
}

/// Split a multi-block control file on blank-line boundaries
///
/// Each block is cut at the first blank line after its start, so runs of
/// several blank lines never produce empty blocks.
pub fn split_blocks(content: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = content;

    loop {
        let start = rest.trim_start_matches(['\r', '\n']);
        if start.is_empty() {
            break;
        }

        match blank_line_boundary(start) {
            Some((end, next)) => {
                blocks.push(&start[..end]);
                rest = &start[next..];
            }
            None => {
                blocks.push(start);
                break;
            }
        }
    }

    blocks
}

/// Find the first blank line: returns (end of block, start of remainder)
fn blank_line_boundary(text: &str) -> Option<(usize, usize)> {
    let lf = text.find("\n\n").map(|i| (i, i + 2));
    let crlf = text.find("\n\r\n").map(|i| (i, i + 3));

    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}
