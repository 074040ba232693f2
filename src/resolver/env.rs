//! Env-template scanning and substitution.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::uri::{parse_op_uri, SecretRef};
use crate::errors::Result;

/// Matches `op://` URIs with vault/item/field path segments.
///
/// The character set (alphanumeric, underscore, hyphen) safely terminates at
/// common delimiters like `@`, `:`, whitespace, and quotes that appear in
/// surrounding strings, enabling inline substitution within larger values
/// such as connection strings.
static OP_URI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"op://[A-Za-z0-9_-]+/[A-Za-z0-9_-]+/[A-Za-z0-9_-]+").unwrap());

/// Scan env-file content for `op://` references, keyed by the raw URI string.
///
/// Both standalone values (`KEY=op://...`) and inline embedded values
/// (`KEY=prefix:op://...@suffix`) are detected. Blank lines, comment lines,
/// and lines without `=` are skipped. Duplicate URIs are deduplicated so each
/// secret is fetched only once per materialize call.
pub fn scan_env(content: &str) -> Result<BTreeMap<String, SecretRef>> {
    let mut refs = BTreeMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((_, value)) = trimmed.split_once('=') else {
            continue;
        };
        for m in OP_URI_RE.find_iter(value) {
            let raw = m.as_str();
            if refs.contains_key(raw) {
                continue;
            }
            refs.insert(raw.to_string(), parse_op_uri(raw)?);
        }
    }
    Ok(refs)
}

/// Return the env content with every `op://` URI present in `resolved_by_uri`
/// replaced by its value.
///
/// Comments, blank lines, and URIs absent from the map pass through
/// unchanged. Each line keeps its trailing newline.
pub fn substitute(content: &str, resolved_by_uri: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(content.len());
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            out.push_str(line);
            out.push('\n');
            continue;
        }
        let replaced = OP_URI_RE.replace_all(line, |caps: &regex::Captures<'_>| {
            let uri = caps.get(0).unwrap().as_str();
            resolved_by_uri.get(uri).cloned().unwrap_or_else(|| uri.to_string())
        });
        out.push_str(&replaced);
        out.push('\n');
    }
    out
}
