//! Content classification for recorded lines

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::Value;

use crate::storage::Content;

/// Deepest array/object nesting accepted as JSON
pub const MAX_JSON_DEPTH: usize = 10_000;

/// Stack kept free when entering a nested-value operation
const STACK_RED_ZONE: usize = 64 * 1024;

/// Stack reserved per nesting level of a JSON value
const STACK_PER_LEVEL: usize = 8 * 1024;

/// A line split into content and terminator
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedLine {
    /// Classified content
    pub content: Content,
    /// Trailing CR/LF run; empty for JSON and base64 content
    pub terminator: String,
}

/// Classify the raw bytes of one line (content followed by its terminator)
///
/// Priority is JSON, then UTF-8 text, then base64:
///
/// 1. If the bytes, trimmed of ASCII whitespace, are exactly one JSON
///    value nested at most [`MAX_JSON_DEPTH`] deep, the parsed value is the
///    content and the terminator is discarded along with the trimmed
///    whitespace. Escaped UTF-16 surrogates that do not form a pair decode
///    to U+FFFD.
/// 2. Valid UTF-8 is text; the maximal trailing run of CR and LF bytes
///    becomes the terminator.
/// 3. Everything else is base64 of the entire input, terminator included.
#[must_use]
pub fn classify(line: &[u8]) -> ClassifiedLine {
    if let Some(value) = parse_json(trim_ascii_whitespace(line)) {
        return ClassifiedLine {
            content: Content::Json(value),
            terminator: String::new(),
        };
    }

    if let Ok(text) = std::str::from_utf8(line) {
        let (content, terminator) = split_trailing_crlf(text);
        return ClassifiedLine {
            content: Content::Text(content.to_string()),
            terminator: terminator.to_string(),
        };
    }

    ClassifiedLine {
        content: Content::Base64(BASE64_STANDARD.encode(line)),
        terminator: String::new(),
    }
}

/// Parse exactly one JSON value
fn parse_json(bytes: &[u8]) -> Option<Value> {
    if bytes.is_empty() {
        return None;
    }

    // from_slice rejects trailing data, so `{"a":1}{"b":2}` is not JSON
    if let Ok(value) = serde_json::from_slice(bytes) {
        return Some(value);
    }

    // only containers and strings can fail for depth or surrogates
    if !matches!(bytes[0], b'[' | b'{' | b'"') {
        return None;
    }

    let scan = scan_json(bytes)?;
    let input = scan.normalized.as_deref().unwrap_or(bytes);

    with_nesting_stack(scan.depth, || {
        let mut de = serde_json::Deserializer::from_slice(input);
        de.disable_recursion_limit();
        let value = Value::deserialize(&mut de).ok()?;
        de.end().ok()?;
        Some(value)
    })
}

/// Run `f` with enough stack for a value nested `depth` levels deep
///
/// Parsing, serializing and dropping a [`Value`] all recurse once per
/// level, so deep values get a heap-allocated stack segment.
pub(crate) fn with_nesting_stack<R>(depth: usize, f: impl FnOnce() -> R) -> R {
    let needed = STACK_RED_ZONE.saturating_add(depth.saturating_mul(STACK_PER_LEVEL));
    stacker::maybe_grow(needed, needed, f)
}

struct JsonScan {
    /// Deepest array/object nesting
    depth: usize,
    /// Input with unpaired surrogate escapes replaced, if any were found
    normalized: Option<Vec<u8>>,
}

/// Measure nesting and rewrite unpaired `\uD800`-`\uDFFF` escapes to `\uFFFD`
///
/// Returns `None` once nesting exceeds [`MAX_JSON_DEPTH`]. Syntax is left
/// to the parser.
fn scan_json(bytes: &[u8]) -> Option<JsonScan> {
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    let mut in_string = false;
    let mut normalized: Option<Vec<u8>> = None;
    let mut i = 0;

    while i < bytes.len() {
        let mut next = i + 1;

        if in_string {
            match bytes[i] {
                b'"' => in_string = false,
                b'\\' => {
                    next = (i + 2).min(bytes.len());
                    if let Some(unit) = escaped_unit(bytes, i).filter(|u| is_surrogate(*u)) {
                        let low = escaped_unit(bytes, i + 6);
                        if is_high_surrogate(unit) && low.is_some_and(is_low_surrogate) {
                            next = i + 12;
                        } else {
                            normalized
                                .get_or_insert_with(|| bytes[..i].to_vec())
                                .extend_from_slice(b"\\ufffd");
                            i += 6;
                            continue;
                        }
                    }
                }
                _ => {}
            }
        } else {
            match bytes[i] {
                b'"' => in_string = true,
                b'[' | b'{' => {
                    depth += 1;
                    if depth > MAX_JSON_DEPTH {
                        return None;
                    }
                    max_depth = max_depth.max(depth);
                }
                b']' | b'}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }

        if let Some(out) = normalized.as_mut() {
            out.extend_from_slice(&bytes[i..next]);
        }
        i = next;
    }

    Some(JsonScan {
        depth: max_depth,
        normalized,
    })
}

/// Code unit of a `\uXXXX` escape starting at `at`
fn escaped_unit(bytes: &[u8], at: usize) -> Option<u16> {
    let escape = bytes.get(at..at + 6)?;
    if escape[..2] != *b"\\u" {
        return None;
    }
    let hex = std::str::from_utf8(&escape[2..]).ok()?;
    u16::from_str_radix(hex, 16).ok()
}

fn is_surrogate(unit: u16) -> bool {
    (0xD800..=0xDFFF).contains(&unit)
}

fn is_high_surrogate(unit: u16) -> bool {
    (0xD800..=0xDBFF).contains(&unit)
}

fn is_low_surrogate(unit: u16) -> bool {
    (0xDC00..=0xDFFF).contains(&unit)
}

/// Split off the maximal trailing run of `\r` and `\n`
fn split_trailing_crlf(text: &str) -> (&str, &str) {
    let content = text.trim_end_matches(['\r', '\n']);
    text.split_at(content.len())
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let Some(start) = bytes.iter().position(|b| !b.is_ascii_whitespace()) else {
        return &[];
    };
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}
