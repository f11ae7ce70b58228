//! Recording file format
//!
//! One JSON object per physical line:
//!
//! ```json
//! {"seq":0,"timestamp":"2024-01-02T03:04:05.678Z","source":"stdout","content":"hello","encoding":"text","end":"\n"}
//! ```
//!
//! `end` is omitted when empty and `truncated` is omitted when false.
//!
//! Terminators are handled differently per encoding. Text records carry
//! them in `end`. Base64 records fold them into the encoded payload. JSON
//! records drop them entirely because surrounding whitespace is trimmed
//! before parsing. This asymmetry is kept for compatibility with existing
//! recordings.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::recording::{ClassifiedLine, Source};
use crate::TapError;

/// Timestamp layout, always UTC with millisecond precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Record delimiter in the recording file
pub const RECORD_DELIMITER: u8 = b'\n';

/// Content encoding of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Valid UTF-8 text
    Text,
    /// A single well-formed JSON value
    Json,
    /// Anything else, base64 encoded
    Base64,
}

/// Record content; the variant determines the encoding
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Content {
    /// Parsed JSON value
    Json(Value),
    /// UTF-8 text without its terminator
    Text(String),
    /// Standard base64 of the raw line bytes
    Base64(String),
}

impl Content {
    /// Encoding matching this content
    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        match self {
            Content::Json(_) => Encoding::Json,
            Content::Text(_) => Encoding::Text,
            Content::Base64(_) => Encoding::Base64,
        }
    }

    /// Deepest array/object nesting of JSON content; 0 for strings
    #[must_use]
    pub fn nesting_depth(&self) -> usize {
        let Content::Json(value) = self else {
            return 0;
        };

        let mut deepest = 0;
        let mut pending = vec![(value, 1)];
        while let Some((value, depth)) = pending.pop() {
            match value {
                Value::Array(items) => {
                    deepest = deepest.max(depth);
                    pending.extend(items.iter().map(|item| (item, depth + 1)));
                }
                Value::Object(fields) => {
                    deepest = deepest.max(depth);
                    pending.extend(fields.values().map(|item| (item, depth + 1)));
                }
                _ => {}
            }
        }
        deepest
    }
}

/// A single recorded line
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawRecord")]
pub struct Record {
    /// Sequence number, unique and gap-free per recorder
    pub seq: u64,
    /// Emission time
    pub timestamp: DateTime<Utc>,
    /// Stream the line was captured from
    pub source: Source,
    /// Line content
    pub content: Content,
    /// Trailing CR/LF run of text lines (empty if none)
    pub end: String,
    /// Whether the line exceeded the configured limit
    pub truncated: bool,
}

impl Record {
    /// Build a record from a classified line
    #[must_use]
    pub fn new(
        seq: u64,
        timestamp: DateTime<Utc>,
        source: Source,
        line: ClassifiedLine,
        truncated: bool,
    ) -> Self {
        Self {
            seq,
            timestamp,
            source,
            content: line.content,
            end: line.terminator,
            truncated,
        }
    }

    /// Encoding of the content
    #[must_use]
    pub const fn encoding(&self) -> Encoding {
        self.content.encoding()
    }

    /// Content as a string: text and base64 verbatim, JSON re-serialized
    #[must_use]
    pub fn content_string(&self) -> String {
        match &self.content {
            Content::Text(s) | Content::Base64(s) => s.clone(),
            Content::Json(value) => value.to_string(),
        }
    }
}

/// Format a timestamp for the recording file
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp written by [`format_timestamp`]
///
/// # Errors
///
/// Returns error if the string does not match [`TIMESTAMP_FORMAT`]
pub fn parse_timestamp(s: &str) -> crate::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map_err(|e| TapError::InvalidRecord(format!("bad timestamp {s:?}: {e}")))?;
    Ok(Utc.from_utc_datetime(&naive))
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = 5 + usize::from(!self.end.is_empty()) + usize::from(self.truncated);
        let mut state = serializer.serialize_struct("Record", len)?;
        state.serialize_field("seq", &self.seq)?;
        state.serialize_field("timestamp", &format_timestamp(&self.timestamp))?;
        state.serialize_field("source", &self.source)?;
        state.serialize_field("content", &self.content)?;
        state.serialize_field("encoding", &self.encoding())?;
        if self.end.is_empty() {
            state.skip_field("end")?;
        } else {
            state.serialize_field("end", &self.end)?;
        }
        if self.truncated {
            state.serialize_field("truncated", &true)?;
        } else {
            state.skip_field("truncated")?;
        }
        state.end()
    }
}

/// Wire shape before content is checked against its encoding
#[derive(Deserialize)]
struct RawRecord {
    seq: u64,
    timestamp: String,
    source: Source,
    content: Value,
    encoding: Encoding,
    #[serde(default)]
    end: String,
    #[serde(default)]
    truncated: bool,
}

impl TryFrom<RawRecord> for Record {
    type Error = TapError;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let content = match (raw.encoding, raw.content) {
            (Encoding::Json, value) => Content::Json(value),
            (Encoding::Text, Value::String(s)) => Content::Text(s),
            (Encoding::Base64, Value::String(s)) => Content::Base64(s),
            (encoding, other) => {
                return Err(TapError::InvalidRecord(format!(
                    "{encoding:?} content must be a string, got {other}"
                )))
            }
        };

        Ok(Self {
            seq: raw.seq,
            timestamp: parse_timestamp(&raw.timestamp)?,
            source: raw.source,
            content,
            end: raw.end,
            truncated: raw.truncated,
        })
    }
}
