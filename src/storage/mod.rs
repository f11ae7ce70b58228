//! NDJSON storage for recorded lines

mod format;
mod writer;

pub use format::{
    format_timestamp, parse_timestamp, Content, Encoding, Record, RECORD_DELIMITER,
    TIMESTAMP_FORMAT,
};
pub use writer::RecordWriter;
