//! Recording engine for tapped stdio streams

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use static_assertions::assert_impl_all;
use tracing::{debug, info};

use crate::storage::RecordWriter;
use crate::{Result, TapError};

use super::assembler::{AssembledLine, LineAssembler};
use super::classify::{classify, with_nesting_stack};
use super::{Source, STREAM_COUNT};

/// Records up to three streams into one NDJSON file
///
/// Each stream identity has one slot, handed out once through
/// [`Recorder::stream`]. The returned [`StreamRecorder`] owns that
/// stream's line buffer, so only the shared writer needs a lock.
pub struct Recorder {
    writer: Arc<RecordWriter>,
    max_line_length: usize,
    claimed: [AtomicBool; STREAM_COUNT],
}

impl Recorder {
    /// Create a recorder writing to `path`
    ///
    /// `max_line_length` limits the bytes per recorded line; 0 is unlimited.
    ///
    /// # Errors
    ///
    /// Returns error if the recording file cannot be created
    pub fn create(path: &Path, max_line_length: usize) -> Result<Self> {
        let writer = RecordWriter::create(path)?;
        info!(
            "Recording to {} (max line length: {})",
            path.display(),
            max_line_length
        );

        Ok(Self {
            writer: Arc::new(writer),
            max_line_length,
            claimed: [
                AtomicBool::new(false),
                AtomicBool::new(false),
                AtomicBool::new(false),
            ],
        })
    }

    /// Take the handle for one stream
    ///
    /// # Errors
    ///
    /// Returns error if the handle for `source` was already taken
    pub fn stream(&self, source: Source) -> Result<StreamRecorder> {
        if self.claimed[source.index()].swap(true, Ordering::AcqRel) {
            return Err(TapError::StreamClaimed(source));
        }

        Ok(StreamRecorder {
            source,
            assembler: LineAssembler::new(self.max_line_length),
            writer: Arc::clone(&self.writer),
            lines: Vec::new(),
        })
    }

    /// Configured line limit (0 = unlimited)
    #[must_use]
    pub fn max_line_length(&self) -> usize {
        self.max_line_length
    }

    /// Number of records emitted so far, including failed ones
    ///
    /// # Errors
    ///
    /// Returns error if the writer lock is poisoned
    pub fn records_emitted(&self) -> Result<u64> {
        self.writer.records_emitted()
    }

    /// Flush and close the recording file
    ///
    /// # Errors
    ///
    /// Returns error if buffered records cannot be flushed
    pub fn close(&self) -> Result<()> {
        self.writer.close()
    }
}

/// Recording handle for a single stream
pub struct StreamRecorder {
    source: Source,
    assembler: LineAssembler,
    writer: Arc<RecordWriter>,
    lines: Vec<AssembledLine>,
}

assert_impl_all!(StreamRecorder: Send);

impl StreamRecorder {
    /// Stream this handle records
    #[must_use]
    pub fn source(&self) -> Source {
        self.source
    }

    /// Record a chunk of bytes
    ///
    /// Complete lines are written immediately; a trailing partial line is
    /// kept until its terminator arrives or [`flush`](Self::flush) is called.
    ///
    /// # Errors
    ///
    /// Returns the first write error. Remaining lines of the chunk are
    /// still attempted and the stream's buffer stays consistent.
    pub fn record(&mut self, chunk: &[u8]) -> Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        self.assembler.feed(chunk, &mut self.lines);

        let mut lines = std::mem::take(&mut self.lines);
        let mut first_error = None;
        for line in lines.drain(..) {
            if let Err(e) = self.emit(now, &line) {
                first_error.get_or_insert(e);
            }
        }
        self.lines = lines;

        first_error.map_or(Ok(()), Err)
    }

    /// Write out any partial line; call once at end of stream
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be written
    pub fn flush(&mut self) -> Result<()> {
        let Some(line) = self.assembler.flush() else {
            debug!("{} flushed with nothing pending", self.source);
            return Ok(());
        };
        self.emit(Utc::now(), &line)
    }

    fn emit(&self, timestamp: DateTime<Utc>, line: &AssembledLine) -> Result<()> {
        let classified = classify(&line.bytes);
        let depth = classified.content.nesting_depth();
        // serializing and dropping the record recurse through the value
        let seq = with_nesting_stack(depth, || {
            self.writer
                .append(self.source, timestamp, classified, line.truncated)
        })?;
        if line.truncated {
            debug!("{} line {} truncated", self.source, seq);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Content, Encoding, Record};
    use serde_json::json;
    use tempfile::TempDir;

    fn recorder(temp_dir: &TempDir, max_line_length: usize) -> Recorder {
        Recorder::create(&temp_dir.path().join("test.jsonl"), max_line_length).unwrap()
    }

    fn read_records(temp_dir: &TempDir) -> Vec<Record> {
        std::fs::read_to_string(temp_dir.path().join("test.jsonl"))
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_stream_claimed_once() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 0);

        assert!(recorder.stream(Source::Stdout).is_ok());
        assert!(matches!(
            recorder.stream(Source::Stdout),
            Err(TapError::StreamClaimed(Source::Stdout))
        ));
        assert!(recorder.stream(Source::Stderr).is_ok());
    }

    #[test]
    fn test_split_line() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 0);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();

        stdout.record(b"he").unwrap();
        stdout.record(b"llo\n").unwrap();
        recorder.close().unwrap();

        let records = read_records(&temp_dir);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, Content::Text("hello".to_string()));
        assert_eq!(records[0].end, "\n");
        assert!(!records[0].truncated);
    }

    #[test]
    fn test_truncated_line() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 10);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();

        stdout.record(b"this is a very long line\n").unwrap();
        recorder.close().unwrap();

        let records = read_records(&temp_dir);
        assert_eq!(records[0].content, Content::Text("this is a ".to_string()));
        assert_eq!(records[0].end, "\n");
        assert!(records[0].truncated);
    }

    #[test]
    fn test_exact_limit_line() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 11);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();

        stdout.record(b"abcdefghij\n").unwrap();
        recorder.close().unwrap();

        let records = read_records(&temp_dir);
        assert_eq!(records[0].content, Content::Text("abcdefghij".to_string()));
        assert!(!records[0].truncated);
    }

    #[test]
    fn test_json_line_has_no_end() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 0);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();

        stdout.record(b"{\"a\":1}\n").unwrap();
        recorder.close().unwrap();

        let raw = std::fs::read_to_string(temp_dir.path().join("test.jsonl")).unwrap();
        let value: serde_json::Value = serde_json::from_str(raw.trim_end()).unwrap();
        assert_eq!(value["content"], json!({"a": 1}));
        assert_eq!(value["encoding"], json!("json"));
        assert!(value.get("end").is_none());
    }

    #[test]
    fn test_truncated_json_falls_back_to_text() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 20);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();

        stdout
            .record(b"{\"key\":\"this is a very long value that exceeds the limit\"}\n")
            .unwrap();
        recorder.close().unwrap();

        let records = read_records(&temp_dir);
        assert_eq!(records[0].encoding(), Encoding::Text);
        assert!(records[0].truncated);
        assert_eq!(records[0].content_string().len(), 20);
    }

    #[test]
    fn test_binary_flushed_at_eof() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 0);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();

        stdout.record(&[0xFF, 0xFE, 0x00, 0x01]).unwrap();
        stdout.flush().unwrap();
        recorder.close().unwrap();

        let records = read_records(&temp_dir);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, Content::Base64("//4AAQ==".to_string()));
        assert_eq!(records[0].end, "");
        assert!(!records[0].truncated);
    }

    #[test]
    fn test_flush_without_data() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 0);
        let mut stderr = recorder.stream(Source::Stderr).unwrap();

        stderr.flush().unwrap();
        recorder.close().unwrap();

        assert!(read_records(&temp_dir).is_empty());
        assert_eq!(recorder.records_emitted().unwrap(), 0);
    }

    #[test]
    fn test_streams_share_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 0);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();
        let mut stderr = recorder.stream(Source::Stderr).unwrap();

        stdout.record(b"partial out").unwrap();
        stderr.record(b"err\n").unwrap();
        stdout.record(b"\n").unwrap();
        recorder.close().unwrap();

        let records = read_records(&temp_dir);
        assert_eq!(records.len(), 2);
        assert_eq!((records[0].seq, records[0].source), (0, Source::Stderr));
        assert_eq!((records[1].seq, records[1].source), (1, Source::Stdout));
        assert_eq!(records[1].content, Content::Text("partial out".to_string()));
    }

    #[test]
    fn test_deeply_nested_json_line() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 0);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();

        let depth = 5_000;
        let line = format!("{}{}\n", "[".repeat(depth), "]".repeat(depth));
        stdout.record(line.as_bytes()).unwrap();
        recorder.close().unwrap();

        let raw = std::fs::read_to_string(temp_dir.path().join("test.jsonl")).unwrap();
        let nested = format!("{}{}", "[".repeat(depth), "]".repeat(depth));
        assert!(raw.contains(&format!("\"content\":{nested},\"encoding\":\"json\"")));
    }

    #[test]
    fn test_record_after_close_fails() {
        let temp_dir = TempDir::new().unwrap();
        let recorder = recorder(&temp_dir, 0);
        let mut stdout = recorder.stream(Source::Stdout).unwrap();
        recorder.close().unwrap();

        assert!(matches!(stdout.record(b"late\n"), Err(TapError::WriterClosed)));
    }
}
