//! Recording file writer

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use static_assertions::assert_impl_all;
use tracing::debug;

use super::format::{Record, RECORD_DELIMITER};
use crate::recording::{ClassifiedLine, Source};
use crate::{Result, TapError};

/// Sequencer and writer for the recording file
///
/// Sequence allocation and the physical write happen under one lock, so
/// records from concurrent producers never interleave and `seq` follows
/// file order. A failed write still consumes its sequence number, and the
/// next record starts on a fresh line in case part of the failed one
/// reached the sink.
pub struct RecordWriter {
    state: Mutex<WriterState>,
}

struct WriterState {
    next_seq: u64,
    sink: Option<Box<dyn Write + Send>>,
    /// Last write failed, possibly mid-record
    broken_line: bool,
}

assert_impl_all!(RecordWriter: Send, Sync);

impl RecordWriter {
    /// Create the recording file, truncating any existing file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be created
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self::from_writer(BufWriter::new(file)))
    }

    /// Write records to an arbitrary sink
    pub fn from_writer<W: Write + Send + 'static>(sink: W) -> Self {
        Self {
            state: Mutex::new(WriterState {
                next_seq: 0,
                sink: Some(Box::new(sink)),
                broken_line: false,
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, WriterState>> {
        self.state.lock().map_err(|_| TapError::LockPoisoned)
    }

    /// Assign the next sequence number and append one record
    ///
    /// Returns the sequence number of the stored record.
    ///
    /// # Errors
    ///
    /// Returns error if the writer is closed or serialization/write fails.
    /// The sequence number is consumed either way.
    pub fn append(
        &self,
        source: Source,
        timestamp: DateTime<Utc>,
        line: ClassifiedLine,
        truncated: bool,
    ) -> Result<u64> {
        let mut guard = self.lock()?;
        let state = &mut *guard;

        let seq = state.next_seq;
        state.next_seq += 1;

        let sink = state.sink.as_mut().ok_or(TapError::WriterClosed)?;

        let record = Record::new(seq, timestamp, source, line, truncated);
        let mut bytes = Vec::with_capacity(128);
        if state.broken_line {
            bytes.push(RECORD_DELIMITER);
        }
        serde_json::to_writer(&mut bytes, &record)?;
        bytes.push(RECORD_DELIMITER);

        if let Err(e) = sink.write_all(&bytes) {
            state.broken_line = true;
            return Err(e.into());
        }
        state.broken_line = false;

        Ok(seq)
    }

    /// Number of sequence numbers allocated so far
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned
    pub fn records_emitted(&self) -> Result<u64> {
        Ok(self.lock()?.next_seq)
    }

    /// Flush buffered records and release the file
    ///
    /// Later calls are no-ops.
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails
    pub fn close(&self) -> Result<()> {
        // close must work after a producer panicked mid-write
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let Some(mut sink) = state.sink.take() else {
            return Ok(());
        };

        debug!("Closing recording after {} records", state.next_seq);
        sink.flush()?;
        Ok(())
    }
}
