//! Line recording for tapped stdio streams
//!
//! Bytes fed for each [`Source`] are split into lines by a per-stream
//! [`LineAssembler`], classified into text, JSON or base64 content, and
//! appended to the shared [`RecordWriter`](crate::storage::RecordWriter).

mod assembler;
mod classify;
mod engine;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use assembler::{AssembledLine, LineAssembler};
pub use classify::{classify, ClassifiedLine};
pub use engine::{Recorder, StreamRecorder};

/// Default maximum bytes per recorded line (16 MiB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Number of tapped streams
pub const STREAM_COUNT: usize = 3;

/// Stream identity a record was captured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Bytes flowing into the child process
    Stdin,
    /// Child's standard output
    Stdout,
    /// Child's standard error
    Stderr,
}

impl Source {
    /// All stream identities, in slot order
    pub const ALL: [Source; STREAM_COUNT] = [Source::Stdin, Source::Stdout, Source::Stderr];

    /// Slot index of this stream
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Source::Stdin => 0,
            Source::Stdout => 1,
            Source::Stderr => 2,
        }
    }

    /// Name used in the recording file
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Source::Stdin => "stdin",
            Source::Stdout => "stdout",
            Source::Stderr => "stderr",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
