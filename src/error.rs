//! Error types for ioetap

use std::io;
use thiserror::Error;

use crate::recording::Source;

/// Result type for ioetap operations
pub type Result<T> = std::result::Result<T, TapError>;

/// Errors that can occur while tapping and recording a child process
#[derive(Debug, Error)]
pub enum TapError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record could not be serialized
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Child process could not be started
    #[error("Failed to start process '{program}': {source}")]
    Spawn {
        /// Program that was being launched
        program: String,
        /// Underlying spawn error
        source: io::Error,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A stream handle for this source was already handed out
    #[error("Stream already claimed: {0}")]
    StreamClaimed(Source),

    /// Record emitted after the writer was closed
    #[error("Recording writer is closed")]
    WriterClosed,

    /// Serialized record whose content does not match its encoding
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A producer panicked while holding the writer lock
    #[error("Recording writer lock poisoned")]
    LockPoisoned,
}
