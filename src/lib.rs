//! ioetap - transparent stdio tap for child processes
//!
//! Forwards a child's stdin, stdout and stderr untouched while recording
//! every line as a sequenced, timestamped NDJSON record.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::field_reassign_with_default,
    clippy::multiple_crate_versions
)]

pub mod cli;
pub mod config;
pub mod error;
pub mod process;
pub mod recording;
pub mod runner;
pub mod storage;
pub mod tee;

pub use error::{Result, TapError};
