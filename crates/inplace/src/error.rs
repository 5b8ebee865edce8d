//! In-place Transform Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Most failures while transforming a file are *not* errors: they are
//! converted into a [`Status`](tamp_engine::Status) so the worker pool can
//! decide whether to retry. The kinds below cover construction, self-tests,
//! and the faults that cannot be classified.

use crate::selftest::Version;
use derive_more::{Display, Error};
use std::path::PathBuf;

/// An in-place transform error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for in-place transform operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The command template is malformed. Fix the configuration.
    #[display("invalid command template: {_0}")]
    Template(#[error(not(source))] String),
    /// The named preset does not exist.
    #[display("unknown preset: {_0}")]
    UnknownPreset(#[error(not(source))] String),
    /// No usable file extension was configured.
    #[display("no file extensions configured")]
    NoExtensions,
    /// A path cannot be passed through the command template.
    #[display("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(#[error(not(source))] PathBuf),
    /// The external program is not installed (or not on `PATH`).
    #[display("program not found: {_0}")]
    ProgramNotFound(#[error(not(source))] String),
    /// The external program could not be started.
    #[display("could not start: {_0}")]
    Spawn(#[error(not(source))] String),
    /// The external program runs, but its self-test failed.
    #[display("self-test failed: {_0}")]
    SelfTest(#[error(not(source))] String),
    /// The external program is installed, but too old.
    #[display("version {found} is older than the required {required}")]
    VersionTooOld { found: Version, required: Version },
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Spawn(_))
    }
}
