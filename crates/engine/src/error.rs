//! Engine Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// An engine error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// [`InvalidRoot`](ErrorKind::InvalidRoot), [`SelfTest`](ErrorKind::SelfTest),
/// [`Scan`](ErrorKind::Scan) and [`Spawn`](ErrorKind::Spawn) abort a whole run. The remaining kinds
/// describe a fault that happened while transforming a single file; they end
/// up inside a [`FailureRecord`](crate::FailureRecord) and never escape
/// [`Scheduler::run`](crate::Scheduler::run).
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The root directory does not exist or is not a directory.
    #[display("not a directory: {}", _0.display())]
    InvalidRoot(#[error(not(source))] PathBuf),
    /// The transform's external dependency is unusable.
    #[display("transform self-test failed")]
    SelfTest,
    /// A directory could not be listed during discovery.
    #[display("could not scan: {}", _0.display())]
    Scan(#[error(not(source))] PathBuf),
    /// A worker thread could not be started.
    #[display("could not start worker thread")]
    Spawn,
    /// The transform failed in a way it could not classify as a [`Status`](crate::Status).
    #[display("transform fault")]
    Transform,
    /// The transform panicked.
    #[display("transform panicked: {_0}")]
    Panicked(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    ///
    /// Never the case here: a fault is terminal for its file, and every other
    /// kind ends the whole run.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exn::ResultExt;
    use rstest::rstest;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidRoot(PathBuf::from("/nope")).to_string(), "not a directory: /nope");
        assert_eq!(ErrorKind::Panicked("boom".to_string()).to_string(), "transform panicked: boom");
        assert_eq!(ErrorKind::SelfTest.to_string(), "transform self-test failed");
    }

    #[rstest]
    #[case(ErrorKind::InvalidRoot(PathBuf::new()))]
    #[case(ErrorKind::SelfTest)]
    #[case(ErrorKind::Scan(PathBuf::new()))]
    #[case(ErrorKind::Spawn)]
    #[case(ErrorKind::Transform)]
    #[case(ErrorKind::Panicked(String::new()))]
    fn error_kind_never_retryable(#[case] kind: ErrorKind) {
        assert!(!kind.is_retryable());
    }

    #[test]
    fn error_from_result() {
        let result: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"));
        let err: Result<()> = result.or_raise(|| ErrorKind::Scan(PathBuf::from("/data")));
        let exn = err.unwrap_err();
        assert!(matches!(&*exn, ErrorKind::Scan(p) if p == &PathBuf::from("/data")));
    }
}
