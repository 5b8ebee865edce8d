use crate::Status;
use crate::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;

/// Why a file ended up in the failure report.
#[derive(Debug)]
pub enum Cause {
    /// The transform classified the failure itself (never [`Status::Ok`]).
    Status(Status),
    /// The transform returned an error or panicked. Never retried.
    Fault(Error),
}

/// A work item paired with its terminal, non-`Ok` outcome.
#[derive(Debug)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub cause: Cause,
}

impl FailureRecord {
    pub(crate) fn new(path: PathBuf, cause: Cause) -> Self {
        Self { path, cause }
    }

    /// The recorded status, if the failure wasn't a fault.
    pub fn status(&self) -> Option<&Status> {
        match &self.cause {
            Cause::Status(status) => Some(status),
            Cause::Fault(_) => None,
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self.cause, Cause::Fault(_))
    }
}

impl Display for Cause {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Cause::Status(status) => write!(f, "{status}"),
            Cause::Fault(err) => write!(f, "{}", &**err),
        }
    }
}

impl Display for FailureRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.path.display(), self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_display_status() {
        let record = FailureRecord::new(PathBuf::from("/data/a.tif"), Cause::Status(Status::fatal("rename failed")));
        assert_eq!(record.to_string(), "/data/a.tif: FATAL_ERROR: rename failed");
        assert_eq!(record.status(), Some(&Status::fatal("rename failed")));
        assert!(!record.is_fault());
    }

    #[test]
    fn test_display_fault() {
        let fault = Error::from(ErrorKind::Panicked("index out of bounds".to_string()));
        let record = FailureRecord::new(PathBuf::from("/data/b.tif"), Cause::Fault(fault));
        assert_eq!(record.to_string(), "/data/b.tif: transform panicked: index out of bounds");
        assert!(record.status().is_none());
        assert!(record.is_fault());
    }
}
