use crate::Status;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// A pluggable, per-file transform applied by the worker pool.
///
/// Implementations are shared between all worker threads, so every method
/// takes `&self`. No two workers ever call [`apply`](Self::apply) with the
/// same path during a run.
pub trait FileTransform: Send + Sync {
    /// Acceptance predicate used while scanning the root directory. Only
    /// regular files are offered.
    fn accept(&self, path: &Path) -> bool;

    /// Pre-flight check of the transform's external dependencies. Runs once,
    /// before anything is scheduled; an error aborts the run.
    fn self_test(&self) -> Result<()> {
        Ok(())
    }

    /// Reshape the discovered file list before it is queued.
    fn plan(&self, discovered: Vec<PathBuf>) -> Vec<PathBuf> {
        discovered
    }

    /// Transform a single file.
    ///
    /// Expected failures are reported as a [`Status`]. An `Err` is treated as
    /// a fault: it is recorded against the file and never retried.
    fn apply(&self, path: &Path) -> Result<Status>;
}
