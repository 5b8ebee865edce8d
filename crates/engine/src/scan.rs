//! Discovery of eligible files under a root directory.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs;
use std::path::{Path, PathBuf};

/// Lists every regular file under `root` for which `accept` returns `true`.
///
/// Subdirectories are descended into only when `recursive` is set. Symbolic
/// links are never followed and never offered to `accept`. The result is
/// sorted so that queue order is stable between runs.
pub fn discover(root: &Path, recursive: bool, accept: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = fs::read_dir(&current).or_raise(|| ErrorKind::Scan(current.clone()))?;
        for entry in entries {
            let entry = entry.or_raise(|| ErrorKind::Scan(current.clone()))?;
            let path = entry.path();
            // DirEntry::file_type does not traverse symlinks.
            let file_type = entry.file_type().or_raise(|| ErrorKind::Scan(path.clone()))?;
            if file_type.is_dir() {
                if recursive {
                    stack.push(path);
                }
            } else if file_type.is_file() && accept(&path) {
                found.push(path);
            }
        }
    }
    found.sort();
    tracing::debug!(root = %root.display(), files = found.len(), "Discovery complete");
    Ok(found)
}
