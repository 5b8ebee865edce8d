//! On-disk marker names used as the crash-recovery journal.
//!
//! While a file `D/F` is being transformed, at most one of three names exists
//! for it (outside the instant of a `rename` syscall):
//!
//! | State         | Name on disk                      | Meaning                               |
//! |---------------|-----------------------------------|---------------------------------------|
//! | `Plain`       | `D/F`                             | untouched, or fully committed         |
//! | `InProgress`  | `D/.COMPRESSION_IN_PROGRESS_F`    | external program is writing output    |
//! | `Done`        | `D/.COMPRESSED_F`                 | output complete, final swap pending   |
//!
//! The prefixes are part of the on-disk format and must not change, or
//! leftovers from an interrupted run will no longer be recognised.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

pub const IN_PROGRESS_PREFIX: &str = ".COMPRESSION_IN_PROGRESS_";
pub const DONE_PREFIX: &str = ".COMPRESSED_";

/// The marker state a path represents, together with the logical (plain)
/// path it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Marker {
    Plain(PathBuf),
    InProgress(PathBuf),
    Done(PathBuf),
}

impl Marker {
    #[must_use]
    pub fn classify(path: &Path) -> Self {
        let Some(name) = path.file_name() else {
            return Self::Plain(path.to_path_buf());
        };
        if let Some(logical) = strip_name_prefix(name, IN_PROGRESS_PREFIX) {
            return Self::InProgress(path.with_file_name(logical));
        }
        if let Some(logical) = strip_name_prefix(name, DONE_PREFIX) {
            return Self::Done(path.with_file_name(logical));
        }
        Self::Plain(path.to_path_buf())
    }

    /// The plain path this marker belongs to.
    #[must_use]
    pub fn logical(&self) -> &Path {
        match self {
            Self::Plain(p) | Self::InProgress(p) | Self::Done(p) => p,
        }
    }

    #[must_use]
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Plain(_))
    }
}

#[must_use]
pub fn in_progress_path(plain: &Path) -> PathBuf {
    with_prefix(plain, IN_PROGRESS_PREFIX)
}

#[must_use]
pub fn done_path(plain: &Path) -> PathBuf {
    with_prefix(plain, DONE_PREFIX)
}

/// The rest of `name` after `prefix`, if there is any.
#[cfg(unix)]
fn strip_name_prefix<'a>(name: &'a OsStr, prefix: &str) -> Option<&'a OsStr> {
    use std::os::unix::ffi::OsStrExt;
    let rest = name.as_bytes().strip_prefix(prefix.as_bytes())?;
    (!rest.is_empty()).then(|| OsStr::from_bytes(rest))
}

#[cfg(not(unix))]
fn strip_name_prefix<'a>(name: &'a OsStr, prefix: &str) -> Option<&'a OsStr> {
    let rest = name.to_str()?.strip_prefix(prefix)?;
    (!rest.is_empty()).then(|| OsStr::new(rest))
}

fn with_prefix(path: &Path, prefix: &str) -> PathBuf {
    let mut name = OsString::from(prefix);
    name.push(path.file_name().unwrap_or_default());
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/data/img.tif", Marker::Plain("/data/img.tif".into()))]
    #[case("/data/.COMPRESSION_IN_PROGRESS_img.tif", Marker::InProgress("/data/img.tif".into()))]
    #[case("/data/.COMPRESSED_img.tif", Marker::Done("/data/img.tif".into()))]
    #[case("relative/.COMPRESSED_a.TIFF", Marker::Done("relative/a.TIFF".into()))]
    // A bare prefix has no logical name to belong to.
    #[case("/data/.COMPRESSED_", Marker::Plain("/data/.COMPRESSED_".into()))]
    // Prefixes only count at the start of the file name.
    #[case("/data/x.COMPRESSED_a.tif", Marker::Plain("/data/x.COMPRESSED_a.tif".into()))]
    #[case("/.COMPRESSED_dir/a.tif", Marker::Plain("/.COMPRESSED_dir/a.tif".into()))]
    fn test_classify(#[case] path: &str, #[case] expected: Marker) {
        assert_eq!(Marker::classify(Path::new(path)), expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_classify_non_utf8() {
        use std::os::unix::ffi::OsStrExt;
        let plain = Path::new(OsStr::from_bytes(b"/data/\xFFimg.tif"));
        assert_eq!(Marker::classify(&in_progress_path(plain)), Marker::InProgress(plain.to_path_buf()));
        assert_eq!(Marker::classify(&done_path(plain)), Marker::Done(plain.to_path_buf()));
        assert_eq!(Marker::classify(plain), Marker::Plain(plain.to_path_buf()));
    }

    #[test]
    fn test_marker_paths() {
        let plain = Path::new("/data/plate 1/img.tif");
        assert_eq!(in_progress_path(plain), Path::new("/data/plate 1/.COMPRESSION_IN_PROGRESS_img.tif"));
        assert_eq!(done_path(plain), Path::new("/data/plate 1/.COMPRESSED_img.tif"));
        assert_eq!(Marker::classify(&in_progress_path(plain)).logical(), plain);
        assert_eq!(Marker::classify(&done_path(plain)).logical(), plain);
    }
}
