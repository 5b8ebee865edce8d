use crate::error::{ErrorKind, Result};
use crate::marker::{self, Marker};
use crate::process::{self, Outcome};
use crate::selftest::SelfTest;
use crate::template::CommandTemplate;
use exn::ResultExt;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tamp_engine::error::{ErrorKind as EngineErrorKind, Result as EngineResult};
use tamp_engine::{FileTransform, Status};
use tracing::instrument;

/// Replaces files with the output of an external program, surviving a crash
/// at any instant without losing or corrupting the original.
///
/// For a plain file `D/F` the program writes to the in-progress marker name;
/// the output is then renamed to the done marker, the original deleted, and
/// the done marker renamed back to `D/F`. A marker found on a later run is
/// resolved by one idempotent action:
///
/// - **in-progress**: the program never finished; the partial output is
///   deleted and the original (still present) is left for the next run.
/// - **done**: the output is complete; any remaining original is deleted and
///   the output committed under the plain name.
///
/// See [`marker`](crate::marker) for the on-disk names.
#[derive(Debug)]
pub struct InPlaceTransform {
    command: CommandTemplate,
    /// Lower-case, each with a leading dot.
    extensions: Vec<String>,
    timeout: Option<Duration>,
    self_test: SelfTest,
}

impl InPlaceTransform {
    /// Accepts files whose name ends in one of `extensions` (case-insensitive,
    /// with or without the leading dot).
    pub fn new(command: CommandTemplate, extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let mut extensions: Vec<String> = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(|ext| format!(".{ext}"))
            .collect();
        extensions.sort();
        extensions.dedup();
        if extensions.is_empty() {
            exn::bail!(ErrorKind::NoExtensions);
        }
        Ok(Self { command, extensions, timeout: None, self_test: SelfTest::Presence })
    }

    /// Kill the program (and retry the file) if it runs longer than `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.timeout = timeout.into();
        self
    }

    #[must_use]
    pub fn with_self_test(mut self, self_test: SelfTest) -> Self {
        self.self_test = self_test;
        self
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn recover_in_progress(&self, marked: &Path) -> Status {
        tracing::info!(path = %marked.display(), "Removing output of an interrupted transform");
        match fs::remove_file(marked) {
            Ok(()) => Status::Ok,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Status::Ok,
            Err(e) => fatal("remove interrupted output", marked, &e),
        }
    }

    fn recover_done(&self, marked: &Path, plain: &Path) -> Status {
        tracing::info!(path = %plain.display(), "Committing output of an interrupted transform");
        let result = remove_if_exists(plain)
            .map_err(|e| fatal("remove stale original", plain, &e))
            .and_then(|()| fs::rename(marked, plain).map_err(|e| fatal("commit", marked, &e)));
        match result {
            Ok(()) => Status::Ok,
            Err(status) => status,
        }
    }

    fn transform(&self, plain: &Path) -> EngineResult<Status> {
        match fs::symlink_metadata(plain) {
            Ok(meta) if meta.is_file() => {},
            Ok(_) => {
                tracing::warn!(path = %plain.display(), "No longer a regular file");
                return Ok(Status::error(format!("no longer a regular file: {}", plain.display())));
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(path = %plain.display(), "File disappeared before it could be transformed");
                return Ok(Status::error(format!("disappeared before it could be transformed: {}", plain.display())));
            },
            Err(e) => return Ok(fatal("inspect", plain, &e)),
        }
        let in_progress = marker::in_progress_path(plain);
        let done = marker::done_path(plain);

        let command = self.command.render(plain, &in_progress).or_raise(|| EngineErrorKind::Transform)?;
        if let Some(status) = self.execute(command, plain, &in_progress) {
            return Ok(status);
        }
        match commit(plain, &in_progress, &done) {
            Ok(()) => {
                tracing::debug!(path = %plain.display(), "Transformed");
                Ok(Status::Ok)
            },
            Err(status) => Ok(status),
        }
    }

    /// Runs the program; `Some` carries the status to report when it failed.
    fn execute(&self, command: std::process::Command, plain: &Path, in_progress: &Path) -> Option<Status> {
        let program = self.command.program();
        let outcome = match process::run(command, self.timeout) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(path = %plain.display(), program, error = ?e, "Could not launch external program");
                return Some(Status::fatal(format!("could not launch {program}: {}", &*e)));
            },
        };
        let (stdout, stderr) = outcome.output().lossy();
        let status = match &outcome {
            Outcome::Exited { status, .. } if status.success() => {
                tracing::trace!(path = %plain.display(), %stdout, %stderr, "External program finished");
                return None;
            },
            Outcome::Exited { status, .. } => {
                tracing::error!(path = %plain.display(), program, %status, %stdout, %stderr, "External program failed");
                Status::fatal(format!("{program} failed ({status}): {stderr}"))
            },
            Outcome::TimedOut { .. } => {
                tracing::warn!(path = %plain.display(), program, timeout = ?self.timeout, %stdout, %stderr, "External program timed out");
                Status::retriable(format!("{program} timed out"))
            },
        };
        // Partial output must not survive into the next attempt.
        if let Err(e) = remove_if_exists(in_progress) {
            tracing::warn!(path = %in_progress.display(), error = %e, "Could not remove partial output");
        }
        Some(status)
    }
}

impl FileTransform for InPlaceTransform {
    fn accept(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().to_lowercase())
            .is_some_and(|name| self.extensions.iter().any(|ext| name.ends_with(ext.as_str())))
    }

    fn self_test(&self) -> EngineResult<()> {
        self.self_test.check(self.command.program()).or_raise(|| EngineErrorKind::Transform)?;
        Ok(())
    }

    /// Leaves a plain file out of the run when a marker for it was also
    /// discovered, so that no two workers ever touch the same logical file.
    /// The marker's recovery owns that name for this run.
    fn plan(&self, discovered: Vec<PathBuf>) -> Vec<PathBuf> {
        let marked: HashSet<PathBuf> = discovered
            .iter()
            .map(|path| Marker::classify(path))
            .filter(|marker| !marker.is_plain())
            .map(|marker| marker.logical().to_path_buf())
            .collect();
        let before = discovered.len();
        let mut planned: Vec<PathBuf> = discovered
            .into_iter()
            .filter(|path| !(marked.contains(path) && Marker::classify(path).is_plain()))
            .collect();
        planned.sort();
        planned.dedup();
        if !marked.is_empty() {
            tracing::info!(
                recovering = marked.len(),
                deferred = before - planned.len(),
                "Found leftovers of an interrupted run"
            );
        }
        planned
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    fn apply(&self, path: &Path) -> EngineResult<Status> {
        match Marker::classify(path) {
            Marker::InProgress(_) => Ok(self.recover_in_progress(path)),
            Marker::Done(plain) => Ok(self.recover_done(path, &plain)),
            Marker::Plain(plain) => self.transform(&plain),
        }
    }
}

/// The three renames/removals after the program succeeded, strictly in order.
fn commit(plain: &Path, in_progress: &Path, done: &Path) -> std::result::Result<(), Status> {
    fs::rename(in_progress, done).map_err(|e| fatal("mark output as done", in_progress, &e))?;
    fs::remove_file(plain).map_err(|e| fatal("remove original", plain, &e))?;
    fs::rename(done, plain).map_err(|e| fatal("commit", done, &e))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn fatal(step: &str, path: &Path, err: &io::Error) -> Status {
    tracing::error!(path = %path.display(), error = %err, "Failed to {step}");
    Status::fatal(format!("failed to {step} {}: {err}", path.display()))
}
