//! Pre-flight checks for the external program.

use crate::error::{ErrorKind, Result};
use crate::process::{self, Outcome};
use exn::{OptionExt, ResultExt};
use regex::Regex;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// A version query should answer almost instantly.
const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

/// A `major.minor` program version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What has to hold before any file is handed to the external program.
#[derive(Clone, Debug)]
pub enum SelfTest {
    /// The program only has to be resolvable on `PATH` (or exist, if given as a path).
    Presence,
    /// The program must also report at least `minimum` when run with `args`.
    ///
    /// `pattern` is matched against stdout followed by stderr and must have
    /// `major` and `minor` named capture groups.
    Version { args: Vec<String>, pattern: Regex, minimum: Version },
}

impl SelfTest {
    /// Runs the check for `program`, returning where it was found.
    pub fn check(&self, program: &str) -> Result<PathBuf> {
        let resolved = which::which(program).or_raise(|| ErrorKind::ProgramNotFound(program.to_string()))?;
        tracing::debug!(program, path = %resolved.display(), "Resolved external program");
        if let Self::Version { args, pattern, minimum } = self {
            let found = Self::query_version(&resolved, args, pattern)?;
            if found < *minimum {
                exn::bail!(ErrorKind::VersionTooOld { found, required: *minimum });
            }
            tracing::info!(program, version = %found, "External program passed self-test");
        }
        Ok(resolved)
    }

    fn query_version(program: &Path, args: &[String], pattern: &Regex) -> Result<Version> {
        let mut command = Command::new(program);
        command.args(args);
        let outcome = process::run(command, Some(VERSION_TIMEOUT))?;
        let (stdout, stderr) = outcome.output().lossy();
        if let Outcome::TimedOut { .. } = outcome {
            exn::bail!(ErrorKind::SelfTest(format!("{} did not answer its version query", program.display())));
        }
        parse_version(pattern, &format!("{stdout}\n{stderr}")).ok_or_raise(|| {
            ErrorKind::SelfTest(format!("could not find a version in the output of {}", program.display()))
        })
    }
}

/// Extracts the `major`/`minor` named groups of the first match.
pub(crate) fn parse_version(pattern: &Regex, text: &str) -> Option<Version> {
    let captures = pattern.captures(text)?;
    let major = captures.name("major")?.as_str().parse().ok()?;
    let minor = captures.name("minor")?.as_str().parse().ok()?;
    Some(Version::new(major, minor))
}
