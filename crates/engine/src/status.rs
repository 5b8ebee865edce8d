//! Classified outcome of a single transform attempt.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// The bare classification of a [`Status`], without its message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Flag {
    Ok,
    Error,
    RetriableError,
    FatalError,
}

/// Outcome of one [`FileTransform::apply`](crate::FileTransform::apply) call.
///
/// Expected failures are reported as values rather than errors. Only
/// [`Retriable`](Self::Retriable) makes the worker try the same file again;
/// [`Error`](Self::Error) and [`Fatal`](Self::Fatal) are recorded immediately.
/// Every non-`Ok` variant carries a message, which may be empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Status {
    #[default]
    Ok,
    /// Non-retriable failure; the file is skipped.
    Error(String),
    /// Transient failure; worth another immediate attempt.
    Retriable(String),
    /// Non-retriable failure that leaves the file in a state a human should look at.
    Fatal(String),
}

impl Status {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    pub fn retriable(message: impl Into<String>) -> Self {
        Self::Retriable(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    #[must_use]
    pub fn flag(&self) -> Flag {
        match self {
            Self::Ok => Flag::Ok,
            Self::Error(_) => Flag::Error,
            Self::Retriable(_) => Flag::RetriableError,
            Self::Fatal(_) => Flag::FatalError,
        }
    }

    /// The message attached to a failure, `None` for [`Ok`](Self::Ok).
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Ok => None,
            Self::Error(m) | Self::Retriable(m) | Self::Fatal(m) => Some(m),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    #[inline]
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Retriable(_))
    }
}

impl Display for Flag {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = match self {
            Flag::Ok => "OK",
            Flag::Error => "ERROR",
            Flag::RetriableError => "RETRIABLE_ERROR",
            Flag::FatalError => "FATAL_ERROR",
        };
        f.write_str(s)
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.message() {
            Some(m) if !m.is_empty() => write!(f, "{}: {}", self.flag(), m),
            _ => write!(f, "{}", self.flag()),
        }
    }
}
