//! Concurrent bulk file transforms with bounded per-file retry.
//!
//! The [`Scheduler`] discovers every file under a root directory that a
//! [`FileTransform`] accepts, then drains that fixed list on a pool of OS
//! threads (one per available CPU by default):
//!
//! - A transform reports expected failures as a [`Status`]. Only
//!   [`Status::Retriable`] is retried, up to [`MAX_RETRY`] attempts in total.
//! - An `Err` or a panic from the transform is a fault: recorded on first
//!   occurrence, never retried.
//! - One file's failure never stops the others. The caller receives every
//!   [`FailureRecord`] once all workers have finished.
//!
//! Only an invalid root directory, a failed [`FileTransform::self_test`] or
//! an unreadable directory during discovery abort a run, always before any
//! file is touched.

pub mod error;
mod failure;
pub mod scan;
mod scheduler;
mod status;
mod transform;
mod worker;

pub use crate::failure::{Cause, FailureRecord};
pub use crate::scheduler::{Scheduler, run};
pub use crate::status::{Flag, Status};
pub use crate::transform::FileTransform;

/// Total attempts (first try included) for a file whose transform keeps
/// returning [`Status::Retriable`].
pub const MAX_RETRY: usize = 3;
