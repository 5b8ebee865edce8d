//! Crash-safe in-place file transforms driven by an external program.
//!
//! [`InPlaceTransform`] plugs into the [`tamp_engine::Scheduler`]: for every
//! accepted file it runs a [`CommandTemplate`] writing to a marker name next
//! to the original, then swaps the result in with a fixed sequence of renames.
//! Leftover markers from an interrupted run are discovered like any other
//! file and resolved on the next run, so the directory always converges to
//! one transformed file per original.
//!
//! [`Preset`] bundles ready-made commands for common tools.

pub mod error;
pub mod marker;
pub mod process;
mod preset;
pub mod selftest;
mod template;
mod transform;

pub use crate::preset::Preset;
pub use crate::selftest::{SelfTest, Version};
pub use crate::template::CommandTemplate;
pub use crate::transform::InPlaceTransform;
