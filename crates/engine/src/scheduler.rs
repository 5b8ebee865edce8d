use crate::error::{ErrorKind, Result};
use crate::worker::{PoolState, work};
use crate::{FailureRecord, FileTransform, scan};
use exn::ResultExt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::instrument;

/// Discovers eligible files under a root directory and applies a
/// [`FileTransform`] to each of them on a fixed pool of worker threads.
///
/// A run aborts before touching any file only when the root is not a
/// directory or the transform's self-test fails. Every other failure is
/// recorded against its file and returned once all workers have finished.
///
/// The on-disk recovery scheme of crash-safe transforms assumes that a single
/// scheduler works a given directory at a time. Nothing enforces this.
pub struct Scheduler {
    transform: Arc<dyn FileTransform>,
    workers: Option<NonZeroUsize>,
    recursive: bool,
    cancelled: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new<T: FileTransform + 'static>(transform: T) -> Self {
        Self::shared(Arc::new(transform))
    }

    /// Like [`new`](Self::new), for a transform the caller keeps a handle to.
    pub fn shared(transform: Arc<dyn FileTransform>) -> Self {
        Self {
            transform,
            workers: None,
            recursive: true,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use exactly `workers` threads instead of one per available CPU.
    #[must_use]
    pub fn workers(mut self, workers: impl Into<Option<NonZeroUsize>>) -> Self {
        self.workers = workers.into();
        self
    }

    /// Descend into subdirectories while discovering files (default: `true`).
    #[must_use]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Flag observed by every worker before it takes the next file. Setting
    /// it stops the run after the files currently in flight; files that were
    /// never taken are neither transformed nor reported.
    pub fn cancellation(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn worker_count(&self) -> usize {
        self.workers
            .or_else(|| thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }

    /// Transforms every eligible file under `root`, blocking until all
    /// workers have finished, and returns the files that failed.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn run(&self, root: impl AsRef<Path>) -> Result<Vec<FailureRecord>> {
        let root = root.as_ref();
        if !root.is_dir() {
            exn::bail!(ErrorKind::InvalidRoot(root.to_path_buf()));
        }
        self.transform.self_test().or_raise(|| ErrorKind::SelfTest)?;

        let discovered = scan::discover(root, self.recursive, |path| self.transform.accept(path))?;
        let planned = self.transform.plan(discovered);
        if planned.is_empty() {
            tracing::info!("No eligible files found");
            return Ok(Vec::new());
        }

        let total = planned.len();
        let workers = self.worker_count();
        tracing::info!(files = total, workers, "Starting worker pool");
        let state = Arc::new(PoolState::new(Self::fill_queue(planned), workers, self.cancellation()));
        let handles = self.spawn_workers(&state, workers)?;
        let failures = state.wait();
        for handle in handles {
            // Workers catch transform panics themselves; anything reaching here
            // happened after the worker already released its slot.
            if handle.join().is_err() {
                tracing::warn!("Worker thread panicked after finishing");
            }
        }
        tracing::info!(files = total, failed = failures.len(), "Run complete");
        Ok(failures)
    }

    fn fill_queue(paths: Vec<PathBuf>) -> crossbeam_channel::Receiver<PathBuf> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        for path in paths {
            // Infallible: the receiver is alive and the channel is unbounded.
            _ = sender.send(path);
        }
        // Sender dropped here: the queue is closed and will only drain.
        receiver
    }

    fn spawn_workers(&self, state: &Arc<PoolState>, workers: usize) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let state_clone = Arc::clone(state);
            let transform = Arc::clone(&self.transform);
            let spawned = thread::Builder::new()
                .name(format!("tamp-worker-{id}"))
                .spawn(move || work(id, &state_clone, transform.as_ref()));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Workers that never started must still be released, or
                    // waiting for the ones that did would never return.
                    state.cancel();
                    state.release(workers - id);
                    _ = state.wait();
                    for handle in handles {
                        _ = handle.join();
                    }
                    return Err(e).or_raise(|| ErrorKind::Spawn);
                },
            }
        }
        Ok(handles)
    }
}

/// Runs `transform` over `root` with the default [`Scheduler`] settings.
pub fn run<T: FileTransform + 'static>(root: impl AsRef<Path>, transform: T) -> Result<Vec<FailureRecord>> {
    Scheduler::new(transform).run(root)
}
