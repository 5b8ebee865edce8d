//! Worker loop and the state shared by every worker of one run.
//!
//! Each worker drains the pre-filled queue without blocking, applies the
//! transform with bounded retry, and records non-`Ok` outcomes in the shared
//! failure sink. When a worker leaves its loop (queue exhausted, cancelled,
//! or unwinding) its [`ExitGuard`] decrements the active-worker counter; the
//! worker that brings it to zero wakes the orchestrator. That wake-up is the
//! only notification ever sent on the condvar.

use crate::error::{Error, ErrorKind};
use crate::{Cause, FailureRecord, FileTransform, MAX_RETRY, Status};
use crossbeam_channel::Receiver;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

pub(crate) struct PoolState {
    /// Populated once before any worker starts; the sender is already gone.
    queue: Receiver<PathBuf>,
    failures: Mutex<Vec<FailureRecord>>,
    finished: Condvar,
    active: AtomicUsize,
    cancelled: Arc<AtomicBool>,
}

impl PoolState {
    pub(crate) fn new(queue: Receiver<PathBuf>, workers: usize, cancelled: Arc<AtomicBool>) -> Self {
        Self {
            queue,
            failures: Mutex::new(Vec::new()),
            finished: Condvar::new(),
            active: AtomicUsize::new(workers),
            cancelled,
        }
    }

    fn failures(&self) -> MutexGuard<'_, Vec<FailureRecord>> {
        // Nothing panics while holding the lock; a poisoned sink still holds valid records.
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, failure: FailureRecord) {
        self.failures().push(failure);
    }

    /// Marks `count` workers as finished. Used by exiting workers and for
    /// workers that could never be started.
    pub(crate) fn release(&self, count: usize) {
        if count == 0 {
            return;
        }
        if self.active.fetch_sub(count, Ordering::AcqRel) == count {
            // Notify under the lock so the wake-up can't land between the
            // orchestrator's counter check and its wait.
            let _sink = self.failures();
            self.finished.notify_all();
        }
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Blocks until every worker has released, then hands over the failures.
    pub(crate) fn wait(&self) -> Vec<FailureRecord> {
        let mut sink = self.failures();
        while self.active.load(Ordering::Acquire) > 0 {
            sink = self.finished.wait(sink).unwrap_or_else(PoisonError::into_inner);
        }
        std::mem::take(&mut *sink)
    }
}

struct ExitGuard<'a>(&'a PoolState);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.release(1);
    }
}

/// Body of one worker thread.
pub(crate) fn work(id: usize, state: &PoolState, transform: &dyn FileTransform) {
    let _exit = ExitGuard(state);
    let _span = tracing::debug_span!("worker", id).entered();
    let mut processed: usize = 0;
    loop {
        if state.cancelled.load(Ordering::SeqCst) {
            tracing::info!(processed, "Cancellation requested; worker stopping");
            break;
        }
        // The queue never refills: empty means done.
        let Ok(path) = state.queue.try_recv() else {
            break;
        };
        if let Some(cause) = process(transform, &path) {
            state.record(FailureRecord::new(path, cause));
        }
        processed += 1;
    }
    tracing::debug!(processed, "Worker finished");
}

/// Applies `transform` to one file, retrying retriable statuses up to
/// [`MAX_RETRY`] attempts in total. Returns the cause to record, if any.
pub(crate) fn process(transform: &dyn FileTransform, path: &Path) -> Option<Cause> {
    let mut attempt: usize = 1;
    loop {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| transform.apply(path))) {
            Ok(result) => result,
            Err(payload) => Err(Error::from(ErrorKind::Panicked(panic_message(payload.as_ref())))),
        };
        match outcome {
            Ok(Status::Ok) => return None,
            Ok(status) if status.is_retriable() && attempt < MAX_RETRY => {
                tracing::debug!(path = %path.display(), attempt, %status, "Retrying");
                attempt += 1;
            },
            Ok(status) => {
                tracing::warn!(path = %path.display(), attempt, %status, "Transform failed");
                return Some(Cause::Status(status));
            },
            Err(fault) => {
                tracing::error!(path = %path.display(), attempt, fault = ?fault, "Transform fault");
                return Some(Cause::Fault(fault));
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    /// Replays `script` one entry per call, repeating the last entry forever.
    struct Replay {
        script: Vec<Status>,
        calls: AtomicUsize,
    }
    impl Replay {
        fn new(script: impl IntoIterator<Item = Status>) -> Self {
            Self { script: script.into_iter().collect(), calls: AtomicUsize::new(0) }
        }
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }
    impl FileTransform for Replay {
        fn accept(&self, _: &Path) -> bool {
            true
        }
        fn apply(&self, _: &Path) -> Result<Status> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.script[n.min(self.script.len() - 1)].clone())
        }
    }

    struct Panics;
    impl FileTransform for Panics {
        fn accept(&self, _: &Path) -> bool {
            true
        }
        fn apply(&self, path: &Path) -> Result<Status> {
            panic!("cannot handle {}", path.display());
        }
    }

    #[test]
    fn test_ok_first_time() {
        let t = Replay::new([Status::Ok]);
        assert!(process(&t, Path::new("a.tif")).is_none());
        assert_eq!(t.calls(), 1);
    }

    #[test]
    fn test_retry_then_ok() {
        let t = Replay::new([Status::retriable("busy"), Status::retriable("busy"), Status::Ok]);
        assert!(process(&t, Path::new("a.tif")).is_none());
        assert_eq!(t.calls(), 3);
    }

    #[test]
    fn test_retry_exhausted() {
        let t = Replay::new([Status::retriable("busy")]);
        let cause = process(&t, Path::new("a.tif")).unwrap();
        assert!(matches!(cause, Cause::Status(Status::Retriable(ref m)) if m == "busy"));
        assert_eq!(t.calls(), MAX_RETRY);
    }

    #[test]
    fn test_retriable_then_fatal_stops() {
        let t = Replay::new([Status::retriable("busy"), Status::fatal("broken"), Status::Ok]);
        let cause = process(&t, Path::new("a.tif")).unwrap();
        assert!(matches!(cause, Cause::Status(Status::Fatal(_))));
        assert_eq!(t.calls(), 2);
    }

    #[test]
    fn test_error_is_not_retried() {
        let t = Replay::new([Status::error("vanished"), Status::Ok]);
        assert!(matches!(process(&t, Path::new("a.tif")), Some(Cause::Status(Status::Error(_)))));
        assert_eq!(t.calls(), 1);
    }

    #[test]
    fn test_panic_becomes_fault() {
        let cause = process(&Panics, Path::new("a.tif")).unwrap();
        let Cause::Fault(fault) = cause else { panic!("expected a fault") };
        assert!(matches!(&*fault, ErrorKind::Panicked(m) if m == "cannot handle a.tif"));
    }

    #[test]
    fn test_release_reaches_zero_once() {
        let (_tx, rx) = crossbeam_channel::unbounded::<PathBuf>();
        let state = PoolState::new(rx, 3, Arc::new(AtomicBool::new(false)));
        state.release(1);
        state.release(2);
        assert_eq!(state.active.load(Ordering::SeqCst), 0);
        // Returns immediately: the counter is already at zero.
        assert!(state.wait().is_empty());
    }

    #[test]
    fn test_guard_releases_on_unwind() {
        let (_tx, rx) = crossbeam_channel::unbounded::<PathBuf>();
        let state = PoolState::new(rx, 1, Arc::new(AtomicBool::new(false)));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _exit = ExitGuard(&state);
            panic!("worker died");
        }));
        assert!(result.is_err());
        assert_eq!(state.active.load(Ordering::SeqCst), 0);
    }
}
