//! Progress reporting and cancellation shared with the caller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use super::types::ProgressState;

/// Receives `(total, completed)` updates from the engine.
///
/// Only the engine's driver thread publishes, so implementations see
/// updates in order.
pub trait ProgressSink {
    fn publish(&self, progress: ProgressState);
}

/// Latest progress, polled by an observer at its own cadence
#[derive(Clone, Debug, Default)]
pub struct SharedProgress {
    inner: Arc<Mutex<ProgressState>>,
}

impl SharedProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressState {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for SharedProgress {
    fn publish(&self, progress: ProgressState) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = progress;
    }
}

/// Forwards every update; a dropped receiver is ignored
impl ProgressSink for flume::Sender<ProgressState> {
    fn publish(&self, progress: ProgressState) {
        let _ = self.send(progress);
    }
}

/// Discards updates
#[derive(Clone, Copy, Debug, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn publish(&self, _progress: ProgressState) {}
}

/// Cooperative stop signal for a run.
///
/// Settable from any thread at any time. The engine polls it between
/// documents and between job completions; jobs already rendering finish.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
