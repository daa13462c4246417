//! Debounced write-back of history snapshots.
//!
//! A burst of mutations arms one delayed callback. When it fires, a snapshot
//! is taken from the store, and the write happens on a background task under
//! the write lock. Teardown takes the same write lock, raises the shutdown
//! flag, then snapshots and writes synchronously, so any background write
//! that has not started yet discards its snapshot and no change committed
//! before the flag went up is missed.
//!
//! Lock order: the store lock may be held while calling
//! [`SaveScheduler::schedule_save`], which only touches the phase lock. The
//! write lock is never acquired while the store lock is held; teardown takes
//! the store lock inside the write lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use crate::services::executor::{submit_or_run_inline, DelayedCallback, TaskExecutor};
use crate::services::history_persistence::{HistoryBackend, PersistedHistory};

/// Produces a snapshot of the live state. Implemented by the store.
pub trait SnapshotSource: Send + Sync + 'static {
    /// `None` when there is no loaded state worth writing.
    fn snapshot(&self) -> Option<PersistedHistory>;
}

/// Where the debounce cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePhase {
    Idle,
    Scheduled,
    Saving,
}

#[derive(Debug, Default)]
struct WriteGate {
    shutting_down: bool,
}

struct SchedulerInner {
    phase: Mutex<SavePhase>,
    gate: Mutex<WriteGate>,
    // Mirrors `WriteGate::shutting_down` for readers that must not wait on I/O.
    shutdown_started: AtomicBool,
    backend: Arc<dyn HistoryBackend>,
    timer: Arc<dyn DelayedCallback>,
    executor: Arc<dyn TaskExecutor>,
    delay: Duration,
}

/// Coalesces save requests into one delayed, off-lock write.
#[derive(Clone)]
pub struct SaveScheduler {
    inner: Arc<SchedulerInner>,
}

fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SaveScheduler {
    pub fn new(
        backend: Arc<dyn HistoryBackend>,
        timer: Arc<dyn DelayedCallback>,
        executor: Arc<dyn TaskExecutor>,
        delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                phase: Mutex::new(SavePhase::Idle),
                gate: Mutex::new(WriteGate::default()),
                shutdown_started: AtomicBool::new(false),
                backend,
                timer,
                executor,
                delay,
            }),
        }
    }

    pub fn phase(&self) -> SavePhase {
        *relock(&self.inner.phase)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutdown_started.load(Ordering::SeqCst)
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// Arms the delayed save unless one is already scheduled or running.
    pub fn schedule_save(&self, source: Weak<dyn SnapshotSource>) {
        if self.is_shutting_down() {
            return;
        }

        let mut phase = relock(&self.inner.phase);
        if *phase != SavePhase::Idle {
            return;
        }
        *phase = SavePhase::Scheduled;

        let inner = Arc::clone(&self.inner);
        let callback = Box::new(move || SchedulerInner::fire(inner, source));
        if self.inner.timer.schedule_once(self.inner.delay, callback).is_err() {
            warn!("failed to arm history save timer; will retry on next change");
            *phase = SavePhase::Idle;
        } else {
            debug!(delay_ms = self.inner.delay.as_millis() as u64, "history save scheduled");
        }
    }

    /// Final synchronous write at teardown.
    ///
    /// Returns `true` the first time it is called. The snapshot is taken after
    /// the shutdown flag is raised. A source with nothing loaded gets the flag
    /// raised without a write.
    pub fn shutdown(&self, source: &dyn SnapshotSource) -> bool {
        let mut gate = relock(&self.inner.gate);
        if gate.shutting_down {
            return false;
        }
        gate.shutting_down = true;
        self.inner.shutdown_started.store(true, Ordering::SeqCst);

        match source.snapshot() {
            Some(snapshot) => match self.inner.backend.save(&snapshot) {
                Ok(()) => debug!(entries = snapshot.entries.len(), "final history save written"),
                Err(e) => warn!(error = %e, "final history save failed"),
            },
            None => debug!("history never loaded; skipping final save"),
        }
        true
    }
}

impl SchedulerInner {
    fn set_phase(&self, next: SavePhase) {
        *relock(&self.phase) = next;
    }

    fn fire(inner: Arc<SchedulerInner>, source: Weak<dyn SnapshotSource>) {
        let Some(snapshot) = source.upgrade().and_then(|source| source.snapshot()) else {
            inner.set_phase(SavePhase::Idle);
            return;
        };
        inner.set_phase(SavePhase::Saving);

        let writer = Arc::clone(&inner);
        submit_or_run_inline(
            inner.executor.as_ref(),
            Box::new(move || writer.write_in_background(snapshot)),
        );
    }

    fn write_in_background(&self, snapshot: PersistedHistory) {
        {
            let gate = relock(&self.gate);
            if gate.shutting_down {
                debug!("shutdown in progress; discarding background history snapshot");
            } else {
                match self.backend.save(&snapshot) {
                    Ok(()) => debug!(entries = snapshot.entries.len(), "history saved"),
                    Err(e) => warn!(error = %e, "background history save failed"),
                }
            }
        }
        self.set_phase(SavePhase::Idle);
    }
}
