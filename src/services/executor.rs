//! Host primitives consumed by the save scheduler: a one-shot delayed
//! callback and a background task runner.
//!
//! Both hand the work back on failure so the caller decides what to do with
//! it. A timer must never run its callback inside `schedule_once`, because the
//! scheduler arms it while the store lock is held.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Arms a callback to run once after `delay`. There is no cancel.
pub trait DelayedCallback: Send + Sync {
    fn schedule_once(&self, delay: Duration, callback: Task) -> Result<(), Task>;
}

/// Runs a task off the caller's critical path.
pub trait TaskExecutor: Send + Sync {
    fn submit(&self, task: Task) -> Result<(), Task>;
}

/// Submits `task`, running it on the current thread if submission fails.
pub fn submit_or_run_inline(executor: &dyn TaskExecutor, task: Task) {
    if let Err(task) = executor.submit(task) {
        warn!("background submission failed, running task synchronously");
        task();
    }
}

/// Spawns a named thread that owns `task`, returning the task if the spawn fails.
fn spawn_with_recovery<F>(name: &str, task: Task, body: F) -> Result<(), Task>
where
    F: FnOnce(Task) + Send + 'static,
{
    let slot: Arc<Mutex<Option<Task>>> = Arc::new(Mutex::new(Some(task)));
    let worker_slot = Arc::clone(&slot);

    let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
        let task = worker_slot.lock().ok().and_then(|mut s| s.take());
        if let Some(task) = task {
            body(task);
        }
    });

    match spawned {
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(error = %e, thread = name, "failed to spawn thread");
            match slot.lock().ok().and_then(|mut s| s.take()) {
                Some(task) => Err(task),
                None => Ok(()),
            }
        }
    }
}

// === std threads ===

/// Runs each task on a freshly spawned thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadExecutor;

impl TaskExecutor for ThreadExecutor {
    fn submit(&self, task: Task) -> Result<(), Task> {
        spawn_with_recovery("visitlog-writer", task, |task| task())
    }
}

/// Sleeps on a dedicated thread, then runs the callback there.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadTimer;

impl DelayedCallback for ThreadTimer {
    fn schedule_once(&self, delay: Duration, callback: Task) -> Result<(), Task> {
        spawn_with_recovery("visitlog-timer", callback, move |callback| {
            thread::sleep(delay);
            callback();
        })
    }
}

// === tokio ===

/// Runs tasks on a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioExecutor {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl TaskExecutor for TokioExecutor {
    fn submit(&self, task: Task) -> Result<(), Task> {
        self.handle.spawn_blocking(task);
        Ok(())
    }
}

/// Arms callbacks as `tokio::time::sleep` tasks on a runtime.
#[derive(Debug, Clone)]
pub struct TokioTimer {
    handle: tokio::runtime::Handle,
}

impl TokioTimer {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }
}

impl DelayedCallback for TokioTimer {
    fn schedule_once(&self, delay: Duration, callback: Task) -> Result<(), Task> {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback();
        });
        Ok(())
    }
}

// === host-pumped ===

/// Runs every task immediately on the submitting thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl TaskExecutor for InlineExecutor {
    fn submit(&self, task: Task) -> Result<(), Task> {
        task();
        Ok(())
    }
}

/// Timer whose callbacks are run by the host's own event loop.
///
/// The host calls [`QueuedTimer::run_due`] on each tick. Callbacks always run
/// outside the queue's lock, so a callback may arm another one.
#[derive(Default)]
pub struct QueuedTimer {
    pending: Mutex<Vec<(Instant, Task)>>,
}

impl QueuedTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of armed callbacks that have not run yet.
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Runs callbacks whose delay has elapsed. Returns how many ran.
    pub fn run_due(&self) -> usize {
        self.run_matching(|due| due <= Instant::now())
    }

    /// Runs every armed callback regardless of its delay. Returns how many ran.
    pub fn run_all(&self) -> usize {
        self.run_matching(|_| true)
    }

    fn run_matching<P: Fn(Instant) -> bool>(&self, ready: P) -> usize {
        let batch: Vec<Task> = match self.pending.lock() {
            Ok(mut pending) => {
                let (run, keep): (Vec<_>, Vec<_>) =
                    pending.drain(..).partition(|(due, _)| ready(*due));
                *pending = keep;
                run.into_iter().map(|(_, task)| task).collect()
            }
            Err(_) => Vec::new(),
        };

        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }
}

impl DelayedCallback for QueuedTimer {
    fn schedule_once(&self, delay: Duration, callback: Task) -> Result<(), Task> {
        match self.pending.lock() {
            Ok(mut pending) => {
                pending.push((Instant::now() + delay, callback));
                Ok(())
            }
            Err(_) => Err(callback),
        }
    }
}
