//! Unit tests for the SaveScheduler debounce and shutdown protocol.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::Duration;

use visitlog::services::executor::{InlineExecutor, QueuedTimer, ThreadExecutor};
use visitlog::services::history_persistence::{HistoryBackend, MemoryBackend, PersistedHistory};
use visitlog::services::save_scheduler::{SavePhase, SaveScheduler, SnapshotSource};
use visitlog::types::entry::Entry;
use visitlog::types::errors::HistoryError;

fn snapshot_of(address: &str) -> PersistedHistory {
    PersistedHistory {
        max_age_days: 7,
        entries: vec![Entry::new(address, 1)],
    }
}

struct FixedSource(PersistedHistory);

impl SnapshotSource for FixedSource {
    fn snapshot(&self) -> Option<PersistedHistory> {
        Some(self.0.clone())
    }
}

/// Notes whether the scheduler was already shutting down when asked for a snapshot.
#[derive(Default)]
struct FlagWatchingSource {
    scheduler: OnceLock<SaveScheduler>,
    saw_shutdown: AtomicBool,
    calls: Mutex<usize>,
}

impl SnapshotSource for FlagWatchingSource {
    fn snapshot(&self) -> Option<PersistedHistory> {
        if let Some(scheduler) = self.scheduler.get() {
            self.saw_shutdown
                .store(scheduler.is_shutting_down(), Ordering::SeqCst);
        }
        *self.calls.lock().unwrap() += 1;
        Some(snapshot_of("final"))
    }
}

/// Records every write; the first write blocks until released.
struct GatedBackend {
    writes: Mutex<Vec<PersistedHistory>>,
    started: Mutex<Option<Sender<()>>>,
    release: Mutex<Option<Receiver<()>>>,
}

impl GatedBackend {
    fn new() -> (Arc<Self>, Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let backend = Arc::new(Self {
            writes: Mutex::new(Vec::new()),
            started: Mutex::new(Some(started_tx)),
            release: Mutex::new(Some(release_rx)),
        });
        (backend, started_rx, release_tx)
    }

    fn writes(&self) -> Vec<PersistedHistory> {
        self.writes.lock().unwrap().clone()
    }
}

impl HistoryBackend for GatedBackend {
    fn load(&self) -> Result<Option<PersistedHistory>, HistoryError> {
        Ok(None)
    }

    fn save(&self, snapshot: &PersistedHistory) -> Result<(), HistoryError> {
        if let Some(started) = self.started.lock().unwrap().take() {
            let _ = started.send(());
        }
        let release = self.release.lock().unwrap().take();
        if let Some(release) = release {
            let _ = release.recv_timeout(Duration::from_secs(5));
        }
        self.writes.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

struct FailingBackend;

impl HistoryBackend for FailingBackend {
    fn load(&self) -> Result<Option<PersistedHistory>, HistoryError> {
        Err(HistoryError::Io("unavailable".to_string()))
    }

    fn save(&self, _snapshot: &PersistedHistory) -> Result<(), HistoryError> {
        Err(HistoryError::Io("disk full".to_string()))
    }
}

#[test]
fn test_shutdown_waits_for_in_flight_write_and_lands_last() {
    let (backend, started, release) = GatedBackend::new();
    let timer = Arc::new(QueuedTimer::new());
    let scheduler = SaveScheduler::new(
        backend.clone(),
        timer.clone(),
        Arc::new(ThreadExecutor),
        Duration::from_millis(0),
    );

    let source: Arc<dyn SnapshotSource> = Arc::new(FixedSource(snapshot_of("background")));
    scheduler.schedule_save(Arc::downgrade(&source));
    timer.run_all();
    started
        .recv_timeout(Duration::from_secs(5))
        .expect("background write should start");

    let final_scheduler = scheduler.clone();
    let shutdown = thread::spawn(move || final_scheduler.shutdown(&FixedSource(snapshot_of("final"))));

    thread::sleep(Duration::from_millis(50));
    assert_eq!(backend.writes().len(), 0, "shutdown must wait for the write lock");

    release.send(()).unwrap();
    assert!(shutdown.join().unwrap());

    let writes = backend.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0], snapshot_of("background"));
    assert_eq!(writes[1], snapshot_of("final"));
}

#[test]
fn test_failed_write_returns_to_idle() {
    let timer = Arc::new(QueuedTimer::new());
    let scheduler = SaveScheduler::new(
        Arc::new(FailingBackend),
        timer.clone(),
        Arc::new(InlineExecutor),
        Duration::from_secs(2),
    );
    let source: Arc<dyn SnapshotSource> = Arc::new(FixedSource(snapshot_of("a")));

    scheduler.schedule_save(Arc::downgrade(&source));
    timer.run_all();
    assert_eq!(scheduler.phase(), SavePhase::Idle);

    scheduler.schedule_save(Arc::downgrade(&source));
    assert_eq!(timer.pending(), 1, "a failed write must not block the next attempt");
}

#[test]
fn test_configured_delay_is_used() {
    let timer = Arc::new(QueuedTimer::new());
    let scheduler = SaveScheduler::new(
        Arc::new(FailingBackend),
        timer.clone(),
        Arc::new(InlineExecutor),
        Duration::from_secs(3600),
    );
    let source: Arc<dyn SnapshotSource> = Arc::new(FixedSource(snapshot_of("a")));

    scheduler.schedule_save(Arc::downgrade(&source));
    assert_eq!(scheduler.delay(), Duration::from_secs(3600));
    assert_eq!(timer.run_due(), 0);
    assert_eq!(scheduler.phase(), SavePhase::Scheduled);
}

#[test]
fn test_shutdown_flag_is_visible() {
    let scheduler = SaveScheduler::new(
        Arc::new(FailingBackend),
        Arc::new(QueuedTimer::new()),
        Arc::new(InlineExecutor),
        Duration::from_secs(2),
    );
    assert!(!scheduler.is_shutting_down());
    assert!(scheduler.shutdown(&FixedSource(snapshot_of("a"))));
    assert!(scheduler.is_shutting_down());
}

#[test]
fn test_shutdown_snapshots_after_raising_the_flag() {
    let backend = Arc::new(MemoryBackend::new());
    let scheduler = SaveScheduler::new(
        backend.clone(),
        Arc::new(QueuedTimer::new()),
        Arc::new(InlineExecutor),
        Duration::from_secs(2),
    );
    let source = FlagWatchingSource::default();
    let _ = source.scheduler.set(scheduler.clone());

    assert!(scheduler.shutdown(&source));
    assert!(source.saw_shutdown.load(Ordering::SeqCst));
    assert_eq!(backend.stored(), Some(snapshot_of("final")));

    assert!(!scheduler.shutdown(&source));
    assert_eq!(*source.calls.lock().unwrap(), 1, "a repeated shutdown must not snapshot again");
}
