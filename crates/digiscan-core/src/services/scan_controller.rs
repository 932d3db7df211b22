//! Scan controller
//!
//! Owns the single scan worker thread. Initialization, complete scans and
//! partial scans are queued here and executed one at a time, in that order
//! of priority. Blocking calls wait on a channel while still serving
//! progress callbacks and volume enumeration requests on the calling
//! thread.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, Receiver, Sender};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::db::{Database, InitObserver};
use crate::events::{EventSinkExt, ScanEvent, SharedEventSink, SCAN_PROGRESS_EVENT};
use crate::models::AppSettings;
use crate::utils::error::InitializationAdvice;

use super::collection_manager::CollectionManager;
use super::collection_scanner::{CollectionScanner, ScanObserver, ScanReport};
use super::hints::{AlbumCopyMoveHint, CopyMoveHint, HintStore, ItemChangeHint};
use super::image_scanner::ScanContext;
use super::volumes::SharedDispatcher;

/// Name of the worker thread.
pub const SCAN_THREAD_NAME: &str = "digiscan-scan";

/// How often an idle worker wakes up to expire hints.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

struct Waiter<T> {
    done: Sender<T>,
    progress: Sender<ScanEvent>,
}

enum Task {
    Initialize(Vec<Waiter<InitializationAdvice>>),
    CompleteScan(Vec<Waiter<ScanReport>>),
    Partial(PathBuf),
}

#[derive(Default)]
struct ControllerState {
    running: bool,
    busy: bool,
    needs_initialization: bool,
    needs_complete_scan: bool,
    init_waiters: Vec<Waiter<InitializationAdvice>>,
    scan_waiters: Vec<Waiter<ScanReport>>,
    queue: VecDeque<PathBuf>,
    suspend_count: usize,
    /// Errors of partial scans since the queue last drained
    session_errors: Vec<String>,
}

impl ControllerState {
    fn next_task(&mut self) -> Option<Task> {
        if self.needs_initialization {
            self.needs_initialization = false;
            return Some(Task::Initialize(std::mem::take(&mut self.init_waiters)));
        }
        if self.needs_complete_scan {
            self.needs_complete_scan = false;
            return Some(Task::CompleteScan(std::mem::take(&mut self.scan_waiters)));
        }
        if self.suspend_count == 0 {
            return self.queue.pop_front().map(Task::Partial);
        }
        None
    }

    fn has_runnable_work(&self) -> bool {
        self.needs_initialization
            || self.needs_complete_scan
            || (self.suspend_count == 0 && !self.queue.is_empty())
    }
}

struct Shared {
    state: Mutex<ControllerState>,
    condvar: Condvar,
    hints: Arc<HintStore>,
    db: Database,
    manager: Arc<CollectionManager>,
    events: SharedEventSink,
    settings: RwLock<AppSettings>,
}

impl Shared {
    fn is_suspended(&self) -> bool {
        self.state.lock().suspend_count > 0
    }
}

/// Forwards worker-side progress to the event sink and to blocked callers.
///
/// Suspension is checked only before a task starts; a running scan always
/// walks its whole subtree.
struct ProgressRelay {
    shared: Arc<Shared>,
    listeners: Vec<Sender<ScanEvent>>,
}

impl ProgressRelay {
    fn send(&self, event: ScanEvent) {
        self.shared.events.emit_typed(SCAN_PROGRESS_EVENT, &event);
        for listener in &self.listeners {
            let _ = listener.send(event.clone());
        }
    }
}

impl ScanObserver for ProgressRelay {
    fn total_files_to_scan(&self, count: usize) {
        self.send(ScanEvent::TotalFilesToScan { count });
    }

    fn start_scanning_album(&self, album_root: &Path, album: &str) {
        self.send(ScanEvent::StartScanningAlbum {
            album_root: album_root.display().to_string(),
            album: album.to_string(),
        });
    }

    fn finished_scanning_album(&self, album_root: &Path, album: &str, files: usize) {
        self.send(ScanEvent::FinishedScanningAlbum {
            album_root: album_root.display().to_string(),
            album: album.to_string(),
            files,
        });
    }

    fn scanned_files(&self, count: usize) {
        self.send(ScanEvent::ScannedFiles { count });
    }

    // Per-file errors are collected in the report and shown once
}

impl InitObserver for ProgressRelay {
    fn more_schema_updates_needed(&self, steps: usize) {
        self.send(ScanEvent::SchemaUpdatesNeeded { steps });
    }

    fn schema_update_progress(&self, message: &str, step: usize) {
        self.send(ScanEvent::SchemaUpdateProgress {
            message: message.to_string(),
            step,
        });
    }

    fn error(&self, message: &str) {
        self.send(ScanEvent::Error {
            message: message.to_string(),
        });
    }
}

/// State of a blocked caller.
enum WaitState<T> {
    Waiting,
    Finished(T),
    /// The worker went away without answering
    Abandoned,
}

/// Synchronous wait for a worker result.
///
/// While waiting, the caller still receives progress events and, on the
/// owner thread, answers volume enumeration requests from the worker.
struct BlockingWait<'a, T> {
    done: Receiver<T>,
    progress: Receiver<ScanEvent>,
    dispatcher: &'a SharedDispatcher,
}

impl<'a, T> BlockingWait<'a, T> {
    fn run(self, mut on_progress: impl FnMut(ScanEvent)) -> Option<T> {
        let never_requests = crossbeam_channel::never();
        let requests = if self.dispatcher.is_owner_thread() {
            self.dispatcher.requests()
        } else {
            &never_requests
        };
        let mut progress = self.progress.clone();
        let mut state = WaitState::Waiting;

        while let WaitState::Waiting = state {
            let mut progress_closed = false;
            select! {
                recv(progress) -> event => match event {
                    Ok(event) => on_progress(event),
                    Err(_) => progress_closed = true,
                },
                recv(requests) -> request => {
                    if let Ok(request) = request {
                        self.dispatcher.answer(request);
                    }
                },
                recv(self.done) -> result => {
                    state = match result {
                        Ok(value) => WaitState::Finished(value),
                        Err(_) => WaitState::Abandoned,
                    };
                },
            }
            if progress_closed {
                progress = crossbeam_channel::never();
            }
        }

        for event in self.progress.try_iter() {
            on_progress(event);
        }

        match state {
            WaitState::Finished(value) => Some(value),
            _ => None,
        }
    }
}

fn forward_scan_event(observer: &dyn ScanObserver, event: ScanEvent) {
    match event {
        ScanEvent::TotalFilesToScan { count } => observer.total_files_to_scan(count),
        ScanEvent::StartScanningAlbum { album_root, album } => {
            observer.start_scanning_album(Path::new(&album_root), &album)
        }
        ScanEvent::FinishedScanningAlbum {
            album_root,
            album,
            files,
        } => observer.finished_scanning_album(Path::new(&album_root), &album, files),
        ScanEvent::ScannedFiles { count } => observer.scanned_files(count),
        ScanEvent::Error { message } => observer.error(&message),
        _ => {}
    }
}

/// Serializes all scan work onto one worker thread.
pub struct ScanController {
    shared: Arc<Shared>,
    dispatcher: SharedDispatcher,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScanController {
    pub fn new(
        db: Database,
        manager: Arc<CollectionManager>,
        dispatcher: SharedDispatcher,
        events: SharedEventSink,
        settings: &AppSettings,
    ) -> std::io::Result<Self> {
        let hints = Arc::new(HintStore::new(Duration::from_secs(
            settings.scan.hint_expiry_secs,
        )));
        let shared = Arc::new(Shared {
            state: Mutex::new(ControllerState {
                running: true,
                ..Default::default()
            }),
            condvar: Condvar::new(),
            hints,
            db,
            manager,
            events,
            settings: RwLock::new(settings.clone()),
        });

        let worker_shared = shared.clone();
        let handle = std::thread::Builder::new()
            .name(SCAN_THREAD_NAME.to_string())
            .spawn(move || Self::worker_loop(worker_shared))?;

        Ok(Self {
            shared,
            dispatcher,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn hints(&self) -> &Arc<HintStore> {
        &self.shared.hints
    }

    pub fn update_settings(&self, settings: &AppSettings) {
        *self.shared.settings.write() = settings.clone();
    }

    fn notify(&self) {
        self.shared.condvar.notify_all();
    }

    // -----------------------------------------------------------------
    // Blocking operations
    // -----------------------------------------------------------------

    /// Open or migrate the database on the worker and wait for the result.
    pub fn database_initialization(&self, observer: &dyn InitObserver) -> InitializationAdvice {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let (progress_tx, progress_rx) = crossbeam_channel::unbounded();
        {
            let mut state = self.shared.state.lock();
            if state.running {
                state.init_waiters.push(Waiter {
                    done: done_tx,
                    progress: progress_tx,
                });
                state.needs_initialization = true;
            } else {
                drop((done_tx, progress_tx));
            }
        }
        self.notify();

        let wait = BlockingWait {
            done: done_rx,
            progress: progress_rx,
            dispatcher: &self.dispatcher,
        };
        let advice = wait.run(|event| match event {
            ScanEvent::SchemaUpdatesNeeded { steps } => observer.more_schema_updates_needed(steps),
            ScanEvent::SchemaUpdateProgress { message, step } => {
                observer.schema_update_progress(&message, step)
            }
            ScanEvent::Error { message } => observer.error(&message),
            _ => {}
        });

        advice.unwrap_or_else(|| {
            tracing::error!("scan worker stopped before initialization finished");
            InitializationAdvice::ContinueWithoutDatabase
        })
    }

    /// Scan every available location on the worker and wait for the result.
    pub fn complete_collection_scan(&self, observer: &dyn ScanObserver) -> ScanReport {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let (progress_tx, progress_rx) = crossbeam_channel::unbounded();
        {
            let mut state = self.shared.state.lock();
            if state.running {
                state.scan_waiters.push(Waiter {
                    done: done_tx,
                    progress: progress_tx,
                });
                state.needs_complete_scan = true;
            } else {
                drop((done_tx, progress_tx));
            }
        }
        self.notify();

        let wait = BlockingWait {
            done: done_rx,
            progress: progress_rx,
            dispatcher: &self.dispatcher,
        };
        wait.run(|event| forward_scan_event(observer, event))
            .unwrap_or_else(|| ScanReport {
                errors: vec!["scan worker stopped before the scan finished".to_string()],
                ..Default::default()
            })
    }

    // -----------------------------------------------------------------
    // Queued operations
    // -----------------------------------------------------------------

    /// Request a complete scan without waiting for it
    pub fn schedule_complete_scan(&self) {
        self.shared.state.lock().needs_complete_scan = true;
        self.notify();
    }

    /// Queue a partial scan of `path`. Returns false when the path was
    /// already queued.
    pub fn schedule_collection_scan(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let queued = {
            let mut state = self.shared.state.lock();
            if state.queue.contains(&path) {
                false
            } else {
                state.queue.push_back(path);
                true
            }
        };
        if queued {
            self.notify();
        }
        queued
    }

    /// Queued partial scan paths, oldest first
    pub fn pending_tasks(&self) -> Vec<PathBuf> {
        self.shared.state.lock().queue.iter().cloned().collect()
    }

    /// Hold back partial scans. Calls nest.
    pub fn suspend_collection_scan(&self) {
        self.shared.state.lock().suspend_count += 1;
    }

    pub fn resume_collection_scan(&self) {
        let resumed = {
            let mut state = self.shared.state.lock();
            state.suspend_count = state.suspend_count.saturating_sub(1);
            state.suspend_count == 0
        };
        if resumed {
            self.notify();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.shared.is_suspended()
    }

    // -----------------------------------------------------------------
    // Hints
    // -----------------------------------------------------------------

    pub fn hint_item_copy_or_move(&self, hint: CopyMoveHint) {
        self.shared.hints.put_item_hints(hint);
    }

    pub fn hint_item_change(&self, hint: ItemChangeHint) {
        self.shared.hints.put_item_change_hint(hint);
    }

    pub fn hint_album_copy_or_move(&self, hint: AlbumCopyMoveHint) {
        self.shared.hints.put_album_hint(hint);
    }

    // -----------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------

    /// Wait until the worker has nothing runnable left. Returns false on
    /// timeout.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.dispatcher.is_owner_thread() {
                self.dispatcher.pump();
            }

            let mut state = self.shared.state.lock();
            if !state.busy && !state.has_runnable_work() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let slice = (deadline - now).min(Duration::from_millis(50));
            self.shared.condvar.wait_for(&mut state, slice);
        }
    }

    /// Stop the worker after its current task
    pub fn shutdown(&self) {
        self.shared.state.lock().running = false;
        self.notify();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            // The worker may be waiting for a volume list from this thread
            while !handle.is_finished() {
                if self.dispatcher.is_owner_thread() {
                    self.dispatcher.pump();
                }
                std::thread::sleep(Duration::from_millis(10));
            }
            if handle.join().is_err() {
                tracing::error!("scan worker panicked");
            }
            tracing::info!("scan controller stopped");
        }
    }

    // -----------------------------------------------------------------
    // Worker
    // -----------------------------------------------------------------

    fn worker_loop(shared: Arc<Shared>) {
        tracing::debug!("scan worker started");
        loop {
            let task = {
                let mut state = shared.state.lock();
                loop {
                    if !state.running {
                        // Blocked callers see a closed channel
                        state.init_waiters.clear();
                        state.scan_waiters.clear();
                        tracing::debug!("scan worker exiting");
                        return;
                    }
                    if let Some(task) = state.next_task() {
                        state.busy = true;
                        break task;
                    }
                    if state.busy {
                        state.busy = false;
                        let errors = std::mem::take(&mut state.session_errors);
                        shared.condvar.notify_all();
                        // Sinks may call back into the controller
                        MutexGuard::unlocked(&mut state, || {
                            Self::finish_session(&shared, errors)
                        });
                        continue;
                    }
                    let timed_out = shared
                        .condvar
                        .wait_for(&mut state, IDLE_SWEEP_INTERVAL)
                        .timed_out();
                    if timed_out {
                        shared.hints.sweep(Instant::now());
                    }
                }
            };

            match task {
                Task::Initialize(waiters) => Self::run_initialization(&shared, waiters),
                Task::CompleteScan(waiters) => Self::run_complete_scan(&shared, waiters),
                Task::Partial(path) => Self::run_partial_scan(&shared, &path),
            }
        }
    }

    /// Queue drained: report collected partial-scan errors once and expire
    /// old hints.
    fn finish_session(shared: &Shared, errors: Vec<String>) {
        if !errors.is_empty() {
            let message = format!("{} errors while scanning: {}", errors.len(), errors.join("; "));
            shared
                .events
                .emit_typed(SCAN_PROGRESS_EVENT, &ScanEvent::Error { message });
        }
        shared.hints.sweep(Instant::now());
    }

    fn run_initialization(shared: &Arc<Shared>, waiters: Vec<Waiter<InitializationAdvice>>) {
        let relay = ProgressRelay {
            shared: shared.clone(),
            listeners: waiters.iter().map(|w| w.progress.clone()).collect(),
        };

        let mut advice = shared.db.initialize(&relay);
        if advice.is_success() {
            if let Err(e) = shared.manager.update_locations() {
                tracing::error!("failed to resolve collection locations: {}", e);
                advice = InitializationAdvice::ContinueWithoutDatabase;
            }
        }
        tracing::info!("database initialization finished: {:?}", advice);
        relay.send(ScanEvent::InitializationFinished { advice });

        for waiter in waiters {
            let _ = waiter.done.send(advice);
        }
    }

    fn scan_context(shared: &Shared) -> Result<(ScanContext, AppSettings), String> {
        let settings = shared.settings.read().clone();
        let context = ScanContext::from_database(&shared.db, settings.metadata.clone())
            .map_err(|e| format!("cannot read scan settings: {}", e))?;
        Ok((context, settings))
    }

    fn run_complete_scan(shared: &Arc<Shared>, waiters: Vec<Waiter<ScanReport>>) {
        let relay = ProgressRelay {
            shared: shared.clone(),
            listeners: waiters.iter().map(|w| w.progress.clone()).collect(),
        };
        let started = Instant::now();
        let mut report = ScanReport::default();

        if let Err(e) = shared.manager.update_locations() {
            report.errors.push(format!("cannot resolve locations: {}", e));
        }

        match Self::scan_context(shared) {
            Ok((context, settings)) => {
                let mut scanner = CollectionScanner::new(
                    &shared.db,
                    &shared.manager,
                    context,
                    &settings.scan,
                    &relay,
                );
                scanner.record_hints(shared.hints.clone());
                let result = scanner.complete_scan();
                report.merge(scanner.into_report());
                if let Err(e) = result {
                    report.errors.push(format!("complete scan failed: {}", e));
                }
            }
            Err(message) => report.errors.push(message),
        }

        tracing::info!(
            "complete scan finished in {:?}: +{} albums, -{} albums, +{} items, ~{} items, -{} items, {} errors",
            started.elapsed(),
            report.albums_added,
            report.albums_removed,
            report.items_added,
            report.items_modified,
            report.items_removed,
            report.errors.len()
        );
        relay.send(ScanEvent::CompleteScanFinished {
            errors: report.errors.clone(),
        });

        for waiter in waiters {
            let _ = waiter.done.send(report.clone());
        }
    }

    fn run_partial_scan(shared: &Arc<Shared>, path: &Path) {
        let relay = ProgressRelay {
            shared: shared.clone(),
            listeners: Vec::new(),
        };
        let path_text = path.display().to_string();
        relay.send(ScanEvent::PartialScanStarted {
            path: path_text.clone(),
        });

        let mut errors = Vec::new();
        match Self::scan_context(shared) {
            Ok((context, settings)) => {
                let mut scanner = CollectionScanner::new(
                    &shared.db,
                    &shared.manager,
                    context,
                    &settings.scan,
                    &relay,
                );
                scanner.record_hints(shared.hints.clone());
                if let Err(e) = scanner.partial_scan(path) {
                    errors.push(format!("{}: {}", path_text, e));
                }
                errors.extend(scanner.into_report().errors);
            }
            Err(message) => errors.push(message),
        }

        tracing::debug!("partial scan of {} finished", path_text);
        relay.send(ScanEvent::PartialScanFinished { path: path_text });
        shared.state.lock().session_errors.extend(errors);
    }
}

impl Drop for ScanController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NoOpInitObserver;
    use crate::events::{EventSink, NoOpEventSink, RecordingEventSink};
    use crate::services::collection_scanner::NoOpScanObserver;
    use crate::services::volumes::{MainThreadDispatcher, SolidVolumeInfo, StaticVolumeProvider};
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Weak;
    use tempfile::TempDir;

    /// Holds the worker at the start of the first partial scan until the
    /// test sends on `release`.
    struct GateSink {
        events: RecordingEventSink,
        entered: Sender<()>,
        release: Receiver<()>,
        passed: AtomicBool,
    }

    fn gate() -> (Arc<GateSink>, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded(1);
        let sink = Arc::new(GateSink {
            events: RecordingEventSink::new(),
            entered: entered_tx,
            release: release_rx,
            passed: AtomicBool::new(false),
        });
        (sink, entered_rx, release_tx)
    }

    impl EventSink for GateSink {
        fn emit(&self, event_name: &str, payload_json: &str) {
            self.events.emit(event_name, payload_json);
            if payload_json.contains("\"partialScanStarted\"")
                && !self.passed.swap(true, Ordering::SeqCst)
            {
                let _ = self.entered.send(());
                let _ = self.release.recv();
            }
        }
    }

    fn started_paths(events: &RecordingEventSink) -> Vec<String> {
        events
            .payloads(SCAN_PROGRESS_EVENT)
            .iter()
            .filter_map(|p| serde_json::from_str::<serde_json::Value>(p).ok())
            .filter(|v| v["kind"] == "partialScanStarted")
            .filter_map(|v| v["path"].as_str().map(str::to_string))
            .collect()
    }

    struct Fixture {
        controller: Arc<ScanController>,
        manager: Arc<CollectionManager>,
        db: Database,
        mount: PathBuf,
        _dir: TempDir,
    }

    fn fixture(events: SharedEventSink) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mount = fs::canonicalize(dir.path()).unwrap();
        let provider = Arc::new(StaticVolumeProvider::new(vec![SolidVolumeInfo {
            path: mount.clone(),
            uuid: Some("U".to_string()),
            is_mounted: true,
            ..Default::default()
        }]));
        let dispatcher = Arc::new(MainThreadDispatcher::new(provider));
        let db = Database::open_in_memory().unwrap();
        let manager = Arc::new(CollectionManager::new(
            db.clone(),
            dispatcher.clone(),
            events.clone(),
        ));
        let controller = Arc::new(
            ScanController::new(
                db.clone(),
                manager.clone(),
                dispatcher,
                events,
                &AppSettings::default(),
            )
            .unwrap(),
        );
        Fixture {
            controller,
            manager,
            db,
            mount,
            _dir: dir,
        }
    }

    #[test]
    fn test_initialization_then_complete_scan() {
        let sink = Arc::new(RecordingEventSink::new());
        let f = fixture(sink.clone());
        assert_eq!(
            f.controller.database_initialization(&NoOpInitObserver),
            InitializationAdvice::Success
        );

        let root = f.mount.join("photos");
        fs::create_dir_all(root.join("2020")).unwrap();
        fs::write(root.join("2020").join("a.jpg"), b"a").unwrap();
        f.manager.add_location(&root, None).unwrap();

        let report = f.controller.complete_collection_scan(&NoOpScanObserver);
        assert_eq!(report.items_added, 1);
        assert!(report.errors.is_empty());

        let kinds: Vec<String> = sink.payloads(SCAN_PROGRESS_EVENT);
        assert!(kinds.iter().any(|p| p.contains("initializationFinished")));
        assert!(kinds.last().unwrap().contains("completeScanFinished"));
    }

    #[test]
    fn test_duplicate_schedule_is_ignored() {
        let f = fixture(Arc::new(NoOpEventSink));
        f.controller.database_initialization(&NoOpInitObserver);

        f.controller.suspend_collection_scan();
        assert!(f.controller.schedule_collection_scan(f.mount.join("a")));
        assert!(!f.controller.schedule_collection_scan(f.mount.join("a")));
        assert!(f.controller.schedule_collection_scan(f.mount.join("b")));
        assert_eq!(f.controller.pending_tasks(), vec![f.mount.join("a"), f.mount.join("b")]);
    }

    #[test]
    fn test_suspend_count_gates_partial_scans() {
        let f = fixture(Arc::new(NoOpEventSink));
        f.controller.database_initialization(&NoOpInitObserver);
        let root = f.mount.join("photos");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("a.jpg"), b"a").unwrap();
        f.manager.add_location(&root, None).unwrap();

        f.controller.suspend_collection_scan();
        f.controller.suspend_collection_scan();
        f.controller.schedule_collection_scan(root.clone());

        f.controller.resume_collection_scan();
        assert!(f.controller.is_suspended());
        assert!(f.controller.wait_for_idle(Duration::from_secs(5)));
        assert_eq!(f.controller.pending_tasks().len(), 1);

        f.controller.resume_collection_scan();
        assert!(f.controller.wait_for_idle(Duration::from_secs(10)));
        assert!(f.controller.pending_tasks().is_empty());
        assert_eq!(f.db.stats().unwrap().image_count, 1);
    }

    #[test]
    fn test_suspend_during_partial_scan_finishes_it() {
        let (sink, entered, release) = gate();
        let f = fixture(sink.clone());
        f.controller.database_initialization(&NoOpInitObserver);
        let root = f.mount.join("photos");
        fs::create_dir_all(root.join("sub").join("deeper")).unwrap();
        fs::write(root.join("sub").join("a.jpg"), b"a").unwrap();
        fs::write(root.join("sub").join("deeper").join("b.jpg"), b"b").unwrap();
        f.manager.add_location(&root, None).unwrap();

        f.controller.schedule_collection_scan(root.clone());
        let held = entered.recv_timeout(Duration::from_secs(10)).is_ok();
        f.controller.suspend_collection_scan();
        release.send(()).unwrap();
        assert!(held);

        assert!(f.controller.wait_for_idle(Duration::from_secs(10)));
        assert!(f.controller.pending_tasks().is_empty());
        assert_eq!(f.db.stats().unwrap().image_count, 2);

        // Later work is still held back
        fs::write(root.join("c.jpg"), b"c").unwrap();
        f.controller.schedule_collection_scan(root.clone());
        assert!(f.controller.wait_for_idle(Duration::from_secs(5)));
        assert_eq!(f.controller.pending_tasks(), vec![root.clone()]);

        f.controller.resume_collection_scan();
        assert!(f.controller.wait_for_idle(Duration::from_secs(10)));
        assert_eq!(f.db.stats().unwrap().image_count, 3);
    }

    #[test]
    fn test_schedule_during_running_scan_runs_once() {
        let (sink, entered, release) = gate();
        let f = fixture(sink.clone());
        f.controller.database_initialization(&NoOpInitObserver);
        let root = f.mount.join("photos");
        let (a, b) = (root.join("a"), root.join("b"));
        fs::create_dir_all(&a).unwrap();
        fs::create_dir_all(&b).unwrap();
        fs::write(a.join("x.jpg"), b"x").unwrap();
        fs::write(b.join("y.jpg"), b"y").unwrap();
        f.manager.add_location(&root, None).unwrap();

        f.controller.schedule_collection_scan(a.clone());
        let held = entered.recv_timeout(Duration::from_secs(10)).is_ok();
        let first = f.controller.schedule_collection_scan(b.clone());
        let second = f.controller.schedule_collection_scan(b.clone());
        let pending = f.controller.pending_tasks();
        release.send(()).unwrap();

        assert!(held);
        assert!(first);
        assert!(!second);
        assert_eq!(pending, vec![b.clone()]);

        assert!(f.controller.wait_for_idle(Duration::from_secs(10)));
        assert_eq!(
            started_paths(&sink.events),
            vec![a.display().to_string(), b.display().to_string()]
        );
        assert_eq!(f.db.stats().unwrap().image_count, 2);
    }

    /// Calls back into the controller when the session error arrives.
    struct ReentrantSink {
        controller: Mutex<Option<Weak<ScanController>>>,
        seen: Sender<Vec<PathBuf>>,
    }

    impl EventSink for ReentrantSink {
        fn emit(&self, _event_name: &str, payload_json: &str) {
            if !payload_json.contains("\"kind\":\"error\"") {
                return;
            }
            let controller = self.controller.lock().as_ref().and_then(Weak::upgrade);
            if let Some(controller) = controller {
                let pending = controller.pending_tasks();
                drop(controller);
                let _ = self.seen.send(pending);
            }
        }
    }

    #[test]
    fn test_session_errors_reported_outside_state_lock() {
        let (seen_tx, seen_rx) = crossbeam_channel::unbounded();
        let sink = Arc::new(ReentrantSink {
            controller: Mutex::new(None),
            seen: seen_tx,
        });
        let f = fixture(sink.clone());
        *sink.controller.lock() = Some(Arc::downgrade(&f.controller));
        f.controller.database_initialization(&NoOpInitObserver);

        // Not inside any location
        f.controller.schedule_collection_scan(f.mount.join("elsewhere"));
        let pending = seen_rx.recv_timeout(Duration::from_secs(10));
        assert_eq!(pending.ok(), Some(Vec::new()));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let f = fixture(Arc::new(NoOpEventSink));
        f.controller.shutdown();
        f.controller.shutdown();
        let report = f.controller.complete_collection_scan(&NoOpScanObserver);
        assert_eq!(report.errors.len(), 1);
    }
}
