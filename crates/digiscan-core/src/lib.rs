//! digiscan core library
//!
//! Collection scanning and metadata indexing for a photo library kept in
//! SQLite. The crate is frontend-agnostic: hosts supply a [`PathProvider`],
//! an [`EventSink`] and a [`VolumeProvider`] and drive everything through
//! [`DigiscanCore`].
//!
//! # Architecture
//!
//! - `models`: row types, enums and settings
//! - `db`: SQLite schema, migrations and the data access layer
//! - `watch`: change notifications published by database writes
//! - `services`: volumes, collection locations, scanners and the scan worker
//! - `events`: event emission abstraction (EventSink trait)
//! - `paths`: path provider abstraction (PathProvider trait)
//! - `utils`: error handling and album path helpers
//!
//! # Example
//!
//! ```no_run
//! use digiscan_core::{
//!     DigiscanCore,
//!     db::NoOpInitObserver,
//!     events::LoggingEventSink,
//!     paths::DefaultPathProvider,
//!     services::{NoOpScanObserver, SysinfoVolumeProvider},
//! };
//! use std::sync::Arc;
//!
//! let core = DigiscanCore::new(
//!     Arc::new(DefaultPathProvider::new()),
//!     Arc::new(LoggingEventSink),
//!     Arc::new(SysinfoVolumeProvider::new()),
//! )
//! .unwrap();
//!
//! core.initialize(&NoOpInitObserver);
//! let report = core.scanner().complete_collection_scan(&NoOpScanObserver);
//! println!("{} new items", report.items_added);
//! ```

pub mod db;
pub mod events;
pub mod models;
pub mod paths;
pub mod services;
pub mod utils;
pub mod watch;

// Re-export commonly used types
pub use db::{Database, DatabaseStats, InitObserver};
pub use events::{EventSink, LoggingEventSink, NoOpEventSink, SharedEventSink};
pub use models::AppSettings;
pub use paths::{DefaultPathProvider, PathProvider, SharedPathProvider};
pub use services::{
    CollectionLocation, CollectionManager, MainThreadDispatcher, ScanController, ScanReport,
    SettingsManager, SharedDispatcher, SharedVolumeProvider, VolumeProvider,
};
pub use utils::{AppError, AppResult, InitializationAdvice};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use services::CollectionWatcher;

/// digiscan application context.
///
/// Owns the database handle, the collection manager and the scan worker.
/// Create it on the thread that will service volume enumeration (the host's
/// main thread).
pub struct DigiscanCore {
    db: Database,
    path_provider: SharedPathProvider,
    event_sink: SharedEventSink,
    settings: AppSettings,
    dispatcher: SharedDispatcher,
    manager: Arc<CollectionManager>,
    controller: Arc<ScanController>,
    watcher: Mutex<Option<CollectionWatcher>>,
}

impl DigiscanCore {
    pub fn new(
        path_provider: SharedPathProvider,
        event_sink: SharedEventSink,
        volumes: SharedVolumeProvider,
    ) -> AppResult<Self> {
        let settings = SettingsManager::new(path_provider.as_ref())?.load()?;
        let db = Database::open_with_settings(path_provider.database_path(), &settings.database)?;

        let dispatcher = Arc::new(MainThreadDispatcher::new(volumes));
        let manager = Arc::new(CollectionManager::new(
            db.clone(),
            dispatcher.clone(),
            event_sink.clone(),
        ));
        let controller = Arc::new(ScanController::new(
            db.clone(),
            manager.clone(),
            dispatcher.clone(),
            event_sink.clone(),
            &settings,
        )?);

        Ok(Self {
            db,
            path_provider,
            event_sink,
            settings,
            dispatcher,
            manager,
            controller,
            watcher: Mutex::new(None),
        })
    }

    /// Create or migrate the database on the scan worker and resolve the
    /// collection locations.
    pub fn initialize(&self, observer: &dyn InitObserver) -> InitializationAdvice {
        let advice = self.controller.database_initialization(observer);
        if advice.is_success() && self.settings.scan.realtime_watch {
            if let Err(e) = self.start_watching() {
                tracing::warn!("realtime watch unavailable: {}", e);
            }
        }
        advice
    }

    /// Watch every available location and queue partial scans on change
    pub fn start_watching(&self) -> AppResult<()> {
        let mut guard = self.watcher.lock();
        if guard.is_none() {
            let controller = Arc::downgrade(&self.controller);
            let debounce = Duration::from_millis(self.settings.scan.watch_debounce_ms);
            *guard = Some(CollectionWatcher::new(debounce, move |dir| {
                if let Some(controller) = controller.upgrade() {
                    controller.schedule_collection_scan(dir);
                }
            })?);
        }

        let roots: Vec<PathBuf> = self
            .manager
            .all_available_locations()
            .into_iter()
            .filter_map(|l| l.root_path)
            .collect();
        match guard.as_mut() {
            Some(watcher) => watcher.sync_paths(&roots),
            None => Ok(()),
        }
    }

    pub fn stop_watching(&self) {
        self.watcher.lock().take();
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn collections(&self) -> &Arc<CollectionManager> {
        &self.manager
    }

    pub fn scanner(&self) -> &Arc<ScanController> {
        &self.controller
    }

    /// Volume requests from the worker; pump this from the owning thread
    /// when it is not blocked in a scan call.
    pub fn dispatcher(&self) -> &SharedDispatcher {
        &self.dispatcher
    }

    pub fn paths(&self) -> &SharedPathProvider {
        &self.path_provider
    }

    pub fn events(&self) -> &SharedEventSink {
        &self.event_sink
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }
}

impl Drop for DigiscanCore {
    fn drop(&mut self) {
        self.stop_watching();
        self.controller.shutdown();
    }
}
