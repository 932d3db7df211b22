//! Collection watcher
//!
//! Watches album root directories with notify and turns file system events
//! into partial scan requests for the affected directories. Events are
//! coalesced per directory until it has been quiet for the debounce delay.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use notify::event::AccessKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::utils::error::{AppError, AppResult};

use super::collection_scanner::TEMP_FILE_MARKER;

/// Directories waiting for their debounce delay to pass.
#[derive(Debug, Default)]
pub struct DebounceQueue {
    pending: HashMap<PathBuf, Instant>,
    delay: Duration,
}

impl DebounceQueue {
    pub fn new(delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            delay,
        }
    }

    /// Record activity in `dir`, restarting its delay
    pub fn push(&mut self, dir: PathBuf, now: Instant) {
        self.pending.insert(dir, now);
    }

    /// Remove and return the directories quiet for at least the delay
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let delay = self.delay;
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) >= delay)
            .map(|(dir, _)| dir.clone())
            .collect();
        for dir in &due {
            self.pending.remove(dir);
        }
        due.sort();
        due
    }

    /// Time until the next directory becomes due
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.pending
            .values()
            .map(|at| (*at + self.delay).saturating_duration_since(now))
            .min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Directories that need a rescan for a notify event.
///
/// The parent directory of every touched path is returned; a partial scan
/// of the parent covers created, renamed and deleted entries alike.
pub fn directories_for_event(event: &Event) -> Vec<PathBuf> {
    let relevant = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(_)
            | EventKind::Access(AccessKind::Close(_))
    );
    if !relevant {
        return Vec::new();
    }

    let mut dirs: Vec<PathBuf> = event
        .paths
        .iter()
        .filter(|path| !is_ignored_path(path))
        .filter_map(|path| path.parent().map(Path::to_path_buf))
        .collect();
    dirs.sort();
    dirs.dedup();
    dirs
}

fn is_ignored_path(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return true;
    };
    name.contains(TEMP_FILE_MARKER) || name.starts_with(".digikam") || name.ends_with("-journal")
}

enum WatchMessage {
    Changed(Vec<PathBuf>),
    Stop,
}

/// Recursive watcher over album roots.
pub struct CollectionWatcher {
    watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
    tx: Sender<WatchMessage>,
    handle: Option<JoinHandle<()>>,
}

impl CollectionWatcher {
    /// Start the watcher. `on_change` is called from the debounce thread
    /// with each directory that needs a rescan.
    pub fn new<F>(debounce: Duration, on_change: F) -> AppResult<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();

        let event_tx = tx.clone();
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let dirs = directories_for_event(&event);
                if !dirs.is_empty() {
                    let _ = event_tx.send(WatchMessage::Changed(dirs));
                }
            }
            Err(e) => tracing::warn!("watch error: {}", e),
        })
        .map_err(|e| AppError::General(format!("cannot create watcher: {}", e)))?;

        let handle = std::thread::Builder::new()
            .name("digiscan-watch".to_string())
            .spawn(move || Self::debounce_loop(rx, debounce, on_change))?;

        Ok(Self {
            watcher,
            watched: Vec::new(),
            tx,
            handle: Some(handle),
        })
    }

    fn debounce_loop<F>(rx: Receiver<WatchMessage>, debounce: Duration, on_change: F)
    where
        F: Fn(PathBuf),
    {
        let mut queue = DebounceQueue::new(debounce);
        loop {
            let timeout = queue
                .next_timeout(Instant::now())
                .unwrap_or(Duration::from_secs(3600));

            match rx.recv_timeout(timeout) {
                Ok(WatchMessage::Changed(dirs)) => {
                    let now = Instant::now();
                    for dir in dirs {
                        queue.push(dir, now);
                    }
                }
                Ok(WatchMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            for dir in queue.take_due(Instant::now()) {
                tracing::debug!("change detected in {}", dir.display());
                on_change(dir);
            }
        }
    }

    /// Watch `path` recursively
    pub fn watch(&mut self, path: &Path) -> AppResult<()> {
        if !path.is_dir() {
            return Err(AppError::InvalidPath(format!(
                "watch path does not exist: {}",
                path.display()
            )));
        }
        if self.watched.iter().any(|p| p == path) {
            return Ok(());
        }

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| AppError::General(e.to_string()))?;
        self.watched.push(path.to_path_buf());

        tracing::info!("watching {}", path.display());
        Ok(())
    }

    pub fn unwatch(&mut self, path: &Path) -> AppResult<()> {
        let Some(idx) = self.watched.iter().position(|p| p == path) else {
            return Ok(());
        };
        self.watched.remove(idx);
        self.watcher
            .unwatch(path)
            .map_err(|e| AppError::General(e.to_string()))?;

        tracing::info!("stopped watching {}", path.display());
        Ok(())
    }

    /// Make the watched set equal to `paths`
    pub fn sync_paths(&mut self, paths: &[PathBuf]) -> AppResult<()> {
        let stale: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|p| !paths.contains(p))
            .cloned()
            .collect();
        for path in stale {
            self.unwatch(&path)?;
        }
        for path in paths {
            if let Err(e) = self.watch(path) {
                tracing::warn!("cannot watch {}: {}", path.display(), e);
            }
        }
        Ok(())
    }

    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched
    }
}

impl Drop for CollectionWatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(WatchMessage::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
    use tempfile::TempDir;

    #[test]
    fn test_debounce_restarts_on_activity() {
        let mut queue = DebounceQueue::new(Duration::from_secs(2));
        let t0 = Instant::now();
        queue.push(PathBuf::from("/p/a"), t0);
        queue.push(PathBuf::from("/p/b"), t0 + Duration::from_secs(1));

        assert!(queue.take_due(t0 + Duration::from_millis(1500)).is_empty());
        assert_eq!(
            queue.take_due(t0 + Duration::from_secs(2)),
            vec![PathBuf::from("/p/a")]
        );

        queue.push(PathBuf::from("/p/b"), t0 + Duration::from_secs(2));
        assert!(queue.take_due(t0 + Duration::from_secs(3)).is_empty());
        assert_eq!(
            queue.next_timeout(t0 + Duration::from_secs(3)),
            Some(Duration::from_secs(1))
        );
        assert_eq!(queue.take_due(t0 + Duration::from_secs(4)).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_directories_for_rename() {
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/p/a/x.jpg"))
            .add_path(PathBuf::from("/p/b/x.jpg"));
        assert_eq!(
            directories_for_event(&event),
            vec![PathBuf::from("/p/a"), PathBuf::from("/p/b")]
        );
    }

    #[test]
    fn test_temp_files_ignored() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/p/a/x.jpg.digikamtempfile.tmp"));
        assert!(directories_for_event(&event).is_empty());

        let event = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/p/a/x.jpg"));
        assert_eq!(directories_for_event(&event), vec![PathBuf::from("/p/a")]);

        let event = Event::new(EventKind::Access(AccessKind::Read))
            .add_path(PathBuf::from("/p/a/x.jpg"));
        assert!(directories_for_event(&event).is_empty());
    }

    #[test]
    fn test_watch_rejects_missing_path() {
        let mut watcher = CollectionWatcher::new(Duration::from_millis(10), |_| {}).unwrap();
        assert!(watcher.watch(Path::new("/nonexistent/digiscan")).is_err());

        let dir = TempDir::new().unwrap();
        watcher.watch(dir.path()).unwrap();
        watcher.watch(dir.path()).unwrap();
        assert_eq!(watcher.watched_paths().len(), 1);

        watcher.sync_paths(&[]).unwrap();
        assert!(watcher.watched_paths().is_empty());
    }
}
