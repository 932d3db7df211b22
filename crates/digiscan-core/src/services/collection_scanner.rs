//! Collection reconciliation
//!
//! Brings the database in line with the directory trees of the collection
//! locations. Albums and items that vanished from disk are first collected
//! as candidates and only removed after the walk, once they are confirmed
//! to be gone; a directory renamed while the scan runs is therefore not
//! deleted by mistake.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::db::Database;
use crate::models::{system_time_to_naive, DatabaseItemStatus, ItemScanInfo, ScanSettings};
use crate::utils::album_path::{album_absolute_path, is_sub_album_path, relative_album_path};
use crate::utils::error::{AppError, AppResult};

use super::collection_manager::{CollectionLocation, CollectionManager};
use super::hints::{HintStore, ItemChangeType};
use super::image_scanner::{ImageScanner, ScanContext};

/// Marker in the name of files that are still being written.
pub const TEMP_FILE_MARKER: &str = ".digikamtempfile.";

/// Progress callbacks of a scan. All methods default to no-ops.
pub trait ScanObserver: Send + Sync {
    fn total_files_to_scan(&self, _count: usize) {}
    fn start_scanning_album(&self, _album_root: &Path, _album: &str) {}
    fn finished_scanning_album(&self, _album_root: &Path, _album: &str, _files: usize) {}
    fn scanned_files(&self, _count: usize) {}
    fn error(&self, _message: &str) {}

    /// Checked between albums; returning false stops the walk early
    fn continue_scan(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpScanObserver;

impl ScanObserver for NoOpScanObserver {}

/// What a scan changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub albums_added: usize,
    pub albums_removed: usize,
    pub items_added: usize,
    pub items_modified: usize,
    pub items_removed: usize,
    pub errors: Vec<String>,
}

impl ScanReport {
    pub fn merge(&mut self, other: ScanReport) {
        self.albums_added += other.albums_added;
        self.albums_removed += other.albums_removed;
        self.items_added += other.items_added;
        self.items_modified += other.items_modified;
        self.items_removed += other.items_removed;
        self.errors.extend(other.errors);
    }

    /// Nothing was added, modified or removed
    pub fn is_unchanged(&self) -> bool {
        self.albums_added == 0
            && self.albums_removed == 0
            && self.items_added == 0
            && self.items_modified == 0
            && self.items_removed == 0
    }
}

fn is_excluded_dir(name: &str, excluded: &[String]) -> bool {
    name.starts_with('.') || excluded.iter().any(|e| e == name)
}

fn is_collection_file(path: &Path, context: &ScanContext) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    !name.contains(TEMP_FILE_MARKER) && context.category_for(path).is_some()
}

fn count_collection_files(root: &Path, excluded: &[String], context: &ScanContext) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !is_excluded_dir(&e.file_name().to_string_lossy(), excluded)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_collection_file(e.path(), context))
        .count()
}

/// Reconciles the database with the file system.
pub struct CollectionScanner<'a> {
    db: &'a Database,
    manager: &'a CollectionManager,
    context: ScanContext,
    excluded_dirs: Vec<String>,
    observer: &'a dyn ScanObserver,
    hints: Option<Arc<HintStore>>,
    stale_albums: BTreeSet<i64>,
    stale_items: BTreeSet<i64>,
    report: ScanReport,
}

impl<'a> CollectionScanner<'a> {
    pub fn new(
        db: &'a Database,
        manager: &'a CollectionManager,
        context: ScanContext,
        settings: &ScanSettings,
        observer: &'a dyn ScanObserver,
    ) -> Self {
        Self {
            db,
            manager,
            context,
            excluded_dirs: settings.excluded_dirs.clone(),
            observer,
            hints: None,
            stale_albums: BTreeSet::new(),
            stale_items: BTreeSet::new(),
            report: ScanReport::default(),
        }
    }

    /// Use the hints announced by file operations
    pub fn record_hints(&mut self, hints: Arc<HintStore>) {
        self.hints = Some(hints);
    }

    pub fn report(&self) -> &ScanReport {
        &self.report
    }

    pub fn into_report(self) -> ScanReport {
        self.report
    }

    fn record_error(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.observer.error(&message);
        self.report.errors.push(message);
    }

    /// Collection files below `paths`, counted in parallel
    pub fn count_files_in(&self, paths: &[PathBuf]) -> usize {
        let excluded = &self.excluded_dirs;
        let context = &self.context;
        paths
            .par_iter()
            .map(|path| count_collection_files(path, excluded, context))
            .sum()
    }

    /// Scan every available location.
    pub fn complete_scan(&mut self) -> AppResult<()> {
        let locations = self.manager.all_available_locations();
        let roots: Vec<PathBuf> = locations.iter().filter_map(|l| l.root_path.clone()).collect();

        let total = self.count_files_in(&roots);
        tracing::info!("complete scan of {} locations, {} files", locations.len(), total);
        self.observer.total_files_to_scan(total);

        self.scan_for_stale_albums(&locations)?;

        for location in &locations {
            if !self.observer.continue_scan() {
                tracing::info!("complete scan stopped by observer");
                break;
            }
            if let Err(e) = self.scan_album_root(location) {
                self.record_error(format!("scanning location {} failed: {}", location.id, e));
            }
        }

        self.finish_stale()?;

        let purged = self.db.delete_stale_albums()?;
        if purged > 0 {
            tracing::debug!("purged {} detached albums", purged);
        }
        Ok(())
    }

    /// Scan the directory (or file) at `path` and everything below it.
    pub fn partial_scan(&mut self, path: &Path) -> AppResult<()> {
        let location = self.manager.location_for_path(path);
        let root = location
            .album_root_path()
            .ok_or_else(|| AppError::Location(format!("{} is not in a collection", path.display())))?
            .to_path_buf();
        if !location.is_available() {
            tracing::debug!(
                "skipping {}: location {} is {:?}",
                path.display(),
                location.id,
                location.status
            );
            return Ok(());
        }

        if path.is_file() {
            self.scan_file(path)?;
            return Ok(());
        }

        let album = relative_album_path(&root, path)
            .ok_or_else(|| AppError::InvalidPath(path.display().to_string()))?;
        self.partial_scan_in(&location, &album)
    }

    /// Scan one album of a location and its sub-albums.
    pub fn partial_scan_in(&mut self, location: &CollectionLocation, album: &str) -> AppResult<()> {
        let root = location
            .album_root_path()
            .ok_or_else(|| AppError::Location(format!("location {} is unavailable", location.id)))?
            .to_path_buf();

        let mut candidates = Vec::new();
        for info in self.db.get_albums_on_album_root(location.id)? {
            let inside = info.relative_path == album || is_sub_album_path(album, &info.relative_path);
            if inside && !album_absolute_path(&root, &info.relative_path).is_dir() {
                candidates.push(info.id);
            }
        }
        self.mark_database_albums_as_stale(&candidates);

        self.scan_album(location, album)?;
        self.finish_stale()
    }

    pub fn scan_album_root(&mut self, location: &CollectionLocation) -> AppResult<()> {
        self.scan_album(location, "/")
    }

    /// Walk one album directory recursively. A missing directory is not
    /// an error; its album becomes a removal candidate.
    pub fn scan_album(&mut self, location: &CollectionLocation, album: &str) -> AppResult<()> {
        let root = location
            .album_root_path()
            .ok_or_else(|| AppError::Location(format!("location {} is unavailable", location.id)))?
            .to_path_buf();
        let dir = album_absolute_path(&root, album);

        if !dir.is_dir() {
            if let Some(id) = self.db.album_for_path(location.id, album)? {
                self.stale_albums.insert(id);
            }
            return Ok(());
        }

        self.scan_directory(location.id, &root, &dir)
    }

    /// Collect albums of `locations` whose directory is gone.
    pub fn scan_for_stale_albums(&mut self, locations: &[CollectionLocation]) -> AppResult<()> {
        for location in locations {
            let Some(root) = location.album_root_path() else {
                continue;
            };
            let missing: Vec<i64> = self
                .db
                .get_albums_on_album_root(location.id)?
                .into_iter()
                .filter(|a| !album_absolute_path(root, &a.relative_path).is_dir())
                .map(|a| a.id)
                .collect();
            self.mark_database_albums_as_stale(&missing);
        }
        Ok(())
    }

    /// Queue albums as removal candidates
    pub fn mark_database_albums_as_stale(&mut self, ids: &[i64]) {
        self.stale_albums.extend(ids.iter().copied());
    }

    /// Delete the albums whose directory is confirmed missing now.
    /// Returns how many were removed.
    pub fn safely_remove_albums(&mut self, ids: &[i64]) -> AppResult<usize> {
        let mut confirmed = Vec::new();
        for id in ids {
            let Some(album) = self.db.get_album(*id)? else {
                continue;
            };
            let Some(root) = self
                .manager
                .location_for_album_root_id(album.album_root_id)
                .filter(|l| l.is_available())
                .and_then(|l| l.root_path)
            else {
                continue;
            };
            if !album_absolute_path(&root, &album.relative_path).is_dir() {
                confirmed.push(*id);
            }
        }

        let removed = self.db.delete_albums(&confirmed)?;
        if removed > 0 {
            tracing::info!("removed {} albums", removed);
        }
        self.report.albums_removed += removed;
        Ok(removed)
    }

    fn safely_remove_items(&mut self, ids: &[i64]) -> AppResult<usize> {
        let mut confirmed = Vec::new();
        for id in ids {
            match self.db.get_item_scan_info(*id)? {
                Some(info) if info.status == DatabaseItemStatus::Visible => {}
                _ => continue,
            }
            if let Some(path) = self.item_path(*id)? {
                if !path.exists() {
                    confirmed.push(*id);
                }
            }
        }

        let removed = self.db.remove_items(&confirmed)?;
        if removed > 0 {
            tracing::info!("removed {} items", removed);
        }
        self.report.items_removed += removed;
        Ok(removed)
    }

    /// Remove confirmed candidates: albums first, then items.
    fn finish_stale(&mut self) -> AppResult<()> {
        let albums: Vec<i64> = std::mem::take(&mut self.stale_albums).into_iter().collect();
        self.safely_remove_albums(&albums)?;

        let items: Vec<i64> = std::mem::take(&mut self.stale_items).into_iter().collect();
        self.safely_remove_items(&items)?;
        Ok(())
    }

    fn item_path(&self, id: i64) -> AppResult<Option<PathBuf>> {
        let Some((root_id, relative)) = self.db.get_item_url(id)? else {
            return Ok(None);
        };
        Ok(self
            .manager
            .location_for_album_root_id(root_id)
            .and_then(|l| l.root_path)
            .map(|root| album_absolute_path(&root, &relative)))
    }

    /// Files and sub-directories of `dir` that belong to the collection
    fn list_directory(&self, dir: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut files = Vec::new();
        let mut dirs = Vec::new();

        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok());

        for entry in entries {
            if entry.file_type().is_dir() {
                if !is_excluded_dir(&entry.file_name().to_string_lossy(), &self.excluded_dirs) {
                    dirs.push(entry.into_path());
                }
            } else if entry.file_type().is_file() && is_collection_file(entry.path(), &self.context) {
                files.push(entry.into_path());
            }
        }

        (files, dirs)
    }

    fn ensure_album(
        &mut self,
        root_id: i64,
        album: &str,
        dir: &Path,
        create: bool,
    ) -> AppResult<Option<i64>> {
        if let Some(id) = self.db.album_for_path(root_id, album)? {
            return Ok(Some(id));
        }
        if !create {
            return Ok(None);
        }

        let date = std::fs::metadata(dir)
            .and_then(|m| m.modified())
            .ok()
            .map(|t| system_time_to_naive(t).date());
        let id = self.db.add_album(root_id, album, None, date, None)?;
        self.report.albums_added += 1;
        tracing::debug!(album = %album, "added album {}", id);

        let hint = self
            .hints
            .as_ref()
            .and_then(|h| h.take_album_hint_for(root_id, album));
        if let Some(hint) = hint {
            if let Some(src) = self.db.album_for_path(hint.src_root, &hint.src_album)? {
                self.db.copy_album_properties(src, id)?;
            }
        }

        Ok(Some(id))
    }

    fn scan_directory(&mut self, root_id: i64, root: &Path, dir: &Path) -> AppResult<()> {
        let album = relative_album_path(root, dir).unwrap_or_else(|| "/".to_string());
        let (files, subdirs) = self.list_directory(dir);

        self.observer.start_scanning_album(root, &album);

        // The root album only exists when the root holds files itself
        let create = album != "/" || !files.is_empty();
        if let Some(album_id) = self.ensure_album(root_id, &album, dir, create)? {
            self.stale_albums.remove(&album_id);
            self.scan_files(root_id, &album, album_id, &files)?;
        }

        self.observer.finished_scanning_album(root, &album, files.len());
        self.observer.scanned_files(files.len());

        for subdir in subdirs {
            if !self.observer.continue_scan() {
                break;
            }
            if let Err(e) = self.scan_directory(root_id, root, &subdir) {
                self.record_error(format!("scanning {} failed: {}", subdir.display(), e));
            }
        }
        Ok(())
    }

    fn scan_files(
        &mut self,
        root_id: i64,
        album: &str,
        album_id: i64,
        files: &[PathBuf],
    ) -> AppResult<()> {
        let known: HashMap<String, ItemScanInfo> = self
            .db
            .get_item_scan_infos(album_id)?
            .into_iter()
            .map(|info| (info.item_name.clone(), info))
            .collect();
        let mut seen = HashSet::new();

        for file in files {
            let name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let result = match known.get(&name) {
                Some(info) => self.scan_existing(file, info),
                None => self.scan_new(root_id, album, album_id, file),
            };
            if let Err(e) = result {
                self.record_error(format!("{}: {}", file.display(), e));
            }
            seen.insert(name);
        }

        for (name, info) in &known {
            if !seen.contains(name) {
                self.stale_items.insert(info.id);
            }
        }
        Ok(())
    }

    fn scan_existing(&mut self, path: &Path, info: &ItemScanInfo) -> AppResult<i64> {
        let change = self
            .hints
            .as_ref()
            .and_then(|h| h.take_item_change_hint(info.id));

        let modified = match change {
            Some(_) => true,
            None => {
                let fs_meta = std::fs::metadata(path)?;
                let mtime = fs_meta.modified().ok().map(system_time_to_naive);
                fs_meta.len() as i64 != info.file_size || mtime != info.modification_date
            }
        };
        if !modified {
            return Ok(info.id);
        }

        let mut scanner = ImageScanner::for_item(self.db, &self.context, path, info.id)?;
        match change {
            Some(ItemChangeType::Rescan) => scanner.full_scan()?,
            _ => scanner.file_modified()?,
        }
        let id = scanner.commit()?;
        self.report.items_modified += 1;
        Ok(id)
    }

    fn scan_new(&mut self, root_id: i64, album: &str, album_id: i64, path: &Path) -> AppResult<i64> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::InvalidPath(path.display().to_string()))?;

        let hinted = self
            .hints
            .as_ref()
            .and_then(|h| h.take_item_hint_for(root_id, album, &name));

        if let Some(src_id) = hinted {
            if self.try_move(src_id, album_id, &name, path)? {
                self.report.items_modified += 1;
                return Ok(src_id);
            }
            let mut scanner = ImageScanner::new(self.db, &self.context, path);
            scanner.copied_from(album_id, src_id)?;
            let id = scanner.commit()?;
            self.report.items_added += 1;
            return Ok(id);
        }

        let mut scanner = ImageScanner::new(self.db, &self.context, path);
        scanner.new_file(album_id)?;
        let id = scanner.commit()?;
        self.report.items_added += 1;
        Ok(id)
    }

    /// A hinted source whose file is gone was moved: keep its row.
    fn try_move(&mut self, src_id: i64, album_id: i64, name: &str, path: &Path) -> AppResult<bool> {
        match self.db.get_item_scan_info(src_id)? {
            Some(info) if info.status == DatabaseItemStatus::Visible => {}
            _ => return Ok(false),
        }
        if self.item_path(src_id)?.map(|p| p.exists()).unwrap_or(true) {
            return Ok(false);
        }

        self.db.move_item(src_id, album_id, name)?;
        let mut scanner = ImageScanner::for_item(self.db, &self.context, path, src_id)?;
        scanner.file_modified()?;
        scanner.commit()?;
        tracing::debug!("item {} moved to {}", src_id, path.display());
        Ok(true)
    }

    /// Scan a single file. Returns its item id, or `None` when the file is
    /// gone or not part of the collection.
    pub fn scan_file(&mut self, path: &Path) -> AppResult<Option<i64>> {
        let location = self.manager.location_for_path(path);
        let Some(root) = location.album_root_path().map(Path::to_path_buf) else {
            return Err(AppError::Location(format!(
                "{} is not in a collection",
                path.display()
            )));
        };
        if !location.is_available() {
            return Ok(None);
        }
        let dir = path
            .parent()
            .ok_or_else(|| AppError::InvalidPath(path.display().to_string()))?;
        let album = relative_album_path(&root, dir)
            .ok_or_else(|| AppError::InvalidPath(path.display().to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !path.is_file() {
            if let Some(album_id) = self.db.album_for_path(location.id, &album)? {
                let gone: Vec<i64> = self
                    .db
                    .get_item_scan_infos(album_id)?
                    .into_iter()
                    .filter(|i| i.item_name == name)
                    .map(|i| i.id)
                    .collect();
                self.stale_items.extend(gone);
                self.finish_stale()?;
            }
            return Ok(None);
        }

        if !is_collection_file(path, &self.context) {
            return Ok(None);
        }

        let Some(album_id) = self.ensure_album(location.id, &album, dir, true)? else {
            return Ok(None);
        };
        let existing = self
            .db
            .get_item_scan_infos(album_id)?
            .into_iter()
            .find(|i| i.item_name == name);

        let id = match existing {
            Some(info) => self.scan_existing(path, &info)?,
            None => self.scan_new(location.id, &album, album_id, path)?,
        };
        Ok(Some(id))
    }
}
