//! Collection locations
//!
//! An album root is persisted as a volume identifier plus the path inside
//! that volume. The manager maps those identifiers to live mount points,
//! so a removable disk keeps its albums when it is mounted elsewhere.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::db::Database;
use crate::events::{EventSinkExt, LocationStatusChanged, SharedEventSink, LOCATION_STATUS_EVENT};
use crate::models::{AlbumRoot, AlbumRootType, CollectionLocationStatus};
use crate::utils::album_path::{album_absolute_path, relative_album_path};
use crate::utils::error::{AppError, AppResult};

use super::volumes::{
    directory_hash, volume_identifier, SharedDispatcher, SolidVolumeInfo, VolumeIdentifier,
};

/// An album root together with its resolved runtime state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionLocation {
    pub id: i64,
    pub label: Option<String>,
    pub status: CollectionLocationStatus,
    pub location_type: AlbumRootType,
    pub identifier: String,
    pub specific_path: String,
    /// Absolute path of the root, when its volume could be resolved
    pub root_path: Option<PathBuf>,
}

impl CollectionLocation {
    /// Location returned when nothing matches.
    pub fn null() -> Self {
        Self {
            id: 0,
            label: None,
            status: CollectionLocationStatus::Null,
            location_type: AlbumRootType::UndefinedType,
            identifier: String::new(),
            specific_path: String::new(),
            root_path: None,
        }
    }

    pub fn is_null(&self) -> bool {
        self.status == CollectionLocationStatus::Null
    }

    pub fn is_available(&self) -> bool {
        self.status == CollectionLocationStatus::Available
    }

    pub fn album_root_path(&self) -> Option<&Path> {
        self.root_path.as_deref()
    }
}

/// Result of checking a candidate path against the existing locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocationCheck {
    Ok,
    NotADirectory,
    /// The path already lies inside this location
    AlreadyContained(i64),
    /// The path would contain this existing location
    ContainsExisting(i64),
}

/// Resolves album roots to mount paths and tracks their availability.
pub struct CollectionManager {
    db: Database,
    dispatcher: SharedDispatcher,
    events: SharedEventSink,
    locations: RwLock<BTreeMap<i64, CollectionLocation>>,
    volume_cache: Mutex<Vec<SolidVolumeInfo>>,
}

impl CollectionManager {
    pub fn new(db: Database, dispatcher: SharedDispatcher, events: SharedEventSink) -> Self {
        Self {
            db,
            dispatcher,
            events,
            locations: RwLock::new(BTreeMap::new()),
            volume_cache: Mutex::new(Vec::new()),
        }
    }

    /// Current volume list. Falls back to the last known list when the
    /// owner thread did not answer.
    fn list_volumes(&self) -> Vec<SolidVolumeInfo> {
        match self.dispatcher.volumes() {
            Some(volumes) => {
                *self.volume_cache.lock() = volumes.clone();
                volumes
            }
            None => self.volume_cache.lock().clone(),
        }
    }

    fn resolve_root_path(root: &AlbumRoot, volumes: &[SolidVolumeInfo]) -> Option<PathBuf> {
        let identifier = match VolumeIdentifier::parse(&root.identifier) {
            Some(identifier) => identifier,
            None => {
                tracing::warn!(
                    "album root {} has an unrecognized identifier {}",
                    root.id,
                    root.identifier
                );
                return None;
            }
        };

        let mounted = volumes.iter().filter(|v| v.is_mounted);
        let mount_point = match identifier {
            VolumeIdentifier::Uuid(uuid) => mounted
                .into_iter()
                .find(|v| v.uuid.as_deref() == Some(uuid.as_str()))
                .map(|v| v.path.clone()),
            VolumeIdentifier::Label {
                label,
                directory_hash: hash,
            } => {
                let mut candidates = mounted.filter(|v| v.label.as_deref() == Some(label.as_str()));
                match hash {
                    Some(hash) => candidates
                        .find(|v| directory_hash(&v.path).as_deref() == Some(hash.as_str()))
                        .map(|v| v.path.clone()),
                    None => candidates.next().map(|v| v.path.clone()),
                }
            }
            VolumeIdentifier::Path(path) | VolumeIdentifier::NetworkShare(path) => {
                Some(PathBuf::from(path))
            }
        }?;

        Some(album_absolute_path(&mount_point, &root.specific_path))
    }

    fn location_from_root(root: &AlbumRoot, volumes: &[SolidVolumeInfo]) -> CollectionLocation {
        let root_path = Self::resolve_root_path(root, volumes);
        let status = if root.is_hidden() {
            CollectionLocationStatus::Hidden
        } else if root_path.as_deref().map(Path::is_dir).unwrap_or(false) {
            CollectionLocationStatus::Available
        } else {
            CollectionLocationStatus::Unavailable
        };

        CollectionLocation {
            id: root.id,
            label: root.label.clone(),
            status,
            location_type: root.root_type,
            identifier: root.identifier.clone(),
            specific_path: root.specific_path.clone(),
            root_path,
        }
    }

    /// Re-enumerate volumes, re-resolve every album root and report each
    /// location whose status flipped.
    pub fn update_locations(&self) -> AppResult<Vec<LocationStatusChanged>> {
        let roots = self.db.get_album_roots()?;
        let volumes = self.list_volumes();

        let fresh: BTreeMap<i64, CollectionLocation> = roots
            .iter()
            .map(|root| (root.id, Self::location_from_root(root, &volumes)))
            .collect();

        let mut changes = Vec::new();
        {
            let mut locations = self.locations.write();

            for (id, location) in &fresh {
                let old_status = locations
                    .get(id)
                    .map(|l| l.status)
                    .unwrap_or(CollectionLocationStatus::Null);
                if old_status != location.status {
                    changes.push(LocationStatusChanged {
                        id: *id,
                        old_status,
                        new_status: location.status,
                    });
                }
            }

            for (id, location) in locations.iter() {
                if !fresh.contains_key(id) {
                    changes.push(LocationStatusChanged {
                        id: *id,
                        old_status: location.status,
                        new_status: CollectionLocationStatus::Deleted,
                    });
                }
            }

            *locations = fresh;
        }

        for change in &changes {
            tracing::info!(
                location = change.id,
                "location status {:?} -> {:?}",
                change.old_status,
                change.new_status
            );
            self.events.emit_typed(LOCATION_STATUS_EVENT, change);
        }

        Ok(changes)
    }

    /// Alias of [`update_locations`](Self::update_locations)
    pub fn refresh(&self) -> AppResult<Vec<LocationStatusChanged>> {
        self.update_locations()
    }

    /// Check whether `path` can become a new location.
    pub fn check_location(&self, path: &Path) -> LocationCheck {
        if !path.is_dir() {
            return LocationCheck::NotADirectory;
        }

        let locations = self.locations.read();
        for location in locations.values() {
            let Some(root) = location.album_root_path() else {
                continue;
            };
            if path.starts_with(root) {
                return LocationCheck::AlreadyContained(location.id);
            }
            if root.starts_with(path) {
                return LocationCheck::ContainsExisting(location.id);
            }
        }
        LocationCheck::Ok
    }

    fn canonical_dir(path: &Path) -> AppResult<PathBuf> {
        let canonical = std::fs::canonicalize(path)
            .map_err(|_| AppError::InvalidPath(path.display().to_string()))?;
        if !canonical.is_dir() {
            return Err(AppError::InvalidPath(format!(
                "not a directory: {}",
                canonical.display()
            )));
        }
        Ok(canonical)
    }

    fn ensure_free(&self, path: &Path) -> AppResult<()> {
        match self.check_location(path) {
            LocationCheck::Ok => Ok(()),
            LocationCheck::NotADirectory => {
                Err(AppError::InvalidPath(path.display().to_string()))
            }
            LocationCheck::AlreadyContained(id) => Err(AppError::Location(format!(
                "{} is already inside location {}",
                path.display(),
                id
            ))),
            LocationCheck::ContainsExisting(id) => Err(AppError::Location(format!(
                "{} contains existing location {}",
                path.display(),
                id
            ))),
        }
    }

    /// Identifier, path inside the volume and type for a local directory
    fn identify(&self, path: &Path) -> (VolumeIdentifier, String, AlbumRootType) {
        let volumes = self.list_volumes();
        if volumes.is_empty() {
            tracing::warn!(
                "volume enumeration returned nothing, identifying {} by path only",
                path.display()
            );
            return path_only(path);
        }

        let volume = volumes
            .iter()
            .filter(|v| v.is_mounted && path.starts_with(&v.path))
            .max_by_key(|v| v.path.components().count());

        let Some(volume) = volume else {
            tracing::warn!("no mounted volume contains {}, identifying by path", path.display());
            return path_only(path);
        };

        let mut identifier = volume_identifier(volume);
        if let VolumeIdentifier::Label {
            label,
            directory_hash: hash @ None,
        } = &mut identifier
        {
            let duplicates = volumes
                .iter()
                .filter(|v| v.label.as_deref() == Some(label.as_str()))
                .count();
            if duplicates > 1 {
                tracing::info!(
                    "several volumes are labeled {}, adding a directory hash",
                    label
                );
                *hash = directory_hash(&volume.path);
            }
        }

        let specific_path =
            relative_album_path(&volume.path, path).unwrap_or_else(|| "/".to_string());
        let root_type = if volume.is_removable || volume.is_optical_disc {
            AlbumRootType::VolumeRemovable
        } else {
            AlbumRootType::VolumeHardWired
        };

        (identifier, specific_path, root_type)
    }

    fn default_label(path: &Path) -> Option<String> {
        path.file_name().map(|n| n.to_string_lossy().into_owned())
    }

    /// Register a local directory as a new location.
    pub fn add_location(&self, path: &Path, label: Option<&str>) -> AppResult<CollectionLocation> {
        let path = Self::canonical_dir(path)?;
        self.ensure_free(&path)?;

        let (identifier, specific_path, root_type) = self.identify(&path);
        let label = label.map(str::to_string).or_else(|| Self::default_label(&path));

        let id = self.db.add_album_root(
            root_type,
            &identifier.to_identifier_string(),
            &specific_path,
            label.as_deref(),
        )?;
        tracing::info!("added location {} at {}", id, path.display());

        self.update_locations()?;
        self.location_for_album_root_id(id)
            .ok_or_else(|| AppError::Location(format!("location {} vanished", id)))
    }

    /// Register a mounted network share as a new location.
    pub fn add_network_location(
        &self,
        path: &Path,
        label: Option<&str>,
    ) -> AppResult<CollectionLocation> {
        let path = Self::canonical_dir(path)?;
        self.ensure_free(&path)?;

        let identifier = VolumeIdentifier::NetworkShare(path.to_string_lossy().into_owned());
        let label = label.map(str::to_string).or_else(|| Self::default_label(&path));
        let id = self.db.add_album_root(
            AlbumRootType::Network,
            &identifier.to_identifier_string(),
            "/",
            label.as_deref(),
        )?;

        self.update_locations()?;
        self.location_for_album_root_id(id)
            .ok_or_else(|| AppError::Location(format!("location {} vanished", id)))
    }

    /// Remove a location with all its albums and items.
    pub fn remove_location(&self, id: i64) -> AppResult<()> {
        if !self.db.delete_album_root(id)? {
            return Err(AppError::Location(format!("no location with id {}", id)));
        }
        self.update_locations()?;
        Ok(())
    }

    pub fn set_label(&self, id: i64, label: Option<&str>) -> AppResult<()> {
        self.db.set_album_root_label(id, label)?;
        if let Some(location) = self.locations.write().get_mut(&id) {
            location.label = label.map(str::to_string);
        }
        Ok(())
    }

    pub fn change_type(&self, id: i64, root_type: AlbumRootType) -> AppResult<()> {
        self.db.change_album_root_type(id, root_type)?;
        if let Some(location) = self.locations.write().get_mut(&id) {
            location.location_type = root_type;
        }
        Ok(())
    }

    /// Hide or unhide a location
    pub fn set_hidden(&self, id: i64, hidden: bool) -> AppResult<()> {
        self.db.set_album_root_status(id, if hidden { 1 } else { 0 })?;
        self.update_locations()?;
        Ok(())
    }

    pub fn all_locations(&self) -> Vec<CollectionLocation> {
        self.locations.read().values().cloned().collect()
    }

    pub fn all_available_locations(&self) -> Vec<CollectionLocation> {
        self.locations
            .read()
            .values()
            .filter(|l| l.is_available())
            .cloned()
            .collect()
    }

    pub fn location_for_album_root_id(&self, id: i64) -> Option<CollectionLocation> {
        self.locations.read().get(&id).cloned()
    }

    /// Location whose resolved root is the longest prefix of `path`.
    ///
    /// Hidden locations match as long as their volume is mounted; callers
    /// that scan must check [`CollectionLocation::is_available`] themselves.
    pub fn location_for_path(&self, path: &Path) -> CollectionLocation {
        self.locations
            .read()
            .values()
            .filter_map(|l| {
                let root = l.album_root_path()?;
                path.starts_with(root)
                    .then(|| (root.components().count(), l))
            })
            .max_by_key(|(depth, _)| *depth)
            .map(|(_, l)| l.clone())
            .unwrap_or_else(CollectionLocation::null)
    }

    /// Root path of the location containing `path`
    pub fn album_root_path(&self, path: &Path) -> Option<PathBuf> {
        self.location_for_path(path).root_path
    }

    pub fn is_album_root(&self, path: &Path) -> bool {
        self.locations
            .read()
            .values()
            .any(|l| l.album_root_path() == Some(path))
    }

    /// Album path of `path` inside its location, e.g. `/2020/summer`
    pub fn album_path(&self, path: &Path) -> Option<String> {
        let root = self.album_root_path(path)?;
        relative_album_path(&root, path)
    }

    /// Root path of any available location
    pub fn one_album_root_path(&self) -> Option<PathBuf> {
        self.all_available_locations()
            .into_iter()
            .find_map(|l| l.root_path)
    }
}

fn path_only(path: &Path) -> (VolumeIdentifier, String, AlbumRootType) {
    (
        VolumeIdentifier::Path(path.to_string_lossy().into_owned()),
        "/".to_string(),
        AlbumRootType::VolumeHardWired,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventSink;
    use crate::services::volumes::{MainThreadDispatcher, StaticVolumeProvider};
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        manager: CollectionManager,
        provider: Arc<StaticVolumeProvider>,
        sink: Arc<RecordingEventSink>,
        _dir: TempDir,
        mount: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let mount = fs::canonicalize(dir.path()).unwrap();
        let provider = Arc::new(StaticVolumeProvider::new(vec![SolidVolumeInfo {
            path: mount.clone(),
            uuid: Some("UUID-1".to_string()),
            label: Some("DISK".to_string()),
            is_removable: true,
            is_optical_disc: false,
            is_mounted: true,
        }]));
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let sink = Arc::new(RecordingEventSink::new());
        let manager = CollectionManager::new(
            db,
            Arc::new(MainThreadDispatcher::new(provider.clone())),
            sink.clone(),
        );
        Fixture {
            manager,
            provider,
            sink,
            _dir: dir,
            mount,
        }
    }

    #[test]
    fn test_add_location_uses_uuid_and_specific_path() {
        let f = fixture();
        let photos = f.mount.join("photos");
        fs::create_dir(&photos).unwrap();

        let location = f.manager.add_location(&photos, None).unwrap();
        assert_eq!(location.identifier, "volumeid:?uuid=UUID-1");
        assert_eq!(location.specific_path, "/photos");
        assert_eq!(location.location_type, AlbumRootType::VolumeRemovable);
        assert_eq!(location.label.as_deref(), Some("photos"));
        assert!(location.is_available());
        assert_eq!(location.root_path.as_deref(), Some(photos.as_path()));
        assert_eq!(f.sink.payloads(LOCATION_STATUS_EVENT).len(), 1);
    }

    #[test]
    fn test_unplug_and_remount_elsewhere() {
        let f = fixture();
        let photos = f.mount.join("photos");
        fs::create_dir(&photos).unwrap();
        let location = f.manager.add_location(&photos, Some("Photos")).unwrap();

        f.provider.set_volumes(vec![]);
        let changes = f.manager.update_locations().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].new_status, CollectionLocationStatus::Unavailable);
        assert!(f.manager.all_available_locations().is_empty());
        assert!(f.manager.location_for_path(&photos).is_null());

        // Same disk comes back at a different mount point
        let other = TempDir::new().unwrap();
        let other_mount = fs::canonicalize(other.path()).unwrap();
        fs::create_dir(other_mount.join("photos")).unwrap();
        f.provider.set_volumes(vec![SolidVolumeInfo {
            path: other_mount.clone(),
            uuid: Some("UUID-1".to_string()),
            is_mounted: true,
            ..Default::default()
        }]);
        let changes = f.manager.update_locations().unwrap();
        assert_eq!(changes[0].new_status, CollectionLocationStatus::Available);

        let relocated = f.manager.location_for_album_root_id(location.id).unwrap();
        assert_eq!(relocated.root_path, Some(other_mount.join("photos")));

        // Unchanged state reports nothing
        assert!(f.manager.update_locations().unwrap().is_empty());
    }

    #[test]
    fn test_location_for_path_longest_prefix() {
        let f = fixture();
        let a = f.mount.join("a");
        let b = f.mount.join("b");
        fs::create_dir_all(a.join("2020")).unwrap();
        fs::create_dir(&b).unwrap();
        let la = f.manager.add_location(&a, None).unwrap();
        f.manager.add_location(&b, None).unwrap();

        let found = f.manager.location_for_path(&a.join("2020").join("x.jpg"));
        assert_eq!(found.id, la.id);
        assert_eq!(f.manager.album_path(&a.join("2020")).as_deref(), Some("/2020"));
        assert!(f.manager.is_album_root(&a));
        assert!(f.manager.location_for_path(Path::new("/nowhere")).is_null());
    }

    #[test]
    fn test_check_location_rejects_nesting() {
        let f = fixture();
        let a = f.mount.join("a");
        fs::create_dir_all(a.join("inner")).unwrap();
        let la = f.manager.add_location(&a, None).unwrap();

        assert_eq!(
            f.manager.check_location(&a.join("inner")),
            LocationCheck::AlreadyContained(la.id)
        );
        assert_eq!(f.manager.check_location(&f.mount), LocationCheck::ContainsExisting(la.id));
        assert!(matches!(
            f.manager.add_location(&a.join("inner"), None),
            Err(AppError::Location(_))
        ));
    }

    #[test]
    fn test_empty_volume_list_falls_back_to_path() {
        let f = fixture();
        f.provider.set_volumes(vec![]);
        let dir = f.mount.join("plain");
        fs::create_dir(&dir).unwrap();

        let location = f.manager.add_location(&dir, None).unwrap();
        assert!(location.identifier.starts_with("volumeid:?path="));
        assert_eq!(location.specific_path, "/");
        assert!(location.is_available());
    }

    #[test]
    fn test_remove_and_hide_location() {
        let f = fixture();
        let dir = f.mount.join("photos");
        fs::create_dir(&dir).unwrap();
        let location = f.manager.add_location(&dir, None).unwrap();

        f.manager.set_hidden(location.id, true).unwrap();
        assert_eq!(
            f.manager.location_for_album_root_id(location.id).unwrap().status,
            CollectionLocationStatus::Hidden
        );

        // Still resolvable by path while hidden
        let found = f.manager.location_for_path(&dir.join("a.jpg"));
        assert_eq!(found.id, location.id);
        assert!(!found.is_available());

        f.manager.remove_location(location.id).unwrap();
        assert!(f.manager.all_locations().is_empty());
        assert!(f.manager.remove_location(location.id).is_err());
    }
}
