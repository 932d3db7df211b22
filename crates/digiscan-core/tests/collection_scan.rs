//! End-to-end scans over real directory trees.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use digiscan_core::db::Database;
use digiscan_core::events::NoOpEventSink;
use digiscan_core::models::{
    system_time_to_naive, DatabaseItemStatus, MetadataSettings, ScanSettings,
};
use digiscan_core::services::{
    CollectionManager, CollectionScanner, MainThreadDispatcher, NoOpScanObserver, ScanContext,
    ScanReport, SolidVolumeInfo, StaticVolumeProvider,
};
use tempfile::TempDir;

struct Harness {
    _tmp: TempDir,
    root: PathBuf,
    db: Database,
    manager: CollectionManager,
}

impl Harness {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let mount = fs::canonicalize(tmp.path()).unwrap();
        let provider = Arc::new(StaticVolumeProvider::new(vec![SolidVolumeInfo {
            path: mount.clone(),
            uuid: Some("0000-TEST".to_string()),
            is_mounted: true,
            ..Default::default()
        }]));

        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let manager = CollectionManager::new(
            db.clone(),
            Arc::new(MainThreadDispatcher::new(provider)),
            Arc::new(NoOpEventSink),
        );

        let root = mount.join("photos");
        fs::create_dir_all(&root).unwrap();
        manager.add_location(&root, None).unwrap();

        Self {
            _tmp: tmp,
            root,
            db,
            manager,
        }
    }

    fn write(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn scan(&self) -> ScanReport {
        let context = ScanContext::from_database(&self.db, MetadataSettings::default()).unwrap();
        let mut scanner = CollectionScanner::new(
            &self.db,
            &self.manager,
            context,
            &ScanSettings::default(),
            &NoOpScanObserver,
        );
        scanner.complete_scan().unwrap();
        scanner.into_report()
    }

    fn count(&self, sql: &str) -> i64 {
        self.db
            .connection()
            .unwrap()
            .query_row(sql, [], |row| row.get(0))
            .unwrap()
    }

    fn item_id(&self, album: &str, name: &str) -> Option<i64> {
        let root_id = self.manager.location_for_path(&self.root).id;
        let album_id = self.db.album_for_path(root_id, album).unwrap()?;
        self.db
            .get_item_scan_infos(album_id)
            .unwrap()
            .into_iter()
            .find(|info| info.item_name == name)
            .map(|info| info.id)
    }
}

fn modified(path: &Path) -> chrono::NaiveDateTime {
    system_time_to_naive(fs::metadata(path).unwrap().modified().unwrap())
}

#[test]
fn test_rescan_of_unchanged_tree_is_idempotent() {
    let h = Harness::new();
    h.write("2020/a.jpg", b"first image");
    h.write("2020/summer/b.png", b"second image");
    h.write("2021/c.jpg", b"third image");

    let first = h.scan();
    assert_eq!(first.items_added, 3);
    let albums = h.count("SELECT COUNT(*) FROM Albums");
    let images = h.count("SELECT COUNT(*) FROM Images");

    let second = h.scan();
    assert!(second.is_unchanged(), "second pass changed rows: {:?}", second);
    assert_eq!(h.count("SELECT COUNT(*) FROM Albums"), albums);
    assert_eq!(h.count("SELECT COUNT(*) FROM Images"), images);
}

#[test]
fn test_stale_albums_and_items_are_reconciled() {
    let h = Harness::new();
    let a = h.write("2020/a.jpg", b"aaaa");
    let b = h.write("2020/b.jpg", b"bbbbbbbb");

    h.scan();
    assert_eq!(h.count("SELECT COUNT(*) FROM Albums"), 1);
    let root_id = h.manager.location_for_path(&h.root).id;
    let album_id = h.db.album_for_path(root_id, "/2020").unwrap().unwrap();

    let infos = h.db.get_item_scan_infos(album_id).unwrap();
    assert_eq!(infos.len(), 2);
    for (info, path, size) in [(&infos[0], &a, 4), (&infos[1], &b, 8)] {
        assert_eq!(info.status, DatabaseItemStatus::Visible);
        assert_eq!(info.file_size, size);
        assert_eq!(info.modification_date, Some(modified(path)));
    }

    fs::remove_file(&b).unwrap();
    let report = h.scan();
    assert_eq!(report.items_removed, 1);
    assert_eq!(h.count("SELECT COUNT(*) FROM Images"), 1);
    assert!(h.item_id("/2020", "a.jpg").is_some());
    assert!(h.db.album_for_path(root_id, "/2020").unwrap().is_some());

    fs::remove_dir_all(h.root.join("2020")).unwrap();
    let report = h.scan();
    assert_eq!(report.albums_removed, 1);
    assert_eq!(h.count("SELECT COUNT(*) FROM Albums"), 0);
    assert_eq!(h.count("SELECT COUNT(*) FROM Images"), 0);
}

#[test]
fn test_rename_without_hint_keeps_user_data() {
    let h = Harness::new();
    h.write("trip/old.jpg", b"identical bytes of a photo");
    h.scan();

    let old_id = h.item_id("/trip", "old.jpg").unwrap();
    h.db.set_item_rating(old_id, 5).unwrap();
    let tags = h
        .db
        .get_tags_from_tag_paths(&["Places/Lisbon".to_string()], true)
        .unwrap();
    h.db.add_tags_to_items(&[old_id], &tags).unwrap();

    fs::rename(h.root.join("trip/old.jpg"), h.root.join("trip/new.jpg")).unwrap();
    let report = h.scan();
    assert_eq!(report.items_removed, 1);

    assert!(h.item_id("/trip", "old.jpg").is_none());
    let new_id = h.item_id("/trip", "new.jpg").unwrap();
    assert_eq!(h.db.get_item_rating(new_id).unwrap(), 5);
    assert_eq!(h.db.get_item_tag_ids(new_id).unwrap(), tags);
}

#[test]
fn test_tag_path_resolution_is_deterministic() {
    let db = Database::open_in_memory().unwrap();
    db.init().unwrap();

    let paths = vec!["People/John".to_string(), "People/Jane".to_string()];
    let ids = db.get_tags_from_tag_paths(&paths, true).unwrap();
    assert_eq!(ids.len(), 2);

    let named = |name: &str| {
        db.get_tags()
            .unwrap()
            .into_iter()
            .filter(|t| t.name == name)
            .collect::<Vec<_>>()
    };
    let people = named("People");
    assert_eq!(people.len(), 1);
    assert_eq!(named("John")[0].pid, people[0].id);
    assert_eq!(named("Jane")[0].pid, people[0].id);

    let again = db
        .get_tags_from_tag_paths(&["People/John".to_string()], true)
        .unwrap();
    assert_eq!(again, vec![ids[0]]);
    assert_eq!(named("People").len(), 1);
    assert_eq!(named("John").len(), 1);
}
