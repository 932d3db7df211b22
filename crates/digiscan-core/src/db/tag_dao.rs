//! Tag data access layer

use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Tag, TagShortInfo};
use crate::utils::error::{AppError, AppResult};
use crate::watch::{ChangeKind, ImageChangeField};

use super::connection::Database;

fn row_to_tag(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        pid: row.get("pid")?,
        name: row.get("name")?,
        icon: row.get("icon")?,
        icon_kde: row.get("iconkde")?,
    })
}

fn find_tag(conn: &Connection, pid: i64, name: &str) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM Tags WHERE pid = ?1 AND name = ?2",
        params![pid, name],
        |row| row.get(0),
    )
    .optional()
}

impl Database {
    /// Create a tag below `pid` (0 = top level), returns its id
    pub fn add_tag(&self, pid: i64, name: &str, icon: Option<i64>) -> AppResult<i64> {
        if name.is_empty() || name.contains('/') {
            return Err(AppError::General(format!("invalid tag name: {:?}", name)));
        }

        let id = {
            let conn = self.connection()?;
            conn.execute(
                "INSERT INTO Tags (pid, name, icon) VALUES (?1, ?2, ?3)",
                params![pid, name, icon],
            )?;
            conn.last_insert_rowid()
        };

        self.watch().tag_changed(id, ChangeKind::Added);
        Ok(id)
    }

    pub fn get_tag_id(&self, pid: i64, name: &str) -> AppResult<Option<i64>> {
        let conn = self.connection()?;
        Ok(find_tag(&conn, pid, name)?)
    }

    pub fn get_tag(&self, id: i64) -> AppResult<Option<Tag>> {
        let conn = self.connection()?;
        let result = conn.query_row("SELECT * FROM Tags WHERE id = ?1", params![id], row_to_tag);

        match result {
            Ok(tag) => Ok(Some(tag)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    pub fn get_tags(&self) -> AppResult<Vec<Tag>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT * FROM Tags ORDER BY pid, name")?;
        let tags = stmt
            .query_map([], row_to_tag)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    pub fn get_tag_short_infos(&self) -> AppResult<Vec<TagShortInfo>> {
        Ok(self
            .get_tags()?
            .into_iter()
            .map(|t| TagShortInfo {
                id: t.id,
                pid: t.pid,
                name: t.name,
            })
            .collect())
    }

    /// Delete a tag and its whole subtree
    pub fn delete_tag(&self, id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute("DELETE FROM Tags WHERE id = ?1", params![id])?;
        }
        self.watch().tag_changed(id, ChangeKind::Deleted);
        Ok(())
    }

    /// Reparent a tag; TagsTree follows through the move trigger
    pub fn move_tag(&self, id: i64, new_pid: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE Tags SET pid = ?1 WHERE id = ?2",
                params![new_pid, id],
            )?;
        }
        self.watch().tag_changed(id, ChangeKind::Renamed);
        Ok(())
    }

    /// Slash separated path of a tag, e.g. `People/John`
    pub fn get_tag_path(&self, id: i64) -> AppResult<Option<String>> {
        let conn = self.connection()?;
        let mut segments = Vec::new();
        let mut current = id;

        while current != 0 {
            let row: Option<(i64, String)> = conn
                .query_row(
                    "SELECT pid, name FROM Tags WHERE id = ?1",
                    params![current],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match row {
                Some((pid, name)) => {
                    segments.push(name);
                    current = pid;
                }
                None if segments.is_empty() => return Ok(None),
                None => break,
            }

            if segments.len() > 256 {
                return Err(AppError::General(format!("tag {} has a cyclic parent chain", id)));
            }
        }

        segments.reverse();
        Ok(Some(segments.join("/")))
    }

    /// Resolve keyword paths to tag ids.
    ///
    /// Each path is walked top-down. With `create`, missing segments are
    /// created once; repeated paths in one call reuse them. Without it,
    /// unresolvable paths are skipped. Returned ids are unique, in input
    /// order.
    pub fn get_tags_from_tag_paths(&self, paths: &[String], create: bool) -> AppResult<Vec<i64>> {
        let mut created = Vec::new();

        let ids = self.transaction(|conn| {
            let mut cache: HashMap<(i64, String), i64> = HashMap::new();
            let mut ids: Vec<i64> = Vec::new();

            'paths: for path in paths {
                let segments: Vec<&str> = path
                    .split('/')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect();
                if segments.is_empty() {
                    continue;
                }

                let mut pid = 0;
                for segment in segments {
                    let key = (pid, segment.to_string());
                    let id = match cache.get(&key) {
                        Some(id) => *id,
                        None => {
                            let id = match find_tag(conn, pid, segment)? {
                                Some(id) => id,
                                None if create => {
                                    conn.execute(
                                        "INSERT INTO Tags (pid, name) VALUES (?1, ?2)",
                                        params![pid, segment],
                                    )?;
                                    let id = conn.last_insert_rowid();
                                    created.push(id);
                                    id
                                }
                                None => continue 'paths,
                            };
                            cache.insert(key, id);
                            id
                        }
                    };
                    pid = id;
                }

                if !ids.contains(&pid) {
                    ids.push(pid);
                }
            }

            Ok(ids)
        })?;

        for id in created {
            self.watch().tag_changed(id, ChangeKind::Added);
        }
        Ok(ids)
    }

    pub fn add_item_tag(&self, item_id: i64, tag_id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "INSERT OR IGNORE INTO ImageTags (imageid, tagid) VALUES (?1, ?2)",
                params![item_id, tag_id],
            )?;
        }
        self.watch().image_changed(vec![item_id], ImageChangeField::ImageTags);
        Ok(())
    }

    pub fn add_tags_to_items(&self, item_ids: &[i64], tag_ids: &[i64]) -> AppResult<()> {
        if item_ids.is_empty() || tag_ids.is_empty() {
            return Ok(());
        }
        self.transaction(|conn| {
            let mut stmt =
                conn.prepare("INSERT OR IGNORE INTO ImageTags (imageid, tagid) VALUES (?1, ?2)")?;
            for item in item_ids {
                for tag in tag_ids {
                    stmt.execute(params![item, tag])?;
                }
            }
            Ok(())
        })?;
        self.watch().image_changed(item_ids.to_vec(), ImageChangeField::ImageTags);
        Ok(())
    }

    pub fn remove_item_tag(&self, item_id: i64, tag_id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "DELETE FROM ImageTags WHERE imageid = ?1 AND tagid = ?2",
                params![item_id, tag_id],
            )?;
        }
        self.watch().image_changed(vec![item_id], ImageChangeField::ImageTags);
        Ok(())
    }

    pub fn get_item_tag_ids(&self, item_id: i64) -> AppResult<Vec<i64>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT tagid FROM ImageTags WHERE imageid = ?1 ORDER BY tagid")?;
        let ids = stmt
            .query_map(params![item_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlbumRootType, DatabaseItemCategory, DatabaseItemStatus};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn tags_tree_rows(db: &Database) -> i64 {
        let conn = db.connection().unwrap();
        conn.query_row("SELECT COUNT(*) FROM TagsTree", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_tag_paths_create_each_segment_once() {
        let db = setup();
        let paths = vec!["People/John".to_string(), "People/Jane".to_string()];
        let ids = db.get_tags_from_tag_paths(&paths, true).unwrap();
        assert_eq!(ids.len(), 2);

        let tags = db.get_tags().unwrap();
        assert_eq!(tags.iter().filter(|t| t.name == "People").count(), 1);
        assert_eq!(tags.len(), 3);

        let again = db
            .get_tags_from_tag_paths(&["People/John".to_string()], true)
            .unwrap();
        assert_eq!(again, vec![ids[0]]);
        assert_eq!(db.get_tags().unwrap().len(), 3);
    }

    #[test]
    fn test_tag_paths_repeated_in_one_call() {
        let db = setup();
        let paths = vec![
            "Places/Berlin".to_string(),
            "/Places/Berlin/".to_string(),
            "Places".to_string(),
        ];
        let ids = db.get_tags_from_tag_paths(&paths, true).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(db.get_tags().unwrap().len(), 2);
    }

    #[test]
    fn test_tag_paths_without_create() {
        let db = setup();
        let people = db.add_tag(0, "People", None).unwrap();
        let ids = db
            .get_tags_from_tag_paths(&["People".to_string(), "People/Nobody".to_string()], false)
            .unwrap();
        assert_eq!(ids, vec![people]);
        assert_eq!(db.get_tags().unwrap().len(), 1);
    }

    #[test]
    fn test_tag_path_and_tree() {
        let db = setup();
        let ids = db
            .get_tags_from_tag_paths(&["A/B/C".to_string()], true)
            .unwrap();
        assert_eq!(db.get_tag_path(ids[0]).unwrap().as_deref(), Some("A/B/C"));
        // C→B, C→A, B→A, plus the three top-level rows to 0
        assert_eq!(tags_tree_rows(&db), 6);
    }

    #[test]
    fn test_delete_tag_removes_subtree() {
        let db = setup();
        let ids = db
            .get_tags_from_tag_paths(&["A/B/C".to_string(), "X".to_string()], true)
            .unwrap();
        let a = db.get_tag_id(0, "A").unwrap().unwrap();

        db.delete_tag(a).unwrap();

        let tags = db.get_tags().unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, ids[1]);
        assert_eq!(tags_tree_rows(&db), 1);
    }

    #[test]
    fn test_items_in_tag_recursive() {
        let db = setup();
        let root = db
            .add_album_root(AlbumRootType::VolumeHardWired, "volumeid:?path=/p", "/", None)
            .unwrap();
        let album = db.add_album(root, "/", None, None, None).unwrap();
        let item = db
            .add_item(
                album,
                "a.jpg",
                DatabaseItemStatus::Visible,
                DatabaseItemCategory::Image,
                None,
                1,
                "h",
            )
            .unwrap();

        let john = db
            .get_tags_from_tag_paths(&["People/John".to_string()], true)
            .unwrap()[0];
        let people = db.get_tag_id(0, "People").unwrap().unwrap();
        db.add_tags_to_items(&[item], &[john]).unwrap();

        assert_eq!(db.get_item_ids_in_tag(people, false).unwrap(), Vec::<i64>::new());
        assert_eq!(db.get_item_ids_in_tag(people, true).unwrap(), vec![item]);
        assert_eq!(db.get_item_tag_ids(item).unwrap(), vec![john]);

        db.remove_item_tag(item, john).unwrap();
        assert!(db.get_item_tag_ids(item).unwrap().is_empty());
    }
}
