//! Album data access layer

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Album, AlbumShortInfo, DatabaseItemStatus};
use crate::utils::album_path::normalize_album_path;
use crate::utils::error::{AppError, AppResult};
use crate::watch::ChangeKind;

use super::connection::Database;

const ALBUM_DATE_FORMAT: &str = "%Y-%m-%d";

fn row_to_album(row: &Row<'_>) -> rusqlite::Result<Album> {
    let date: Option<String> = row.get("date")?;
    Ok(Album {
        id: row.get("id")?,
        album_root_id: row.get("albumRoot")?,
        relative_path: row.get("relativePath")?,
        date: date.and_then(|d| NaiveDate::parse_from_str(&d, ALBUM_DATE_FORMAT).ok()),
        caption: row.get("caption")?,
        collection: row.get("collection")?,
        icon: row.get("icon")?,
    })
}

fn row_to_album_short(row: &Row<'_>) -> rusqlite::Result<AlbumShortInfo> {
    Ok(AlbumShortInfo {
        id: row.get("id")?,
        album_root_id: row.get("albumRoot")?,
        relative_path: row.get("relativePath")?,
    })
}

/// Ids of the albums strictly below `relative_path` in `root`.
fn sub_album_ids(conn: &Connection, root: i64, relative_path: &str) -> AppResult<Vec<i64>> {
    let ids = if relative_path == "/" {
        let mut stmt = conn.prepare(
            "SELECT id FROM Albums WHERE albumRoot = ?1 AND relativePath != '/' ORDER BY relativePath",
        )?;
        let ids = stmt
            .query_map(params![root], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        ids
    } else {
        let mut stmt = conn.prepare(
            r#"
            SELECT id FROM Albums
            WHERE albumRoot = ?1
              AND substr(relativePath, 1, length(?2) + 1) = ?2 || '/'
            ORDER BY relativePath
            "#,
        )?;
        let ids = stmt
            .query_map(params![root, relative_path], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        ids
    };
    Ok(ids)
}

impl Database {
    /// Add an album, or return the id of the existing one at that path
    pub fn add_album(
        &self,
        album_root_id: i64,
        relative_path: &str,
        caption: Option<&str>,
        date: Option<NaiveDate>,
        collection: Option<&str>,
    ) -> AppResult<i64> {
        let relative_path = normalize_album_path(relative_path);
        let date = date.map(|d| d.format(ALBUM_DATE_FORMAT).to_string());

        let (id, inserted) = {
            let conn = self.connection()?;
            let rows = conn.execute(
                r#"
                INSERT OR IGNORE INTO Albums (albumRoot, relativePath, date, caption, collection)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![album_root_id, relative_path, date, caption, collection],
            )?;

            let id: i64 = conn.query_row(
                "SELECT id FROM Albums WHERE albumRoot = ?1 AND relativePath = ?2",
                params![album_root_id, relative_path],
                |row| row.get(0),
            )?;
            (id, rows > 0)
        };

        if inserted {
            tracing::debug!(album = %relative_path, root = album_root_id, "album added");
            self.watch().album_changed(id, ChangeKind::Added);
        }
        Ok(id)
    }

    /// Album id for a path inside an album root
    pub fn album_for_path(&self, album_root_id: i64, relative_path: &str) -> AppResult<Option<i64>> {
        let conn = self.connection()?;
        let id = conn
            .query_row(
                "SELECT id FROM Albums WHERE albumRoot = ?1 AND relativePath = ?2",
                params![album_root_id, normalize_album_path(relative_path)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn get_album(&self, id: i64) -> AppResult<Option<Album>> {
        let conn = self.connection()?;
        let result = conn.query_row("SELECT * FROM Albums WHERE id = ?1", params![id], row_to_album);

        match result {
            Ok(album) => Ok(Some(album)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// All albums of live album roots
    pub fn get_album_short_infos(&self) -> AppResult<Vec<AlbumShortInfo>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, albumRoot, relativePath FROM Albums WHERE albumRoot != 0 ORDER BY albumRoot, relativePath",
        )?;
        let albums = stmt
            .query_map([], row_to_album_short)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    pub fn get_albums_on_album_root(&self, album_root_id: i64) -> AppResult<Vec<AlbumShortInfo>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, albumRoot, relativePath FROM Albums WHERE albumRoot = ?1 ORDER BY relativePath",
        )?;
        let albums = stmt
            .query_map(params![album_root_id], row_to_album_short)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    /// Delete an album and its items
    pub fn delete_album(&self, id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute("DELETE FROM Albums WHERE id = ?1", params![id])?;
        }
        self.watch().album_changed(id, ChangeKind::Deleted);
        Ok(())
    }

    /// Delete albums in one transaction. Their items are marked removed
    /// first and go away with the album rows.
    pub fn delete_albums(&self, ids: &[i64]) -> AppResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.transaction(|conn| {
            let mut mark = conn.prepare("UPDATE Images SET status = ?1 WHERE album = ?2")?;
            let mut delete = conn.prepare("DELETE FROM Albums WHERE id = ?1")?;
            let mut deleted = 0;
            for id in ids {
                mark.execute(params![DatabaseItemStatus::Removed.to_db(), id])?;
                deleted += delete.execute(params![id])?;
            }
            Ok(deleted)
        })?;

        for id in ids {
            self.watch().album_changed(*id, ChangeKind::Deleted);
        }
        Ok(deleted)
    }

    /// Detach an album from its root so its path is free again.
    ///
    /// The row (and its items) stays until `delete_stale_albums`.
    pub fn make_stale_album(&self, id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                r#"
                UPDATE Albums
                SET relativePath = albumRoot || '-' || relativePath || '-' || id,
                    albumRoot = 0
                WHERE id = ?1 AND albumRoot != 0
                "#,
                params![id],
            )?;
        }
        self.watch().album_changed(id, ChangeKind::Deleted);
        Ok(())
    }

    /// Physically remove all stale albums
    pub fn delete_stale_albums(&self) -> AppResult<usize> {
        let conn = self.connection()?;
        let rows = conn.execute("DELETE FROM Albums WHERE albumRoot = 0", [])?;
        Ok(rows)
    }

    /// Move an album (and everything below it) to a new root or path
    pub fn rename_album(&self, id: i64, new_root_id: i64, new_relative_path: &str) -> AppResult<()> {
        let new_path = normalize_album_path(new_relative_path);

        let album = self
            .get_album(id)?
            .ok_or_else(|| AppError::General(format!("album {} not found", id)))?;

        self.transaction(|conn| {
            // Free the destination if a stale row of the same name exists
            conn.execute(
                "DELETE FROM Albums WHERE albumRoot = ?1 AND relativePath = ?2 AND id != ?3",
                params![new_root_id, new_path, id],
            )?;

            let children = sub_album_ids(conn, album.album_root_id, &album.relative_path)?;

            conn.execute(
                "UPDATE Albums SET albumRoot = ?1, relativePath = ?2 WHERE id = ?3",
                params![new_root_id, new_path, id],
            )?;

            let old_prefix = if album.relative_path == "/" {
                String::new()
            } else {
                album.relative_path.clone()
            };
            let new_prefix = if new_path == "/" { String::new() } else { new_path.clone() };

            for child in children {
                let child_path: String = conn.query_row(
                    "SELECT relativePath FROM Albums WHERE id = ?1",
                    params![child],
                    |row| row.get(0),
                )?;
                let rest = &child_path[old_prefix.len()..];
                conn.execute(
                    "UPDATE Albums SET albumRoot = ?1, relativePath = ?2 WHERE id = ?3",
                    params![new_root_id, format!("{}{}", new_prefix, rest), child],
                )?;
            }
            Ok(())
        })?;

        self.watch().album_changed(id, ChangeKind::Renamed);
        Ok(())
    }

    /// Copy caption, collection, date and icon from one album to another
    pub fn copy_album_properties(&self, src_id: i64, dst_id: i64) -> AppResult<()> {
        if src_id == dst_id {
            return Ok(());
        }
        {
            let conn = self.connection()?;
            conn.execute(
                r#"
                UPDATE Albums
                SET date = (SELECT date FROM Albums WHERE id = ?1),
                    caption = (SELECT caption FROM Albums WHERE id = ?1),
                    collection = (SELECT collection FROM Albums WHERE id = ?1),
                    icon = (SELECT icon FROM Albums WHERE id = ?1)
                WHERE id = ?2
                "#,
                params![src_id, dst_id],
            )?;
        }
        self.watch().album_changed(dst_id, ChangeKind::PropertiesChanged);
        Ok(())
    }

    pub fn set_album_caption(&self, id: i64, caption: Option<&str>) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE Albums SET caption = ?1 WHERE id = ?2",
                params![caption, id],
            )?;
        }
        self.watch().album_changed(id, ChangeKind::PropertiesChanged);
        Ok(())
    }

    pub fn set_album_collection(&self, id: i64, collection: Option<&str>) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE Albums SET collection = ?1 WHERE id = ?2",
                params![collection, id],
            )?;
        }
        self.watch().album_changed(id, ChangeKind::PropertiesChanged);
        Ok(())
    }

    pub fn set_album_date(&self, id: i64, date: Option<NaiveDate>) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE Albums SET date = ?1 WHERE id = ?2",
                params![date.map(|d| d.format(ALBUM_DATE_FORMAT).to_string()), id],
            )?;
        }
        self.watch().album_changed(id, ChangeKind::PropertiesChanged);
        Ok(())
    }

    /// Use an item as album icon (`None` clears it)
    pub fn set_album_icon(&self, id: i64, icon_item_id: Option<i64>) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE Albums SET icon = ?1 WHERE id = ?2",
                params![icon_item_id, id],
            )?;
        }
        self.watch().album_changed(id, ChangeKind::PropertiesChanged);
        Ok(())
    }

    pub fn get_album_relative_path(&self, id: i64) -> AppResult<Option<String>> {
        let conn = self.connection()?;
        let path = conn
            .query_row(
                "SELECT relativePath FROM Albums WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(path)
    }

    pub fn get_album_root_id(&self, id: i64) -> AppResult<Option<i64>> {
        let conn = self.connection()?;
        let root = conn
            .query_row(
                "SELECT albumRoot FROM Albums WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(root)
    }

    /// Ids of every album below the given one
    pub fn get_sub_album_ids(&self, id: i64) -> AppResult<Vec<i64>> {
        let album = match self.get_album(id)? {
            Some(album) => album,
            None => return Ok(Vec::new()),
        };
        let conn = self.connection()?;
        sub_album_ids(&conn, album.album_root_id, &album.relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlbumRootType;

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let root = db
            .add_album_root(AlbumRootType::VolumeHardWired, "volumeid:?path=/photos", "/photos", None)
            .unwrap();
        (db, root)
    }

    #[test]
    fn test_add_album_is_unique_per_path() {
        let (db, root) = setup();
        let a = db.add_album(root, "/2020", None, None, None).unwrap();
        let b = db.add_album(root, "2020/", Some("ignored"), None, None).unwrap();
        assert_eq!(a, b);
        assert_eq!(db.get_album_short_infos().unwrap().len(), 1);
        assert_eq!(db.album_for_path(root, "/2020").unwrap(), Some(a));
        assert_eq!(db.album_for_path(root, "/2021").unwrap(), None);
    }

    #[test]
    fn test_album_properties() {
        let (db, root) = setup();
        let date = NaiveDate::from_ymd_opt(2020, 7, 1).unwrap();
        let src = db.add_album(root, "/src", Some("Beach"), Some(date), Some("Holidays")).unwrap();
        let dst = db.add_album(root, "/dst", None, None, None).unwrap();

        db.copy_album_properties(src, dst).unwrap();
        let album = db.get_album(dst).unwrap().unwrap();
        assert_eq!(album.caption.as_deref(), Some("Beach"));
        assert_eq!(album.collection.as_deref(), Some("Holidays"));
        assert_eq!(album.date, Some(date));

        db.set_album_caption(dst, None).unwrap();
        db.set_album_date(dst, None).unwrap();
        let album = db.get_album(dst).unwrap().unwrap();
        assert!(album.caption.is_none());
        assert!(album.date.is_none());
    }

    #[test]
    fn test_sub_albums_respect_boundaries() {
        let (db, root) = setup();
        let parent = db.add_album(root, "/2020", None, None, None).unwrap();
        let child = db.add_album(root, "/2020/summer", None, None, None).unwrap();
        db.add_album(root, "/20201", None, None, None).unwrap();

        assert_eq!(db.get_sub_album_ids(parent).unwrap(), vec![child]);
    }

    #[test]
    fn test_rename_album_moves_children() {
        let (db, root) = setup();
        let parent = db.add_album(root, "/2020", None, None, None).unwrap();
        let child = db.add_album(root, "/2020/summer", None, None, None).unwrap();

        db.rename_album(parent, root, "/archive/2020").unwrap();

        assert_eq!(
            db.get_album_relative_path(parent).unwrap().as_deref(),
            Some("/archive/2020")
        );
        assert_eq!(
            db.get_album_relative_path(child).unwrap().as_deref(),
            Some("/archive/2020/summer")
        );
    }

    #[test]
    fn test_stale_album_frees_path() {
        let (db, root) = setup();
        let old = db.add_album(root, "/2020", None, None, None).unwrap();

        db.make_stale_album(old).unwrap();
        assert_eq!(db.album_for_path(root, "/2020").unwrap(), None);
        assert!(db.get_album_short_infos().unwrap().is_empty());

        let new = db.add_album(root, "/2020", None, None, None).unwrap();
        assert_ne!(old, new);

        assert_eq!(db.delete_stale_albums().unwrap(), 1);
        assert!(db.get_album(old).unwrap().is_none());
        assert!(db.get_album(new).unwrap().is_some());
    }

    #[test]
    fn test_delete_albums_removes_items() {
        use crate::models::DatabaseItemCategory;

        let (db, root) = setup();
        let album = db.add_album(root, "/2020", None, None, None).unwrap();
        let keep = db.add_album(root, "/2021", None, None, None).unwrap();
        db.add_item(album, "a.jpg", DatabaseItemStatus::Visible, DatabaseItemCategory::Image, None, 1, "h")
            .unwrap();

        assert_eq!(db.delete_albums(&[album]).unwrap(), 1);
        assert!(db.get_album(album).unwrap().is_none());
        assert!(db.get_album(keep).unwrap().is_some());
        assert_eq!(db.stats().unwrap().image_count, 0);
    }
}
