//! Item (Images table) data access layer

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use crate::models::{
    from_db_datetime, to_db_datetime, DatabaseItemCategory, DatabaseItemStatus, ItemScanInfo,
    ItemShortInfo, ItemSortOrder,
};
use crate::utils::error::{AppError, AppResult};
use crate::watch::{CollectionChangeKind, ImageChangeField};

use super::connection::Database;

const SCAN_INFO_COLUMNS: &str =
    "id, album, name, status, category, modificationDate, fileSize, uniqueHash";

fn row_to_scan_info(row: &Row<'_>) -> rusqlite::Result<ItemScanInfo> {
    let modification_date: Option<String> = row.get("modificationDate")?;
    Ok(ItemScanInfo {
        id: row.get("id")?,
        album_id: row.get("album")?,
        item_name: row.get("name")?,
        status: DatabaseItemStatus::from_db(row.get("status")?),
        category: DatabaseItemCategory::from_db(row.get("category")?),
        modification_date: modification_date.as_deref().and_then(from_db_datetime),
        file_size: row.get::<_, Option<i64>>("fileSize")?.unwrap_or(0),
        unique_hash: row.get::<_, Option<String>>("uniqueHash")?.unwrap_or_default(),
    })
}

fn row_to_short_info(row: &Row<'_>) -> rusqlite::Result<ItemShortInfo> {
    Ok(ItemShortInfo {
        id: row.get("id")?,
        item_name: row.get("name")?,
        album_id: row.get("album")?,
        album_root_id: row.get("albumRoot")?,
        album: row.get("relativePath")?,
    })
}

impl Database {
    /// Insert a new item row, returns its id
    #[allow(clippy::too_many_arguments)]
    pub fn add_item(
        &self,
        album_id: i64,
        name: &str,
        status: DatabaseItemStatus,
        category: DatabaseItemCategory,
        modification_date: Option<NaiveDateTime>,
        file_size: i64,
        unique_hash: &str,
    ) -> AppResult<i64> {
        let id = {
            let conn = self.connection()?;
            conn.execute(
                r#"
                INSERT INTO Images (album, name, status, category, modificationDate, fileSize, uniqueHash)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    album_id,
                    name,
                    status.to_db(),
                    category.to_db(),
                    modification_date.as_ref().map(to_db_datetime),
                    file_size,
                    unique_hash,
                ],
            )?;
            conn.last_insert_rowid()
        };

        self.watch()
            .collection_changed(vec![id], CollectionChangeKind::ItemsAdded);
        Ok(id)
    }

    /// Update the hard file attributes of an item
    pub fn update_item(
        &self,
        id: i64,
        category: DatabaseItemCategory,
        modification_date: Option<NaiveDateTime>,
        file_size: i64,
        unique_hash: &str,
    ) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                r#"
                UPDATE Images
                SET category = ?1, modificationDate = ?2, fileSize = ?3, uniqueHash = ?4
                WHERE id = ?5
                "#,
                params![
                    category.to_db(),
                    modification_date.as_ref().map(to_db_datetime),
                    file_size,
                    unique_hash,
                    id,
                ],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImageInformation);
        Ok(())
    }

    pub fn set_item_status(&self, id: i64, status: DatabaseItemStatus) -> AppResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE Images SET status = ?1 WHERE id = ?2",
            params![status.to_db(), id],
        )?;
        Ok(())
    }

    /// Move an item row to another album, keeping its name
    pub fn set_item_album(&self, id: i64, album_id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE Images SET album = ?1 WHERE id = ?2",
                params![album_id, id],
            )?;
        }
        self.watch()
            .collection_changed(vec![id], CollectionChangeKind::ItemsMoved);
        Ok(())
    }

    pub fn rename_item(&self, id: i64, new_name: &str) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE Images SET name = ?1 WHERE id = ?2",
                params![new_name, id],
            )?;
        }
        self.watch()
            .collection_changed(vec![id], CollectionChangeKind::ItemsMoved);
        Ok(())
    }

    /// Move an item to a new album and name in one step.
    ///
    /// A visible item already occupying the destination is marked removed.
    pub fn move_item(&self, id: i64, dst_album_id: i64, dst_name: &str) -> AppResult<()> {
        self.transaction(|conn| {
            conn.execute(
                "UPDATE Images SET status = ?1 WHERE album = ?2 AND name = ?3 AND status = ?4 AND id != ?5",
                params![
                    DatabaseItemStatus::Removed.to_db(),
                    dst_album_id,
                    dst_name,
                    DatabaseItemStatus::Visible.to_db(),
                    id,
                ],
            )?;
            conn.execute(
                "UPDATE Images SET album = ?1, name = ?2, status = ?3 WHERE id = ?4",
                params![dst_album_id, dst_name, DatabaseItemStatus::Visible.to_db(), id],
            )?;
            Ok(())
        })?;

        self.watch()
            .collection_changed(vec![id], CollectionChangeKind::ItemsMoved);
        Ok(())
    }

    /// Duplicate an item row into another album, including all attributes
    pub fn copy_item(&self, src_id: i64, dst_album_id: i64, dst_name: &str) -> AppResult<i64> {
        let new_id = self.transaction(|conn| {
            conn.execute(
                "UPDATE Images SET status = ?1 WHERE album = ?2 AND name = ?3 AND status = ?4",
                params![
                    DatabaseItemStatus::Removed.to_db(),
                    dst_album_id,
                    dst_name,
                    DatabaseItemStatus::Visible.to_db(),
                ],
            )?;
            let rows = conn.execute(
                r#"
                INSERT INTO Images (album, name, status, category, modificationDate, fileSize, uniqueHash)
                SELECT ?1, ?2, ?3, category, modificationDate, fileSize, uniqueHash
                FROM Images WHERE id = ?4
                "#,
                params![dst_album_id, dst_name, DatabaseItemStatus::Visible.to_db(), src_id],
            )?;
            if rows == 0 {
                return Err(AppError::General(format!("item {} not found", src_id)));
            }
            Ok(conn.last_insert_rowid())
        })?;

        self.copy_image_attributes(src_id, new_id)?;
        self.watch()
            .collection_changed(vec![new_id], CollectionChangeKind::ItemsAdded);
        Ok(new_id)
    }

    /// Visible item ids of an album
    pub fn get_item_ids_in_album(&self, album_id: i64) -> AppResult<Vec<i64>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT id FROM Images WHERE album = ?1 AND status = 1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![album_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Visible item names of an album
    pub fn get_item_names_in_album(&self, album_id: i64) -> AppResult<Vec<String>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT name FROM Images WHERE album = ?1 AND status = 1 ORDER BY name")?;
        let names = stmt
            .query_map(params![album_id], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Hard attributes of every visible item in an album
    pub fn get_item_scan_infos(&self, album_id: i64) -> AppResult<Vec<ItemScanInfo>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM Images WHERE album = ?1 AND status = 1 ORDER BY name",
            SCAN_INFO_COLUMNS
        ))?;
        let infos = stmt
            .query_map(params![album_id], row_to_scan_info)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(infos)
    }

    pub fn get_item_scan_info(&self, id: i64) -> AppResult<Option<ItemScanInfo>> {
        let conn = self.connection()?;
        let info = conn
            .query_row(
                &format!("SELECT {} FROM Images WHERE id = ?1", SCAN_INFO_COLUMNS),
                params![id],
                row_to_scan_info,
            )
            .optional()?;
        Ok(info)
    }

    /// Items with identical content fingerprint, best candidate first:
    /// visible before anything else, then the most recently modified.
    pub fn get_items_with_unique_hash(
        &self,
        unique_hash: &str,
        file_size: i64,
    ) -> AppResult<Vec<ItemScanInfo>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM Images
            WHERE uniqueHash = ?1 AND fileSize = ?2 AND album IS NOT NULL
            ORDER BY (status = 1) DESC, modificationDate DESC, id DESC
            "#,
            SCAN_INFO_COLUMNS
        ))?;
        let infos = stmt
            .query_map(params![unique_hash, file_size], row_to_scan_info)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(infos)
    }

    pub fn get_item_ids_with_unique_hash(
        &self,
        unique_hash: &str,
        file_size: i64,
    ) -> AppResult<Vec<i64>> {
        Ok(self
            .get_items_with_unique_hash(unique_hash, file_size)?
            .into_iter()
            .map(|info| info.id)
            .collect())
    }

    /// Physically delete one item
    pub fn delete_item(&self, id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute("DELETE FROM Images WHERE id = ?1", params![id])?;
        }
        self.watch()
            .collection_changed(vec![id], CollectionChangeKind::ItemsRemoved);
        Ok(())
    }

    /// Mark items of an album as removed (the rows stay until
    /// `delete_removed_items`)
    pub fn remove_items_from_album(&self, album_id: i64, ids: &[i64]) -> AppResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.transaction(|conn| {
            let mut stmt = conn.prepare("UPDATE Images SET status = ?1 WHERE id = ?2 AND album = ?3")?;
            for id in ids {
                stmt.execute(params![DatabaseItemStatus::Removed.to_db(), id, album_id])?;
            }
            Ok(())
        })?;

        self.watch()
            .collection_changed(ids.to_vec(), CollectionChangeKind::ItemsRemoved);
        Ok(())
    }

    /// Mark items removed, then delete them, in one transaction
    pub fn remove_items(&self, ids: &[i64]) -> AppResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.transaction(|conn| {
            let mut mark = conn.prepare("UPDATE Images SET status = ?1 WHERE id = ?2")?;
            let mut delete = conn.prepare("DELETE FROM Images WHERE id = ?1 AND status = ?2")?;
            let mut deleted = 0;
            for id in ids {
                mark.execute(params![DatabaseItemStatus::Removed.to_db(), id])?;
                deleted += delete.execute(params![id, DatabaseItemStatus::Removed.to_db()])?;
            }
            Ok(deleted)
        })?;

        self.watch()
            .collection_changed(ids.to_vec(), CollectionChangeKind::ItemsRemoved);
        Ok(deleted)
    }

    /// Mark every item of an album as removed
    pub fn remove_all_items_from_album(&self, album_id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE Images SET status = ?1 WHERE album = ?2",
                params![DatabaseItemStatus::Removed.to_db(), album_id],
            )?;
        }
        self.watch()
            .collection_changed(Vec::new(), CollectionChangeKind::ItemsRemovedAll);
        Ok(())
    }

    /// Physically delete all items marked removed
    pub fn delete_removed_items(&self) -> AppResult<usize> {
        let conn = self.connection()?;
        let rows = conn.execute(
            "DELETE FROM Images WHERE status = ?1",
            params![DatabaseItemStatus::Removed.to_db()],
        )?;
        Ok(rows)
    }

    /// Items carrying a tag; with `recursive`, items carrying any tag below it
    pub fn get_item_ids_in_tag(&self, tag_id: i64, recursive: bool) -> AppResult<Vec<i64>> {
        let conn = self.connection()?;
        let sql = if recursive {
            r#"
            SELECT DISTINCT it.imageid FROM ImageTags it
            JOIN Images i ON i.id = it.imageid
            WHERE i.status = 1
              AND (it.tagid = ?1 OR it.tagid IN (SELECT id FROM TagsTree WHERE pid = ?1))
            ORDER BY it.imageid
            "#
        } else {
            r#"
            SELECT it.imageid FROM ImageTags it
            JOIN Images i ON i.id = it.imageid
            WHERE i.status = 1 AND it.tagid = ?1
            ORDER BY it.imageid
            "#
        };
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![tag_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// Album root, album and name of an item
    pub fn get_item_short_info(&self, id: i64) -> AppResult<Option<ItemShortInfo>> {
        let conn = self.connection()?;
        let info = conn
            .query_row(
                r#"
                SELECT i.id, i.name, i.album, a.albumRoot, a.relativePath
                FROM Images i JOIN Albums a ON a.id = i.album
                WHERE i.id = ?1
                "#,
                params![id],
                row_to_short_info,
            )
            .optional()?;
        Ok(info)
    }

    /// Album root id and root-relative file path (`/2020/a.jpg`) of an item
    pub fn get_item_url(&self, id: i64) -> AppResult<Option<(i64, String)>> {
        Ok(self.get_item_short_info(id)?.map(|info| {
            let path = if info.album == "/" {
                format!("/{}", info.item_name)
            } else {
                format!("{}/{}", info.album, info.item_name)
            };
            (info.album_root_id, path)
        }))
    }

    /// Visible items of an album in the requested order
    pub fn list_album_items(
        &self,
        album_id: i64,
        order: ItemSortOrder,
    ) -> AppResult<Vec<ItemShortInfo>> {
        let conn = self.connection()?;
        let sql = format!(
            r#"
            SELECT i.id, i.name, i.album, a.albumRoot, a.relativePath
            FROM Images i
            JOIN Albums a ON a.id = i.album
            LEFT JOIN ImageInformation ii ON ii.imageid = i.id
            WHERE i.album = ?1 AND i.status = 1{}
            "#,
            order.order_by()
        );
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![album_id], row_to_short_info)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
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
        let album = db.add_album(root, "/2020", None, None, None).unwrap();
        (db, album)
    }

    fn add(db: &Database, album: i64, name: &str, hash: &str) -> i64 {
        db.add_item(
            album,
            name,
            DatabaseItemStatus::Visible,
            DatabaseItemCategory::Image,
            None,
            100,
            hash,
        )
        .unwrap()
    }

    #[test]
    fn test_add_and_list_items() {
        let (db, album) = setup();
        let a = add(&db, album, "a.jpg", "h1");
        add(&db, album, "b.jpg", "h2");

        assert_eq!(db.get_item_names_in_album(album).unwrap(), vec!["a.jpg", "b.jpg"]);
        let info = db.get_item_scan_info(a).unwrap().unwrap();
        assert_eq!(info.item_name, "a.jpg");
        assert_eq!(info.status, DatabaseItemStatus::Visible);
        assert_eq!(info.file_size, 100);
        assert_eq!(db.get_item_url(a).unwrap(), Some((1, "/2020/a.jpg".to_string())));
    }

    #[test]
    fn test_visible_name_is_unique() {
        let (db, album) = setup();
        add(&db, album, "a.jpg", "h1");
        let dup = db.add_item(
            album,
            "a.jpg",
            DatabaseItemStatus::Visible,
            DatabaseItemCategory::Image,
            None,
            1,
            "x",
        );
        assert!(dup.is_err());
    }

    #[test]
    fn test_remove_then_delete_removed() {
        let (db, album) = setup();
        let a = add(&db, album, "a.jpg", "h1");
        let b = add(&db, album, "b.jpg", "h2");

        db.remove_items_from_album(album, &[b]).unwrap();
        assert_eq!(db.get_item_ids_in_album(album).unwrap(), vec![a]);
        assert_eq!(
            db.get_item_scan_info(b).unwrap().unwrap().status,
            DatabaseItemStatus::Removed
        );

        assert_eq!(db.delete_removed_items().unwrap(), 1);
        assert!(db.get_item_scan_info(b).unwrap().is_none());
    }

    #[test]
    fn test_hash_candidates_prefer_visible() {
        let (db, album) = setup();
        let removed = add(&db, album, "old.jpg", "same");
        db.set_item_status(removed, DatabaseItemStatus::Removed).unwrap();
        let visible = add(&db, album, "new.jpg", "same");

        let ids = db.get_item_ids_with_unique_hash("same", 100).unwrap();
        assert_eq!(ids, vec![visible, removed]);
        assert!(db.get_item_ids_with_unique_hash("same", 99).unwrap().is_empty());
    }

    #[test]
    fn test_copy_item_copies_rating() {
        let (db, album) = setup();
        let src = add(&db, album, "a.jpg", "h1");
        db.set_item_rating(src, 4).unwrap();

        let dst = db.copy_item(src, album, "copy.jpg").unwrap();
        assert_ne!(src, dst);
        assert_eq!(db.get_item_rating(dst).unwrap(), 4);
        assert_eq!(db.get_item_scan_info(dst).unwrap().unwrap().unique_hash, "h1");
    }

    #[test]
    fn test_list_album_items_by_rating() {
        let (db, album) = setup();
        let a = add(&db, album, "a.jpg", "h1");
        let b = add(&db, album, "b.jpg", "h2");
        db.set_item_rating(a, 1).unwrap();
        db.set_item_rating(b, 5).unwrap();

        let ids: Vec<i64> = db
            .list_album_items(album, ItemSortOrder::ByItemRating)
            .unwrap()
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![b, a]);

        let names: Vec<String> = db
            .list_album_items(album, ItemSortOrder::ByItemName)
            .unwrap()
            .into_iter()
            .map(|i| i.item_name)
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg"]);
    }

    #[test]
    fn test_move_item_replaces_visible_destination() {
        let (db, album) = setup();
        let a = add(&db, album, "a.jpg", "h1");
        let b = add(&db, album, "b.jpg", "h2");

        db.move_item(a, album, "b.jpg").unwrap();
        assert_eq!(db.get_item_ids_in_album(album).unwrap(), vec![a]);
        assert_eq!(
            db.get_item_scan_info(b).unwrap().unwrap().status,
            DatabaseItemStatus::Removed
        );
    }
}
