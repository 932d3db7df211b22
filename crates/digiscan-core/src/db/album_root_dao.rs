//! Album root data access layer

use rusqlite::{params, Row};

use crate::models::{AlbumRoot, AlbumRootType};
use crate::utils::error::{AppError, AppResult};
use crate::watch::ChangeKind;

use super::connection::Database;

fn row_to_album_root(row: &Row<'_>) -> rusqlite::Result<AlbumRoot> {
    Ok(AlbumRoot {
        id: row.get("id")?,
        label: row.get("label")?,
        status: row.get("status")?,
        root_type: AlbumRootType::from_db(row.get("type")?),
        identifier: row.get::<_, Option<String>>("identifier")?.unwrap_or_default(),
        specific_path: row
            .get::<_, Option<String>>("specificPath")?
            .unwrap_or_else(|| "/".to_string()),
    })
}

impl Database {
    /// Register a new album root, returns its id
    pub fn add_album_root(
        &self,
        root_type: AlbumRootType,
        identifier: &str,
        specific_path: &str,
        label: Option<&str>,
    ) -> AppResult<i64> {
        let id = {
            let conn = self.connection()?;
            conn.execute(
                r#"
                INSERT INTO AlbumRoots (label, status, type, identifier, specificPath)
                VALUES (?1, 0, ?2, ?3, ?4)
                "#,
                params![label, root_type.to_db(), identifier, specific_path],
            )?;
            conn.last_insert_rowid()
        };

        self.watch().album_root_changed(id, ChangeKind::Added);
        Ok(id)
    }

    /// All registered album roots
    pub fn get_album_roots(&self) -> AppResult<Vec<AlbumRoot>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT * FROM AlbumRoots ORDER BY id")?;
        let roots = stmt
            .query_map([], row_to_album_root)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roots)
    }

    /// A single album root
    pub fn get_album_root(&self, id: i64) -> AppResult<Option<AlbumRoot>> {
        let conn = self.connection()?;
        let result = conn.query_row(
            "SELECT * FROM AlbumRoots WHERE id = ?1",
            params![id],
            row_to_album_root,
        );

        match result {
            Ok(root) => Ok(Some(root)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(AppError::Database(e)),
        }
    }

    /// Delete an album root with all its albums and items
    pub fn delete_album_root(&self, id: i64) -> AppResult<bool> {
        let rows = {
            let conn = self.connection()?;
            conn.execute("DELETE FROM AlbumRoots WHERE id = ?1", params![id])?
        };

        if rows > 0 {
            self.watch().album_root_changed(id, ChangeKind::Deleted);
        }
        Ok(rows > 0)
    }

    pub fn set_album_root_label(&self, id: i64, label: Option<&str>) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE AlbumRoots SET label = ?1 WHERE id = ?2",
                params![label, id],
            )?;
        }
        self.watch().album_root_changed(id, ChangeKind::PropertiesChanged);
        Ok(())
    }

    /// 0 = active, 1 = hidden
    pub fn set_album_root_status(&self, id: i64, status: i32) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE AlbumRoots SET status = ?1 WHERE id = ?2",
                params![status, id],
            )?;
        }
        self.watch().album_root_changed(id, ChangeKind::PropertiesChanged);
        Ok(())
    }

    pub fn change_album_root_type(&self, id: i64, root_type: AlbumRootType) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE AlbumRoots SET type = ?1 WHERE id = ?2",
                params![root_type.to_db(), id],
            )?;
        }
        self.watch().album_root_changed(id, ChangeKind::PropertiesChanged);
        Ok(())
    }

    pub fn set_album_root_identifier(
        &self,
        id: i64,
        identifier: &str,
        specific_path: &str,
    ) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "UPDATE AlbumRoots SET identifier = ?1, specificPath = ?2 WHERE id = ?3",
                params![identifier, specific_path, id],
            )?;
        }
        self.watch().album_root_changed(id, ChangeKind::PropertiesChanged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::AttributeChange;

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    #[test]
    fn test_add_and_get_album_root() {
        let db = setup();
        let id = db
            .add_album_root(
                AlbumRootType::VolumeHardWired,
                "volumeid:?uuid=1234",
                "/photos",
                Some("Photos"),
            )
            .unwrap();

        let roots = db.get_album_roots().unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].id, id);
        assert_eq!(roots[0].identifier, "volumeid:?uuid=1234");
        assert_eq!(roots[0].specific_path, "/photos");
        assert_eq!(roots[0].root_type, AlbumRootType::VolumeHardWired);
        assert!(!roots[0].is_hidden());
    }

    #[test]
    fn test_update_album_root_fields() {
        let db = setup();
        let id = db
            .add_album_root(AlbumRootType::VolumeRemovable, "volumeid:?path=/a", "/", None)
            .unwrap();

        db.set_album_root_label(id, Some("Card")).unwrap();
        db.set_album_root_status(id, 1).unwrap();
        db.change_album_root_type(id, AlbumRootType::VolumeHardWired).unwrap();
        db.set_album_root_identifier(id, "volumeid:?uuid=abcd", "/dcim").unwrap();

        let root = db.get_album_root(id).unwrap().unwrap();
        assert_eq!(root.label.as_deref(), Some("Card"));
        assert!(root.is_hidden());
        assert_eq!(root.root_type, AlbumRootType::VolumeHardWired);
        assert_eq!(root.identifier, "volumeid:?uuid=abcd");
        assert_eq!(root.specific_path, "/dcim");
    }

    #[test]
    fn test_delete_album_root_cascades() {
        let db = setup();
        let root = db
            .add_album_root(AlbumRootType::VolumeHardWired, "volumeid:?path=/p", "/", None)
            .unwrap();
        db.add_album(root, "/2020", None, None, None).unwrap();

        let rx = db.watch().subscribe();
        assert!(db.delete_album_root(root).unwrap());
        assert!(db.get_album_short_infos().unwrap().is_empty());
        assert_eq!(
            rx.try_recv().unwrap(),
            AttributeChange::AlbumRootChanged {
                id: root,
                kind: ChangeKind::Deleted
            }
        );
        assert!(db.get_album_root(root).unwrap().is_none());
    }
}
