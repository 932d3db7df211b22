//! Saved search data access layer

use rusqlite::{params, Row};

use crate::models::{SearchInfo, SearchType};
use crate::utils::error::AppResult;

use super::connection::Database;

fn row_to_search(row: &Row<'_>) -> rusqlite::Result<SearchInfo> {
    Ok(SearchInfo {
        id: row.get("id")?,
        search_type: SearchType::from_db(row.get("type")?),
        name: row.get("name")?,
        query: row.get("query")?,
    })
}

impl Database {
    /// Save a search; an existing search of the same type and name is
    /// overwritten
    pub fn add_search(&self, search_type: SearchType, name: &str, query: &str) -> AppResult<i64> {
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO Searches (type, name, query) VALUES (?1, ?2, ?3)
            ON CONFLICT(type, name) DO UPDATE SET query = excluded.query
            "#,
            params![search_type.to_db(), name, query],
        )?;
        let id = conn.query_row(
            "SELECT id FROM Searches WHERE type = ?1 AND name = ?2",
            params![search_type.to_db(), name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Saved searches, optionally only one type
    pub fn get_searches(&self, search_type: Option<SearchType>) -> AppResult<Vec<SearchInfo>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            "SELECT * FROM Searches WHERE (?1 IS NULL OR type = ?1) ORDER BY type, name",
        )?;
        let searches = stmt
            .query_map(params![search_type.map(SearchType::to_db)], row_to_search)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(searches)
    }

    pub fn delete_search(&self, id: i64) -> AppResult<bool> {
        let conn = self.connection()?;
        let rows = conn.execute("DELETE FROM Searches WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_crud() {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();

        let id = db.add_search(SearchType::Keyword, "beach", "beach sand").unwrap();
        let same = db.add_search(SearchType::Keyword, "beach", "beach sea").unwrap();
        assert_eq!(id, same);
        db.add_search(SearchType::Timeline, "2020", "2020-01-01..2020-12-31").unwrap();

        let keyword = db.get_searches(Some(SearchType::Keyword)).unwrap();
        assert_eq!(keyword.len(), 1);
        assert_eq!(keyword[0].query, "beach sea");
        assert_eq!(db.get_searches(None).unwrap().len(), 2);

        assert!(db.delete_search(id).unwrap());
        assert!(!db.delete_search(id).unwrap());
    }
}
