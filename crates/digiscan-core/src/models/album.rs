//! Album (directory) data model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Persisted `Albums` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Album {
    pub id: i64,
    pub album_root_id: i64,
    /// Path relative to the album root, `/` for the root album.
    pub relative_path: String,
    pub date: Option<NaiveDate>,
    pub caption: Option<String>,
    pub collection: Option<String>,
    /// Image used as album icon
    pub icon: Option<i64>,
}

/// Light-weight album listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumShortInfo {
    pub id: i64,
    pub album_root_id: i64,
    pub relative_path: String,
}
