//! digiscan data model module
//!
//! Row types for the collection database and the enums stored in it.

pub mod album;
pub mod album_root;
pub mod image;
pub mod settings;
pub mod tag;

pub use album::{Album, AlbumShortInfo};
pub use album_root::{AlbumRoot, AlbumRootType, CollectionLocationStatus};
pub use image::{
    CopyrightInfo, DatabaseCommentType, DatabaseItemCategory, DatabaseItemStatus,
    ImageComment, ImageInformation, ImageMetadataRow, ImagePosition, ItemScanInfo,
    ItemShortInfo, ReplaceMode,
};
pub use settings::{AppSettings, DatabaseSettings, MetadataSettings, ScanSettings};
pub use tag::{SearchInfo, SearchType, Tag, TagShortInfo};

use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use std::time::SystemTime;

/// Storage format of all date columns.
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Format a date for storage.
pub fn to_db_datetime(dt: &NaiveDateTime) -> String {
    dt.format(DB_DATETIME_FORMAT).to_string()
}

/// Parse a stored date. Accepts the storage format, a space separator and
/// RFC 3339 strings written by older versions.
pub fn from_db_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DB_DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// Local wall-clock time of a file system timestamp, truncated to seconds.
pub fn system_time_to_naive(time: SystemTime) -> NaiveDateTime {
    let local: DateTime<Local> = time.into();
    let naive = local.naive_local();
    naive.with_nanosecond(0).unwrap_or(naive)
}

/// Current time in storage format.
pub fn now_db_datetime() -> String {
    to_db_datetime(&Local::now().naive_local())
}

/// Sort order of album item listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemSortOrder {
    #[default]
    NoItemSorting,
    ByItemName,
    ByItemPath,
    ByItemDate,
    ByItemRating,
}

impl ItemSortOrder {
    /// ORDER BY clause for a query joining `Images` (as `i`) with
    /// `ImageInformation` (as `ii`) and `Albums` (as `a`).
    pub fn order_by(&self) -> &'static str {
        match self {
            ItemSortOrder::NoItemSorting => "",
            ItemSortOrder::ByItemName => " ORDER BY i.name COLLATE NOCASE",
            ItemSortOrder::ByItemPath => " ORDER BY a.relativePath, i.name",
            ItemSortOrder::ByItemDate => " ORDER BY ii.creationDate",
            ItemSortOrder::ByItemRating => " ORDER BY ii.rating DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_db_datetime_roundtrip_formats() {
        let dt = NaiveDate::from_ymd_opt(2020, 5, 17)
            .unwrap()
            .and_hms_opt(10, 30, 45)
            .unwrap();
        assert_eq!(to_db_datetime(&dt), "2020-05-17T10:30:45");
        assert_eq!(from_db_datetime("2020-05-17 10:30:45"), Some(dt));
        assert!(from_db_datetime("not a date").is_none());
    }

    #[test]
    fn test_sort_order_sql() {
        assert_eq!(ItemSortOrder::NoItemSorting.order_by(), "");
        assert!(ItemSortOrder::ByItemRating.order_by().contains("rating"));
    }
}
