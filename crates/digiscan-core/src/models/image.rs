//! Image data model

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an `Images` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseItemStatus {
    #[default]
    UndefinedStatus,
    Visible,
    Removed,
    Trashed,
}

impl DatabaseItemStatus {
    pub fn to_db(self) -> i32 {
        match self {
            DatabaseItemStatus::UndefinedStatus => 0,
            DatabaseItemStatus::Visible => 1,
            DatabaseItemStatus::Removed => 2,
            DatabaseItemStatus::Trashed => 3,
        }
    }

    pub fn from_db(value: i32) -> Self {
        match value {
            1 => DatabaseItemStatus::Visible,
            2 => DatabaseItemStatus::Removed,
            3 => DatabaseItemStatus::Trashed,
            _ => DatabaseItemStatus::UndefinedStatus,
        }
    }
}

/// Media category of an item, decided from its suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseItemCategory {
    #[default]
    UndefinedCategory,
    Image,
    Video,
    Audio,
    Other,
}

impl DatabaseItemCategory {
    pub fn to_db(self) -> i32 {
        match self {
            DatabaseItemCategory::UndefinedCategory => 0,
            DatabaseItemCategory::Image => 1,
            DatabaseItemCategory::Video => 2,
            DatabaseItemCategory::Audio => 3,
            DatabaseItemCategory::Other => 4,
        }
    }

    pub fn from_db(value: i32) -> Self {
        match value {
            1 => DatabaseItemCategory::Image,
            2 => DatabaseItemCategory::Video,
            3 => DatabaseItemCategory::Audio,
            4 => DatabaseItemCategory::Other,
            _ => DatabaseItemCategory::UndefinedCategory,
        }
    }
}

/// Kind of a multi-language comment entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseCommentType {
    #[default]
    Comment,
    Headline,
    Title,
}

impl DatabaseCommentType {
    pub fn to_db(self) -> i32 {
        match self {
            DatabaseCommentType::Comment => 1,
            DatabaseCommentType::Headline => 2,
            DatabaseCommentType::Title => 3,
        }
    }

    pub fn from_db(value: i32) -> Self {
        match value {
            2 => DatabaseCommentType::Headline,
            3 => DatabaseCommentType::Title,
            _ => DatabaseCommentType::Comment,
        }
    }
}

/// How a new copyright value is merged with existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplaceMode {
    /// Remove every entry of the property first
    ReplaceAllEntries,
    /// Remove only the entry with the same language (extra value)
    ReplaceLanguageEntry,
    /// Keep existing entries, add this one
    AddEntryToExisting,
}

/// Minimal item listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemShortInfo {
    pub id: i64,
    pub item_name: String,
    pub album_id: i64,
    pub album_root_id: i64,
    pub album: String,
}

/// The hard file attributes the scanner compares against disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemScanInfo {
    pub id: i64,
    pub album_id: Option<i64>,
    pub item_name: String,
    pub status: DatabaseItemStatus,
    pub category: DatabaseItemCategory,
    pub modification_date: Option<NaiveDateTime>,
    pub file_size: i64,
    pub unique_hash: String,
}

/// `ImageInformation` row (1:1 with Images).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageInformation {
    /// -1 = no rating, 0..=5 otherwise
    pub rating: i32,
    pub creation_date: Option<NaiveDateTime>,
    pub digitization_date: Option<NaiveDateTime>,
    pub orientation: Option<i32>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub format: Option<String>,
    pub color_depth: Option<i32>,
    pub color_model: Option<i32>,
}

/// `ImageMetadata` row: photographic EXIF fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadataRow {
    pub make: Option<String>,
    pub model: Option<String>,
    pub lens: Option<String>,
    pub aperture: Option<f64>,
    pub focal_length: Option<f64>,
    pub focal_length_35: Option<f64>,
    pub exposure_time: Option<f64>,
    pub exposure_program: Option<i32>,
    pub exposure_mode: Option<i32>,
    pub sensitivity: Option<i32>,
    pub flash: Option<i32>,
    pub white_balance: Option<i32>,
    pub metering_mode: Option<i32>,
    pub subject_distance: Option<f64>,
}

impl ImageMetadataRow {
    pub fn is_empty(&self) -> bool {
        *self == ImageMetadataRow::default()
    }
}

/// `ImagePositions` row: GPS information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePosition {
    pub latitude_number: Option<f64>,
    pub longitude_number: Option<f64>,
    pub altitude: Option<f64>,
    pub orientation: Option<f64>,
    pub tilt: Option<f64>,
    pub roll: Option<f64>,
    pub accuracy: Option<f64>,
    pub description: Option<String>,
}

impl ImagePosition {
    pub fn is_valid(&self) -> bool {
        self.latitude_number.is_some() && self.longitude_number.is_some()
    }
}

/// `ImageComments` row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageComment {
    pub id: i64,
    pub image_id: i64,
    pub comment_type: DatabaseCommentType,
    pub language: String,
    pub author: Option<String>,
    pub date: Option<NaiveDateTime>,
    pub comment: String,
}

/// `ImageCopyright` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CopyrightInfo {
    pub property: String,
    pub value: String,
    /// Usually the language code of `value`
    pub extra_value: Option<String>,
}
