//! Album root data model

use serde::{Deserialize, Serialize};

/// Kind of storage an album root lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum AlbumRootType {
    #[default]
    UndefinedType,
    VolumeHardWired,
    VolumeRemovable,
    Network,
}

impl AlbumRootType {
    pub fn to_db(self) -> i32 {
        match self {
            AlbumRootType::UndefinedType => 0,
            AlbumRootType::VolumeHardWired => 1,
            AlbumRootType::VolumeRemovable => 2,
            AlbumRootType::Network => 3,
        }
    }

    pub fn from_db(value: i32) -> Self {
        match value {
            1 => AlbumRootType::VolumeHardWired,
            2 => AlbumRootType::VolumeRemovable,
            3 => AlbumRootType::Network,
            _ => AlbumRootType::UndefinedType,
        }
    }
}

/// Runtime status of a collection location.
///
/// Only the hidden flag is persisted; availability is derived from the
/// mounted volumes each time locations are updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum CollectionLocationStatus {
    #[default]
    Null,
    Available,
    Hidden,
    Unavailable,
    Deleted,
}

/// Persisted `AlbumRoots` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlbumRoot {
    pub id: i64,
    pub label: Option<String>,
    /// 0 = active, 1 = hidden
    pub status: i32,
    pub root_type: AlbumRootType,
    /// Structured volume identifier, e.g. `volumeid:?uuid=...`
    pub identifier: String,
    /// Path of the root inside its volume, starting with `/`.
    pub specific_path: String,
}

impl AlbumRoot {
    pub fn is_hidden(&self) -> bool {
        self.status == 1
    }
}
