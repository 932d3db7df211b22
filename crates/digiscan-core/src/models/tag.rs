//! Tag and saved-search data model

use serde::{Deserialize, Serialize};

/// Persisted `Tags` row. `pid == 0` marks a top-level tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub pid: i64,
    pub name: String,
    pub icon: Option<i64>,
    pub icon_kde: Option<String>,
}

/// Tag listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagShortInfo {
    pub id: i64,
    pub pid: i64,
    pub name: String,
}

/// Kind of a saved search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SearchType {
    Keyword,
    Advanced,
    Timeline,
    Map,
    Duplicates,
}

impl SearchType {
    pub fn to_db(self) -> i32 {
        match self {
            SearchType::Keyword => 1,
            SearchType::Advanced => 2,
            SearchType::Timeline => 3,
            SearchType::Map => 4,
            SearchType::Duplicates => 5,
        }
    }

    pub fn from_db(value: i32) -> Self {
        match value {
            2 => SearchType::Advanced,
            3 => SearchType::Timeline,
            4 => SearchType::Map,
            5 => SearchType::Duplicates,
            _ => SearchType::Keyword,
        }
    }
}

/// Persisted `Searches` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchInfo {
    pub id: i64,
    pub search_type: SearchType,
    pub name: String,
    pub query: String,
}
