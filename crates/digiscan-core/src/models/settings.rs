//! Application settings data model

use serde::{Deserialize, Serialize};

/// Scanning settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScanSettings {
    /// Directory names never descended into
    pub excluded_dirs: Vec<String>,
    /// Seconds a copy/move hint survives without being consumed
    pub hint_expiry_secs: u64,
    /// Watch available locations and schedule partial scans on change
    pub realtime_watch: bool,
    /// Debounce for watcher events (milliseconds)
    pub watch_debounce_ms: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            excluded_dirs: vec![
                String::from(".git"),
                String::from("$RECYCLE.BIN"),
                String::from("System Volume Information"),
                String::from("lost+found"),
            ],
            hint_expiry_secs: 300, // 5 minutes
            realtime_watch: false,
            watch_debounce_ms: 2000,
        }
    }
}

/// Database settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Use WAL journaling (single writer, concurrent readers)
    pub enable_wal: bool,
    /// SQLite busy timeout in milliseconds
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            enable_wal: true,
            busy_timeout_ms: 5000,
        }
    }
}

/// Metadata extraction settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataSettings {
    /// Look for an embedded XMP packet (keywords, rating, captions)
    pub read_xmp: bool,
    /// Language code used for comments without one
    pub default_language: String,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            read_xmp: true,
            default_language: String::from("x-default"),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppSettings {
    pub scan: ScanSettings,
    pub database: DatabaseSettings,
    pub metadata: MetadataSettings,
}
