//! Where digiscan keeps its own files.
//!
//! By default the database lives in the platform's local data directory,
//! `settings.json` in the config directory and logs in the state directory
//! (falling back to `<data>/Logs` where the platform has none). A single
//! data directory given on the command line holds all three instead.

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Directory name used under each platform base directory.
pub const APP_DIR_NAME: &str = "digiscan";

/// File name of the collection database.
pub const DATABASE_FILE_NAME: &str = "digiscan.db";

/// Resolves the files the core reads and writes.
pub trait PathProvider: Send + Sync {
    /// SQLite database file.
    fn database_path(&self) -> PathBuf;

    /// JSON settings file.
    fn settings_path(&self) -> PathBuf;

    /// Directory for rolling log files.
    fn logs_dir(&self) -> PathBuf;
}

pub type SharedPathProvider = Arc<dyn PathProvider>;

/// Fixed locations resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultPathProvider {
    database_path: PathBuf,
    settings_path: PathBuf,
    logs_dir: PathBuf,
}

impl DefaultPathProvider {
    /// Platform directories.
    pub fn new() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME);
        let config_dir = dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .unwrap_or_else(|| data_dir.clone());
        let logs_dir = dirs::state_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .unwrap_or_else(|| data_dir.join("Logs"));

        Self {
            database_path: data_dir.join(DATABASE_FILE_NAME),
            settings_path: config_dir.join("settings.json"),
            logs_dir,
        }
    }

    /// Everything under one directory: `digiscan.db`, `settings.json`
    /// and `Logs/`.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            database_path: base_dir.join(DATABASE_FILE_NAME),
            settings_path: base_dir.join("settings.json"),
            logs_dir: base_dir.join("Logs"),
        }
    }

    /// `with_base_dir` when a data directory override is given, the
    /// platform directories otherwise.
    pub fn for_data_dir(data_dir: Option<&Path>) -> Self {
        match data_dir {
            Some(dir) => Self::with_base_dir(dir.to_path_buf()),
            None => Self::new(),
        }
    }
}

impl Default for DefaultPathProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl PathProvider for DefaultPathProvider {
    fn database_path(&self) -> PathBuf {
        self.database_path.clone()
    }

    fn settings_path(&self) -> PathBuf {
        self.settings_path.clone()
    }

    fn logs_dir(&self) -> PathBuf {
        self.logs_dir.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_dir_holds_everything() {
        let provider = DefaultPathProvider::with_base_dir(PathBuf::from("/tmp/ds"));
        assert_eq!(provider.database_path(), PathBuf::from("/tmp/ds/digiscan.db"));
        assert_eq!(provider.settings_path(), PathBuf::from("/tmp/ds/settings.json"));
        assert_eq!(provider.logs_dir(), PathBuf::from("/tmp/ds/Logs"));
    }

    #[test]
    fn test_data_dir_override() {
        let dir = Path::new("/srv/photos-index");
        assert_eq!(
            DefaultPathProvider::for_data_dir(Some(dir)),
            DefaultPathProvider::with_base_dir(dir.to_path_buf())
        );
        assert_eq!(DefaultPathProvider::for_data_dir(None), DefaultPathProvider::new());
    }

    #[test]
    fn test_platform_layout() {
        let provider = DefaultPathProvider::new();
        assert_eq!(
            provider.database_path().file_name().and_then(|n| n.to_str()),
            Some(DATABASE_FILE_NAME)
        );
        assert!(provider.settings_path().ends_with("digiscan/settings.json"));
    }
}
