//! Settings service
//!
//! Loads and saves the JSON settings file.

use std::fs;
use std::path::{Path, PathBuf};

use crate::models::AppSettings;
use crate::paths::PathProvider;
use crate::utils::error::{AppError, AppResult};

/// Settings file manager
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    pub fn new(provider: &dyn PathProvider) -> AppResult<Self> {
        Self::from_path(provider.settings_path())
    }

    /// Manage the settings file at `settings_path`, creating its directory
    pub fn from_path(settings_path: PathBuf) -> AppResult<Self> {
        if let Some(parent) = settings_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Config(format!("cannot create config directory: {}", e)))?;
        }
        Ok(Self { settings_path })
    }

    /// Load settings; a missing file yields the defaults
    pub fn load(&self) -> AppResult<AppSettings> {
        if !self.settings_path.exists() {
            tracing::info!("no settings file, using defaults");
            return Ok(AppSettings::default());
        }

        let content = fs::read_to_string(&self.settings_path)
            .map_err(|e| AppError::Config(format!("cannot read settings: {}", e)))?;
        let settings: AppSettings = serde_json::from_str(&content)
            .map_err(|e| AppError::Config(format!("malformed settings file: {}", e)))?;

        tracing::info!("loaded settings from {:?}", self.settings_path);
        Ok(settings)
    }

    pub fn save(&self, settings: &AppSettings) -> AppResult<()> {
        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Config(format!("cannot serialize settings: {}", e)))?;
        fs::write(&self.settings_path, content)
            .map_err(|e| AppError::Config(format!("cannot write settings: {}", e)))?;

        tracing::info!("saved settings to {:?}", self.settings_path);
        Ok(())
    }

    pub fn reset(&self) -> AppResult<AppSettings> {
        let defaults = AppSettings::default();
        self.save(&defaults)?;
        Ok(defaults)
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let manager = SettingsManager::from_path(tmp.path().join("config").join("settings.json")).unwrap();
        assert_eq!(manager.load().unwrap(), AppSettings::default());
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let manager = SettingsManager::from_path(tmp.path().join("settings.json")).unwrap();

        let mut settings = AppSettings::default();
        settings.scan.excluded_dirs.push("@eaDir".to_string());
        settings.metadata.read_xmp = false;
        manager.save(&settings).unwrap();

        assert_eq!(manager.load().unwrap(), settings);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, r#"{"scan":{"realtimeWatch":true}}"#).unwrap();

        let settings = SettingsManager::from_path(path).unwrap().load().unwrap();
        assert!(settings.scan.realtime_watch);
        assert_eq!(settings.scan.hint_expiry_secs, 300);
        assert!(settings.metadata.read_xmp);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let err = SettingsManager::from_path(path).unwrap().load().unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
