//! Key/value `Settings` table

use rusqlite::{params, OptionalExtension};

use crate::utils::error::AppResult;

use super::connection::Database;

pub const IMAGE_FORMATS_KEY: &str = "databaseImageFormats";
pub const VIDEO_FORMATS_KEY: &str = "databaseVideoFormats";
pub const AUDIO_FORMATS_KEY: &str = "databaseAudioFormats";

/// Suffix lists the scanner uses to decide item categories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatFilters {
    pub image: Vec<String>,
    pub video: Vec<String>,
    pub audio: Vec<String>,
}

impl FormatFilters {
    pub fn contains(&self, suffix: &str) -> bool {
        let suffix = suffix.to_lowercase();
        self.image.contains(&suffix) || self.video.contains(&suffix) || self.audio.contains(&suffix)
    }
}

fn split_filter(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split([';', ' ', ','])
        .map(|s| s.trim().trim_start_matches("*.").trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Database {
    pub fn get_setting(&self, keyword: &str) -> AppResult<Option<String>> {
        let conn = self.connection()?;
        let value: Option<Option<String>> = conn
            .query_row(
                "SELECT value FROM Settings WHERE keyword = ?1",
                params![keyword],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    pub fn set_setting(&self, keyword: &str, value: &str) -> AppResult<()> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO Settings (keyword, value) VALUES (?1, ?2)",
            params![keyword, value],
        )?;
        Ok(())
    }

    /// Image, video and audio suffix filters
    pub fn get_filter_settings(&self) -> AppResult<FormatFilters> {
        Ok(FormatFilters {
            image: split_filter(self.get_setting(IMAGE_FORMATS_KEY)?),
            video: split_filter(self.get_setting(VIDEO_FORMATS_KEY)?),
            audio: split_filter(self.get_setting(AUDIO_FORMATS_KEY)?),
        })
    }

    pub fn set_filter_settings(&self, filters: &FormatFilters) -> AppResult<()> {
        self.set_setting(IMAGE_FORMATS_KEY, &filters.image.join(";"))?;
        self.set_setting(VIDEO_FORMATS_KEY, &filters.video.join(";"))?;
        self.set_setting(AUDIO_FORMATS_KEY, &filters.audio.join(";"))?;
        Ok(())
    }
}
