//! digiscan error handling
//!
//! Defines the application error type shared by every layer of the core.

use serde::Serialize;
use thiserror::Error;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// EXIF parsing error
    #[error("exif error: {0}")]
    Exif(#[from] exif::Error),

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Unsupported format
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Collection location error
    #[error("location error: {0}")]
    Location(String),

    /// Schema creation or migration failure
    #[error("schema error: {0}")]
    Schema(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    General(String),
}

/// Application result alias
pub type AppResult<T> = Result<T, AppError>;

/// What the caller should do after database initialization.
///
/// Opening or migrating the database can fail in ways the core cannot
/// recover from on its own; the host decides whether to keep running
/// without a database or to quit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InitializationAdvice {
    Success,
    ContinueWithoutDatabase,
    AbortImmediately,
}

impl InitializationAdvice {
    pub fn is_success(self) -> bool {
        self == InitializationAdvice::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::FileNotFound("test.jpg".to_string());
        assert_eq!(err.to_string(), "file not found: test.jpg");
    }

    #[test]
    fn test_advice_success() {
        assert!(InitializationAdvice::Success.is_success());
        assert!(!InitializationAdvice::AbortImmediately.is_success());
    }
}
