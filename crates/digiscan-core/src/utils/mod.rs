//! digiscan utility module
//!
//! Error types and small path helpers shared by the database layer and the
//! scanning services.

pub mod error;
pub mod album_path;

pub use error::*;
pub use album_path::*;
