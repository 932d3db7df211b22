//! digiscan database module
//!
//! Connection management plus the data access layer, split per table group.

pub mod schema;
pub mod connection;
pub mod album_root_dao;
pub mod album_dao;
pub mod image_dao;
pub mod attribute_dao;
pub mod tag_dao;
pub mod search_dao;
pub mod settings_dao;

// Re-export common types
pub use connection::{Database, DatabaseStats, InitObserver, NoOpInitObserver};
