//! digiscan services
//!
//! Volume identification, location management, scanning and the worker
//! that serializes scans.

pub mod hasher;
pub mod metadata;
pub mod volumes;
pub mod collection_manager;
pub mod hints;
pub mod image_scanner;
pub mod collection_scanner;
pub mod scan_controller;
pub mod watcher;
pub mod settings;

pub use hasher::FileHasher;
pub use metadata::{ExtractedMetadata, MetadataExtractor};
pub use volumes::{
    MainThreadDispatcher, SharedDispatcher, SharedVolumeProvider, SolidVolumeInfo,
    StaticVolumeProvider, SysinfoVolumeProvider, VolumeIdentifier, VolumeProvider,
};
pub use collection_manager::{CollectionLocation, CollectionManager, LocationCheck};
pub use hints::{AlbumCopyMoveHint, CopyMoveHint, HintStore, ItemChangeHint, ItemChangeType};
pub use image_scanner::{ImageScanner, ScanContext, ScanOrigin};
pub use collection_scanner::{CollectionScanner, NoOpScanObserver, ScanObserver, ScanReport};
pub use scan_controller::ScanController;
pub use watcher::CollectionWatcher;
pub use settings::SettingsManager;
