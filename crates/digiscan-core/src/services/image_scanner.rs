//! Per-file scanning
//!
//! [`ImageScanner`] fills the database rows describing one file. A new
//! file first tries to inherit the attributes of a known item (copy/move
//! hint, then identical content); only when neither exists is the file's
//! metadata extracted.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::db::settings_dao::FormatFilters;
use crate::db::Database;
use crate::models::{
    system_time_to_naive, DatabaseItemCategory, DatabaseItemStatus,
    ImageInformation, ItemScanInfo, MetadataSettings, ReplaceMode,
};
use crate::utils::album_path::file_suffix;
use crate::utils::error::{AppError, AppResult};

use super::hasher::FileHasher;
use super::metadata::{ExtractedMetadata, MetadataExtractor};

pub const COPYRIGHT_CREATOR: &str = "creator";
pub const COPYRIGHT_NOTICE: &str = "copyrightNotice";
pub const COPYRIGHT_PROVIDER: &str = "provider";
pub const COPYRIGHT_SOURCE: &str = "source";

/// Settings shared by every file of one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanContext {
    pub filters: FormatFilters,
    pub metadata: MetadataSettings,
}

impl ScanContext {
    pub fn from_database(db: &Database, metadata: MetadataSettings) -> AppResult<Self> {
        Ok(Self {
            filters: db.get_filter_settings()?,
            metadata,
        })
    }

    /// Category by suffix, `None` when the file is not part of the collection
    pub fn category_for(&self, path: &Path) -> Option<DatabaseItemCategory> {
        let suffix = file_suffix(path)?;
        if self.filters.image.contains(&suffix) {
            Some(DatabaseItemCategory::Image)
        } else if self.filters.video.contains(&suffix) {
            Some(DatabaseItemCategory::Video)
        } else if self.filters.audio.contains(&suffix) {
            Some(DatabaseItemCategory::Audio)
        } else {
            None
        }
    }
}

/// Size, fingerprint and modification time of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileAttributes {
    size: i64,
    hash: String,
    modified: Option<NaiveDateTime>,
}

/// How an item got its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrigin {
    /// Inherited from the hinted source item
    Hint(i64),
    /// Inherited from an item with identical content
    ContentMatch(i64),
    /// Extracted from the file
    Extracted,
    /// Only hard attributes were refreshed
    Modified,
}

/// Scanner for one file.
pub struct ImageScanner<'a> {
    db: &'a Database,
    context: &'a ScanContext,
    path: PathBuf,
    info: Option<ItemScanInfo>,
    attributes: Option<FileAttributes>,
    metadata: Option<ExtractedMetadata>,
    origin: Option<ScanOrigin>,
}

impl<'a> ImageScanner<'a> {
    /// Scanner for a file not yet in the database
    pub fn new(db: &'a Database, context: &'a ScanContext, path: &Path) -> Self {
        Self {
            db,
            context,
            path: path.to_path_buf(),
            info: None,
            attributes: None,
            metadata: None,
            origin: None,
        }
    }

    /// Scanner for an existing item
    pub fn for_item(
        db: &'a Database,
        context: &'a ScanContext,
        path: &Path,
        id: i64,
    ) -> AppResult<Self> {
        let info = db
            .get_item_scan_info(id)?
            .ok_or_else(|| AppError::General(format!("no item with id {}", id)))?;
        let mut scanner = Self::new(db, context, path);
        scanner.info = Some(info);
        Ok(scanner)
    }

    pub fn id(&self) -> Option<i64> {
        self.info.as_ref().map(|i| i.id)
    }

    pub fn origin(&self) -> Option<ScanOrigin> {
        self.origin
    }

    fn file_name(&self) -> AppResult<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| AppError::InvalidPath(self.path.display().to_string()))
    }

    fn category(&self) -> DatabaseItemCategory {
        self.context
            .category_for(&self.path)
            .unwrap_or(DatabaseItemCategory::Other)
    }

    fn load_attributes(&mut self) -> AppResult<FileAttributes> {
        if let Some(attrs) = &self.attributes {
            return Ok(attrs.clone());
        }

        let fs_meta = std::fs::metadata(&self.path)
            .map_err(|_| AppError::FileNotFound(self.path.display().to_string()))?;
        let modified = fs_meta.modified().ok().map(system_time_to_naive);

        let (hash, size) = match FileHasher::unique_hash(&self.path) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("cannot hash {}: {}", self.path.display(), e);
                (String::new(), fs_meta.len() as i64)
            }
        };

        let attrs = FileAttributes {
            size,
            hash,
            modified,
        };
        self.attributes = Some(attrs.clone());
        Ok(attrs)
    }

    fn insert_row(&mut self, album_id: i64) -> AppResult<i64> {
        let name = self.file_name()?;
        let category = self.category();
        let attrs = self.load_attributes()?;

        let id = self.db.add_item(
            album_id,
            &name,
            DatabaseItemStatus::Visible,
            category,
            attrs.modified,
            attrs.size,
            &attrs.hash,
        )?;

        self.info = Some(ItemScanInfo {
            id,
            album_id: Some(album_id),
            item_name: name,
            status: DatabaseItemStatus::Visible,
            category,
            modification_date: attrs.modified,
            file_size: attrs.size,
            unique_hash: attrs.hash,
        });
        Ok(id)
    }

    fn require_id(&self) -> AppResult<i64> {
        self.id()
            .ok_or_else(|| AppError::General("scanner has no item".to_string()))
    }

    /// Register a new file. Attributes come from an identical item when
    /// one exists, otherwise from the file.
    pub fn new_file(&mut self, album_id: i64) -> AppResult<()> {
        let id = self.insert_row(album_id)?;
        let attrs = self.load_attributes()?;

        if !attrs.hash.is_empty() {
            let best = self
                .db
                .get_items_with_unique_hash(&attrs.hash, attrs.size)?
                .into_iter()
                .find(|candidate| candidate.id != id);

            if let Some(source) = best {
                tracing::debug!(
                    "{} matches item {} by content",
                    self.path.display(),
                    source.id
                );
                self.db.copy_image_attributes(source.id, id)?;
                self.origin = Some(ScanOrigin::ContentMatch(source.id));
                return Ok(());
            }
        }

        self.metadata = Some(MetadataExtractor::extract(&self.path, &self.context.metadata));
        self.origin = Some(ScanOrigin::Extracted);
        Ok(())
    }

    /// Register a new file and always extract its metadata
    pub fn new_file_fully(&mut self, album_id: i64) -> AppResult<()> {
        self.insert_row(album_id)?;
        self.metadata = Some(MetadataExtractor::extract(&self.path, &self.context.metadata));
        self.origin = Some(ScanOrigin::Extracted);
        Ok(())
    }

    /// Register a new file as a copy of `src_id`
    pub fn copied_from(&mut self, album_id: i64, src_id: i64) -> AppResult<()> {
        let id = self.insert_row(album_id)?;
        self.db.copy_image_attributes(src_id, id)?;
        self.origin = Some(ScanOrigin::Hint(src_id));
        Ok(())
    }

    /// Refresh size, fingerprint and modification date only
    pub fn file_modified(&mut self) -> AppResult<()> {
        let id = self.require_id()?;
        let category = self.category();
        let attrs = self.load_attributes()?;

        self.db
            .update_item(id, category, attrs.modified, attrs.size, &attrs.hash)?;
        if let Some(info) = self.info.as_mut() {
            info.category = category;
            info.modification_date = attrs.modified;
            info.file_size = attrs.size;
            info.unique_hash = attrs.hash;
        }
        self.origin = Some(ScanOrigin::Modified);
        Ok(())
    }

    /// Extract everything again, ignoring identity shortcuts
    pub fn full_scan(&mut self) -> AppResult<()> {
        self.file_modified()?;
        self.metadata = Some(MetadataExtractor::extract(&self.path, &self.context.metadata));
        self.origin = Some(ScanOrigin::Extracted);
        Ok(())
    }

    /// Write pending metadata. Returns the item id.
    pub fn commit(&mut self) -> AppResult<i64> {
        let id = self.require_id()?;
        if let Some(metadata) = self.metadata.take() {
            self.write_metadata(id, &metadata)?;
        }
        Ok(id)
    }

    fn write_metadata(&self, id: i64, metadata: &ExtractedMetadata) -> AppResult<()> {
        if !metadata.readable {
            tracing::warn!("{} is unreadable, keeping file attributes only", self.path.display());
        }

        let modified = self.attributes.as_ref().and_then(|a| a.modified);
        let info = ImageInformation {
            rating: metadata.rating.unwrap_or(-1),
            creation_date: metadata.creation_date.or(modified),
            digitization_date: metadata.digitization_date,
            orientation: metadata.orientation,
            width: metadata.width.map(|w| w as i32),
            height: metadata.height.map(|h| h as i32),
            format: metadata.format.clone(),
            color_depth: metadata.color_depth,
            color_model: Some(metadata.color_model.to_db()),
        };
        self.db.add_image_information(id, &info)?;

        if !metadata.photo.is_empty() {
            self.db.add_image_metadata(id, &metadata.photo)?;
        }
        if metadata.position.is_valid() {
            self.db.add_image_position(id, &metadata.position)?;
        }

        for entry in &metadata.comments {
            let language = if entry.language.is_empty() {
                self.context.metadata.default_language.as_str()
            } else {
                entry.language.as_str()
            };
            self.db
                .set_image_comment(id, entry.comment_type, language, None, None, &entry.text)?;
        }

        self.write_copyright(id, metadata)?;

        for (property, value) in &metadata.properties {
            self.db.set_image_property(id, property, value)?;
        }

        if !metadata.keywords.is_empty() {
            let tag_ids = self.db.get_tags_from_tag_paths(&metadata.keywords, true)?;
            self.db.add_tags_to_items(&[id], &tag_ids)?;
        }

        Ok(())
    }

    fn write_copyright(&self, id: i64, metadata: &ExtractedMetadata) -> AppResult<()> {
        let copyright = &metadata.copyright;

        if !copyright.creators.is_empty() {
            let existing = self.db.get_image_copyright(id, Some(COPYRIGHT_CREATOR))?;
            for creator in &copyright.creators {
                if existing.iter().any(|c| &c.value == creator) {
                    continue;
                }
                self.db.set_image_copyright_property(
                    id,
                    COPYRIGHT_CREATOR,
                    creator,
                    None,
                    ReplaceMode::AddEntryToExisting,
                )?;
            }
        }

        for (language, text) in &copyright.rights {
            self.db.set_image_copyright_property(
                id,
                COPYRIGHT_NOTICE,
                text,
                Some(language),
                ReplaceMode::ReplaceLanguageEntry,
            )?;
        }

        if let Some(credit) = &copyright.credit {
            self.db.set_image_copyright_property(
                id,
                COPYRIGHT_PROVIDER,
                credit,
                None,
                ReplaceMode::ReplaceAllEntries,
            )?;
        }
        if let Some(source) = &copyright.source {
            self.db.set_image_copyright_property(
                id,
                COPYRIGHT_SOURCE,
                source,
                None,
                ReplaceMode::ReplaceAllEntries,
            )?;
        }

        Ok(())
    }
}
