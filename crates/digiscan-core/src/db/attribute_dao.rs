//! Per-item attribute tables: information, metadata, position, comments,
//! copyright and free-form properties.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use crate::models::{
    from_db_datetime, to_db_datetime, CopyrightInfo, DatabaseCommentType, ImageComment,
    ImageInformation, ImageMetadataRow, ImagePosition, ReplaceMode,
};
use crate::utils::error::AppResult;
use crate::watch::ImageChangeField;

use super::connection::Database;

fn row_to_information(row: &Row<'_>) -> rusqlite::Result<ImageInformation> {
    let creation: Option<String> = row.get("creationDate")?;
    let digitization: Option<String> = row.get("digitizationDate")?;
    Ok(ImageInformation {
        rating: row.get::<_, Option<i32>>("rating")?.unwrap_or(-1),
        creation_date: creation.as_deref().and_then(from_db_datetime),
        digitization_date: digitization.as_deref().and_then(from_db_datetime),
        orientation: row.get("orientation")?,
        width: row.get("width")?,
        height: row.get("height")?,
        format: row.get("format")?,
        color_depth: row.get("colorDepth")?,
        color_model: row.get("colorModel")?,
    })
}

fn row_to_metadata(row: &Row<'_>) -> rusqlite::Result<ImageMetadataRow> {
    Ok(ImageMetadataRow {
        make: row.get("make")?,
        model: row.get("model")?,
        lens: row.get("lens")?,
        aperture: row.get("aperture")?,
        focal_length: row.get("focalLength")?,
        focal_length_35: row.get("focalLength35")?,
        exposure_time: row.get("exposureTime")?,
        exposure_program: row.get("exposureProgram")?,
        exposure_mode: row.get("exposureMode")?,
        sensitivity: row.get("sensitivity")?,
        flash: row.get("flash")?,
        white_balance: row.get("whiteBalance")?,
        metering_mode: row.get("meteringMode")?,
        subject_distance: row.get("subjectDistance")?,
    })
}

fn row_to_position(row: &Row<'_>) -> rusqlite::Result<ImagePosition> {
    Ok(ImagePosition {
        latitude_number: row.get("latitudeNumber")?,
        longitude_number: row.get("longitudeNumber")?,
        altitude: row.get("altitude")?,
        orientation: row.get("orientation")?,
        tilt: row.get("tilt")?,
        roll: row.get("roll")?,
        accuracy: row.get("accuracy")?,
        description: row.get("description")?,
    })
}

fn row_to_comment(row: &Row<'_>) -> rusqlite::Result<ImageComment> {
    let date: Option<String> = row.get("date")?;
    Ok(ImageComment {
        id: row.get("id")?,
        image_id: row.get("imageid")?,
        comment_type: DatabaseCommentType::from_db(row.get("type")?),
        language: row.get("language")?,
        author: row.get("author")?,
        date: date.as_deref().and_then(from_db_datetime),
        comment: row.get("comment")?,
    })
}

impl Database {
    // ---------------------------------------------------------------
    // ImageInformation
    // ---------------------------------------------------------------

    /// Write the full information row of an item, replacing any existing one
    pub fn add_image_information(&self, id: i64, info: &ImageInformation) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                r#"
                INSERT OR REPLACE INTO ImageInformation
                    (imageid, rating, creationDate, digitizationDate, orientation,
                     width, height, format, colorDepth, colorModel)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    id,
                    info.rating,
                    info.creation_date.as_ref().map(to_db_datetime),
                    info.digitization_date.as_ref().map(to_db_datetime),
                    info.orientation,
                    info.width,
                    info.height,
                    info.format,
                    info.color_depth,
                    info.color_model,
                ],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImageInformation);
        Ok(())
    }

    /// Update only the fields that are set in `info` (rating < 0 is unset)
    pub fn change_image_information(&self, id: i64, info: &ImageInformation) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "INSERT OR IGNORE INTO ImageInformation (imageid, rating) VALUES (?1, -1)",
                params![id],
            )?;
            conn.execute(
                r#"
                UPDATE ImageInformation SET
                    rating = CASE WHEN ?2 >= 0 THEN ?2 ELSE rating END,
                    creationDate = COALESCE(?3, creationDate),
                    digitizationDate = COALESCE(?4, digitizationDate),
                    orientation = COALESCE(?5, orientation),
                    width = COALESCE(?6, width),
                    height = COALESCE(?7, height),
                    format = COALESCE(?8, format),
                    colorDepth = COALESCE(?9, colorDepth),
                    colorModel = COALESCE(?10, colorModel)
                WHERE imageid = ?1
                "#,
                params![
                    id,
                    info.rating,
                    info.creation_date.as_ref().map(to_db_datetime),
                    info.digitization_date.as_ref().map(to_db_datetime),
                    info.orientation,
                    info.width,
                    info.height,
                    info.format,
                    info.color_depth,
                    info.color_model,
                ],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImageInformation);
        Ok(())
    }

    pub fn get_image_information(&self, id: i64) -> AppResult<Option<ImageInformation>> {
        let conn = self.connection()?;
        let info = conn
            .query_row(
                "SELECT * FROM ImageInformation WHERE imageid = ?1",
                params![id],
                row_to_information,
            )
            .optional()?;
        Ok(info)
    }

    /// Set the rating (0..=5, -1 clears)
    pub fn set_item_rating(&self, id: i64, rating: i32) -> AppResult<()> {
        let rating = rating.clamp(-1, 5);
        {
            let conn = self.connection()?;
            conn.execute(
                r#"
                INSERT INTO ImageInformation (imageid, rating) VALUES (?1, ?2)
                ON CONFLICT(imageid) DO UPDATE SET rating = excluded.rating
                "#,
                params![id, rating],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImageRating);
        Ok(())
    }

    /// Rating of an item, -1 when none is set
    pub fn get_item_rating(&self, id: i64) -> AppResult<i32> {
        let conn = self.connection()?;
        let rating: Option<Option<i32>> = conn
            .query_row(
                "SELECT rating FROM ImageInformation WHERE imageid = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(rating.flatten().unwrap_or(-1))
    }

    // ---------------------------------------------------------------
    // ImageMetadata / ImagePositions
    // ---------------------------------------------------------------

    pub fn add_image_metadata(&self, id: i64, meta: &ImageMetadataRow) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                r#"
                INSERT OR REPLACE INTO ImageMetadata
                    (imageid, make, model, lens, aperture, focalLength, focalLength35,
                     exposureTime, exposureProgram, exposureMode, sensitivity, flash,
                     whiteBalance, meteringMode, subjectDistance)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                "#,
                params![
                    id,
                    meta.make,
                    meta.model,
                    meta.lens,
                    meta.aperture,
                    meta.focal_length,
                    meta.focal_length_35,
                    meta.exposure_time,
                    meta.exposure_program,
                    meta.exposure_mode,
                    meta.sensitivity,
                    meta.flash,
                    meta.white_balance,
                    meta.metering_mode,
                    meta.subject_distance,
                ],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImageMetadata);
        Ok(())
    }

    pub fn get_image_metadata(&self, id: i64) -> AppResult<Option<ImageMetadataRow>> {
        let conn = self.connection()?;
        let meta = conn
            .query_row(
                "SELECT * FROM ImageMetadata WHERE imageid = ?1",
                params![id],
                row_to_metadata,
            )
            .optional()?;
        Ok(meta)
    }

    pub fn add_image_position(&self, id: i64, position: &ImagePosition) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                r#"
                INSERT OR REPLACE INTO ImagePositions
                    (imageid, latitudeNumber, longitudeNumber, altitude, orientation,
                     tilt, roll, accuracy, description)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    id,
                    position.latitude_number,
                    position.longitude_number,
                    position.altitude,
                    position.orientation,
                    position.tilt,
                    position.roll,
                    position.accuracy,
                    position.description,
                ],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImagePosition);
        Ok(())
    }

    pub fn get_image_position(&self, id: i64) -> AppResult<Option<ImagePosition>> {
        let conn = self.connection()?;
        let position = conn
            .query_row(
                "SELECT * FROM ImagePositions WHERE imageid = ?1",
                params![id],
                row_to_position,
            )
            .optional()?;
        Ok(position)
    }

    // ---------------------------------------------------------------
    // ImageComments
    // ---------------------------------------------------------------

    /// Add a comment entry, returns its id
    pub fn add_image_comment(
        &self,
        id: i64,
        comment_type: DatabaseCommentType,
        language: &str,
        author: Option<&str>,
        date: Option<NaiveDateTime>,
        comment: &str,
    ) -> AppResult<i64> {
        let comment_id = {
            let conn = self.connection()?;
            conn.execute(
                r#"
                INSERT INTO ImageComments (imageid, type, language, author, date, comment)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    id,
                    comment_type.to_db(),
                    language,
                    author,
                    date.as_ref().map(to_db_datetime),
                    comment,
                ],
            )?;
            conn.last_insert_rowid()
        };
        self.watch().image_changed(vec![id], ImageChangeField::ImageComment);
        Ok(comment_id)
    }

    /// Set the comment of one type and language, replacing the previous one
    pub fn set_image_comment(
        &self,
        id: i64,
        comment_type: DatabaseCommentType,
        language: &str,
        author: Option<&str>,
        date: Option<NaiveDateTime>,
        comment: &str,
    ) -> AppResult<i64> {
        let comment_id = self.transaction(|conn| {
            conn.execute(
                "DELETE FROM ImageComments WHERE imageid = ?1 AND type = ?2 AND language = ?3",
                params![id, comment_type.to_db(), language],
            )?;
            conn.execute(
                r#"
                INSERT INTO ImageComments (imageid, type, language, author, date, comment)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    id,
                    comment_type.to_db(),
                    language,
                    author,
                    date.as_ref().map(to_db_datetime),
                    comment,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        self.watch().image_changed(vec![id], ImageChangeField::ImageComment);
        Ok(comment_id)
    }

    pub fn get_image_comments(&self, id: i64) -> AppResult<Vec<ImageComment>> {
        let conn = self.connection()?;
        let mut stmt =
            conn.prepare("SELECT * FROM ImageComments WHERE imageid = ?1 ORDER BY type, language")?;
        let comments = stmt
            .query_map(params![id], row_to_comment)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    pub fn remove_image_comment(&self, comment_id: i64, id: i64) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "DELETE FROM ImageComments WHERE id = ?1 AND imageid = ?2",
                params![comment_id, id],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImageComment);
        Ok(())
    }

    // ---------------------------------------------------------------
    // ImageCopyright
    // ---------------------------------------------------------------

    pub fn set_image_copyright_property(
        &self,
        id: i64,
        property: &str,
        value: &str,
        extra_value: Option<&str>,
        mode: ReplaceMode,
    ) -> AppResult<()> {
        self.transaction(|conn| {
            match mode {
                ReplaceMode::ReplaceAllEntries => {
                    conn.execute(
                        "DELETE FROM ImageCopyright WHERE imageid = ?1 AND property = ?2",
                        params![id, property],
                    )?;
                }
                ReplaceMode::ReplaceLanguageEntry => {
                    conn.execute(
                        "DELETE FROM ImageCopyright WHERE imageid = ?1 AND property = ?2 AND extraValue IS ?3",
                        params![id, property, extra_value],
                    )?;
                }
                ReplaceMode::AddEntryToExisting => {}
            }
            conn.execute(
                r#"
                INSERT OR IGNORE INTO ImageCopyright (imageid, property, value, extraValue)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![id, property, value, extra_value],
            )?;
            Ok(())
        })?;
        self.watch().image_changed(vec![id], ImageChangeField::ImageCopyright);
        Ok(())
    }

    /// Copyright entries of an item, optionally only one property
    pub fn get_image_copyright(
        &self,
        id: i64,
        property: Option<&str>,
    ) -> AppResult<Vec<CopyrightInfo>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT property, value, extraValue FROM ImageCopyright
            WHERE imageid = ?1 AND (?2 IS NULL OR property = ?2)
            ORDER BY property, id
            "#,
        )?;
        let entries = stmt
            .query_map(params![id, property], |row| {
                Ok(CopyrightInfo {
                    property: row.get(0)?,
                    value: row.get(1)?,
                    extra_value: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // ---------------------------------------------------------------
    // ImageProperties
    // ---------------------------------------------------------------

    pub fn set_image_property(&self, id: i64, property: &str, value: &str) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "INSERT OR REPLACE INTO ImageProperties (imageid, property, value) VALUES (?1, ?2, ?3)",
                params![id, property, value],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImageProperties);
        Ok(())
    }

    pub fn get_image_property(&self, id: i64, property: &str) -> AppResult<Option<String>> {
        let conn = self.connection()?;
        let value = conn
            .query_row(
                "SELECT value FROM ImageProperties WHERE imageid = ?1 AND property = ?2",
                params![id, property],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn remove_image_property(&self, id: i64, property: &str) -> AppResult<()> {
        {
            let conn = self.connection()?;
            conn.execute(
                "DELETE FROM ImageProperties WHERE imageid = ?1 AND property = ?2",
                params![id, property],
            )?;
        }
        self.watch().image_changed(vec![id], ImageChangeField::ImageProperties);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Copy
    // ---------------------------------------------------------------

    /// Replace every attribute of `dst_id` with those of `src_id`
    pub fn copy_image_attributes(&self, src_id: i64, dst_id: i64) -> AppResult<()> {
        if src_id == dst_id {
            return Ok(());
        }

        self.transaction(|conn| {
            for (table, columns) in ATTRIBUTE_TABLES {
                conn.execute(
                    &format!("DELETE FROM {} WHERE imageid = ?1", table),
                    params![dst_id],
                )?;
                conn.execute(
                    &format!(
                        "INSERT INTO {table} (imageid, {columns}) \
                         SELECT ?1, {columns} FROM {table} WHERE imageid = ?2",
                        table = table,
                        columns = columns,
                    ),
                    params![dst_id, src_id],
                )?;
            }
            Ok(())
        })?;

        self.watch().image_changed(vec![dst_id], ImageChangeField::AllFields);
        Ok(())
    }
}

/// Per-item attribute tables and the columns copied besides `imageid`.
const ATTRIBUTE_TABLES: [(&str, &str); 7] = [
    (
        "ImageInformation",
        "rating, creationDate, digitizationDate, orientation, width, height, format, \
         colorDepth, colorModel",
    ),
    (
        "ImageMetadata",
        "make, model, lens, aperture, focalLength, focalLength35, exposureTime, \
         exposureProgram, exposureMode, sensitivity, flash, whiteBalance, meteringMode, \
         subjectDistance",
    ),
    (
        "ImagePositions",
        "latitudeNumber, longitudeNumber, altitude, orientation, tilt, roll, accuracy, \
         description",
    ),
    ("ImageComments", "type, language, author, date, comment"),
    ("ImageCopyright", "property, value, extraValue"),
    ("ImageProperties", "property, value"),
    ("ImageTags", "tagid"),
];
