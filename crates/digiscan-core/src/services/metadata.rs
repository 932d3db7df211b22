//! Metadata extraction
//!
//! Reads the EXIF container, an embedded XMP packet and the image header of
//! a file. Extraction never fails: unreadable parts simply leave their
//! fields empty.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use exif::{Context, In, Tag, Value};
use image::{ColorType, ImageDecoder, ImageFormat, ImageReader};
use regex::Regex;

use crate::models::{DatabaseCommentType, ImageMetadataRow, ImagePosition, MetadataSettings};
use crate::utils::album_path::file_suffix;

/// Camera raw suffixes.
pub const RAW_SUFFIXES: &[&str] = &[
    "raw", "dng", "cr2", "cr3", "crw", "nef", "nrw", "arw", "srf", "sr2", "orf", "rw2", "pef",
    "srw", "raf", "x3f", "mrw", "kdc", "dcr", "erf", "3fr", "mos",
];

/// Upper bound of bytes searched for an XMP packet.
const XMP_SEARCH_LIMIT: u64 = 4 * 1024 * 1024;

/// EXIF `Rating` (0x4746) lives in IFD0 but has no named constant.
const EXIF_RATING: Tag = Tag(Context::Tiff, 0x4746);

/// Color model of the decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorModel {
    #[default]
    Unknown,
    Rgb,
    Indexed,
    GrayScale,
    Cmyk,
    YCbCr,
    Raw,
}

impl ColorModel {
    pub fn to_db(self) -> i32 {
        match self {
            ColorModel::Unknown => 0,
            ColorModel::Rgb => 1,
            ColorModel::Indexed => 2,
            ColorModel::GrayScale => 3,
            ColorModel::Cmyk => 4,
            ColorModel::YCbCr => 5,
            ColorModel::Raw => 6,
        }
    }
}

/// One comment found in the metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEntry {
    pub comment_type: DatabaseCommentType,
    pub language: String,
    pub text: String,
}

/// Creator and rights fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyrightFields {
    pub creators: Vec<String>,
    /// (language, text)
    pub rights: Vec<(String, String)>,
    pub credit: Option<String>,
    pub source: Option<String>,
}

/// Everything extracted from a single file.
#[derive(Debug, Clone, Default)]
pub struct ExtractedMetadata {
    /// The file could be opened at all
    pub readable: bool,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    pub color_depth: Option<i32>,
    pub color_model: ColorModel,
    pub orientation: Option<i32>,
    pub rating: Option<i32>,
    pub creation_date: Option<NaiveDateTime>,
    pub digitization_date: Option<NaiveDateTime>,
    pub photo: ImageMetadataRow,
    pub position: ImagePosition,
    pub comments: Vec<CommentEntry>,
    pub copyright: CopyrightFields,
    /// IPTC core free-text fields, (property, value)
    pub properties: Vec<(String, String)>,
    /// Slash separated keyword paths
    pub keywords: Vec<String>,
}

/// Metadata extractor
pub struct MetadataExtractor;

impl MetadataExtractor {
    /// Extract all metadata of a file
    pub fn extract(path: &Path, settings: &MetadataSettings) -> ExtractedMetadata {
        let mut metadata = ExtractedMetadata {
            readable: path.is_file() && File::open(path).is_ok(),
            ..Default::default()
        };
        if !metadata.readable {
            return metadata;
        }

        if let Some(exif) = Self::read_exif(path) {
            Self::parse_exif(&exif, &mut metadata, &settings.default_language);
        }

        if settings.read_xmp {
            if let Some(packet) = Self::read_xmp_packet(path) {
                Self::parse_xmp(&packet, &mut metadata, &settings.default_language);
            }
        }

        Self::detect_format(path, &mut metadata);

        metadata
    }

    fn read_exif(path: &Path) -> Option<exif::Exif> {
        let file = File::open(path).ok()?;
        let mut reader = BufReader::new(file);
        exif::Reader::new().read_from_container(&mut reader).ok()
    }

    // -----------------------------------------------------------------
    // EXIF
    // -----------------------------------------------------------------

    fn parse_exif(exif: &exif::Exif, metadata: &mut ExtractedMetadata, default_language: &str) {
        let photo = &mut metadata.photo;
        photo.make = Self::get_string(exif, Tag::Make);
        photo.model = Self::get_string(exif, Tag::Model);
        photo.lens = Self::get_string(exif, Tag::LensModel);
        photo.aperture = Self::get_rational(exif, Tag::FNumber);
        photo.focal_length = Self::get_rational(exif, Tag::FocalLength);
        photo.focal_length_35 = Self::get_uint(exif, Tag::FocalLengthIn35mmFilm).map(f64::from);
        photo.exposure_time = Self::get_rational(exif, Tag::ExposureTime);
        photo.exposure_program = Self::get_uint(exif, Tag::ExposureProgram).map(|v| v as i32);
        photo.exposure_mode = Self::get_uint(exif, Tag::ExposureMode).map(|v| v as i32);
        photo.sensitivity = Self::get_uint(exif, Tag::PhotographicSensitivity).map(|v| v as i32);
        photo.flash = Self::get_uint(exif, Tag::Flash).map(|v| v as i32);
        photo.white_balance = Self::get_uint(exif, Tag::WhiteBalance).map(|v| v as i32);
        photo.metering_mode = Self::get_uint(exif, Tag::MeteringMode).map(|v| v as i32);
        photo.subject_distance = Self::get_rational(exif, Tag::SubjectDistance);

        metadata.width = Self::get_uint(exif, Tag::PixelXDimension)
            .or_else(|| Self::get_uint(exif, Tag::ImageWidth));
        metadata.height = Self::get_uint(exif, Tag::PixelYDimension)
            .or_else(|| Self::get_uint(exif, Tag::ImageLength));

        metadata.orientation = Self::get_uint(exif, Tag::Orientation)
            .filter(|v| (1..=8).contains(v))
            .map(|v| v as i32);

        metadata.creation_date = Self::get_datetime(exif, Tag::DateTimeOriginal)
            .or_else(|| Self::get_datetime(exif, Tag::DateTime));
        metadata.digitization_date = Self::get_datetime(exif, Tag::DateTimeDigitized);

        metadata.rating = Self::get_uint(exif, EXIF_RATING)
            .map(|v| (v as i32).clamp(0, 5));

        if let Some((lat, lon)) = Self::get_gps(exif) {
            metadata.position.latitude_number = Some(lat);
            metadata.position.longitude_number = Some(lon);
            metadata.position.altitude = Self::get_altitude(exif);
        }

        if let Some(description) = Self::get_string(exif, Tag::ImageDescription) {
            metadata.comments.push(CommentEntry {
                comment_type: DatabaseCommentType::Comment,
                language: default_language.to_string(),
                text: description,
            });
        }
        if let Some(artist) = Self::get_string(exif, Tag::Artist) {
            metadata.copyright.creators.push(artist);
        }
        if let Some(copyright) = Self::get_string(exif, Tag::Copyright) {
            metadata
                .copyright
                .rights
                .push((default_language.to_string(), copyright));
        }
    }

    fn get_string(exif: &exif::Exif, tag: Tag) -> Option<String> {
        let field = exif.get_field(tag, In::PRIMARY)?;
        match &field.value {
            Value::Ascii(parts) => {
                let text = parts
                    .iter()
                    .map(|p| String::from_utf8_lossy(p).trim_matches(char::from(0)).trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ");
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            }
            _ => None,
        }
    }

    fn get_uint(exif: &exif::Exif, tag: Tag) -> Option<u32> {
        exif.get_field(tag, In::PRIMARY)?.value.get_uint(0)
    }

    fn get_rational(exif: &exif::Exif, tag: Tag) -> Option<f64> {
        match &exif.get_field(tag, In::PRIMARY)?.value {
            Value::Rational(v) if !v.is_empty() && v[0].denom != 0 => Some(v[0].to_f64()),
            _ => None,
        }
    }

    fn get_datetime(exif: &exif::Exif, tag: Tag) -> Option<NaiveDateTime> {
        match &exif.get_field(tag, In::PRIMARY)?.value {
            Value::Ascii(parts) if !parts.is_empty() => {
                let dt = exif::DateTime::from_ascii(&parts[0]).ok()?;
                let date = NaiveDate::from_ymd_opt(dt.year as i32, dt.month as u32, dt.day as u32)?;
                let time =
                    NaiveTime::from_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)?;
                Some(NaiveDateTime::new(date, time))
            }
            _ => None,
        }
    }

    fn get_gps(exif: &exif::Exif) -> Option<(f64, f64)> {
        let lat = Self::gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S")?;
        let lon = Self::gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W")?;
        Some((lat, lon))
    }

    fn gps_coordinate(exif: &exif::Exif, coord: Tag, reference: Tag, negative: &str) -> Option<f64> {
        let field = exif.get_field(coord, In::PRIMARY)?;
        let degrees = match &field.value {
            Value::Rational(v) if v.len() >= 3 && v.iter().all(|r| r.denom != 0) => {
                v[0].to_f64() + v[1].to_f64() / 60.0 + v[2].to_f64() / 3600.0
            }
            _ => return None,
        };

        let sign = exif
            .get_field(reference, In::PRIMARY)
            .map(|f| f.display_value().to_string())
            .map(|s| s.trim_matches('"').trim().eq_ignore_ascii_case(negative))
            .map(|neg| if neg { -1.0 } else { 1.0 })
            .unwrap_or(1.0);

        Some(degrees * sign)
    }

    fn get_altitude(exif: &exif::Exif) -> Option<f64> {
        let altitude = Self::get_rational(exif, Tag::GPSAltitude)?;
        let below_sea = matches!(
            exif.get_field(Tag::GPSAltitudeRef, In::PRIMARY).map(|f| &f.value),
            Some(Value::Byte(bytes)) if bytes.first() == Some(&1)
        );
        Some(if below_sea { -altitude } else { altitude })
    }

    // -----------------------------------------------------------------
    // XMP
    // -----------------------------------------------------------------

    /// Locate an embedded `<x:xmpmeta>` packet
    fn read_xmp_packet(path: &Path) -> Option<String> {
        let file = File::open(path).ok()?;
        let mut buffer = Vec::new();
        file.take(XMP_SEARCH_LIMIT).read_to_end(&mut buffer).ok()?;

        let start = find_bytes(&buffer, b"<x:xmpmeta")?;
        let end_tag = b"</x:xmpmeta>";
        let end = find_bytes(&buffer[start..], end_tag)? + start + end_tag.len();
        Some(String::from_utf8_lossy(&buffer[start..end]).into_owned())
    }

    fn parse_xmp(packet: &str, metadata: &mut ExtractedMetadata, default_language: &str) {
        if let Some(rating) = xmp_simple(packet, "xmp:Rating").and_then(|r| r.parse::<f64>().ok()) {
            metadata.rating = Some((rating.round() as i32).clamp(0, 5));
        } else if metadata.rating.is_none() {
            // IPTC urgency: 1 is most urgent
            metadata.rating = xmp_simple(packet, "photoshop:Urgency")
                .and_then(|u| u.parse::<i32>().ok())
                .and_then(urgency_to_rating);
        }

        if let Some(date) = xmp_simple(packet, "photoshop:DateCreated")
            .or_else(|| xmp_simple(packet, "exif:DateTimeOriginal"))
            .and_then(|d| parse_xmp_date(&d))
        {
            metadata.creation_date = Some(date);
        }
        if metadata.digitization_date.is_none() {
            metadata.digitization_date = xmp_simple(packet, "xmp:CreateDate")
                .or_else(|| xmp_simple(packet, "exif:DateTimeDigitized"))
                .and_then(|d| parse_xmp_date(&d));
        }

        let mut comments = Vec::new();
        for (name, comment_type) in [
            ("dc:description", DatabaseCommentType::Comment),
            ("dc:title", DatabaseCommentType::Title),
        ] {
            for (lang, text) in xmp_items(packet, name) {
                comments.push(CommentEntry {
                    comment_type,
                    language: lang.unwrap_or_else(|| default_language.to_string()),
                    text,
                });
            }
        }
        if let Some(headline) = xmp_simple(packet, "photoshop:Headline") {
            comments.push(CommentEntry {
                comment_type: DatabaseCommentType::Headline,
                language: default_language.to_string(),
                text: headline,
            });
        }
        if !comments.is_empty() {
            // XMP supersedes the EXIF description
            metadata.comments = comments;
        }

        let creators: Vec<String> = xmp_items(packet, "dc:creator")
            .into_iter()
            .map(|(_, text)| text)
            .collect();
        if !creators.is_empty() {
            metadata.copyright.creators = creators;
        }
        let rights: Vec<(String, String)> = xmp_items(packet, "dc:rights")
            .into_iter()
            .map(|(lang, text)| (lang.unwrap_or_else(|| default_language.to_string()), text))
            .collect();
        if !rights.is_empty() {
            metadata.copyright.rights = rights;
        }
        metadata.copyright.credit = xmp_simple(packet, "photoshop:Credit");
        metadata.copyright.source = xmp_simple(packet, "photoshop:Source");

        for (name, property) in [
            ("Iptc4xmpCore:Location", "location"),
            ("photoshop:City", "city"),
            ("photoshop:State", "provinceState"),
            ("photoshop:Country", "country"),
            ("Iptc4xmpCore:CountryCode", "countryCode"),
            ("photoshop:Instructions", "instructions"),
            ("photoshop:TransmissionReference", "jobId"),
            ("Iptc4xmpCore:IntellectualGenre", "genre"),
        ] {
            if let Some(value) = xmp_simple(packet, name) {
                metadata.properties.push((property.to_string(), value));
            }
        }

        metadata.keywords = Self::xmp_keywords(packet);
    }

    /// Keyword paths, best source first: digiKam tag list, Lightroom
    /// hierarchy, plain dc:subject
    fn xmp_keywords(packet: &str) -> Vec<String> {
        let tags_list: Vec<String> = xmp_items(packet, "digiKam:TagsList")
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        if !tags_list.is_empty() {
            return tags_list;
        }

        let hierarchical: Vec<String> = xmp_items(packet, "lr:hierarchicalSubject")
            .into_iter()
            .map(|(_, t)| t.replace('|', "/"))
            .collect();
        if !hierarchical.is_empty() {
            return hierarchical;
        }

        xmp_items(packet, "dc:subject")
            .into_iter()
            .map(|(_, t)| t.replace('/', "\\"))
            .collect()
    }

    // -----------------------------------------------------------------
    // Image header / format
    // -----------------------------------------------------------------

    /// Dimensions, color information and format name.
    ///
    /// Format order: decoder format, `RAW-<SUFFIX>`, MIME guess from the
    /// suffix, content sniffing.
    fn detect_format(path: &Path, metadata: &mut ExtractedMetadata) {
        let suffix = file_suffix(path).unwrap_or_default();

        if let Some(format) = Self::decode_header(path, metadata) {
            metadata.format = Some(format);
            return;
        }

        if RAW_SUFFIXES.contains(&suffix.as_str()) {
            Self::decode_raw(path, metadata);
            metadata.format = Some(format!("RAW-{}", suffix.to_uppercase()));
            return;
        }

        if let Some(format) = mime_format_for_suffix(&suffix) {
            metadata.format = Some(format.to_string());
            return;
        }

        metadata.format = Self::sniff_format(path).map(|f| format_name(f).to_string());
    }

    fn decode_header(path: &Path, metadata: &mut ExtractedMetadata) -> Option<String> {
        let format = ImageFormat::from_path(path).ok()?;
        let mut reader = ImageReader::open(path).ok()?;
        reader.set_format(format);
        let decoder = reader.into_decoder().ok()?;

        let (width, height) = decoder.dimensions();
        let color_type = decoder.color_type();

        if metadata.width.is_none() || metadata.height.is_none() {
            metadata.width = Some(width);
            metadata.height = Some(height);
        }
        let channels = color_type.channel_count().max(1) as u16;
        metadata.color_depth = Some((color_type.bits_per_pixel() / channels) as i32);
        metadata.color_model = color_model_of(color_type);

        Some(format_name(format).to_string())
    }

    fn decode_raw(path: &Path, metadata: &mut ExtractedMetadata) {
        let raw = match rawloader::decode_file(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!("raw decode failed for {}: {:?}", path.display(), e);
                return;
            }
        };

        if metadata.width.is_none() || metadata.height.is_none() {
            metadata.width = Some(raw.width as u32);
            metadata.height = Some(raw.height as u32);
        }
        metadata.color_model = ColorModel::Raw;
        metadata.color_depth = Some(16);
        if metadata.photo.make.is_none() && !raw.clean_make.is_empty() {
            metadata.photo.make = Some(raw.clean_make.clone());
        }
        if metadata.photo.model.is_none() && !raw.clean_model.is_empty() {
            metadata.photo.model = Some(raw.clean_model.clone());
        }
    }

    fn sniff_format(path: &Path) -> Option<ImageFormat> {
        let file = File::open(path).ok()?;
        let mut header = Vec::with_capacity(64);
        file.take(64).read_to_end(&mut header).ok()?;
        image::guess_format(&header).ok()
    }
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Value of a simple XMP property, written either as attribute or element
fn xmp_simple(packet: &str, name: &str) -> Option<String> {
    let name = regex::escape(name);
    let attribute = Regex::new(&format!(r#"{}\s*=\s*"([^"]*)""#, name)).ok()?;
    if let Some(caps) = attribute.captures(packet) {
        let value = unescape_xml(caps[1].trim());
        return if value.is_empty() { None } else { Some(value) };
    }

    let element = Regex::new(&format!(r"(?s)<{0}>([^<]*)</{0}>", name)).ok()?;
    let caps = element.captures(packet)?;
    let value = unescape_xml(caps[1].trim());
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Items of an XMP array property (`rdf:Bag`, `rdf:Seq`, `rdf:Alt`) with
/// their `xml:lang`, if any
fn xmp_items(packet: &str, name: &str) -> Vec<(Option<String>, String)> {
    let escaped = regex::escape(name);
    let container = match Regex::new(&format!(r"(?s)<{0}(?:\s[^>]*)?>(.*?)</{0}>", escaped)) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };
    let item = match Regex::new(r#"(?s)<rdf:li(?:\s+xml:lang="([^"]*)")?[^>]*>(.*?)</rdf:li>"#) {
        Ok(re) => re,
        Err(_) => return Vec::new(),
    };

    let Some(body) = container.captures(packet) else {
        return Vec::new();
    };

    item.captures_iter(&body[1])
        .filter_map(|caps| {
            let text = unescape_xml(caps[2].trim());
            if text.is_empty() {
                return None;
            }
            Some((caps.get(1).map(|m| m.as_str().to_string()), text))
        })
        .collect()
}

fn parse_xmp_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y:%m:%d %H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn urgency_to_rating(urgency: i32) -> Option<i32> {
    match urgency {
        1 => Some(5),
        2 => Some(4),
        3 | 4 => Some(3),
        5 | 6 => Some(2),
        7 => Some(1),
        8 => Some(0),
        _ => None,
    }
}

fn color_model_of(color_type: ColorType) -> ColorModel {
    match color_type {
        ColorType::L8 | ColorType::L16 | ColorType::La8 | ColorType::La16 => ColorModel::GrayScale,
        ColorType::Rgb8
        | ColorType::Rgba8
        | ColorType::Rgb16
        | ColorType::Rgba16
        | ColorType::Rgb32F
        | ColorType::Rgba32F => ColorModel::Rgb,
        _ => ColorModel::Unknown,
    }
}

/// Short format name stored in `ImageInformation.format`
fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "JPG",
        ImageFormat::Png => "PNG",
        ImageFormat::Gif => "GIF",
        ImageFormat::WebP => "WEBP",
        ImageFormat::Tiff => "TIFF",
        ImageFormat::Bmp => "BMP",
        ImageFormat::Ico => "ICO",
        ImageFormat::Tga => "TGA",
        ImageFormat::Pnm => "PPM",
        ImageFormat::Avif => "AVIF",
        ImageFormat::Hdr => "HDR",
        ImageFormat::OpenExr => "EXR",
        ImageFormat::Dds => "DDS",
        ImageFormat::Qoi => "QOI",
        _ => "IMAGE",
    }
}

/// Format name from a MIME type guessed by suffix, for files the image
/// decoder does not handle
fn mime_format_for_suffix(suffix: &str) -> Option<&'static str> {
    let format = match suffix {
        "mpeg" | "mpg" | "mpe" => "MPEG",
        "mp4" | "m4v" => "MP4",
        "mov" => "QUICKTIME",
        "avi" => "AVI",
        "wmv" | "asf" => "WMV",
        "mkv" => "MATROSKA",
        "webm" => "WEBM",
        "3gp" => "3GPP",
        "mts" | "m2ts" => "MPEG-TS",
        "mp3" => "MP3",
        "ogg" => "OGG",
        "wav" => "WAV",
        "flac" => "FLAC",
        "wma" => "WMA",
        "m4a" | "aac" => "AAC",
        "heic" | "heif" => "HEIF",
        "jp2" => "JP2",
        "xpm" => "XPM",
        _ => return None,
    };
    Some(format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const PACKET: &str = r#"<x:xmpmeta xmlns:x="adobe:ns:meta/">
 <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#">
  <rdf:Description xmp:Rating="4" photoshop:City="Berlin" photoshop:Credit="Agency">
   <dc:subject><rdf:Bag><rdf:li>beach</rdf:li><rdf:li>sea</rdf:li></rdf:Bag></dc:subject>
   <lr:hierarchicalSubject><rdf:Bag><rdf:li>People|John</rdf:li></rdf:Bag></lr:hierarchicalSubject>
   <dc:description><rdf:Alt>
     <rdf:li xml:lang="x-default">A &amp; B</rdf:li>
     <rdf:li xml:lang="de-DE">Ein Bild</rdf:li>
   </rdf:Alt></dc:description>
   <dc:creator><rdf:Seq><rdf:li>Alice</rdf:li></rdf:Seq></dc:creator>
   <photoshop:DateCreated>2019-06-01T12:30:00</photoshop:DateCreated>
  </rdf:Description>
 </rdf:RDF>
</x:xmpmeta>"#;

    #[test]
    fn test_parse_xmp_packet() {
        let mut metadata = ExtractedMetadata::default();
        MetadataExtractor::parse_xmp(PACKET, &mut metadata, "x-default");

        assert_eq!(metadata.rating, Some(4));
        assert_eq!(metadata.keywords, vec!["People/John".to_string()]);
        assert_eq!(metadata.comments.len(), 2);
        assert_eq!(metadata.comments[0].text, "A & B");
        assert_eq!(metadata.comments[1].language, "de-DE");
        assert_eq!(metadata.copyright.creators, vec!["Alice".to_string()]);
        assert_eq!(metadata.copyright.credit.as_deref(), Some("Agency"));
        assert!(metadata
            .properties
            .contains(&("city".to_string(), "Berlin".to_string())));
        assert_eq!(
            metadata.creation_date,
            NaiveDate::from_ymd_opt(2019, 6, 1).unwrap().and_hms_opt(12, 30, 0)
        );
    }

    #[test]
    fn test_urgency_fallback() {
        let packet = r#"<x:xmpmeta><rdf:Description photoshop:Urgency="2"/></x:xmpmeta>"#;
        let mut metadata = ExtractedMetadata::default();
        MetadataExtractor::parse_xmp(packet, &mut metadata, "x-default");
        assert_eq!(metadata.rating, Some(4));
    }

    #[test]
    fn test_extract_png_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.png");
        image::RgbImage::new(4, 3).save(&path).unwrap();

        let metadata = MetadataExtractor::extract(&path, &MetadataSettings::default());
        assert!(metadata.readable);
        assert_eq!(metadata.width, Some(4));
        assert_eq!(metadata.height, Some(3));
        assert_eq!(metadata.format.as_deref(), Some("PNG"));
        assert_eq!(metadata.color_model, ColorModel::Rgb);
        assert_eq!(metadata.color_depth, Some(8));
    }

    #[test]
    fn test_corrupt_file_still_readable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();

        let metadata = MetadataExtractor::extract(&path, &MetadataSettings::default());
        assert!(metadata.readable);
        assert!(metadata.width.is_none());
        assert!(metadata.keywords.is_empty());
    }

    #[test]
    fn test_format_fallbacks() {
        let temp_dir = TempDir::new().unwrap();
        let raw = temp_dir.path().join("img.nef");
        fs::write(&raw, b"garbage").unwrap();
        let video = temp_dir.path().join("clip.mp4");
        fs::write(&video, b"garbage").unwrap();

        let settings = MetadataSettings::default();
        assert_eq!(
            MetadataExtractor::extract(&raw, &settings).format.as_deref(),
            Some("RAW-NEF")
        );
        assert_eq!(
            MetadataExtractor::extract(&video, &settings).format.as_deref(),
            Some("MP4")
        );
    }

    #[test]
    fn test_missing_file_not_readable() {
        let metadata =
            MetadataExtractor::extract(Path::new("/nonexistent/x.jpg"), &MetadataSettings::default());
        assert!(!metadata.readable);
    }
}
