//! Album path helpers
//!
//! Album paths are stored relative to their album root, always starting
//! with `/` and never ending with one (except the root album itself, `/`).

use std::path::{Path, PathBuf};

/// Normalize a relative album path: forward slashes, leading `/`, no
/// trailing `/`, no empty segments.
pub fn normalize_album_path(relative: &str) -> String {
    let segments: Vec<&str> = relative
        .split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Relative album path of `path` inside `root`, or `None` if `path` is not
/// below `root`.
pub fn relative_album_path(root: &Path, path: &Path) -> Option<String> {
    let rest = path.strip_prefix(root).ok()?;
    let joined = rest
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Some(normalize_album_path(&joined))
}

/// Absolute file system path of an album.
pub fn album_absolute_path(root: &Path, relative: &str) -> PathBuf {
    let normalized = normalize_album_path(relative);
    let mut path = root.to_path_buf();
    for segment in normalized.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path
}

/// Parent of a relative album path; the root album has no parent.
pub fn parent_album_path(relative: &str) -> Option<String> {
    let normalized = normalize_album_path(relative);
    if normalized == "/" {
        return None;
    }
    match normalized.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(normalized[..idx].to_string()),
        None => None,
    }
}

/// Whether `child` lies strictly below `parent` in album path terms.
pub fn is_sub_album_path(parent: &str, child: &str) -> bool {
    let parent = normalize_album_path(parent);
    let child = normalize_album_path(child);
    if parent == child {
        return false;
    }
    if parent == "/" {
        return true;
    }
    child.starts_with(&format!("{}/", parent))
}

/// Lowercased file suffix without the dot.
pub fn file_suffix(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}
