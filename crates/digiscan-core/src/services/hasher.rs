//! Content fingerprint ("unique hash") of collection files.
//!
//! Hashing the whole file is too slow for large videos and raw files, so
//! the fingerprint covers the head and tail of the file plus its size.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use xxhash_rust::xxh3::Xxh3;

use crate::utils::error::{AppError, AppResult};

/// Bytes taken from the beginning and from the end of a file.
pub const UNIQUE_HASH_CHUNK: u64 = 100 * 1024;

/// Fingerprint calculator
pub struct FileHasher;

impl FileHasher {
    /// Unique hash and size of a file
    pub fn unique_hash(path: &Path) -> AppResult<(String, i64)> {
        if !path.exists() {
            return Err(AppError::FileNotFound(path.display().to_string()));
        }

        let file = File::open(path).map_err(|e| {
            AppError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot open {}: {}", path.display(), e),
            ))
        })?;
        let size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        Ok((Self::hash_reader(&mut reader, size)?, size as i64))
    }

    /// Fingerprint of an already opened stream of `size` bytes
    pub fn hash_reader<R: Read + Seek>(reader: &mut R, size: u64) -> AppResult<String> {
        let mut hasher = Xxh3::new();

        if size <= 2 * UNIQUE_HASH_CHUNK {
            let mut buffer = Vec::with_capacity(size as usize);
            reader.read_to_end(&mut buffer)?;
            hasher.update(&buffer);
        } else {
            let mut buffer = vec![0u8; UNIQUE_HASH_CHUNK as usize];
            reader.read_exact(&mut buffer)?;
            hasher.update(&buffer);

            reader.seek(SeekFrom::End(-(UNIQUE_HASH_CHUNK as i64)))?;
            reader.read_exact(&mut buffer)?;
            hasher.update(&buffer);
        }

        hasher.update(&size.to_le_bytes());
        Ok(format!("{:032x}", hasher.digest128()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_unique_hash() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.jpg");
        fs::write(&file_path, b"Hello, World!").unwrap();

        let (hash, size) = FileHasher::unique_hash(&file_path).unwrap();
        assert_eq!(hash.len(), 32);
        assert_eq!(size, 13);

        let (again, _) = FileHasher::unique_hash(&file_path).unwrap();
        assert_eq!(hash, again);
    }

    #[test]
    fn test_same_content_different_name() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.jpg");
        let b = temp_dir.path().join("b.jpg");
        fs::write(&a, vec![7u8; 300_000]).unwrap();
        fs::write(&b, vec![7u8; 300_000]).unwrap();

        assert_eq!(
            FileHasher::unique_hash(&a).unwrap(),
            FileHasher::unique_hash(&b).unwrap()
        );
    }

    #[test]
    fn test_tail_change_detected() {
        let temp_dir = TempDir::new().unwrap();
        let a = temp_dir.path().join("a.raw");
        let b = temp_dir.path().join("b.raw");
        let mut content = vec![1u8; 500_000];
        fs::write(&a, &content).unwrap();
        content[499_999] = 2;
        fs::write(&b, &content).unwrap();

        assert_ne!(
            FileHasher::unique_hash(&a).unwrap().0,
            FileHasher::unique_hash(&b).unwrap().0
        );
    }

    #[test]
    fn test_missing_file() {
        let result = FileHasher::unique_hash(Path::new("/nonexistent/file.jpg"));
        assert!(matches!(result, Err(AppError::FileNotFound(_))));
    }
}
