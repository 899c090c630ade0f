use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use thiserror::Error;

use crate::collection::unix_now;

pub const COLLECTION_ENTRY: &str = "collection.deckhand2";
pub const LEGACY_COLLECTION_ENTRY: &str = "collection.deckhand";
pub const MEDIA_MAP_ENTRY: &str = "media";

const ENTRY_MODE: i64 = 0o100644;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("package archive sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("file is not a package archive")]
    NotAnArchive,
    #[error("package archive already exists")]
    AlreadyExists,
    #[error("package archive has no entry named '{0}'")]
    MissingEntry(String),
    #[error("package archive entry '{0}' is compressed")]
    CompressedEntry(String),
    #[error("package archive media map is invalid: {0}")]
    MediaMap(#[from] serde_json::Error),
    #[error("package archive io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A package file: an SQLite archive holding the collection, a media map, and media files.
pub struct PackageArchive {
    connection: Connection,
}

impl PackageArchive {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let path = path.into();
        if path.exists() {
            return Err(ArchiveError::AlreadyExists);
        }
        let connection = Connection::open(&path)?;
        connection.execute_batch(
            "
CREATE TABLE IF NOT EXISTS sqlar (
    name TEXT PRIMARY KEY,
    mode INT,
    mtime INT,
    sz INT,
    data BLOB
);
",
        )?;
        Ok(Self { connection })
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let path = path.into();
        if !path.is_file() {
            return Err(ArchiveError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "package archive does not exist",
            )));
        }
        let connection = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let tables: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'sqlar'",
                [],
                |row| row.get(0),
            )
            .map_err(|_| ArchiveError::NotAnArchive)?;
        if tables == 0 {
            return Err(ArchiveError::NotAnArchive);
        }
        Ok(Self { connection })
    }

    pub fn entry_names(&self) -> Result<Vec<String>, ArchiveError> {
        let mut statement = self.connection.prepare("SELECT name FROM sqlar ORDER BY name")?;
        let rows = statement.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    pub fn has_entry(&self, name: &str) -> Result<bool, ArchiveError> {
        let found: Option<i64> = self
            .connection
            .query_row("SELECT 1 FROM sqlar WHERE name = ?1", [name], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>, ArchiveError> {
        let entry: Option<(i64, Vec<u8>)> = self
            .connection
            .query_row(
                "SELECT sz, data FROM sqlar WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((size, data)) = entry else {
            return Err(ArchiveError::MissingEntry(name.to_string()));
        };
        if usize::try_from(size).ok() != Some(data.len()) {
            return Err(ArchiveError::CompressedEntry(name.to_string()));
        }
        Ok(data)
    }

    pub fn extract_entry(&self, name: &str, target: &Path) -> Result<(), ArchiveError> {
        let data = self.read_entry(name)?;
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, data)?;
        Ok(())
    }

    pub fn write_entry(&self, name: &str, data: &[u8]) -> Result<(), ArchiveError> {
        let size = i64::try_from(data.len()).unwrap_or(i64::MAX);
        self.connection.execute(
            "INSERT OR REPLACE INTO sqlar (name, mode, mtime, sz, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![name, ENTRY_MODE, unix_now(), size, data],
        )?;
        Ok(())
    }

    pub fn add_file(&self, name: &str, source: &Path) -> Result<(), ArchiveError> {
        let data = fs::read(source)?;
        self.write_entry(name, &data)
    }

    /// Name of the collection entry, preferring the current name over the legacy one.
    pub fn collection_entry(&self) -> Result<&'static str, ArchiveError> {
        if self.has_entry(COLLECTION_ENTRY)? {
            return Ok(COLLECTION_ENTRY);
        }
        if self.has_entry(LEGACY_COLLECTION_ENTRY)? {
            return Ok(LEGACY_COLLECTION_ENTRY);
        }
        Err(ArchiveError::MissingEntry(COLLECTION_ENTRY.to_string()))
    }

    /// Entry number to media file name. A package without a media map has no media.
    pub fn media_map(&self) -> Result<BTreeMap<String, String>, ArchiveError> {
        if !self.has_entry(MEDIA_MAP_ENTRY)? {
            return Ok(BTreeMap::new());
        }
        let raw = self.read_entry(MEDIA_MAP_ENTRY)?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn write_media_map(&self, map: &BTreeMap<String, String>) -> Result<(), ArchiveError> {
        let raw = serde_json::to_vec(map)?;
        self.write_entry(MEDIA_MAP_ENTRY, &raw)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::{SystemTime, UNIX_EPOCH};

    use super::{ArchiveError, COLLECTION_ENTRY, LEGACY_COLLECTION_ENTRY, PackageArchive};

    fn temp_archive(test_name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("deckhand-archive-{test_name}-{nanos}.pkg"))
    }

    #[test]
    fn legacy_collection_entry_is_used_when_current_is_absent() {
        let path = temp_archive("legacy");
        let archive = PackageArchive::create(&path).unwrap();
        archive.write_entry(LEGACY_COLLECTION_ENTRY, b"old").unwrap();

        assert_eq!(archive.collection_entry().unwrap(), LEGACY_COLLECTION_ENTRY);

        archive.write_entry(COLLECTION_ENTRY, b"new").unwrap();
        assert_eq!(archive.collection_entry().unwrap(), COLLECTION_ENTRY);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_entry_names_the_entry() {
        let path = temp_archive("missing");
        let archive = PackageArchive::create(&path).unwrap();

        let error = archive.read_entry("3").unwrap_err();
        assert!(matches!(error, ArchiveError::MissingEntry(ref name) if name == "3"));
        assert!(archive.media_map().unwrap().is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn media_map_is_read_back_from_json() {
        let path = temp_archive("media-map");
        let archive = PackageArchive::create(&path).unwrap();
        let map = BTreeMap::from([("0".to_string(), "cat.png".to_string())]);
        archive.write_media_map(&map).unwrap();
        drop(archive);

        let reopened = PackageArchive::open(&path).unwrap();
        assert_eq!(reopened.media_map().unwrap(), map);
        let _ = std::fs::remove_file(path);
    }
}
