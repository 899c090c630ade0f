use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

pub const DEFAULT_UNDO_LIMIT: usize = 30;
pub const DEFAULT_LOG_FILTER: &str = "info";
const STAGING_DIR_NAME: &str = "tmpimport";

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckhandConfig {
    pub collection_path: PathBuf,
    pub media_dir: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub undo_limit: usize,
    pub log_filter: String,
}

impl Default for DeckhandConfig {
    fn default() -> Self {
        Self {
            collection_path: PathBuf::from("collection.deckhand2"),
            media_dir: None,
            staging_dir: None,
            undo_limit: DEFAULT_UNDO_LIMIT,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl DeckhandConfig {
    pub fn for_collection(collection_path: impl Into<PathBuf>) -> Self {
        Self {
            collection_path: collection_path.into(),
            ..Self::default()
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("invalid deckhand config: {error}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let raw = fs::read_to_string(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("failed to read deckhand config: {error}"),
            )
            .with_resource(path.display().to_string())
        })?;
        Self::from_json_str(&raw).map_err(|error| error.with_resource(path.display().to_string()))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.collection_path.as_os_str().is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "collection_path must not be empty",
            ));
        }
        if self.undo_limit == 0 {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "undo_limit must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn media_dir(&self) -> PathBuf {
        self.media_dir
            .clone()
            .unwrap_or_else(|| default_media_dir(&self.collection_path))
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(|| sibling_path(&self.collection_path, STAGING_DIR_NAME))
    }
}

pub fn default_media_dir(collection_path: &Path) -> PathBuf {
    let stem = collection_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "collection".to_string());
    sibling_path(collection_path, &format!("{stem}.media"))
}

fn sibling_path(collection_path: &Path, name: &str) -> PathBuf {
    match collection_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(name),
        _ => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::DeckhandConfig;
    use crate::models::CoreErrorKind;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config =
            DeckhandConfig::from_json_str(r#"{"collection_path": "/data/col.deckhand2"}"#)
                .unwrap();

        assert_eq!(config.undo_limit, 30);
        assert_eq!(config.log_filter, "info");
        assert_eq!(config.media_dir(), PathBuf::from("/data/col.media"));
        assert_eq!(config.staging_dir(), PathBuf::from("/data/tmpimport"));
    }

    #[test]
    fn explicit_directories_override_derived_ones() {
        let config = DeckhandConfig::from_json_str(
            r#"{"collection_path": "/data/col.deckhand2", "media_dir": "/media", "staging_dir": "/scratch"}"#,
        )
        .unwrap();

        assert_eq!(config.media_dir(), PathBuf::from("/media"));
        assert_eq!(config.staging_dir(), PathBuf::from("/scratch"));
    }

    #[test]
    fn zero_undo_limit_is_rejected() {
        let error = DeckhandConfig::from_json_str(
            r#"{"collection_path": "col.deckhand2", "undo_limit": 0}"#,
        )
        .unwrap_err();

        assert_eq!(error.kind, CoreErrorKind::InvalidInput);
    }
}
