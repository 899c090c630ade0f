use std::path::{Path, PathBuf};

use crate::collection::{Collection, CollectionResult};
use crate::config::DeckhandConfig;
use crate::models::{CoreError, CoreErrorKind};

/// The shared store handle. Only the collection worker holds one.
pub struct CollectionManager {
    config: DeckhandConfig,
    collection: Option<Collection>,
    locked: bool,
}

impl CollectionManager {
    pub fn new(config: DeckhandConfig) -> Self {
        Self {
            config,
            collection: None,
            locked: false,
        }
    }

    pub fn from_config(config: DeckhandConfig) -> CollectionResult<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    pub fn for_path(collection_path: impl Into<PathBuf>) -> Self {
        Self::new(DeckhandConfig::for_collection(collection_path))
    }

    pub fn config(&self) -> &DeckhandConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.collection_path
    }

    pub fn media_dir(&self) -> PathBuf {
        self.config.media_dir()
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.config.staging_dir()
    }

    pub fn is_open(&self) -> bool {
        self.collection.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns the open collection, opening it first when needed. Fails while the collection file
    /// is locked for replacement.
    pub fn open_on_demand(&mut self) -> CollectionResult<&mut Collection> {
        if self.locked {
            return Err(CoreError::new(
                CoreErrorKind::StoreUnavailable,
                "collection is locked while its file is being replaced",
            )
            .with_resource(self.path().display().to_string()));
        }

        if self.collection.is_none() {
            let collection =
                Collection::open_with_undo_limit(self.path(), self.config.undo_limit).map_err(
                    |error| {
                        tracing::error!(
                            path = %self.config.collection_path.display(),
                            message = %error.message,
                            "collection could not be opened"
                        );
                        CoreError::new(
                            CoreErrorKind::StoreUnavailable,
                            format!("collection could not be opened: {}", error.message),
                        )
                        .with_resource(self.config.collection_path.display().to_string())
                    },
                )?;
            tracing::info!(path = %self.config.collection_path.display(), "collection opened");
            self.collection = Some(collection);
        }

        self.collection_mut()
    }

    pub fn collection_mut(&mut self) -> CollectionResult<&mut Collection> {
        self.collection.as_mut().ok_or_else(|| {
            CoreError::new(CoreErrorKind::StoreUnavailable, "collection is not open")
        })
    }

    /// Closes the collection if it is open. Undo history and review-queue state go with it.
    pub fn close(&mut self, reason: &str) -> CollectionResult<()> {
        let Some(collection) = self.collection.take() else {
            return Ok(());
        };
        tracing::info!(path = %self.config.collection_path.display(), reason, "closing collection");
        collection.close()
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }
}
