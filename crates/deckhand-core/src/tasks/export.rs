use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::collection::{
    ArchiveError, COLLECTION_ENTRY, Collection, CollectionManager, PackageArchive,
};
use crate::models::{CoreError, CoreErrorKind, DeckId, TaskKind};
use crate::orchestration::TaskContext;
use crate::tasks::{CollectionTask, TaskResult, file_label, remove_if_present};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ExportReport {
    pub cards: u32,
    pub media_files: usize,
}

/// Writes the collection, or one deck of it, to a package file.
#[derive(Clone, Debug)]
pub struct ExportPackage {
    pub path: PathBuf,
    pub deck: Option<DeckId>,
    pub include_scheduling: bool,
    pub include_media: bool,
}

impl ExportPackage {
    pub fn whole_collection(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            deck: None,
            include_scheduling: true,
            include_media: true,
        }
    }
}

impl CollectionTask for ExportPackage {
    type Progress = String;
    type Output = ExportReport;

    fn kind(&self) -> TaskKind {
        TaskKind::ExportPackage
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        context: &TaskContext<String>,
    ) -> TaskResult<ExportReport> {
        let file = file_label(&self.path);
        let external = |error: ArchiveError| {
            tracing::error!(file = %file, message = %error, "export failed");
            CoreError::new(CoreErrorKind::ExternalResource, error.to_string()).with_resource(&file)
        };

        let staged = manager.staging_dir().join(format!(
            "export-{}.deckhand2",
            context.task_id().0
        ));
        let media_dir = manager.media_dir();
        let collection = manager.collection_mut()?;

        if let Some(deck) = self.deck
            && collection.deck(deck)?.is_none()
        {
            return Err(CoreError::new(
                CoreErrorKind::PreconditionFailure,
                format!("deck '{}' does not exist", deck.0),
            ));
        }

        context.emit("copying collection".to_string());
        prepare_parent(&staged).map_err(external)?;
        remove_if_present(&staged).map_err(external)?;
        collection
            .export_copy(&staged)
            .map_err(|error| retag_external(error, &file))?;

        let partial = self
            .path
            .with_file_name(format!(".{file}.export-{}", context.task_id().0));
        let written = self
            .write_package(&staged, &partial, &media_dir, context)
            .and_then(|report| {
                context.check_cancelled()?;
                fs::rename(&partial, &self.path)
                    .map_err(|error| external(ArchiveError::Io(error)))?;
                Ok(report)
            });
        let _ = fs::remove_file(&staged);
        match written {
            Ok(report) => {
                tracing::info!(
                    file = %file,
                    cards = report.cards,
                    media = report.media_files,
                    "package exported"
                );
                Ok(report)
            }
            Err(error) => {
                let _ = fs::remove_file(&partial);
                Err(error)
            }
        }
    }
}

impl ExportPackage {
    /// Builds the package at `partial`; the target path is left alone.
    fn write_package(
        &self,
        staged: &Path,
        partial: &Path,
        media_dir: &Path,
        context: &TaskContext<String>,
    ) -> TaskResult<ExportReport> {
        let file = file_label(&self.path);
        let external = |error: ArchiveError| {
            CoreError::new(CoreErrorKind::ExternalResource, error.to_string()).with_resource(&file)
        };

        let cards = {
            let mut copy = Collection::open(staged).map_err(|error| retag_external(error, &file))?;
            copy.transact("export_filter", |tx| {
                if let Some(deck) = self.deck {
                    tx.retain_deck(deck)?;
                }
                if !self.include_scheduling {
                    tx.reset_scheduling()?;
                }
                Ok(())
            })
            .map_err(|error| retag_external(error, &file))?;
            let cards = copy.card_count()?;
            copy.close().map_err(|error| retag_external(error, &file))?;
            cards
        };
        context.check_cancelled()?;

        context.emit(format!("writing {file}"));
        prepare_parent(partial).map_err(external)?;
        remove_if_present(partial).map_err(external)?;
        let archive = PackageArchive::create(partial).map_err(external)?;
        archive.add_file(COLLECTION_ENTRY, staged).map_err(external)?;

        let mut media = BTreeMap::new();
        if self.include_media {
            for (index, source) in media_files(media_dir).map_err(external)?.into_iter().enumerate() {
                context.check_cancelled()?;
                let entry = index.to_string();
                archive.add_file(&entry, &source).map_err(external)?;
                media.insert(entry, file_label(&source));
            }
        }
        archive.write_media_map(&media).map_err(external)?;

        Ok(ExportReport {
            cards,
            media_files: media.len(),
        })
    }
}

fn media_files(media_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
    if !media_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(media_dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn prepare_parent(path: &Path) -> Result<(), ArchiveError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn retag_external(error: CoreError, file: &str) -> CoreError {
    CoreError::new(CoreErrorKind::ExternalResource, error.message).with_resource(file)
}
