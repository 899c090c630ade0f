use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::collection::{
    ArchiveError, COLLECTION_ENTRY, Collection, CollectionManager, PackageArchive,
};
use crate::models::{CoreError, CoreErrorKind, TaskKind};
use crate::orchestration::TaskContext;
use crate::tasks::{CollectionTask, TaskResult, file_label, remove_if_present};

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ImportedPackage {
    pub file: String,
    pub notes_added: usize,
    pub cards_added: usize,
    pub media_files: usize,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportFailure {
    pub file: String,
    pub error: CoreError,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ImportAddReport {
    pub imported: Vec<ImportedPackage>,
    pub failed: Vec<ImportFailure>,
}

/// Merges packages into the open collection. A package that fails is recorded and the rest
/// are still imported. Progress names the file being imported.
#[derive(Clone, Debug)]
pub struct ImportAdd {
    pub paths: Vec<PathBuf>,
}

impl CollectionTask for ImportAdd {
    type Progress = String;
    type Output = ImportAddReport;

    fn kind(&self) -> TaskKind {
        TaskKind::ImportAdd
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        context: &TaskContext<String>,
    ) -> TaskResult<ImportAddReport> {
        let mut report = ImportAddReport::default();

        for (index, path) in self.paths.iter().enumerate() {
            context.check_cancelled()?;
            let file = file_label(path);
            context.emit(format!("importing {file}"));

            match import_package(manager, path, index, context) {
                Ok(imported) => {
                    tracing::info!(
                        file = %file,
                        notes = imported.notes_added,
                        cards = imported.cards_added,
                        media = imported.media_files,
                        "package imported"
                    );
                    report.imported.push(imported);
                }
                Err(error) if error.is_cancelled() => return Err(error),
                Err(error) => {
                    tracing::warn!(
                        file = %file,
                        kind = ?error.kind,
                        message = %error.message,
                        "package import failed"
                    );
                    report.failed.push(ImportFailure { file, error });
                }
            }
        }

        Ok(report)
    }
}

fn import_package(
    manager: &mut CollectionManager,
    path: &Path,
    index: usize,
    context: &TaskContext<String>,
) -> TaskResult<ImportedPackage> {
    let file = file_label(path);
    let external = |error: ArchiveError| {
        CoreError::new(CoreErrorKind::ExternalResource, error.to_string()).with_resource(&file)
    };

    let archive = PackageArchive::open(path).map_err(external)?;
    let entry = archive.collection_entry().map_err(external)?;
    let staged = manager
        .staging_dir()
        .join(format!("import-{}-{index}.deckhand2", context.task_id().0));
    remove_if_present(&staged).map_err(external)?;
    archive.extract_entry(entry, &staged).map_err(external)?;

    let merged = Collection::validate_file(&staged)
        .map_err(|error| {
            CoreError::new(
                CoreErrorKind::ExternalResource,
                format!("package does not contain a valid collection: {}", error.message),
            )
            .with_resource(&file)
        })
        .and_then(|_| {
            Collection::open(&staged)
                .and_then(Collection::close)
                .map_err(|error| {
                    CoreError::new(CoreErrorKind::ExternalResource, error.message)
                        .with_resource(&file)
                })
        })
        .and_then(|_| {
            context.check_cancelled()?;
            manager.collection_mut()?.merge_from(&staged)
        });
    if let Err(error) = fs::remove_file(&staged) {
        tracing::debug!(path = %staged.display(), message = %error, "failed to remove staged collection");
    }
    let merged = merged?;

    let media_files = import_media(&archive, &manager.media_dir()).map_err(external)?;

    Ok(ImportedPackage {
        file,
        notes_added: merged.notes_added,
        cards_added: merged.cards_added,
        media_files,
    })
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ImportReplaceReport {
    pub media_files: usize,
}

/// Replaces the collection file with the one inside a package.
///
/// Extraction and validation happen in the staging directory first. Renaming the staged file
/// over the collection is the point of no return: failures before it leave the collection
/// untouched and are `ExternalResource` errors, failures after it are
/// `ExternalResourceAfterCommit`. A failed rename leaves the collection closed and locked until
/// a later replacement succeeds.
#[derive(Clone, Debug)]
pub struct ImportReplace {
    pub path: PathBuf,
}

impl CollectionTask for ImportReplace {
    type Progress = String;
    type Output = ImportReplaceReport;

    fn kind(&self) -> TaskKind {
        TaskKind::ImportReplace
    }

    fn requires_open_collection(&self) -> bool {
        false
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        context: &TaskContext<String>,
    ) -> TaskResult<ImportReplaceReport> {
        let file = file_label(&self.path);
        let before_commit = |error: ArchiveError| {
            tracing::error!(file = %file, message = %error, "import failed before replacing collection");
            CoreError::new(CoreErrorKind::ExternalResource, error.to_string()).with_resource(&file)
        };

        context.emit(format!("extracting {file}"));
        let archive = PackageArchive::open(&self.path).map_err(before_commit)?;
        let entry = archive.collection_entry().map_err(before_commit)?;
        let staged = manager.staging_dir().join(COLLECTION_ENTRY);
        remove_if_present(&staged).map_err(before_commit)?;
        archive.extract_entry(entry, &staged).map_err(before_commit)?;

        if let Err(error) = Collection::validate_file(&staged) {
            let _ = fs::remove_file(&staged);
            tracing::error!(file = %file, message = %error.message, "package holds an invalid collection");
            return Err(CoreError::new(
                CoreErrorKind::ExternalResource,
                format!("package does not contain a valid collection: {}", error.message),
            )
            .with_resource(&file));
        }

        if let Err(error) = context.check_cancelled() {
            let _ = fs::remove_file(&staged);
            return Err(error);
        }

        context.emit("replacing collection".to_string());
        manager.close("collection replaced by import")?;
        manager.lock();
        let target = manager.path().to_path_buf();
        if let Err(error) = replace_file(&staged, &target) {
            let _ = fs::remove_file(&staged);
            tracing::error!(
                path = %target.display(),
                message = %error,
                "collection file could not be replaced, leaving it locked"
            );
            return Err(before_commit(ArchiveError::Io(error)));
        }
        manager.unlock();
        tracing::info!(file = %file, path = %target.display(), "collection file replaced");

        context.emit("importing media".to_string());
        let media_files = import_media(&archive, &manager.media_dir()).map_err(|error| {
            tracing::error!(file = %file, message = %error, "media import failed after collection was replaced");
            CoreError::new(CoreErrorKind::ExternalResourceAfterCommit, error.to_string())
                .with_resource(&file)
        })?;

        Ok(ImportReplaceReport { media_files })
    }
}

fn replace_file(staged: &Path, target: &Path) -> std::io::Result<()> {
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::rename(staged, target)
}

/// Copies the package's media files into `media_dir`. Existing files are kept.
pub(crate) fn import_media(archive: &PackageArchive, media_dir: &Path) -> Result<usize, ArchiveError> {
    let map = archive.media_map()?;
    if map.is_empty() {
        return Ok(0);
    }
    fs::create_dir_all(media_dir)?;

    let mut copied = 0;
    for (entry, name) in &map {
        let plain = Path::new(name)
            .file_name()
            .is_some_and(|file_name| file_name == name.as_str());
        if !plain {
            tracing::warn!(entry = %entry, name = %name, "skipping media file with a path in its name");
            continue;
        }
        let target = media_dir.join(name);
        if target.exists() {
            continue;
        }
        archive.extract_entry(entry, &target)?;
        copied += 1;
    }
    Ok(copied)
}
