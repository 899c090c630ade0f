pub mod batch;
pub mod export;
pub mod import;
pub mod maintenance;
pub mod note_types;
pub mod review;
pub mod with_collection;

pub use batch::{CardBatchOperation, ChangeDeck, DismissCards, SuspendCards};
pub use export::{ExportPackage, ExportReport};
pub use import::{ImportAdd, ImportAddReport, ImportFailure, ImportReplace, ImportReplaceReport, ImportedPackage};
pub use maintenance::{CheckDatabase, CheckReport, FindEmptyCards};
pub use note_types::{DeleteNoteType, LoadNoteTypes};
pub use review::{AnswerCard, LoadDeckCounts, ResetScheduler, UndoLast};
pub use with_collection::WithCollection;

use std::fs;
use std::path::Path;

use crate::collection::{ArchiveError, CollectionManager};
use crate::models::{CoreError, TaskKind};
use crate::orchestration::TaskContext;

pub type TaskResult<T> = Result<T, CoreError>;

/// One background operation against the collection.
///
/// `run` is called at most once, on the collection worker. When `requires_open_collection` is
/// true the collection is already open; otherwise `run` manages the store itself.
pub trait CollectionTask: Send + 'static {
    type Progress: Send + 'static;
    type Output: Send + 'static;

    fn kind(&self) -> TaskKind;

    fn requires_open_collection(&self) -> bool {
        true
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        context: &TaskContext<Self::Progress>,
    ) -> TaskResult<Self::Output>;
}

pub(crate) fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub(crate) fn remove_if_present(path: &Path) -> Result<(), ArchiveError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(ArchiveError::Io(error)),
    }
}
