use crate::collection::CollectionManager;
use crate::models::{NoteTypeId, NoteTypeUsage, TaskKind};
use crate::orchestration::TaskContext;
use crate::tasks::{CollectionTask, TaskResult};

#[derive(Clone, Copy, Debug, Default)]
pub struct LoadNoteTypes;

impl CollectionTask for LoadNoteTypes {
    type Progress = ();
    type Output = Vec<NoteTypeUsage>;

    fn kind(&self) -> TaskKind {
        TaskKind::LoadNoteTypes
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        _context: &TaskContext<()>,
    ) -> TaskResult<Vec<NoteTypeUsage>> {
        manager.collection_mut()?.note_type_usage()
    }
}

/// Deletes a note type together with its notes and cards. Returns the number of cards removed.
#[derive(Clone, Copy, Debug)]
pub struct DeleteNoteType {
    pub id: NoteTypeId,
}

impl CollectionTask for DeleteNoteType {
    type Progress = ();
    type Output = usize;

    fn kind(&self) -> TaskKind {
        TaskKind::DeleteNoteType
    }

    fn run(self, manager: &mut CollectionManager, context: &TaskContext<()>) -> TaskResult<usize> {
        context.check_cancelled()?;
        let removed = manager.collection_mut()?.delete_note_type(self.id)?;
        tracing::info!(note_type = self.id.0, cards = removed, "note type deleted");
        Ok(removed)
    }
}
