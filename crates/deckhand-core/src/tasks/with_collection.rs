use crate::collection::{Collection, CollectionManager};
use crate::models::TaskKind;
use crate::orchestration::TaskContext;
use crate::tasks::{CollectionTask, TaskResult};

/// Runs an ad-hoc closure against the open collection on the worker.
pub struct WithCollection<F> {
    kind: TaskKind,
    operation: F,
}

impl<F> WithCollection<F> {
    pub fn new<R>(operation: F) -> Self
    where
        F: FnOnce(&mut Collection) -> TaskResult<R>,
    {
        Self::named(TaskKind::WithCollection, operation)
    }

    pub fn named<R>(kind: TaskKind, operation: F) -> Self
    where
        F: FnOnce(&mut Collection) -> TaskResult<R>,
    {
        Self { kind, operation }
    }
}

impl<F, R> CollectionTask for WithCollection<F>
where
    F: FnOnce(&mut Collection) -> TaskResult<R> + Send + 'static,
    R: Send + 'static,
{
    type Progress = ();
    type Output = R;

    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn run(self, manager: &mut CollectionManager, _context: &TaskContext<()>) -> TaskResult<R> {
        (self.operation)(manager.collection_mut()?)
    }
}
