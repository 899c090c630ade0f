use crate::collection::{CollectionManager, today};
use crate::models::{Card, CardId, DeckCounts, Ease, TaskKind, UndoOutcome};
use crate::orchestration::TaskContext;
use crate::tasks::{CollectionTask, TaskResult};

/// New, learning and due counts for every deck. Progress is the number of decks counted.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoadDeckCounts;

impl CollectionTask for LoadDeckCounts {
    type Progress = usize;
    type Output = Vec<DeckCounts>;

    fn kind(&self) -> TaskKind {
        TaskKind::LoadDeckCounts
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        context: &TaskContext<usize>,
    ) -> TaskResult<Vec<DeckCounts>> {
        let collection = manager.collection_mut()?;
        let today = today();
        let decks = collection.decks()?;

        let mut counts = Vec::with_capacity(decks.len());
        for deck in &decks {
            context.check_cancelled()?;
            counts.push(collection.deck_counts(deck, today)?);
            context.emit(counts.len());
        }
        Ok(counts)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct AnswerCard {
    pub card: CardId,
    pub ease: Ease,
}

impl CollectionTask for AnswerCard {
    type Progress = ();
    type Output = Card;

    fn kind(&self) -> TaskKind {
        TaskKind::AnswerCard
    }

    fn run(self, manager: &mut CollectionManager, _context: &TaskContext<()>) -> TaskResult<Card> {
        let answered = manager.collection_mut()?.answer_card(self.card, self.ease)?;
        tracing::debug!(card = answered.id.0, ease = ?self.ease, due = answered.due, "card answered");
        Ok(answered)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct UndoLast;

impl CollectionTask for UndoLast {
    type Progress = ();
    type Output = UndoOutcome;

    fn kind(&self) -> TaskKind {
        TaskKind::Undo
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        _context: &TaskContext<()>,
    ) -> TaskResult<UndoOutcome> {
        manager.collection_mut()?.undo()
    }
}

/// Drops derived review-queue state. Returns the new reset generation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResetScheduler;

impl CollectionTask for ResetScheduler {
    type Progress = ();
    type Output = u64;

    fn kind(&self) -> TaskKind {
        TaskKind::ResetScheduler
    }

    fn run(self, manager: &mut CollectionManager, _context: &TaskContext<()>) -> TaskResult<u64> {
        let queue = manager.collection_mut()?.review_queue_mut();
        queue.reset();
        Ok(queue.generation())
    }
}
