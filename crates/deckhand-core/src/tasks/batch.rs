use crate::collection::{CollectionManager, CollectionTx};
use crate::models::{Card, CardId, CardQueue, CoreError, CoreErrorKind, DeckId, TaskKind, UndoAction};
use crate::orchestration::TaskContext;
use crate::tasks::{CollectionTask, TaskResult};

/// A per-card mutation applied by [`DismissCards`] inside one transaction.
pub trait CardBatchOperation: Send + 'static {
    fn kind(&self) -> TaskKind;

    /// Rejects the whole batch before any card is written.
    fn check_target(&self, _tx: &CollectionTx<'_>) -> TaskResult<()> {
        Ok(())
    }

    fn apply(&self, card: &mut Card) -> TaskResult<()>;

    fn undo_action(&self, previous: Vec<Card>) -> UndoAction;
}

/// Applies one operation to a batch of cards atomically and records a single undo step.
///
/// Progress is the number of cards processed so far.
pub struct DismissCards<O> {
    card_ids: Vec<CardId>,
    operation: O,
}

impl<O> DismissCards<O> {
    pub fn new(card_ids: Vec<CardId>, operation: O) -> Self {
        Self {
            card_ids,
            operation,
        }
    }
}

impl DismissCards<ChangeDeck> {
    pub fn change_deck(card_ids: Vec<CardId>, target: DeckId) -> Self {
        Self::new(card_ids, ChangeDeck { target })
    }
}

impl DismissCards<SuspendCards> {
    pub fn suspend(card_ids: Vec<CardId>) -> Self {
        Self::new(card_ids, SuspendCards { suspend: true })
    }

    pub fn unsuspend(card_ids: Vec<CardId>) -> Self {
        Self::new(card_ids, SuspendCards { suspend: false })
    }
}

impl<O: CardBatchOperation> CollectionTask for DismissCards<O> {
    type Progress = usize;
    type Output = Vec<Card>;

    fn kind(&self) -> TaskKind {
        self.operation.kind()
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        context: &TaskContext<usize>,
    ) -> TaskResult<Vec<Card>> {
        let kind = self.operation.kind();
        let collection = manager.collection_mut()?;
        let previous = collection.cards(&self.card_ids)?;
        if previous.is_empty() {
            return Ok(Vec::new());
        }

        let operation = &self.operation;
        let updated = collection.transact(kind.as_str(), |tx| {
            operation.check_target(tx)?;

            let mut updated = Vec::with_capacity(previous.len());
            for (index, card) in previous.iter().enumerate() {
                context.check_cancelled()?;
                let mut next = card.clone();
                operation.apply(&mut next)?;
                tx.update_card(&next)?;
                updated.push(next);
                context.emit(index + 1);
            }

            context.check_cancelled()?;
            Ok(updated)
        })?;

        tracing::info!(task = kind.as_str(), cards = updated.len(), "batch edit committed");
        collection.mark_undo(self.operation.undo_action(previous));
        Ok(updated)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChangeDeck {
    pub target: DeckId,
}

impl CardBatchOperation for ChangeDeck {
    fn kind(&self) -> TaskKind {
        TaskKind::ChangeDeckMulti
    }

    fn check_target(&self, tx: &CollectionTx<'_>) -> TaskResult<()> {
        match tx.deck(self.target)? {
            None => Err(CoreError::new(
                CoreErrorKind::PreconditionFailure,
                format!("deck '{}' does not exist", self.target.0),
            )),
            Some(deck) if deck.dynamic => {
                tracing::warn!(deck = deck.id.0, name = %deck.name, "cannot move cards into a filtered deck");
                Err(CoreError::new(
                    CoreErrorKind::PreconditionFailure,
                    format!("cannot move cards into filtered deck '{}'", deck.name),
                ))
            }
            Some(_) => Ok(()),
        }
    }

    fn apply(&self, card: &mut Card) -> TaskResult<()> {
        if card.original_deck_id.take().is_some() && card.queue != CardQueue::Suspended {
            card.queue = card.card_type.active_queue();
        }
        card.deck_id = self.target;
        Ok(())
    }

    fn undo_action(&self, previous: Vec<Card>) -> UndoAction {
        UndoAction::ChangeDeck { cards: previous }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SuspendCards {
    pub suspend: bool,
}

impl CardBatchOperation for SuspendCards {
    fn kind(&self) -> TaskKind {
        TaskKind::SuspendCards
    }

    fn apply(&self, card: &mut Card) -> TaskResult<()> {
        if self.suspend {
            card.queue = CardQueue::Suspended;
        } else if card.queue == CardQueue::Suspended {
            card.queue = card.card_type.active_queue();
        }
        Ok(())
    }

    fn undo_action(&self, previous: Vec<Card>) -> UndoAction {
        UndoAction::Suspend { cards: previous }
    }
}

#[cfg(test)]
mod tests {
    use super::{CardBatchOperation, ChangeDeck, SuspendCards};
    use crate::models::{Card, CardId, CardQueue, CardType, DeckId, NoteId};

    #[test]
    fn moving_out_of_a_filtered_deck_clears_the_home_deck() {
        let mut card = Card::new(CardId(1), NoteId(1), DeckId(7));
        card.original_deck_id = Some(DeckId(3));
        card.card_type = CardType::Review;
        card.queue = CardQueue::Learning;

        ChangeDeck { target: DeckId(4) }.apply(&mut card).unwrap();

        assert_eq!(card.deck_id, DeckId(4));
        assert_eq!(card.original_deck_id, None);
        assert_eq!(card.queue, CardQueue::Review);
    }

    #[test]
    fn unsuspend_restores_the_queue_for_the_card_type() {
        let mut card = Card::new(CardId(1), NoteId(1), DeckId::DEFAULT);
        card.card_type = CardType::Learning;
        SuspendCards { suspend: true }.apply(&mut card).unwrap();
        assert_eq!(card.queue, CardQueue::Suspended);

        SuspendCards { suspend: false }.apply(&mut card).unwrap();
        assert_eq!(card.queue, CardQueue::Learning);
    }
}
