use serde::{Deserialize, Serialize};

use crate::models::Card;

/// A committed mutation together with the prior state of every card it touched.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoAction {
    ChangeDeck { cards: Vec<Card> },
    Suspend { cards: Vec<Card> },
    Review { card: Card },
}

impl UndoAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ChangeDeck { .. } => "change_deck",
            Self::Suspend { .. } => "suspend",
            Self::Review { .. } => "review",
        }
    }

    pub fn prior_cards(&self) -> &[Card] {
        match self {
            Self::ChangeDeck { cards } | Self::Suspend { cards } => cards,
            Self::Review { card } => std::slice::from_ref(card),
        }
    }

    pub fn is_review(&self) -> bool {
        matches!(self, Self::Review { .. })
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoOutcome {
    Nothing,
    Batch { name: String, cards: usize },
    Review { card: Card },
}
