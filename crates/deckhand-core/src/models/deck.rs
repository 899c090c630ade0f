use serde::{Deserialize, Serialize};

use crate::models::DeckId;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    pub id: DeckId,
    pub name: String,
    /// Filtered decks are built by a search and cannot be a move target.
    pub dynamic: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DeckCounts {
    pub deck_id: DeckId,
    pub name: String,
    pub new: u32,
    pub learning: u32,
    pub review: u32,
}
