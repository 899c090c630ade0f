use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct CardId(pub i64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NoteId(pub i64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DeckId(pub i64);

impl DeckId {
    pub const DEFAULT: DeckId = DeckId(1);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    New,
    Learning,
    Review,
}

impl CardType {
    pub fn to_i64(self) -> i64 {
        match self {
            Self::New => 0,
            Self::Learning => 1,
            Self::Review => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Self::New),
            1 => Some(Self::Learning),
            2 => Some(Self::Review),
            _ => None,
        }
    }

    /// Queue a card of this type returns to when it is not suspended.
    pub fn active_queue(self) -> CardQueue {
        match self {
            Self::New => CardQueue::New,
            Self::Learning => CardQueue::Learning,
            Self::Review => CardQueue::Review,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardQueue {
    Suspended,
    New,
    Learning,
    Review,
}

impl CardQueue {
    pub fn to_i64(self) -> i64 {
        match self {
            Self::Suspended => -1,
            Self::New => 0,
            Self::Learning => 1,
            Self::Review => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            -1 => Some(Self::Suspended),
            0 => Some(Self::New),
            1 => Some(Self::Learning),
            2 => Some(Self::Review),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: CardId,
    pub note_id: NoteId,
    pub deck_id: DeckId,
    /// Home deck of a card that currently sits in a filtered deck.
    pub original_deck_id: Option<DeckId>,
    pub card_type: CardType,
    pub queue: CardQueue,
    pub due: i64,
    pub interval: i64,
    pub reps: i64,
}

impl Card {
    pub fn new(id: CardId, note_id: NoteId, deck_id: DeckId) -> Self {
        Self {
            id,
            note_id,
            deck_id,
            original_deck_id: None,
            card_type: CardType::New,
            queue: CardQueue::New,
            due: 0,
            interval: 0,
            reps: 0,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    Again,
    Hard,
    Good,
    Easy,
}

impl Ease {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Again),
            2 => Some(Self::Hard),
            3 => Some(Self::Good),
            4 => Some(Self::Easy),
            _ => None,
        }
    }
}
