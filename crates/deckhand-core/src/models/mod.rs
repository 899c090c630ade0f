pub mod card;
pub mod deck;
pub mod error;
pub mod note;
pub mod task;
pub mod undo;

pub use card::{Card, CardId, CardQueue, CardType, DeckId, Ease, NoteId};
pub use deck::{Deck, DeckCounts};
pub use error::{CoreError, CoreErrorKind};
pub use note::{Note, NoteType, NoteTypeId, NoteTypeUsage};
pub use task::{TaskId, TaskKind, TaskStatus};
pub use undo::{UndoAction, UndoOutcome};
