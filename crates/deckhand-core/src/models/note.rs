use serde::{Deserialize, Serialize};

use crate::models::NoteId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct NoteTypeId(pub i64);

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NoteType {
    pub id: NoteTypeId,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NoteTypeUsage {
    pub note_type: NoteType,
    pub note_count: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub note_type_id: NoteTypeId,
    pub fields: Vec<String>,
}

impl Note {
    pub fn is_blank(&self) -> bool {
        self.fields.iter().all(|field| field.trim().is_empty())
    }
}
