use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TaskId(pub u64);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum TaskKind {
    LoadDeckCounts,
    ChangeDeckMulti,
    SuspendCards,
    AnswerCard,
    Undo,
    ResetScheduler,
    CheckDatabase,
    FindEmptyCards,
    ImportAdd,
    ImportReplace,
    ExportPackage,
    LoadNoteTypes,
    DeleteNoteType,
    WithCollection,
    Custom(&'static str),
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoadDeckCounts => "load_deck_counts",
            Self::ChangeDeckMulti => "change_deck_multi",
            Self::SuspendCards => "suspend_cards",
            Self::AnswerCard => "answer_card",
            Self::Undo => "undo",
            Self::ResetScheduler => "reset_scheduler",
            Self::CheckDatabase => "check_database",
            Self::FindEmptyCards => "find_empty_cards",
            Self::ImportAdd => "import_add",
            Self::ImportReplace => "import_replace",
            Self::ExportPackage => "export_package",
            Self::LoadNoteTypes => "load_note_types",
            Self::DeleteNoteType => "delete_note_type",
            Self::WithCollection => "with_collection",
            Self::Custom(name) => name,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}
