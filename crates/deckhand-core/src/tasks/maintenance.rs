use serde::Serialize;

use crate::collection::{CollectionManager, RepairReport, unix_now};
use crate::models::{CardId, TaskKind};
use crate::orchestration::TaskContext;
use crate::tasks::{CollectionTask, TaskResult};

pub const LAST_CHECK_KEY: &str = "last_checked_unix";

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct CheckReport {
    pub ok: bool,
    pub problems: Vec<String>,
    pub repairs: RepairReport,
}

/// Integrity check plus repairs. A corrupt file is reported in the result rather than as an
/// error. The collection is closed afterwards, dropping its undo history, and reopened by the
/// next task that needs it.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckDatabase;

impl CollectionTask for CheckDatabase {
    type Progress = String;
    type Output = CheckReport;

    fn kind(&self) -> TaskKind {
        TaskKind::CheckDatabase
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        context: &TaskContext<String>,
    ) -> TaskResult<CheckReport> {
        let collection = manager.collection_mut()?;

        context.emit("checking integrity".to_string());
        let problems = collection.integrity_problems()?;
        if !problems.is_empty() {
            tracing::error!(problems = problems.len(), "collection failed integrity check");
            return Ok(CheckReport {
                ok: false,
                problems,
                repairs: RepairReport::default(),
            });
        }

        context.check_cancelled()?;
        context.emit("repairing".to_string());
        let repairs = collection.transact("check_database", |tx| {
            let repairs = tx.repair()?;
            tx.set_config(LAST_CHECK_KEY, &unix_now().to_string())?;
            context.check_cancelled()?;
            Ok(repairs)
        })?;
        tracing::info!(
            orphan_cards = repairs.orphan_cards_removed,
            rehomed_cards = repairs.cards_moved_to_default,
            empty_notes = repairs.empty_notes_removed,
            "collection check finished"
        );

        manager.close("database checked")?;
        context.emit("done".to_string());
        Ok(CheckReport {
            ok: true,
            problems: Vec::new(),
            repairs,
        })
    }
}

/// Cards whose note has nothing but blank fields. Progress is the number of notes scanned.
#[derive(Clone, Copy, Debug, Default)]
pub struct FindEmptyCards;

impl CollectionTask for FindEmptyCards {
    type Progress = usize;
    type Output = Vec<CardId>;

    fn kind(&self) -> TaskKind {
        TaskKind::FindEmptyCards
    }

    fn run(
        self,
        manager: &mut CollectionManager,
        context: &TaskContext<usize>,
    ) -> TaskResult<Vec<CardId>> {
        let collection = manager.collection_mut()?;
        let notes = collection.notes()?;

        let mut empty = Vec::new();
        for (index, note) in notes.iter().enumerate() {
            context.check_cancelled()?;
            if note.is_blank() {
                empty.extend(collection.card_ids_for_note(note.id)?);
            }
            context.emit(index + 1);
        }
        Ok(empty)
    }
}
