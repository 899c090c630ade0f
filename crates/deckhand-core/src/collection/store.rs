use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::collection::CollectionResult;
use crate::collection::migrations::current_schema_version;
use crate::collection::review::{ReviewQueue, apply_answer, today};
use crate::collection::schema::{
    CARD_COLUMNS, bool_to_sqlite, has_migrations_table, join_fields, migrate, open_connection,
    open_read_only, read_card, read_current_version, split_fields, sqlite_to_bool,
    storage_error, to_u32,
};
use crate::collection::undo::UndoStack;
use crate::config::DEFAULT_UNDO_LIMIT;
use crate::models::{
    Card, CardId, CoreError, CoreErrorKind, Deck, DeckCounts, DeckId, Ease, Note, NoteId,
    NoteType, NoteTypeId, NoteTypeUsage, UndoAction, UndoOutcome,
};

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct MergeReport {
    pub decks_added: usize,
    pub notes_added: usize,
    pub cards_added: usize,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct RepairReport {
    pub orphan_cards_removed: usize,
    pub cards_moved_to_default: usize,
    pub empty_notes_removed: usize,
}

#[derive(Debug)]
pub struct Collection {
    path: PathBuf,
    connection: Connection,
    undo: UndoStack,
    review: ReviewQueue,
}

impl Collection {
    pub fn open(path: impl Into<PathBuf>) -> CollectionResult<Self> {
        Self::open_with_undo_limit(path, DEFAULT_UNDO_LIMIT)
    }

    pub fn open_with_undo_limit(
        path: impl Into<PathBuf>,
        undo_limit: usize,
    ) -> CollectionResult<Self> {
        let path = path.into();
        let mut connection = open_connection(&path).map_err(|error| {
            storage_error("open", error).with_resource(path.display().to_string())
        })?;
        migrate(&mut connection, current_schema_version())
            .map_err(|error| storage_error("migrate", error))?;

        Ok(Self {
            path,
            connection,
            undo: UndoStack::new(undo_limit),
            review: ReviewQueue::new(),
        })
    }

    /// Checks that `path` holds a collection this build can open, returning its schema version.
    pub fn validate_file(path: &Path) -> CollectionResult<i64> {
        let resource = path.display().to_string();
        if !path.is_file() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "collection file does not exist",
            )
            .with_resource(resource));
        }

        let connection = open_read_only(path)
            .map_err(|error| storage_error("validate_file", error).with_resource(&resource))?;
        let version = probe_schema_version(&connection)
            .map_err(|error| storage_error("validate_file", error).with_resource(&resource))?;

        if version < 1 || version > current_schema_version() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("unsupported collection schema version '{version}'"),
            )
            .with_resource(resource));
        }
        Ok(version)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn close(self) -> CollectionResult<()> {
        self.connection
            .close()
            .map_err(|(_, error)| storage_error("close", error))
    }

    pub fn schema_version(&self) -> CollectionResult<i64> {
        self.read("schema_version", read_current_version)
    }

    pub fn apply_migration(&mut self, target_version: i64) -> CollectionResult<()> {
        migrate(&mut self.connection, target_version)
            .map_err(|error| storage_error("apply_migration", error))
    }

    pub fn card(&self, id: CardId) -> CollectionResult<Card> {
        self.read("card", |connection| query_card(connection, id))?
            .ok_or_else(|| missing_card(id))
    }

    /// Loads cards in the order given; any missing id fails the whole read.
    pub fn cards(&self, ids: &[CardId]) -> CollectionResult<Vec<Card>> {
        ids.iter().map(|id| self.card(*id)).collect()
    }

    pub fn card_ids_for_note(&self, note: NoteId) -> CollectionResult<Vec<CardId>> {
        self.read("card_ids_for_note", |connection| {
            let mut statement =
                connection.prepare("SELECT id FROM cards WHERE note_id = ?1 ORDER BY id")?;
            let rows = statement.query_map([note.0], |row| Ok(CardId(row.get(0)?)))?;
            rows.collect()
        })
    }

    pub fn card_count(&self) -> CollectionResult<u32> {
        self.read("card_count", |connection| {
            let count: i64 = connection.query_row("SELECT COUNT(*) FROM cards", [], |row| {
                row.get(0)
            })?;
            to_u32(count)
        })
    }

    pub fn deck(&self, id: DeckId) -> CollectionResult<Option<Deck>> {
        self.read("deck", |connection| query_deck(connection, id))
    }

    pub fn decks(&self) -> CollectionResult<Vec<Deck>> {
        self.read("decks", |connection| {
            let mut statement =
                connection.prepare("SELECT id, name, dynamic FROM decks ORDER BY name")?;
            let rows = statement.query_map([], |row| {
                Ok(Deck {
                    id: DeckId(row.get(0)?),
                    name: row.get(1)?,
                    dynamic: sqlite_to_bool(row.get(2)?),
                })
            })?;
            rows.collect()
        })
    }

    pub fn deck_counts(&self, deck: &Deck, today: i64) -> CollectionResult<DeckCounts> {
        self.read("deck_counts", |connection| {
            let (new, learning, review): (i64, i64, i64) = connection.query_row(
                "
SELECT
    COALESCE(SUM(CASE WHEN queue = 0 THEN 1 ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN queue = 1 THEN 1 ELSE 0 END), 0),
    COALESCE(SUM(CASE WHEN queue = 2 AND due <= ?2 THEN 1 ELSE 0 END), 0)
FROM cards
WHERE deck_id = ?1
",
                params![deck.id.0, today],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            Ok(DeckCounts {
                deck_id: deck.id,
                name: deck.name.clone(),
                new: to_u32(new)?,
                learning: to_u32(learning)?,
                review: to_u32(review)?,
            })
        })
    }

    pub fn notes(&self) -> CollectionResult<Vec<Note>> {
        self.read("notes", |connection| {
            let mut statement =
                connection.prepare("SELECT id, note_type_id, fields FROM notes ORDER BY id")?;
            let rows = statement.query_map([], read_note)?;
            rows.collect()
        })
    }

    pub fn note_type_usage(&self) -> CollectionResult<Vec<NoteTypeUsage>> {
        self.read("note_type_usage", |connection| {
            let mut statement = connection.prepare(
                "
SELECT nt.id, nt.name, COUNT(n.id)
FROM note_types nt
LEFT JOIN notes n ON n.note_type_id = nt.id
GROUP BY nt.id, nt.name
ORDER BY nt.name, nt.id
",
            )?;
            let rows = statement.query_map([], |row| {
                Ok(NoteTypeUsage {
                    note_type: NoteType {
                        id: NoteTypeId(row.get(0)?),
                        name: row.get(1)?,
                    },
                    note_count: to_u32(row.get(2)?)?,
                })
            })?;
            rows.collect()
        })
    }

    pub fn config_value(&self, key: &str) -> CollectionResult<Option<String>> {
        self.read("config_value", |connection| {
            connection
                .query_row(
                    "SELECT value FROM collection_config WHERE key = ?1",
                    [key],
                    |row| row.get(0),
                )
                .optional()
        })
    }

    pub fn add_deck(&mut self, name: &str, dynamic: bool) -> CollectionResult<DeckId> {
        self.read("add_deck", |connection| {
            connection.execute(
                "INSERT INTO decks (name, dynamic) VALUES (?1, ?2)",
                params![name, bool_to_sqlite(dynamic)],
            )?;
            Ok(DeckId(connection.last_insert_rowid()))
        })
    }

    pub fn add_note_type(&mut self, name: &str) -> CollectionResult<NoteTypeId> {
        self.read("add_note_type", |connection| {
            connection.execute("INSERT INTO note_types (name) VALUES (?1)", [name])?;
            Ok(NoteTypeId(connection.last_insert_rowid()))
        })
    }

    pub fn add_note(
        &mut self,
        note_type: NoteTypeId,
        fields: &[String],
    ) -> CollectionResult<NoteId> {
        self.read("add_note", |connection| {
            connection.execute(
                "INSERT INTO notes (note_type_id, fields, guid) VALUES (?1, ?2, lower(hex(randomblob(8))))",
                params![note_type.0, join_fields(fields)],
            )?;
            Ok(NoteId(connection.last_insert_rowid()))
        })
    }

    pub fn add_card(&mut self, note: NoteId, deck: DeckId) -> CollectionResult<CardId> {
        self.read("add_card", |connection| {
            connection.execute(
                "INSERT INTO cards (note_id, deck_id) VALUES (?1, ?2)",
                params![note.0, deck.0],
            )?;
            Ok(CardId(connection.last_insert_rowid()))
        })
    }

    pub fn insert_card(&mut self, card: &Card) -> CollectionResult<()> {
        self.read("insert_card", |connection| {
            connection.execute(
                &format!(
                    "INSERT INTO cards ({CARD_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                card_params(card),
            )?;
            Ok(())
        })
    }

    /// Runs `body` inside one SQLite transaction: committed when it returns `Ok`, rolled back
    /// otherwise. Storage errors raised inside the body are reported as transaction failures.
    pub fn transact<T>(
        &mut self,
        operation: &str,
        body: impl FnOnce(&CollectionTx<'_>) -> CollectionResult<T>,
    ) -> CollectionResult<T> {
        let transaction = self
            .connection
            .transaction()
            .map_err(|error| transaction_error(operation, error))?;

        let outcome = body(&CollectionTx {
            connection: &*transaction,
        });

        match outcome {
            Ok(value) => {
                transaction
                    .commit()
                    .map_err(|error| transaction_error(operation, error))?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = transaction.rollback() {
                    tracing::error!(
                        operation,
                        message = %rollback_error,
                        "failed to roll back collection transaction"
                    );
                }
                Err(rolled_back(operation, error))
            }
        }
    }

    pub fn mark_undo(&mut self, action: UndoAction) {
        tracing::debug!(action = action.name(), cards = action.prior_cards().len(), "marked undo");
        self.undo.push(action);
    }

    pub fn pop_undo(&mut self) -> Option<UndoAction> {
        self.undo.pop()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn clear_undo(&mut self) {
        self.undo.clear();
    }

    /// Reverts the most recent undoable mutation. Undoing a single review additionally restarts
    /// the card timer and asks the review queue to re-derive that card.
    pub fn undo(&mut self) -> CollectionResult<UndoOutcome> {
        let Some(action) = self.undo.pop() else {
            return Ok(UndoOutcome::Nothing);
        };

        let restored = self.transact("undo", |tx| {
            for card in action.prior_cards() {
                tx.update_card(card)?;
            }
            Ok(())
        });
        if let Err(error) = restored {
            self.undo.push(action);
            return Err(error);
        }

        match action {
            UndoAction::Review { card } => {
                tracing::debug!(card = card.id.0, "single card review undo succeeded");
                self.review.start_timer(card.id);
                self.review.reset();
                self.review.defer_reset(card.id);
                Ok(UndoOutcome::Review { card })
            }
            batch => {
                tracing::debug!(
                    action = batch.name(),
                    cards = batch.prior_cards().len(),
                    "multi-card undo succeeded"
                );
                Ok(UndoOutcome::Batch {
                    name: batch.name().to_string(),
                    cards: batch.prior_cards().len(),
                })
            }
        }
    }

    pub fn review_queue(&self) -> &ReviewQueue {
        &self.review
    }

    pub fn review_queue_mut(&mut self) -> &mut ReviewQueue {
        &mut self.review
    }

    pub fn answer_card(&mut self, id: CardId, ease: Ease) -> CollectionResult<Card> {
        let previous = self.card(id)?;
        let mut answered = previous.clone();
        apply_answer(&mut answered, ease, today());

        self.transact("answer_card", |tx| tx.update_card(&answered))?;
        self.review.stop_timer(id);
        self.mark_undo(UndoAction::Review { card: previous });
        Ok(answered)
    }

    /// Deletes a note type with all of its notes and cards. Clears undo history, since the
    /// recorded snapshots may reference removed cards.
    pub fn delete_note_type(&mut self, id: NoteTypeId) -> CollectionResult<usize> {
        let removed = self.transact("delete_note_type", |tx| tx.remove_note_type(id))?;
        self.clear_undo();
        Ok(removed)
    }

    /// Adds the notes of another collection file that are not already present, together with
    /// their cards and any decks or note types they need. Notes already present always win.
    /// `source` must be at the current schema version.
    pub fn merge_from(&mut self, source: &Path) -> CollectionResult<MergeReport> {
        let source_name = source.display().to_string();
        self.connection
            .execute(
                "ATTACH DATABASE ?1 AS incoming",
                [source.to_string_lossy().as_ref()],
            )
            .map_err(|error| storage_error("attach", error).with_resource(&source_name))?;

        let merged = self.transact("merge_from", |tx| tx.merge_attached());

        if let Err(error) = self.connection.execute("DETACH DATABASE incoming", []) {
            tracing::warn!(path = %source_name, message = %error, "failed to detach merged collection");
        }
        merged.map_err(|error| error.with_resource(source_name))
    }

    /// Writes a consistent copy of the collection to `target`, which must not exist yet.
    pub fn export_copy(&self, target: &Path) -> CollectionResult<()> {
        self.read("export_copy", |connection| {
            connection.execute("VACUUM INTO ?1", [target.to_string_lossy().as_ref()])?;
            Ok(())
        })
        .map_err(|error| error.with_resource(target.display().to_string()))
    }

    /// Returns the problems reported by SQLite's integrity check; empty when healthy.
    pub fn integrity_problems(&self) -> CollectionResult<Vec<String>> {
        self.read("integrity_check", |connection| {
            let mut statement = connection.prepare("PRAGMA integrity_check")?;
            let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
            let messages = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(messages
                .into_iter()
                .filter(|message| message != "ok")
                .collect())
        })
    }

    fn read<T>(
        &self,
        operation: &str,
        operation_body: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> CollectionResult<T> {
        operation_body(&self.connection).map_err(|error| storage_error(operation, error))
    }
}

/// Collection access inside an open transaction.
pub struct CollectionTx<'a> {
    connection: &'a Connection,
}

impl CollectionTx<'_> {
    pub fn card(&self, id: CardId) -> CollectionResult<Card> {
        query_card(self.connection, id)
            .map_err(|error| storage_error("card", error))?
            .ok_or_else(|| missing_card(id))
    }

    pub fn deck(&self, id: DeckId) -> CollectionResult<Option<Deck>> {
        query_deck(self.connection, id).map_err(|error| storage_error("deck", error))
    }

    pub fn update_card(&self, card: &Card) -> CollectionResult<()> {
        let changed = self
            .connection
            .execute(
                "
UPDATE cards SET
    note_id = ?2,
    deck_id = ?3,
    original_deck_id = ?4,
    card_type = ?5,
    queue = ?6,
    due = ?7,
    interval = ?8,
    reps = ?9
WHERE id = ?1
",
                card_params(card),
            )
            .map_err(|error| storage_error("update_card", error))?;
        if changed == 0 {
            return Err(missing_card(card.id));
        }
        Ok(())
    }

    pub fn set_config(&self, key: &str, value: &str) -> CollectionResult<()> {
        self.connection
            .execute(
                "
INSERT INTO collection_config (key, value) VALUES (?1, ?2)
ON CONFLICT(key) DO UPDATE SET value = excluded.value
",
                params![key, value],
            )
            .map_err(|error| storage_error("set_config", error))?;
        Ok(())
    }

    pub fn repair(&self) -> CollectionResult<RepairReport> {
        let orphan_cards_removed = self
            .connection
            .execute(
                "DELETE FROM cards WHERE note_id NOT IN (SELECT id FROM notes)",
                [],
            )
            .map_err(|error| storage_error("remove_orphan_cards", error))?;
        let cards_moved_to_default = self
            .connection
            .execute(
                "
UPDATE cards SET deck_id = 1, original_deck_id = NULL
WHERE deck_id NOT IN (SELECT id FROM decks)
",
                [],
            )
            .map_err(|error| storage_error("rehome_cards", error))?;
        let empty_notes_removed = self
            .connection
            .execute(
                "DELETE FROM notes WHERE id NOT IN (SELECT note_id FROM cards)",
                [],
            )
            .map_err(|error| storage_error("remove_empty_notes", error))?;

        Ok(RepairReport {
            orphan_cards_removed,
            cards_moved_to_default,
            empty_notes_removed,
        })
    }

    /// Drops everything that does not belong to `deck`. Returns the number of cards removed.
    pub fn retain_deck(&self, deck: DeckId) -> CollectionResult<usize> {
        let removed = self
            .connection
            .execute(
                "DELETE FROM cards WHERE deck_id != ?1 AND COALESCE(original_deck_id, 0) != ?1",
                [deck.0],
            )
            .map_err(|error| storage_error("retain_deck_cards", error))?;
        self.connection
            .execute_batch(&format!(
                "
DELETE FROM notes WHERE id NOT IN (SELECT note_id FROM cards);
DELETE FROM note_types WHERE id NOT IN (SELECT note_type_id FROM notes);
DELETE FROM decks
WHERE id NOT IN ({default}, {deck})
  AND id NOT IN (SELECT deck_id FROM cards)
  AND id NOT IN (SELECT original_deck_id FROM cards WHERE original_deck_id IS NOT NULL);
",
                default = DeckId::DEFAULT.0,
                deck = deck.0,
            ))
            .map_err(|error| storage_error("retain_deck", error))?;
        Ok(removed)
    }

    /// Returns every card to the new queue in its home deck.
    pub fn reset_scheduling(&self) -> CollectionResult<usize> {
        self.connection
            .execute(
                "
UPDATE cards SET
    deck_id = COALESCE(original_deck_id, deck_id),
    original_deck_id = NULL,
    card_type = 0,
    queue = 0,
    due = 0,
    interval = 0,
    reps = 0
",
                [],
            )
            .map_err(|error| storage_error("reset_scheduling", error))
    }

    fn remove_note_type(&self, id: NoteTypeId) -> CollectionResult<usize> {
        let exists: Option<i64> = self
            .connection
            .query_row("SELECT id FROM note_types WHERE id = ?1", [id.0], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|error| storage_error("note_type", error))?;
        if exists.is_none() {
            return Err(CoreError::new(
                CoreErrorKind::PreconditionFailure,
                format!("note type '{}' does not exist", id.0),
            ));
        }

        let removed_cards = self
            .connection
            .execute(
                "
DELETE FROM cards
WHERE note_id IN (SELECT id FROM notes WHERE note_type_id = ?1)
",
                [id.0],
            )
            .map_err(|error| storage_error("delete_note_type_cards", error))?;
        self.connection
            .execute("DELETE FROM notes WHERE note_type_id = ?1", [id.0])
            .map_err(|error| storage_error("delete_note_type_notes", error))?;
        self.connection
            .execute("DELETE FROM note_types WHERE id = ?1", [id.0])
            .map_err(|error| storage_error("delete_note_type", error))?;
        Ok(removed_cards)
    }

    fn merge_attached(&self) -> CollectionResult<MergeReport> {
        merge_rows(self.connection).map_err(|error| storage_error("merge_from", error))
    }
}

/// Copies the attached `incoming` collection into `main`. Decks and note types are matched by
/// name and notes by guid; an incoming id that is already taken locally gets a fresh one, and
/// every reference is rewritten through the resulting id maps. Cards are only brought in with
/// a newly added note, so notes already present keep their local scheduling.
fn merge_rows(connection: &Connection) -> rusqlite::Result<MergeReport> {
    let mut report = MergeReport::default();

    let mut decks = HashMap::new();
    let incoming_decks = {
        let mut statement =
            connection.prepare("SELECT id, name, dynamic FROM incoming.decks ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (id, name, dynamic) in incoming_decks {
        let local = match find_id_by_name(connection, "decks", &name)? {
            Some(local) => local,
            None => {
                connection.execute(
                    "INSERT INTO main.decks (id, name, dynamic) VALUES (?1, ?2, ?3)",
                    params![free_id(connection, "decks", id)?, name, dynamic],
                )?;
                report.decks_added += 1;
                connection.last_insert_rowid()
            }
        };
        decks.insert(id, local);
    }

    let mut note_types = HashMap::new();
    let incoming_note_types = {
        let mut statement =
            connection.prepare("SELECT id, name FROM incoming.note_types ORDER BY id")?;
        let rows = statement
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (id, name) in incoming_note_types {
        let local = match find_id_by_name(connection, "note_types", &name)? {
            Some(local) => local,
            None => {
                connection.execute(
                    "INSERT INTO main.note_types (id, name) VALUES (?1, ?2)",
                    params![free_id(connection, "note_types", id)?, name],
                )?;
                connection.last_insert_rowid()
            }
        };
        note_types.insert(id, local);
    }

    let mut added_notes = HashMap::new();
    let incoming_notes = {
        let mut statement = connection
            .prepare("SELECT id, note_type_id, fields, guid FROM incoming.notes ORDER BY id")?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (id, note_type_id, fields, guid) in incoming_notes {
        if let Some(guid) = &guid {
            let present: bool = connection.query_row(
                "SELECT EXISTS(SELECT 1 FROM main.notes WHERE guid = ?1)",
                [guid],
                |row| row.get(0),
            )?;
            if present {
                continue;
            }
        }
        let Some(note_type) = note_types.get(&note_type_id) else {
            tracing::warn!(
                note = id,
                note_type = note_type_id,
                "skipping incoming note without a note type"
            );
            continue;
        };
        connection.execute(
            "
INSERT INTO main.notes (id, note_type_id, fields, guid)
VALUES (?1, ?2, ?3, COALESCE(?4, lower(hex(randomblob(8)))))
",
            params![free_id(connection, "notes", id)?, note_type, fields, guid],
        )?;
        added_notes.insert(id, connection.last_insert_rowid());
        report.notes_added += 1;
    }

    let incoming_cards = {
        let mut statement = connection.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM incoming.cards ORDER BY id"
        ))?;
        let rows = statement.query_map([], read_card)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for card in incoming_cards {
        let Some(note) = added_notes.get(&card.note_id.0) else {
            continue;
        };
        let home = card.original_deck_id.unwrap_or(card.deck_id);
        let deck = decks.get(&home.0).copied().unwrap_or(DeckId::DEFAULT.0);
        connection.execute(
            &format!(
                "INSERT INTO main.cards ({CARD_COLUMNS}) VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                free_id(connection, "cards", card.id.0)?,
                note,
                deck,
                card.card_type.to_i64(),
                card.queue.to_i64(),
                card.due,
                card.interval,
                card.reps,
            ],
        )?;
        report.cards_added += 1;
    }

    Ok(report)
}

fn find_id_by_name(
    connection: &Connection,
    table: &str,
    name: &str,
) -> rusqlite::Result<Option<i64>> {
    connection
        .query_row(
            &format!("SELECT id FROM main.{table} WHERE name = ?1 ORDER BY id LIMIT 1"),
            [name],
            |row| row.get(0),
        )
        .optional()
}

/// Keeps `id` when it is unused locally; `None` lets SQLite assign the next rowid.
fn free_id(connection: &Connection, table: &str, id: i64) -> rusqlite::Result<Option<i64>> {
    let taken: bool = connection.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM main.{table} WHERE id = ?1)"),
        [id],
        |row| row.get(0),
    )?;
    Ok((!taken).then_some(id))
}

fn probe_schema_version(connection: &Connection) -> rusqlite::Result<i64> {
    if !has_migrations_table(connection)? {
        return Ok(0);
    }
    let version = read_current_version(connection)?;
    connection.query_row("SELECT COUNT(*) FROM cards", [], |row| row.get::<_, i64>(0))?;
    Ok(version)
}

fn query_card(connection: &Connection, id: CardId) -> rusqlite::Result<Option<Card>> {
    connection
        .query_row(
            &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
            [id.0],
            read_card,
        )
        .optional()
}

fn query_deck(connection: &Connection, id: DeckId) -> rusqlite::Result<Option<Deck>> {
    connection
        .query_row(
            "SELECT id, name, dynamic FROM decks WHERE id = ?1",
            [id.0],
            |row| {
                Ok(Deck {
                    id: DeckId(row.get(0)?),
                    name: row.get(1)?,
                    dynamic: sqlite_to_bool(row.get(2)?),
                })
            },
        )
        .optional()
}

fn read_note(row: &rusqlite::Row<'_>) -> rusqlite::Result<Note> {
    let fields: String = row.get(2)?;
    Ok(Note {
        id: NoteId(row.get(0)?),
        note_type_id: NoteTypeId(row.get(1)?),
        fields: split_fields(&fields),
    })
}

fn card_params(card: &Card) -> [rusqlite::types::Value; 9] {
    use rusqlite::types::Value;

    [
        Value::Integer(card.id.0),
        Value::Integer(card.note_id.0),
        Value::Integer(card.deck_id.0),
        card.original_deck_id
            .map(|deck| Value::Integer(deck.0))
            .unwrap_or(Value::Null),
        Value::Integer(card.card_type.to_i64()),
        Value::Integer(card.queue.to_i64()),
        Value::Integer(card.due),
        Value::Integer(card.interval),
        Value::Integer(card.reps),
    ]
}

fn missing_card(id: CardId) -> CoreError {
    CoreError::new(
        CoreErrorKind::PreconditionFailure,
        format!("card '{}' does not exist", id.0),
    )
}

fn transaction_error(operation: &str, error: rusqlite::Error) -> CoreError {
    tracing::error!(operation, message = %error, "collection transaction failed");
    CoreError::new(
        CoreErrorKind::TransactionFailure,
        format!("sqlite collection '{operation}' transaction failed: {error}"),
    )
}

fn rolled_back(operation: &str, error: CoreError) -> CoreError {
    if error.kind != CoreErrorKind::StorageFailure {
        tracing::debug!(operation, kind = ?error.kind, "collection transaction rolled back");
        return error;
    }

    tracing::error!(
        operation,
        message = %error.message,
        "collection transaction rolled back after storage failure"
    );
    CoreError {
        kind: CoreErrorKind::TransactionFailure,
        ..error
    }
}
