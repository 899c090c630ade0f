use std::fs;
use std::path::Path;

use rusqlite::{Connection, OpenFlags};

use crate::collection::migrations::{SqliteMigration, current_schema_version, migration};
use crate::models::{
    Card, CardId, CardQueue, CardType, CoreError, CoreErrorKind, DeckId, NoteId,
};

pub(crate) const MIGRATIONS_TABLE: &str = "deckhand_schema_migrations";

pub(crate) const CARD_COLUMNS: &str =
    "id, note_id, deck_id, original_deck_id, card_type, queue, due, interval, reps";

pub(crate) fn open_connection(database_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| rusqlite::Error::ToSqlConversionFailure(Box::new(error)))?;
    }
    Connection::open(database_path)
}

pub(crate) fn open_read_only(database_path: &Path) -> rusqlite::Result<Connection> {
    Connection::open_with_flags(
        database_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
}

pub(crate) fn ensure_migrations_table(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!(
        "
CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at_unix INTEGER NOT NULL
);
"
    ))?;
    Ok(())
}

pub(crate) fn read_current_version(connection: &Connection) -> rusqlite::Result<i64> {
    connection.query_row(
        &format!("SELECT COALESCE(MAX(version), 0) FROM {MIGRATIONS_TABLE}"),
        [],
        |row| row.get(0),
    )
}

pub(crate) fn has_migrations_table(connection: &Connection) -> rusqlite::Result<bool> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [MIGRATIONS_TABLE],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn migrate(connection: &mut Connection, target_version: i64) -> rusqlite::Result<()> {
    if target_version < 0 || target_version > current_schema_version() {
        return Err(storage_error_sqlite(&format!(
            "invalid migration target version '{target_version}'"
        )));
    }

    ensure_migrations_table(connection)?;
    let current_version = read_current_version(connection)?;

    if target_version > current_version {
        for version in (current_version + 1)..=target_version {
            let migration = defined_migration(version)?;
            apply_up_migration(connection, migration)?;
        }
    } else {
        for version in ((target_version + 1)..=current_version).rev() {
            let migration = defined_migration(version)?;
            apply_down_migration(connection, migration)?;
        }
    }

    Ok(())
}

fn defined_migration(version: i64) -> rusqlite::Result<&'static SqliteMigration> {
    migration(version).ok_or_else(|| {
        storage_error_sqlite(&format!("migration version '{version}' is not defined"))
    })
}

fn apply_up_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.up_sql)?;
    transaction.execute(
        &format!(
            "INSERT INTO {MIGRATIONS_TABLE} (version, name, applied_at_unix)
             VALUES (?1, ?2, strftime('%s', 'now'))"
        ),
        (migration.version, migration.name),
    )?;
    transaction.commit()?;
    Ok(())
}

fn apply_down_migration(
    connection: &mut Connection,
    migration: &SqliteMigration,
) -> rusqlite::Result<()> {
    let transaction = connection.transaction()?;
    transaction.execute_batch(migration.down_sql)?;
    transaction.execute(
        &format!("DELETE FROM {MIGRATIONS_TABLE} WHERE version = ?1"),
        [migration.version],
    )?;
    transaction.commit()?;
    Ok(())
}

pub(crate) fn read_card(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    let card_type_raw: i64 = row.get(4)?;
    let queue_raw: i64 = row.get(5)?;
    let original_deck_id: Option<i64> = row.get(3)?;

    Ok(Card {
        id: CardId(row.get(0)?),
        note_id: NoteId(row.get(1)?),
        deck_id: DeckId(row.get(2)?),
        original_deck_id: original_deck_id.filter(|id| *id != 0).map(DeckId),
        card_type: CardType::from_i64(card_type_raw).ok_or_else(|| {
            storage_error_sqlite(&format!("unknown card type '{card_type_raw}' in sqlite record"))
        })?,
        queue: CardQueue::from_i64(queue_raw).ok_or_else(|| {
            storage_error_sqlite(&format!("unknown card queue '{queue_raw}' in sqlite record"))
        })?,
        due: row.get(6)?,
        interval: row.get(7)?,
        reps: row.get(8)?,
    })
}

pub(crate) fn split_fields(raw: &str) -> Vec<String> {
    raw.split('\u{1f}').map(str::to_string).collect()
}

pub(crate) fn join_fields(fields: &[String]) -> String {
    fields.join("\u{1f}")
}

pub(crate) fn bool_to_sqlite(value: bool) -> i64 {
    if value { 1 } else { 0 }
}

pub(crate) fn sqlite_to_bool(value: i64) -> bool {
    value != 0
}

pub(crate) fn to_u32(value: i64) -> rusqlite::Result<u32> {
    u32::try_from(value).map_err(|_| storage_error_sqlite("count exceeds u32 range"))
}

pub(crate) fn storage_error(operation: &str, error: rusqlite::Error) -> CoreError {
    storage_error_text(operation, error.to_string())
}

pub(crate) fn storage_error_sqlite(message: &str) -> rusqlite::Error {
    rusqlite::Error::ToSqlConversionFailure(Box::new(std::io::Error::other(message.to_string())))
}

pub(crate) fn storage_error_text(operation: &str, message: impl AsRef<str>) -> CoreError {
    CoreError::new(
        CoreErrorKind::StorageFailure,
        format!("sqlite collection '{operation}' failed: {}", message.as_ref()),
    )
}
