#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub up_sql: &'static str,
    pub down_sql: &'static str,
}

const MIGRATION_0001: SqliteMigration = SqliteMigration {
    version: 1,
    name: "initial_collection_schema",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS decks (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    dynamic INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO decks (id, name, dynamic) VALUES (1, 'Default', 0);

CREATE TABLE IF NOT EXISTS note_types (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY,
    note_type_id INTEGER NOT NULL,
    fields TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_note_type ON notes (note_type_id);

CREATE TABLE IF NOT EXISTS cards (
    id INTEGER PRIMARY KEY,
    note_id INTEGER NOT NULL,
    deck_id INTEGER NOT NULL,
    original_deck_id INTEGER,
    card_type INTEGER NOT NULL DEFAULT 0,
    queue INTEGER NOT NULL DEFAULT 0,
    due INTEGER NOT NULL DEFAULT 0,
    interval INTEGER NOT NULL DEFAULT 0,
    reps INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_cards_note ON cards (note_id);
CREATE INDEX IF NOT EXISTS idx_cards_deck ON cards (deck_id);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_cards_deck;
DROP INDEX IF EXISTS idx_cards_note;
DROP TABLE IF EXISTS cards;
DROP INDEX IF EXISTS idx_notes_note_type;
DROP TABLE IF EXISTS notes;
DROP TABLE IF EXISTS note_types;
DROP TABLE IF EXISTS decks;
"#,
};

const MIGRATION_0002: SqliteMigration = SqliteMigration {
    version: 2,
    name: "add_collection_config",
    up_sql: r#"
CREATE TABLE IF NOT EXISTS collection_config (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

INSERT OR IGNORE INTO collection_config (key, value)
VALUES ('created_at_unix', CAST(strftime('%s', 'now') AS TEXT));
"#,
    down_sql: r#"
DROP TABLE IF EXISTS collection_config;
"#,
};

const MIGRATION_0003: SqliteMigration = SqliteMigration {
    version: 3,
    name: "add_note_guid",
    up_sql: r#"
ALTER TABLE notes ADD COLUMN guid TEXT;

UPDATE notes SET guid = lower(hex(randomblob(8))) WHERE guid IS NULL;

CREATE UNIQUE INDEX IF NOT EXISTS idx_notes_guid ON notes (guid);
"#,
    down_sql: r#"
DROP INDEX IF EXISTS idx_notes_guid;
ALTER TABLE notes DROP COLUMN guid;
"#,
};

const MIGRATIONS: [SqliteMigration; 3] = [MIGRATION_0001, MIGRATION_0002, MIGRATION_0003];

pub fn migrations() -> &'static [SqliteMigration] {
    &MIGRATIONS
}

pub fn migration(version: i64) -> Option<&'static SqliteMigration> {
    MIGRATIONS.iter().find(|entry| entry.version == version)
}

pub fn current_schema_version() -> i64 {
    MIGRATIONS.last().map(|entry| entry.version).unwrap_or(0)
}
