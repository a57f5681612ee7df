use std::path::Path;

use rusqlite::{params, Connection, Transaction, TransactionBehavior};
use serde::Serialize;

use crate::attachments::FileKind;
use crate::error::NotesResult;

/// Busy timeout applied when the caller does not configure one.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

// ---------------------------------------------------------------------------
// Data structs
// ---------------------------------------------------------------------------

/// A note row enriched with its tags and attachments.
#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: i64,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
    pub is_archived: bool,
    pub sort_order: i64,
    /// Filled by the batch loader; empty when the note has no tags.
    pub tags: Vec<String>,
    /// Filled by the batch loader; empty when the note has no attachments.
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub id: i64,
    /// Stored file name relative to the storage root.
    pub file_path: String,
    /// Thumbnail file name, empty when no derivative exists.
    pub thumbnail_path: String,
    pub file_type: FileKind,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and apply the schema.
    ///
    /// Every request worker opens its own handle; SQLite's WAL journal lets
    /// readers proceed while a single writer holds the lock.
    pub fn open(path: impl AsRef<Path>) -> NotesResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout_ms: u64) -> NotesResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self { conn };
        db.apply_pragmas(busy_timeout_ms)?;
        db.migrate()?;
        tracing::debug!(path = %path.as_ref().display(), "database opened");
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> NotesResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_pragmas(DEFAULT_BUSY_TIMEOUT_MS)?;
        db.migrate()?;
        Ok(db)
    }

    fn apply_pragmas(&self, busy_timeout_ms: u64) -> NotesResult<()> {
        self.conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {busy_timeout_ms};"
        ))?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Execute `f` inside an IMMEDIATE transaction. Commits on Ok; the guard
    /// rolls back on Err and on unwind.
    pub fn with_transaction<T, F>(&self, f: F) -> NotesResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> NotesResult<T>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let val = f(&tx)?;
        tx.commit()?;
        Ok(val)
    }

    fn migrate(&self) -> NotesResult<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS notes (
                id            INTEGER PRIMARY KEY,
                content       TEXT NOT NULL,
                content_lower TEXT NOT NULL DEFAULT '',
                created_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at    TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                is_archived   INTEGER NOT NULL DEFAULT 0,
                sort_order    INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS tags (
                id   INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS note_tags (
                note_id INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                tag_id  INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (note_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS attachments (
                id             INTEGER PRIMARY KEY,
                note_id        INTEGER NOT NULL REFERENCES notes(id) ON DELETE CASCADE,
                file_path      TEXT NOT NULL,
                thumbnail_path TEXT NOT NULL DEFAULT '',
                file_type      TEXT NOT NULL
            );
            ",
        )?;

        // Older databases may predate some columns; indexes below depend on them.
        self.apply_additive_migrations()?;

        self.conn.execute_batch(
            "
            CREATE INDEX IF NOT EXISTS idx_notes_sort_order     ON notes(sort_order);
            CREATE INDEX IF NOT EXISTS idx_notes_archived_order ON notes(is_archived, sort_order);
            CREATE INDEX IF NOT EXISTS idx_note_tags_tag        ON note_tags(tag_id);
            CREATE INDEX IF NOT EXISTS idx_attachments_note     ON attachments(note_id);
            ",
        )?;

        Ok(())
    }

    fn has_column(&self, table: &str, column: &str) -> bool {
        self.conn
            .prepare(&format!("SELECT {column} FROM {table} LIMIT 0"))
            .is_ok()
    }

    /// Column additions for existing databases. Each checks for the column
    /// first, so this runs on every open. Other mismatches are left alone.
    fn apply_additive_migrations(&self) -> NotesResult<()> {
        if !self.has_column("notes", "updated_at") {
            self.conn.execute_batch(
                "ALTER TABLE notes ADD COLUMN updated_at TEXT NOT NULL DEFAULT '';
                 UPDATE notes SET updated_at = created_at;",
            )?;
        }

        if !self.has_column("notes", "is_archived") {
            self.conn.execute_batch(
                "ALTER TABLE notes ADD COLUMN is_archived INTEGER NOT NULL DEFAULT 0;",
            )?;
        }

        if !self.has_column("notes", "sort_order") {
            self.conn.execute_batch(
                "ALTER TABLE notes ADD COLUMN sort_order INTEGER NOT NULL DEFAULT 0;
                 UPDATE notes SET sort_order = id;",
            )?;
        }

        if !self.has_column("notes", "content_lower") {
            self.conn.execute_batch(
                "ALTER TABLE notes ADD COLUMN content_lower TEXT NOT NULL DEFAULT '';",
            )?;
            let backfilled = self.backfill_content_lower()?;
            tracing::info!(backfilled, "added content_lower to notes");
        }

        if !self.has_column("attachments", "thumbnail_path") {
            self.conn.execute_batch(
                "ALTER TABLE attachments ADD COLUMN thumbnail_path TEXT NOT NULL DEFAULT '';",
            )?;
        }

        Ok(())
    }

    /// SQLite's lower() only folds ASCII, so the projection is computed here.
    fn backfill_content_lower(&self) -> NotesResult<usize> {
        self.with_transaction(|tx| {
            let rows: Vec<(i64, String)> = {
                let mut stmt = tx.prepare("SELECT id, content FROM notes")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            let mut stmt = tx.prepare("UPDATE notes SET content_lower = ?1 WHERE id = ?2")?;
            for (id, content) in &rows {
                stmt.execute(params![content.to_lowercase(), id])?;
            }
            Ok(rows.len())
        })
    }

    /// Return all user table names (for testing/diagnostics).
    pub fn table_names(&self) -> NotesResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table'
             AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

/// Build a `?,?,?` placeholder list for an `IN (...)` clause.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}
