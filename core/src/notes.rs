use rusqlite::{params, params_from_iter, Row};
use serde::Serialize;

use crate::attachments::{AttachmentReport, AttachmentStore, UploadedFile};
use crate::db::{placeholders, Database, Note};
use crate::error::{NotesError, NotesResult};
use crate::filter::{ListParams, NoteFilter};
use crate::loader;
use crate::reorder::reorder_notes;
use crate::tags::{apply_tags, list_tags};

const NOTE_COLUMNS: &str = "id, content, created_at, updated_at, is_archived, sort_order";

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: row.get(0)?,
        content: row.get(1)?,
        created_at: row.get(2)?,
        updated_at: row.get(3)?,
        is_archived: row.get::<_, i64>(4)? != 0,
        sort_order: row.get(5)?,
        tags: Vec::new(),
        attachments: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Edit of an existing note.
#[derive(Debug, Clone, Default)]
pub struct NoteUpdate {
    pub id: i64,
    pub content: String,
    /// Attachments of this note to delete.
    pub remove_attachments: Vec<i64>,
    pub new_files: Vec<UploadedFile>,
}

/// Result of a create or update.
#[derive(Debug, Clone, Serialize)]
pub struct SavedNote {
    pub id: i64,
    pub sort_order: i64,
    pub tags: Vec<String>,
    pub attachments: AttachmentReport,
}

/// Parse a comma-separated id list such as `"3, 7,9"`. Blank entries are
/// skipped; anything non-numeric is a validation error.
pub fn parse_id_list(field: &str, raw: &str) -> NotesResult<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| NotesError::validation(field, format!("not an id: {s}")))
        })
        .collect()
}

fn require_id(field: &str, id: i64) -> NotesResult<()> {
    if id <= 0 {
        return Err(NotesError::validation(field, "a positive note id is required"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// NoteRepository
// ---------------------------------------------------------------------------

/// Read path and all-or-nothing mutations over notes.
///
/// One repository per worker: it owns its own connection, and the store's
/// transactional isolation is the only coordination between workers.
pub struct NoteRepository {
    db: Database,
    files: AttachmentStore,
}

impl NoteRepository {
    pub fn new(db: Database, files: AttachmentStore) -> Self {
        Self { db, files }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn attachment_store(&self) -> &AttachmentStore {
        &self.files
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// One page of notes, highest `sort_order` first, with tags and
    /// attachments batch-loaded.
    pub fn list(&self, filter: &NoteFilter) -> NotesResult<Vec<Note>> {
        let compiled = filter.compile();
        let conn = self.db.connection();
        let mut stmt = conn.prepare(&compiled.select_sql(NOTE_COLUMNS))?;
        let rows = stmt.query_map(params_from_iter(compiled.query_args()), note_from_row)?;
        let mut notes = rows.collect::<Result<Vec<_>, _>>()?;
        loader::enrich(conn, &mut notes)?;
        Ok(notes)
    }

    pub fn list_params(&self, params: &ListParams) -> NotesResult<Vec<Note>> {
        self.list(&NoteFilter::from_params(params))
    }

    pub fn get(&self, id: i64) -> NotesResult<Note> {
        require_id("id", id)?;
        self.list(&NoteFilter::new().id(id))?
            .into_iter()
            .next()
            .ok_or_else(|| NotesError::not_found(format!("note {id}")))
    }

    pub fn list_tags(&self) -> NotesResult<Vec<String>> {
        list_tags(self.db.connection())
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Insert a note on top of the list, index its tags and store its files.
    pub fn create(&self, content: &str, files: &[UploadedFile]) -> NotesResult<SavedNote> {
        let saved = self.db.with_transaction(|tx| {
            let sort_order: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM notes",
                [],
                |r| r.get(0),
            )?;
            tx.execute(
                "INSERT INTO notes (content, content_lower, sort_order) VALUES (?1, ?2, ?3)",
                params![content, content.to_lowercase(), sort_order],
            )?;
            let id = tx.last_insert_rowid();
            let tags = apply_tags(tx, id, content)?;
            let attachments = self.files.add_attachments(tx, id, files)?;
            Ok(SavedNote {
                id,
                sort_order,
                tags,
                attachments,
            })
        })?;
        tracing::info!(
            id = saved.id,
            tags = saved.tags.len(),
            attachments = saved.attachments.saved.len(),
            failed = saved.attachments.failed.len(),
            "note created"
        );
        Ok(saved)
    }

    /// Replace content, drop the requested attachments, store new uploads and
    /// re-index tags, as one transaction.
    pub fn update(&self, update: &NoteUpdate) -> NotesResult<SavedNote> {
        require_id("id", update.id)?;
        let id = update.id;
        let saved = self.db.with_transaction(|tx| {
            let changed = tx.execute(
                "UPDATE notes SET content = ?1, content_lower = ?2, updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?3",
                params![update.content, update.content.to_lowercase(), id],
            )?;
            if changed == 0 {
                return Err(NotesError::not_found(format!("note {id}")));
            }
            if !update.remove_attachments.is_empty() {
                self.files.remove_attachments(tx, id, &update.remove_attachments)?;
            }
            let attachments = self.files.add_attachments(tx, id, &update.new_files)?;
            let tags = apply_tags(tx, id, &update.content)?;
            let sort_order: i64 =
                tx.query_row("SELECT sort_order FROM notes WHERE id = ?1", params![id], |r| {
                    r.get(0)
                })?;
            Ok(SavedNote {
                id,
                sort_order,
                tags,
                attachments,
            })
        })?;
        tracing::info!(
            id,
            removed = update.remove_attachments.len(),
            added = saved.attachments.saved.len(),
            "note updated"
        );
        Ok(saved)
    }

    /// Delete one note. Its files go first; rows for tags and attachments
    /// follow through the cascading foreign keys.
    pub fn delete(&self, id: i64) -> NotesResult<()> {
        require_id("id", id)?;
        self.db.with_transaction(|tx| {
            self.files.purge_files_for_notes(tx, &[id])?;
            let deleted = tx.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(NotesError::not_found(format!("note {id}")));
            }
            Ok(())
        })?;
        tracing::info!(id, "note deleted");
        Ok(())
    }

    /// Delete several notes. Unknown ids are ignored; returns the number of
    /// notes removed. An empty list does nothing.
    pub fn delete_batch(&self, ids: &[i64]) -> NotesResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.db.with_transaction(|tx| {
            self.files.purge_files_for_notes(tx, ids)?;
            let sql = format!("DELETE FROM notes WHERE id IN ({})", placeholders(ids.len()));
            Ok(tx.execute(&sql, params_from_iter(ids))?)
        })?;
        tracing::info!(requested = ids.len(), deleted, "notes deleted");
        Ok(deleted)
    }

    pub fn set_archived(&self, id: i64, archived: bool) -> NotesResult<()> {
        require_id("id", id)?;
        let changed = self.db.connection().execute(
            "UPDATE notes SET is_archived = ?1 WHERE id = ?2",
            params![archived as i64, id],
        )?;
        if changed == 0 {
            return Err(NotesError::not_found(format!("note {id}")));
        }
        tracing::debug!(id, archived, "archive flag set");
        Ok(())
    }

    /// Archive or unarchive several notes at once. Returns the number changed.
    pub fn set_archived_batch(&self, ids: &[i64], archived: bool) -> NotesResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.db.with_transaction(|tx| {
            let sql = format!(
                "UPDATE notes SET is_archived = ? WHERE id IN ({})",
                placeholders(ids.len())
            );
            let mut args: Vec<i64> = Vec::with_capacity(ids.len() + 1);
            args.push(archived as i64);
            args.extend_from_slice(ids);
            Ok(tx.execute(&sql, params_from_iter(args))?)
        })
    }

    /// Reorder notes; `ids[0]` becomes the top of the set.
    pub fn reorder(&self, ids: &[i64]) -> NotesResult<()> {
        self.db.with_transaction(|tx| reorder_notes(tx, ids))
    }

    /// Remove unreferenced upload files. Holds the write lock for the whole
    /// sweep so no other worker's upload can be mid-commit meanwhile.
    pub fn sweep_orphan_files(&self) -> NotesResult<Vec<String>> {
        self.db.with_transaction(|tx| self.files.sweep_orphan_files(tx))
    }
}
