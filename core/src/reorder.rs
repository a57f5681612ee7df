use std::collections::HashSet;

use rusqlite::{params, Connection};

use crate::db::placeholders;
use crate::error::{NotesError, NotesResult};

/// Reassign `sort_order` so that `ordered_ids[0]` ends up on top.
///
/// Only the keys already held by these ids are reused: they are sorted
/// descending and handed out by position. Notes outside the set keep their
/// keys, so their relative position is unchanged. Call inside a transaction.
pub fn reorder_notes(conn: &Connection, ordered_ids: &[i64]) -> NotesResult<()> {
    if ordered_ids.is_empty() {
        return Ok(());
    }

    let mut seen = HashSet::new();
    if let Some(dup) = ordered_ids.iter().find(|id| !seen.insert(**id)) {
        return Err(NotesError::validation(
            "ids",
            format!("note {dup} appears more than once"),
        ));
    }

    let sql = format!(
        "SELECT sort_order FROM notes WHERE id IN ({}) ORDER BY sort_order DESC",
        placeholders(ordered_ids.len())
    );
    let keys: Vec<i64> = {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(ordered_ids), |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };
    if keys.len() != ordered_ids.len() {
        return Err(NotesError::validation(
            "ids",
            format!(
                "{} of {} notes do not exist",
                ordered_ids.len() - keys.len(),
                ordered_ids.len()
            ),
        ));
    }

    let mut update = conn.prepare_cached("UPDATE notes SET sort_order = ?1 WHERE id = ?2")?;
    for (id, key) in ordered_ids.iter().zip(&keys) {
        update.execute(params![key, id])?;
    }
    tracing::debug!(count = ordered_ids.len(), "notes reordered");
    Ok(())
}
