use std::collections::HashMap;

use rusqlite::Connection;

use crate::attachments::FileKind;
use crate::db::{placeholders, Attachment, Note};
use crate::error::NotesResult;

/// Tag names for a page of notes in one query, keyed by note id. Notes without
/// tags have no entry.
pub fn load_tags_batch(conn: &Connection, note_ids: &[i64]) -> NotesResult<HashMap<i64, Vec<String>>> {
    let mut map: HashMap<i64, Vec<String>> = HashMap::new();
    if note_ids.is_empty() {
        return Ok(map);
    }
    let sql = format!(
        "SELECT nt.note_id, t.name
         FROM note_tags nt
         JOIN tags t ON t.id = nt.tag_id
         WHERE nt.note_id IN ({})
         ORDER BY nt.note_id, t.name",
        placeholders(note_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(note_ids), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for r in rows {
        let (note_id, name) = r?;
        map.entry(note_id).or_default().push(name);
    }
    Ok(map)
}

/// Attachments for a page of notes in one query, keyed by note id, in upload
/// order.
pub fn load_attachments_batch(
    conn: &Connection,
    note_ids: &[i64],
) -> NotesResult<HashMap<i64, Vec<Attachment>>> {
    let mut map: HashMap<i64, Vec<Attachment>> = HashMap::new();
    if note_ids.is_empty() {
        return Ok(map);
    }
    let sql = format!(
        "SELECT note_id, id, file_path, thumbnail_path, file_type
         FROM attachments
         WHERE note_id IN ({})
         ORDER BY note_id, id",
        placeholders(note_ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(note_ids), |row| {
        Ok((
            row.get::<_, i64>(0)?,
            Attachment {
                id: row.get(1)?,
                file_path: row.get(2)?,
                thumbnail_path: row.get(3)?,
                file_type: FileKind::parse(&row.get::<_, String>(4)?),
            },
        ))
    })?;
    for r in rows {
        let (note_id, attachment) = r?;
        map.entry(note_id).or_default().push(attachment);
    }
    Ok(map)
}

/// Fill `tags` and `attachments` on each note with two queries total.
pub fn enrich(conn: &Connection, notes: &mut [Note]) -> NotesResult<()> {
    let ids: Vec<i64> = notes.iter().map(|n| n.id).collect();
    let mut tags = load_tags_batch(conn, &ids)?;
    let mut attachments = load_attachments_batch(conn, &ids)?;
    for note in notes.iter_mut() {
        note.tags = tags.remove(&note.id).unwrap_or_default();
        note.attachments = attachments.remove(&note.id).unwrap_or_default();
    }
    Ok(())
}
