use std::collections::HashSet;

use rusqlite::{params, Connection};

use crate::error::NotesResult;

/// Extract hashtags from note content.
///
/// Every `#` starts a tag, wherever it appears, and the tag runs until the
/// next whitespace or `$`. Tags are lowercased and de-duplicated, keeping
/// first-seen order. A `#` with nothing after it is not a tag.
pub fn extract_hashtags(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut tags = Vec::new();
    let mut rest = content;
    while let Some(pos) = rest.find('#') {
        let after = &rest[pos + 1..];
        let end = after
            .find(|c: char| c.is_whitespace() || c == '$')
            .unwrap_or(after.len());
        let (tag, tail) = after.split_at(end);
        rest = tail;
        if tag.is_empty() {
            continue;
        }
        // "##x" yields "#x": the run after the first '#' swallows the second.
        let tag = tag.to_lowercase();
        if seen.insert(tag.clone()) {
            tags.push(tag);
        }
    }
    tags
}

/// Replace the tag links of `note_id` with the hashtags found in `content`.
///
/// Must be called with the transaction that wrote the note so that a rollback
/// undoes both. Tag rows are created on demand and never removed.
pub fn apply_tags(conn: &Connection, note_id: i64, content: &str) -> NotesResult<Vec<String>> {
    conn.execute("DELETE FROM note_tags WHERE note_id = ?1", params![note_id])?;

    let tags = extract_hashtags(content);
    let mut insert_tag = conn.prepare_cached("INSERT OR IGNORE INTO tags (name) VALUES (?1)")?;
    let mut link = conn.prepare_cached(
        "INSERT OR IGNORE INTO note_tags (note_id, tag_id)
         SELECT ?1, id FROM tags WHERE name = ?2",
    )?;
    for tag in &tags {
        insert_tag.execute(params![tag])?;
        link.execute(params![note_id, tag])?;
    }
    Ok(tags)
}

/// All tag names linked to at least one note, alphabetically.
pub fn list_tags(conn: &Connection) -> NotesResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT t.name
         FROM tags t
         JOIN note_tags nt ON nt.tag_id = t.id
         ORDER BY t.name ASC",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}
