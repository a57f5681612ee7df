use notes_core::db::Database;
use notes_core::error::NotesError;
use rusqlite::{params, Connection};
use tempfile::TempDir;

fn count(db: &Database, sql: &str) -> i64 {
    db.connection().query_row(sql, [], |r| r.get(0)).unwrap()
}

// ---------------------------------------------------------------------------
// 1. Schema — all tables exist after open
// ---------------------------------------------------------------------------
#[test]
fn test_create_database_and_migrate() {
    let db = Database::open_in_memory().unwrap();
    let tables = db.table_names().unwrap();

    for t in ["attachments", "note_tags", "notes", "tags"] {
        assert!(
            tables.iter().any(|name| name == t),
            "missing table: {t}, got: {tables:?}"
        );
    }
}

// ---------------------------------------------------------------------------
// 2. Re-opening an existing file is a no-op
// ---------------------------------------------------------------------------
#[test]
fn test_reopen_existing_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.db");

    {
        let db = Database::open(&path).unwrap();
        db.connection()
            .execute(
                "INSERT INTO notes (content, content_lower, sort_order) VALUES ('a', 'a', 1)",
                [],
            )
            .unwrap();
    }

    let db = Database::open(&path).unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM notes"), 1);
}

// ---------------------------------------------------------------------------
// 3. Transaction commits on Ok
// ---------------------------------------------------------------------------
#[test]
fn test_transaction_commits() {
    let db = Database::open_in_memory().unwrap();

    let id = db
        .with_transaction(|tx| {
            tx.execute(
                "INSERT INTO notes (content, content_lower, sort_order) VALUES ('x', 'x', 1)",
                [],
            )?;
            Ok(tx.last_insert_rowid())
        })
        .unwrap();

    assert!(id > 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM notes"), 1);
}

// ---------------------------------------------------------------------------
// 4. Transaction rollback on error
// ---------------------------------------------------------------------------
#[test]
fn test_transaction_rollback_on_error() {
    let db = Database::open_in_memory().unwrap();

    let result: Result<(), NotesError> = db.with_transaction(|tx| {
        tx.execute(
            "INSERT INTO notes (content, content_lower, sort_order) VALUES ('x', 'x', 1)",
            [],
        )?;
        Err(NotesError::validation("test", "intentional failure"))
    });
    assert!(result.is_err());

    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM notes"),
        0,
        "rolled-back note should not persist"
    );
}

// ---------------------------------------------------------------------------
// 5. Transaction rollback on panic
// ---------------------------------------------------------------------------
#[test]
fn test_transaction_rollback_on_panic() {
    let db = Database::open_in_memory().unwrap();

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = db.with_transaction(|tx| -> notes_core::NotesResult<()> {
            tx.execute(
                "INSERT INTO notes (content, content_lower, sort_order) VALUES ('x', 'x', 1)",
                [],
            )?;
            panic!("boom");
        });
    }));
    assert!(outcome.is_err());

    assert_eq!(count(&db, "SELECT COUNT(*) FROM notes"), 0);
    // The connection is usable again: a new transaction can start.
    db.with_transaction(|_| Ok(())).unwrap();
}

// ---------------------------------------------------------------------------
// 6. Cascade: deleting a note removes its links and attachments, not tags
// ---------------------------------------------------------------------------
#[test]
fn test_delete_cascades_to_dependents() {
    let db = Database::open_in_memory().unwrap();
    let conn = db.connection();
    conn.execute_batch(
        "INSERT INTO notes (id, content, content_lower, sort_order) VALUES (1, '#a', '#a', 1);
         INSERT INTO tags (id, name) VALUES (1, 'a');
         INSERT INTO note_tags (note_id, tag_id) VALUES (1, 1);
         INSERT INTO attachments (note_id, file_path, file_type) VALUES (1, '1_x.txt', 'document');",
    )
    .unwrap();

    conn.execute("DELETE FROM notes WHERE id = 1", []).unwrap();

    assert_eq!(count(&db, "SELECT COUNT(*) FROM note_tags"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM attachments"), 0);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM tags"), 1);
}

// ---------------------------------------------------------------------------
// 7. Additive migrations on a database that predates the newer columns
// ---------------------------------------------------------------------------
#[test]
fn test_additive_migrations_backfill_legacy_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legacy.db");

    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE notes (
                 id         INTEGER PRIMARY KEY,
                 content    TEXT NOT NULL,
                 created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
             );
             CREATE TABLE attachments (
                 id        INTEGER PRIMARY KEY,
                 note_id   INTEGER NOT NULL,
                 file_path TEXT NOT NULL,
                 file_type TEXT NOT NULL
             );",
        )
        .unwrap();
        conn.execute(
            "INSERT INTO notes (content) VALUES (?1), (?2)",
            params!["Hello WORLD", "Привет Мир"],
        )
        .unwrap();
    }

    let db = Database::open(&path).unwrap();
    let rows: Vec<(i64, String, i64, i64, String)> = {
        let mut stmt = db
            .connection()
            .prepare(
                "SELECT id, content_lower, sort_order, is_archived, updated_at
                 FROM notes ORDER BY id",
            )
            .unwrap();
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?)))
            .unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    };

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].1, "hello world");
    // Non-ASCII text is folded too.
    assert_eq!(rows[1].1, "привет мир");
    // sort_order is seeded from id so the old display order survives.
    assert_eq!(rows[0].2, rows[0].0);
    assert_eq!(rows[1].2, rows[1].0);
    assert_eq!(rows[0].3, 0);
    assert!(!rows[0].4.is_empty(), "updated_at should be copied from created_at");

    let thumbs = count(&db, "SELECT COUNT(*) FROM attachments WHERE thumbnail_path = ''");
    assert_eq!(thumbs, 0);
}
