use notes_core::db::Database;
use notes_core::error::NotesError;
use notes_core::reorder::reorder_notes;
use rusqlite::params;

/// Notes 1..=n with sort_order = 10 * id, so gaps are visible.
fn seed(n: i64) -> Database {
    let db = Database::open_in_memory().unwrap();
    for id in 1..=n {
        db.connection()
            .execute(
                "INSERT INTO notes (id, content, content_lower, sort_order) VALUES (?1, 'n', 'n', ?2)",
                params![id, id * 10],
            )
            .unwrap();
    }
    db
}

fn display_order(db: &Database) -> Vec<i64> {
    let mut stmt = db
        .connection()
        .prepare("SELECT id FROM notes ORDER BY sort_order DESC")
        .unwrap();
    let rows = stmt.query_map([], |r| r.get(0)).unwrap();
    rows.collect::<Result<Vec<_>, _>>().unwrap()
}

fn sort_order(db: &Database, id: i64) -> i64 {
    db.connection()
        .query_row("SELECT sort_order FROM notes WHERE id = ?1", params![id], |r| r.get(0))
        .unwrap()
}

// ---------------------------------------------------------------------------
// 1. Full permutation
// ---------------------------------------------------------------------------
#[test]
fn test_reorder_all_notes() {
    let db = seed(4);
    assert_eq!(display_order(&db), vec![4, 3, 2, 1]);

    db.with_transaction(|tx| reorder_notes(tx, &[2, 4, 1, 3])).unwrap();

    assert_eq!(display_order(&db), vec![2, 4, 1, 3]);
    // The same set of keys is reused.
    assert_eq!(sort_order(&db, 2), 40);
    assert_eq!(sort_order(&db, 4), 30);
    assert_eq!(sort_order(&db, 1), 20);
    assert_eq!(sort_order(&db, 3), 10);
}

// ---------------------------------------------------------------------------
// 2. Subset: notes outside the set keep their keys
// ---------------------------------------------------------------------------
#[test]
fn test_reorder_subset_leaves_others_alone() {
    let db = seed(5);

    // Swap 2 and 4; 1, 3 and 5 stay where they were.
    db.with_transaction(|tx| reorder_notes(tx, &[2, 4])).unwrap();

    assert_eq!(display_order(&db), vec![5, 2, 3, 4, 1]);
    assert_eq!(sort_order(&db, 5), 50);
    assert_eq!(sort_order(&db, 3), 30);
    assert_eq!(sort_order(&db, 1), 10);
    assert_eq!(sort_order(&db, 2), 40);
    assert_eq!(sort_order(&db, 4), 20);
}

#[test]
fn test_reorder_already_ordered_is_stable() {
    let db = seed(3);
    db.with_transaction(|tx| reorder_notes(tx, &[3, 2, 1])).unwrap();
    assert_eq!(sort_order(&db, 3), 30);
    assert_eq!(sort_order(&db, 2), 20);
    assert_eq!(sort_order(&db, 1), 10);
}

// ---------------------------------------------------------------------------
// 3. Edge cases
// ---------------------------------------------------------------------------
#[test]
fn test_reorder_empty_is_noop() {
    let db = seed(2);
    db.with_transaction(|tx| reorder_notes(tx, &[])).unwrap();
    assert_eq!(display_order(&db), vec![2, 1]);
}

#[test]
fn test_reorder_unknown_id_rejected() {
    let db = seed(3);
    let err = db
        .with_transaction(|tx| reorder_notes(tx, &[1, 99, 2]))
        .unwrap_err();
    assert!(matches!(err, NotesError::Validation { ref field, .. } if field == "ids"));
    assert_eq!(display_order(&db), vec![3, 2, 1]);
}

#[test]
fn test_reorder_duplicate_id_rejected() {
    let db = seed(3);
    let err = db
        .with_transaction(|tx| reorder_notes(tx, &[1, 2, 1]))
        .unwrap_err();
    assert!(matches!(err, NotesError::Validation { .. }));
    assert_eq!(display_order(&db), vec![3, 2, 1]);
}
