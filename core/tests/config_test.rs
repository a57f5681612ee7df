use std::fs;

use notes_core::config::{Config, Profile, CONFIG_FILE};
use notes_core::error::NotesError;
use notes_core::filter::NoteFilter;
use tempfile::TempDir;

#[test]
fn test_load_writes_defaults() {
    let dir = TempDir::new().unwrap();
    let profile = Profile::load(dir.path().join("profile")).unwrap();

    assert_eq!(profile.config, Config::default());
    assert_eq!(profile.config.page_size, 15);
    let written = fs::read_to_string(dir.path().join("profile").join(CONFIG_FILE)).unwrap();
    assert!(written.contains("database = \"notes.db\""));
}

#[test]
fn test_load_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join(CONFIG_FILE),
        "uploads_dir = \"files\"\npage_size = 5\n",
    )
    .unwrap();

    let profile = Profile::load(dir.path()).unwrap();
    assert_eq!(profile.config.page_size, 5);
    assert_eq!(profile.config.database, "notes.db");
    assert_eq!(profile.uploads_path(), dir.path().join("files"));
    assert_eq!(profile.database_path(), dir.path().join("notes.db"));
}

#[test]
fn test_load_rejects_bad_toml() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join(CONFIG_FILE), "page_size = \"lots\"").unwrap();
    assert!(matches!(Profile::load(dir.path()), Err(NotesError::Config(_))));
}

#[test]
fn test_explicit_dir_wins() {
    let dir = TempDir::new().unwrap();
    assert_eq!(Profile::resolve_dir(Some(dir.path())), dir.path());
}

#[test]
fn test_open_repository_round_trip() {
    let dir = TempDir::new().unwrap();
    let profile = Profile::load(dir.path()).unwrap();

    {
        let repo = profile.open_repository().unwrap();
        repo.create("persisted #kept", &[]).unwrap();
    }

    let repo = profile.open_repository().unwrap();
    let notes = repo.list(&NoteFilter::new()).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].tags, vec!["kept"]);
    assert!(profile.database_path().exists());
}
