use crate::config::{read_library, ConfigError, LibraryFile, LIBRARY_VERSION};
use crate::core::store::ChordStore;
use crate::core::types::OutputSpec;
use std::fs;
use tempfile::TempDir;

fn sample_store() -> ChordStore {
    let mut store = ChordStore::new();
    store.add(["a", "s"], OutputSpec::text("as"), Some("words".to_string())).unwrap();
    store.add(["cmd", "q", "w"], OutputSpec::shell("open -a Safari"), None).unwrap();
    store
}

#[test]
fn test_new_library_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let library = LibraryFile::open(temp_dir.path().join("chords.json"), None, 5).unwrap();

    assert!(library.load().unwrap().is_empty());
}

#[test]
fn test_save_then_load() {
    let temp_dir = TempDir::new().unwrap();
    let library = LibraryFile::open(temp_dir.path().join("chords.json"), None, 5).unwrap();
    let store = sample_store();

    library.save(&store).unwrap();
    let mut loaded = library.load().unwrap();

    assert_eq!(loaded.snapshot(), store.snapshot());
    assert_eq!(loaded.history(), store.history(), "Undo history persists");
    assert_eq!(loaded.undo(1)[0].output, OutputSpec::shell("open -a Safari"));
}

#[test]
fn test_document_shape() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("chords.json");
    let library = LibraryFile::open(path.clone(), None, 5).unwrap();

    library.save(&sample_store()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

    assert_eq!(json["version"], LIBRARY_VERSION);
    assert_eq!(json["metadata"]["chord_count"], 2);
    assert_eq!(json["chords"][0]["input_keys"], serde_json::json!(["a", "s"]));
    assert_eq!(json["chords"][0]["output"]["type"], "text");
}

#[test]
fn test_unknown_version_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("chords.json");
    fs::write(
        &path,
        r#"{"version": "2.0", "metadata": {"saved_at": "2025-01-01T00:00:00Z", "chord_count": 0}}"#,
    )
    .unwrap();

    let library = LibraryFile::open(path, None, 5).unwrap();

    assert!(matches!(
        library.load(),
        Err(ConfigError::UnsupportedVersion { .. })
    ));
}

#[test]
fn test_corrupt_library_reported() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("chords.json");
    fs::write(&path, "{ not json").unwrap();

    let library = LibraryFile::open(path, None, 5).unwrap();

    assert!(matches!(library.load(), Err(ConfigError::InvalidLibrary { .. })));
}

#[test]
fn test_save_keeps_backup() {
    let temp_dir = TempDir::new().unwrap();
    let backups = temp_dir.path().join("backups-here");
    let library =
        LibraryFile::open(temp_dir.path().join("chords.json"), Some(backups.clone()), 5).unwrap();

    library.save(&sample_store()).unwrap();

    assert_eq!(library.manager().list_backups().unwrap().len(), 1);
    assert_eq!(library.manager().backup_dir(), backups.as_path());
}

#[test]
fn test_read_library_creates_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested/chords.json");

    assert!(read_library(&path).unwrap().is_empty());
    assert!(!path.exists());
    assert!(!temp_dir.path().join("nested").exists());
}

#[test]
fn test_read_library_matches_load() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("chords.json");
    LibraryFile::open(path.clone(), None, 5)
        .unwrap()
        .save(&sample_store())
        .unwrap();

    assert_eq!(read_library(&path).unwrap().len(), 2);
}
