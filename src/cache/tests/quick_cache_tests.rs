use crate::cache::*;
use crate::core::store::{ChordStore, StoreError};
use crate::core::types::{KeySet, OutputSpec};
use std::fs;
use std::io::Write;
use std::time::Duration;
use tempfile::TempDir;

fn cache_in(temp_dir: &TempDir) -> QuickCache {
    QuickCache::new(temp_dir.path().join("cache/quick.jsonl"))
}

#[test]
fn test_append_creates_log() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);

    cache.append(&["t", "h"], "the", None).unwrap();
    cache.append(&["a", "n", "d"], "and", Some("words")).unwrap();

    let content = fs::read_to_string(cache.path()).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("\"output\":\"the\""));
    assert!(!lines[0].contains("category"), "Missing category is not written");
    assert!(lines[1].contains("\"category\":\"words\""));
}

#[test]
fn test_pending_reports_malformed_lines() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    cache.append(&["t", "h"], "the", None).unwrap();

    let mut file = fs::OpenOptions::new().append(true).open(cache.path()).unwrap();
    writeln!(file, "not json").unwrap();
    writeln!(file).unwrap();

    let pending = cache.pending().unwrap();
    assert_eq!(pending.len(), 2, "Blank lines are skipped");
    assert!(matches!(&pending[0], PendingLine::Entry { chord, .. } if chord.output == "the"));
    assert!(matches!(&pending[1], PendingLine::Malformed { .. }));
    assert_eq!(pending[1].raw(), "not json");
}

#[test]
fn test_missing_log_is_empty() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    let mut store = ChordStore::new();

    assert!(cache.pending().unwrap().is_empty());
    let report = cache.reconcile(&mut store).unwrap();
    assert!(report.is_empty());
    assert_eq!(report.remaining, 0);
}

#[test]
fn test_reconcile_adds_and_removes_log() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    cache.append(&["t", "h"], "the", None).unwrap();
    cache.append(&["a", "n", "d"], "and", Some("words")).unwrap();

    let mut store = ChordStore::new();
    let report = cache.reconcile(&mut store).unwrap();

    assert_eq!(report.added.len(), 2);
    assert_eq!(report.remaining, 0);
    assert!(!cache.path().exists());

    let the = store.find_by_keys(&KeySet::new(["h", "t"]).unwrap()).unwrap();
    assert_eq!(the.category.as_deref(), Some(QUICK_CATEGORY));
    assert_eq!(the.output, OutputSpec::text("the"));

    let and = store.find_by_keys(&KeySet::new(["a", "d", "n"]).unwrap()).unwrap();
    assert_eq!(and.category.as_deref(), Some("words"));
}

#[test]
fn test_reconcile_keeps_failed_and_malformed_lines() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    let mut store = ChordStore::new();
    store.add(["t", "h"], OutputSpec::text("the"), None).unwrap();

    cache.append(&["h", "t"], "that", None).unwrap();
    cache.append(&["o", "f"], "of", None).unwrap();
    let mut file = fs::OpenOptions::new().append(true).open(cache.path()).unwrap();
    writeln!(file, "{{broken").unwrap();

    let report = cache.reconcile(&mut store).unwrap();

    assert_eq!(report.added.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(report.failed[0].1, StoreError::Conflict { .. }));
    assert_eq!(report.malformed, vec!["{broken".to_string()]);
    assert_eq!(report.remaining, 2);

    let left = cache.pending().unwrap();
    assert_eq!(left.len(), 2);
    assert!(matches!(&left[0], PendingLine::Entry { chord, .. } if chord.output == "that"));
    assert_eq!(left[1].raw(), "{broken");
    assert_eq!(store.len(), 2);
}

#[test]
fn test_unknown_keys_stay_queued() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    cache.append(&["t", "nosuchkey"], "oops", None).unwrap();
    let before = fs::read_to_string(cache.path()).unwrap();

    let mut store = ChordStore::new();
    let report = cache.reconcile(&mut store).unwrap();

    assert!(report.added.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(fs::read_to_string(cache.path()).unwrap(), before, "Nothing added, log untouched");
}

#[test]
fn test_apply_leaves_log_until_settled() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    cache.append(&["t", "h"], "the", None).unwrap();

    let mut store = ChordStore::new();
    let reconciliation = cache.apply(&mut store).unwrap();
    assert_eq!(reconciliation.report().added.len(), 1);
    assert_eq!(cache.pending().unwrap().len(), 1);

    // Written by another `quick` between apply and settle
    cache.append(&["o", "f"], "of", None).unwrap();

    let report = cache.settle(reconciliation).unwrap();
    assert_eq!(report.remaining, 1);

    let left = cache.pending().unwrap();
    assert!(matches!(&left[0], PendingLine::Entry { chord, .. } if chord.output == "of"));
}

#[test]
fn test_rewritten_log_keeps_only_new_lines() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    let mut store = ChordStore::new();
    store.add(["t", "h"], OutputSpec::text("the"), None).unwrap();

    cache.append(&["h", "t"], "that", None).unwrap();
    cache.append(&["a", "n", "d"], "and", None).unwrap();
    let consumed = fs::read_to_string(cache.path()).unwrap();

    let reconciliation = cache.apply(&mut store).unwrap();
    assert_eq!(reconciliation.report().added.len(), 1);
    assert_eq!(reconciliation.report().failed.len(), 1);

    // Another writer rewrites the log with a new line in front
    cache.append(&["o", "f"], "of", None).unwrap();
    let appended = fs::read_to_string(cache.path()).unwrap();
    let new_line = appended.strip_prefix(&consumed).unwrap();
    fs::write(cache.path(), format!("{}{}", new_line, consumed)).unwrap();

    let report = cache.settle(reconciliation).unwrap();
    assert_eq!(report.remaining, 2, "Failed line once, new line once");

    let left = cache.pending().unwrap();
    let outputs: Vec<&str> = left
        .iter()
        .filter_map(|line| match line {
            PendingLine::Entry { chord, .. } => Some(chord.output.as_str()),
            PendingLine::Malformed { .. } => None,
        })
        .collect();
    assert_eq!(outputs, vec!["that", "of"]);
}

#[test]
fn test_dropped_reconciliation_keeps_log() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    cache.append(&["t", "h"], "the", None).unwrap();

    let mut store = ChordStore::new();
    drop(cache.apply(&mut store).unwrap());

    assert_eq!(cache.pending().unwrap().len(), 1);
}

#[test]
fn test_watcher_sees_append() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    let watcher = CacheWatcher::new(cache.path()).unwrap();

    assert!(!watcher.check_for_changes());

    cache.append(&["t", "h"], "the", None).unwrap();

    assert!(watcher.wait_for_change(Duration::from_secs(5)));
}

#[test]
fn test_watcher_ignores_other_files() {
    let temp_dir = TempDir::new().unwrap();
    let cache = cache_in(&temp_dir);
    let watcher = CacheWatcher::new(cache.path()).unwrap();

    fs::write(temp_dir.path().join("cache/other.txt"), "x").unwrap();

    assert!(!watcher.wait_for_change(Duration::from_millis(300)));
}
