// Copyright 2025 Eric Jingryd (tidynest@proton.me)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use super::super::*;
use std::fs;
use tempfile::TempDir;

// ============================================================================
// ConfigTransaction Tests
// ============================================================================

#[test]
fn test_transaction_basic_flow() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("karabiner.json");
    let original_content = "{\"profiles\": []}\n";
    fs::write(&config_path, original_content).unwrap();

    let manager = ConfigManager::new(config_path.clone()).unwrap();

    // Begin transaction (creates backup)
    let tx = ConfigTransaction::begin(&manager).unwrap();
    assert_eq!(manager.list_backups().unwrap().len(), 1, "Should have created one backup");

    let new_content = "{\"profiles\": [{\"name\": \"Chords\"}]}\n";
    tx.commit(new_content).unwrap();

    assert_eq!(fs::read_to_string(&config_path).unwrap(), new_content);

    // Backup survives the commit and holds the old content
    let backups = manager.list_backups().unwrap();
    assert_eq!(backups.len(), 1, "Backup should still exist after commit");
    assert_eq!(fs::read_to_string(&backups[0]).unwrap(), original_content);
}

#[test]
fn test_transaction_preserves_exact_content() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("chords.json");
    fs::write(&config_path, "initial\n").unwrap();

    let manager = ConfigManager::new(config_path.clone()).unwrap();

    for content in ["", "line1\n\n\nline2\n", "no newline at end", "unicode → ✓\n"] {
        ConfigTransaction::begin(&manager)
            .unwrap()
            .commit(content)
            .unwrap();
        assert_eq!(fs::read_to_string(&config_path).unwrap(), content);
    }
}

#[test]
fn test_commit_prunes_to_backup_limit() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("chords.json");
    fs::write(&config_path, "0").unwrap();

    let manager = ConfigManager::new(config_path).unwrap().with_backup_limit(3);

    for i in 1..=6 {
        let tx = manager.begin_transaction().unwrap();
        tx.commit(&i.to_string()).unwrap();
        // Millisecond timestamps keep backup names distinct
        std::thread::sleep(std::time::Duration::from_millis(5));
    }

    let backups = manager.list_backups().unwrap();
    assert_eq!(backups.len(), 3);
    assert_eq!(
        fs::read_to_string(backups.last().unwrap()).unwrap(),
        "5",
        "Newest backup holds the content before the last commit"
    );
}

#[test]
fn test_backup_path_exposed() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("chords.json");
    fs::write(&config_path, "x").unwrap();

    let manager = ConfigManager::new(config_path).unwrap();
    let tx = manager.begin_transaction().unwrap();

    assert!(tx.backup_path().unwrap().exists());
}
