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

//! File system watcher for the quick-cache log
//!
//! Uses OS-level file watching via the notify crate. The parent directory is
//! watched rather than the log itself, since reconcile deletes an empty log
//! and `quick` recreates it.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::{
    ffi::OsString,
    fs,
    path::Path,
    sync::mpsc::{channel, Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

use super::CacheError;

/// Reports appends to the quick-cache log
pub struct CacheWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    file_name: OsString,
}

impl CacheWatcher {
    pub fn new(log_path: &Path) -> Result<Self, CacheError> {
        let dir = match log_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        fs::create_dir_all(&dir)?;

        let file_name = log_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();

        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        Ok(CacheWatcher {
            _watcher: watcher,
            rx,
            file_name,
        })
    }

    fn is_relevant(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
            && event
                .paths
                .iter()
                .any(|p| p.file_name() == Some(self.file_name.as_os_str()))
    }

    /// Checks for log changes (non-blocking)
    pub fn check_for_changes(&self) -> bool {
        let mut changed = false;
        // Drain everything so one burst of writes reports once
        while let Ok(event_result) = self.rx.try_recv() {
            if let Ok(event) = event_result {
                changed |= self.is_relevant(&event);
            }
        }
        changed
    }

    /// Blocks until the log changes or `timeout` passes
    pub fn wait_for_change(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.rx.recv_timeout(remaining) {
                Ok(Ok(event)) if self.is_relevant(&event) => {
                    self.check_for_changes();
                    return true;
                }
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false
                }
            }
        }
    }
}
