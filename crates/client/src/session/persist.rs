// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key-value storage backing the token store.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// A single key update: `Some` writes the value, `None` removes the key.
pub type Change<'a> = (&'a str, Option<String>);

/// String key-value storage that survives the process.
///
/// `apply` must land all changes or none of them.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<String>;

    fn apply(&self, changes: &[Change<'_>]) -> anyhow::Result<()>;

    fn set(&self, key: &str, value: String) -> anyhow::Result<()> {
        self.apply(&[(key, Some(value))])
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.apply(&[(key, None)])
    }
}

/// In-process store. Nothing outlives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn apply(&self, changes: &[Change<'_>]) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        for (key, value) in changes {
            match value {
                Some(v) => entries.insert((*key).to_owned(), v.clone()),
                None => entries.remove(*key),
            };
        }
        Ok(())
    }
}

/// JSON object file, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable one is logged and treated as empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                if path.exists() {
                    warn!(path = %path.display(), "failed to read persisted session: {e}");
                } else {
                    debug!(path = %path.display(), "no persisted session");
                }
                BTreeMap::new()
            }
        };
        Self { path, entries: Mutex::new(entries) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn apply(&self, changes: &[Change<'_>]) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        for (key, value) in changes {
            match value {
                Some(v) => next.insert((*key).to_owned(), v.clone()),
                None => next.remove(*key),
            };
        }
        save(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

fn load(path: &Path) -> anyhow::Result<BTreeMap<String, String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Write the map to `path` atomically (write tmp + rename).
///
/// The temp name carries PID and a counter so concurrent writers never share
/// a temp file.
fn save(path: &Path, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = serde_json::to_string_pretty(entries)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
