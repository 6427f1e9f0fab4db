// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Key-value persistence used by the reconciler.
//!
//! Writes go through a [`Batch`] that is applied as a unit: a concurrent
//! reader sees either every edit of a batch or none of them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

pub trait Store: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Apply every edit in `batch` atomically.
    fn commit(&self, batch: Batch) -> anyhow::Result<()>;
}

/// Ordered set of puts and removes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    edits: Vec<(String, Option<String>)>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(mut self, key: &str, value: impl Into<String>) -> Self {
        self.edits.push((key.to_owned(), Some(value.into())));
        self
    }

    pub fn remove(mut self, key: &str) -> Self {
        self.edits.push((key.to_owned(), None));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    fn apply(self, entries: &mut BTreeMap<String, String>) {
        for (key, value) in self.edits {
            match value {
                Some(v) => {
                    entries.insert(key, v);
                }
                None => {
                    entries.remove(&key);
                }
            }
        }
    }
}

/// In-process store; contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn commit(&self, batch: Batch) -> anyhow::Result<()> {
        batch.apply(&mut self.entries.lock());
        Ok(())
    }
}

/// JSON object on disk, rewritten whole on every commit.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path: path.to_owned(), entries: Mutex::new(entries) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Store for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn commit(&self, batch: Batch) -> anyhow::Result<()> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        batch.apply(&mut next);
        save(&self.path, &next)?;
        *entries = next;
        Ok(())
    }
}

/// Write `entries` to `path` atomically (write tmp + rename).
///
/// The temp name is unique per process and call so two stores pointed at
/// the same file never share a half-written temp.
fn save(path: &Path, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

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
#[path = "store_tests.rs"]
mod tests;
