// Persistent flags

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bevy::log::{debug, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::FlowResult;
use crate::levels::LevelId;

/// A stored value: a boolean marker or a short string such as a level name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Text(String),
}

pub type FlagMap = BTreeMap<String, FlagValue>;

/// Where flags live between runs.
pub trait FlagBackend: Send + Sync {
    fn load(&self) -> FlowResult<FlagMap>;
    fn save(&self, flags: &FlagMap) -> FlowResult<()>;
}

/// Pretty-printed JSON file. A missing file reads as an empty store.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FlagBackend for JsonFileBackend {
    fn load(&self) -> FlowResult<FlagMap> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(FlagMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn save(&self, flags: &FlagMap) -> FlowResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(flags)?)?;
        Ok(())
    }
}

/// Keeps the serialized store in memory. Clones share the same slot, so a
/// second `FlagStore` opened on a clone behaves like a restarted process.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    stored: Arc<Mutex<Option<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FlagBackend for MemoryBackend {
    fn load(&self) -> FlowResult<FlagMap> {
        match self.stored.lock().as_deref() {
            Some(text) => Ok(serde_json::from_str(text)?),
            None => Ok(FlagMap::new()),
        }
    }

    fn save(&self, flags: &FlagMap) -> FlowResult<()> {
        *self.stored.lock() = Some(serde_json::to_string(flags)?);
        Ok(())
    }
}

/// Last write wins; there are no transactions.
pub struct FlagStore {
    backend: Box<dyn FlagBackend>,
    values: FlagMap,
    dirty: bool,
}

impl FlagStore {
    pub fn open(backend: impl FlagBackend + 'static) -> FlowResult<Self> {
        let values = backend.load()?;
        debug!("loaded {} persisted flag(s)", values.len());
        Ok(Self {
            backend: Box::new(backend),
            values,
            dirty: false,
        })
    }

    /// Opens the store, starting empty when the backend cannot be read.
    pub fn open_or_empty(backend: impl FlagBackend + 'static) -> Self {
        match backend.load() {
            Ok(values) => Self {
                backend: Box::new(backend),
                values,
                dirty: false,
            },
            Err(err) => {
                warn!("starting with empty flags: {err}");
                Self {
                    backend: Box::new(backend),
                    values: FlagMap::new(),
                    dirty: false,
                }
            }
        }
    }

    pub fn in_memory() -> Self {
        Self::open_or_empty(MemoryBackend::new())
    }

    /// Missing keys and string values read as `false`.
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.values.get(key), Some(FlagValue::Bool(true)))
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.insert(key.into(), FlagValue::Bool(value));
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(FlagValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn set_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key.into(), FlagValue::Text(value.into()));
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<FlagValue> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    /// Wipes every flag. Persisted on the next flush.
    pub fn clear(&mut self) {
        self.values.clear();
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Writes pending changes to the backend. A clean store does nothing.
    pub fn flush(&mut self) -> FlowResult<()> {
        if !self.dirty {
            return Ok(());
        }
        self.backend.save(&self.values)?;
        self.dirty = false;
        debug!("flushed {} flag(s)", self.values.len());
        Ok(())
    }

    fn insert(&mut self, key: String, value: FlagValue) {
        if self.values.get(&key) != Some(&value) {
            self.values.insert(key, value);
            self.dirty = true;
        }
    }
}

/// The fixed flag vocabulary.
pub mod keys {
    use super::LevelId;

    pub const LAST_LEVEL_PLAYED: &str = "last_level_played";

    pub fn badge_unlocked(level: LevelId) -> String {
        format!("badge_unlocked.{level}")
    }

    pub fn badge_notified(level: LevelId) -> String {
        format!("badge_notified.{level}")
    }

    pub fn milestone(name: &str) -> String {
        format!("milestone.{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_survives_a_reload() {
        let backend = MemoryBackend::new();
        let mut store = FlagStore::open(backend.clone()).expect("empty store opens");
        store.set_bool(keys::badge_unlocked(LevelId::Prologue), true);
        store.flush().expect("memory flush");

        let reloaded = FlagStore::open(backend).expect("stored flags decode");
        assert!(reloaded.get_bool(&keys::badge_unlocked(LevelId::Prologue)));
    }

    #[test]
    fn unflushed_writes_are_lost_on_reload() {
        let backend = MemoryBackend::new();
        let mut store = FlagStore::open(backend.clone()).expect("empty store opens");
        store.set_bool("pending", true);

        let reloaded = FlagStore::open(backend).expect("empty store opens");
        assert!(!reloaded.get_bool("pending"));
    }

    #[test]
    fn clear_resets_to_defaults() {
        let backend = MemoryBackend::new();
        let mut store = FlagStore::open(backend.clone()).expect("empty store opens");
        store.set_bool("seen", true);
        store.set_string(keys::LAST_LEVEL_PLAYED, "awaken");
        store.flush().expect("memory flush");

        store.clear();
        assert!(!store.get_bool("seen"));
        assert_eq!(store.get_string(keys::LAST_LEVEL_PLAYED), None);
        store.flush().expect("memory flush");

        let reloaded = FlagStore::open(backend).expect("stored flags decode");
        assert!(reloaded.is_empty());
    }

    #[test]
    fn types_do_not_leak_across_accessors() {
        let mut store = FlagStore::in_memory();
        store.set_string("mode", "true");
        store.set_bool("done", true);
        assert!(!store.get_bool("mode"));
        assert_eq!(store.get_string("done"), None);
    }

    #[test]
    fn rewriting_the_same_value_stays_clean() {
        let mut store = FlagStore::in_memory();
        store.set_bool("seen", true);
        store.flush().expect("memory flush");
        store.set_bool("seen", true);
        assert!(!store.is_dirty());
        store.set_bool("seen", false);
        assert!(store.is_dirty());
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("save").join("flags.json");

        let mut store = FlagStore::open(JsonFileBackend::new(&path)).expect("missing file is empty");
        assert!(store.is_empty());
        store.set_bool(keys::milestone("prologue_seen"), true);
        store.set_string(keys::LAST_LEVEL_PLAYED, LevelId::Awaken.as_ref());
        store.flush().expect("file flush");

        let reloaded = FlagStore::open(JsonFileBackend::new(&path)).expect("file decodes");
        assert!(reloaded.get_bool(&keys::milestone("prologue_seen")));
        assert_eq!(reloaded.get_string(keys::LAST_LEVEL_PLAYED), Some("awaken"));
    }

    #[test]
    fn corrupt_file_is_an_error_or_an_empty_store() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("flags.json");
        std::fs::write(&path, "{ not json").expect("write corrupt file");

        assert!(FlagStore::open(JsonFileBackend::new(&path)).is_err());
        assert!(FlagStore::open_or_empty(JsonFileBackend::new(&path)).is_empty());
    }
}
