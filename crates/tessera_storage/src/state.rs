//! In-memory database state rebuilt from the journal.

use crate::error::{EngineError, EngineResult};
use crate::journal::JournalEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tessera_codec::{Key, Value};

/// Declaration of a secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within its collection.
    pub name: String,
    /// Dotted path of the indexed field.
    pub path: String,
    /// Whether two records may share an index key.
    pub unique: bool,
}

impl IndexDef {
    /// Creates a non-unique index declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            unique: false,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// Reads the key stored at a dotted path of a record.
fn key_at(value: &Value, path: &str) -> Option<Key> {
    let segments: Vec<&str> = path.split('.').collect();
    value.get_path(&segments).and_then(Key::from_value)
}

#[derive(Debug, Clone)]
pub(crate) struct IndexState {
    pub(crate) def: IndexDef,
    entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl IndexState {
    fn new(def: IndexDef) -> Self {
        Self {
            def,
            entries: BTreeMap::new(),
        }
    }

    fn insert(&mut self, primary: &Key, record: &Value) {
        if let Some(key) = key_at(record, &self.def.path) {
            self.entries.entry(key).or_default().insert(primary.clone());
        }
    }

    fn remove(&mut self, primary: &Key, record: &Value) {
        if let Some(key) = key_at(record, &self.def.path) {
            if let Some(set) = self.entries.get_mut(&key) {
                set.remove(primary);
                if set.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Fails if `record` would share a unique key with a record other than `primary`.
    fn check_unique(&self, primary: &Key, record: &Value) -> EngineResult<()> {
        if !self.def.unique {
            return Ok(());
        }
        let Some(key) = key_at(record, &self.def.path) else {
            return Ok(());
        };
        match self.entries.get(&key) {
            Some(owners) if owners.iter().any(|owner| owner != primary) => {
                Err(EngineError::constraint(format!(
                    "unique index '{}' already contains {key}",
                    self.def.name
                )))
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn lookup(&self, key: &Key) -> Vec<Key> {
        self.entries
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CollectionState {
    pub(crate) key_path: String,
    pub(crate) indexes: BTreeMap<String, IndexState>,
    pub(crate) records: BTreeMap<Key, Value>,
}

impl CollectionState {
    fn new(key_path: String) -> Self {
        Self {
            key_path,
            indexes: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }

    /// Extracts the primary key of a record.
    pub(crate) fn key_of(&self, record: &Value) -> EngineResult<Key> {
        key_at(record, &self.key_path).ok_or_else(|| {
            EngineError::data(format!(
                "record has no valid key at '{}'",
                self.key_path
            ))
        })
    }

    fn check_write(&self, key: &Key, record: &Value, must_be_new: bool) -> EngineResult<()> {
        if self.key_of(record)? != *key {
            return Err(EngineError::data(format!(
                "record key does not match {key}"
            )));
        }
        if must_be_new && self.records.contains_key(key) {
            return Err(EngineError::constraint(format!("key {key} already exists")));
        }
        self.indexes
            .values()
            .try_for_each(|index| index.check_unique(key, record))
    }

    fn write(&mut self, key: Key, record: Value) {
        if let Some(old) = self.records.get(&key) {
            for index in self.indexes.values_mut() {
                index.remove(&key, old);
            }
        }
        for index in self.indexes.values_mut() {
            index.insert(&key, &record);
        }
        self.records.insert(key, record);
    }

    fn build_index(&self, def: IndexDef) -> EngineResult<IndexState> {
        let mut index = IndexState::new(def);
        for (key, record) in &self.records {
            index.check_unique(key, record)?;
            index.insert(key, record);
        }
        Ok(index)
    }
}

/// Everything a database holds: its version and its collections.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    pub(crate) version: u64,
    pub(crate) collections: BTreeMap<String, CollectionState>,
}

impl DatabaseState {
    pub(crate) fn collection(&self, name: &str) -> EngineResult<&CollectionState> {
        self.collections
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("collection '{name}'")))
    }

    pub(crate) fn collection_names(&self) -> Vec<String> {
        self.collections.keys().cloned().collect()
    }

    /// Checks that `entry` can be applied without mutating anything.
    pub(crate) fn check(&self, entry: &JournalEntry) -> EngineResult<()> {
        match entry {
            JournalEntry::SetVersion { version } => {
                if *version == 0 {
                    return Err(EngineError::InvalidVersion { version: 0 });
                }
                Ok(())
            }
            JournalEntry::CreateCollection { name, .. } => {
                if self.collections.contains_key(name) {
                    return Err(EngineError::already_exists(format!("collection '{name}'")));
                }
                Ok(())
            }
            JournalEntry::DeleteCollection { name }
            | JournalEntry::Clear { collection: name }
            | JournalEntry::Delete {
                collection: name, ..
            } => self.collection(name).map(|_| ()),
            JournalEntry::CreateIndex { collection, index } => {
                let state = self.collection(collection)?;
                if state.indexes.contains_key(&index.name) {
                    return Err(EngineError::already_exists(format!(
                        "index '{}' on '{collection}'",
                        index.name
                    )));
                }
                state.build_index(index.clone()).map(|_| ())
            }
            JournalEntry::DeleteIndex { collection, name } => {
                if !self.collection(collection)?.indexes.contains_key(name) {
                    return Err(EngineError::not_found(format!(
                        "index '{name}' on '{collection}'"
                    )));
                }
                Ok(())
            }
            JournalEntry::Add {
                collection,
                key,
                value,
            } => self.collection(collection)?.check_write(key, value, true),
            JournalEntry::Put {
                collection,
                key,
                value,
            } => self.collection(collection)?.check_write(key, value, false),
        }
    }

    /// Applies an entry that already passed [`check`](Self::check).
    pub(crate) fn mutate(&mut self, entry: JournalEntry) {
        match entry {
            JournalEntry::SetVersion { version } => self.version = version,
            JournalEntry::CreateCollection { name, key_path } => {
                self.collections
                    .insert(name, CollectionState::new(key_path));
            }
            JournalEntry::DeleteCollection { name } => {
                self.collections.remove(&name);
            }
            JournalEntry::CreateIndex { collection, index } => {
                if let Some(state) = self.collections.get_mut(&collection) {
                    if let Ok(built) = state.build_index(index.clone()) {
                        state.indexes.insert(index.name, built);
                    }
                }
            }
            JournalEntry::DeleteIndex { collection, name } => {
                if let Some(state) = self.collections.get_mut(&collection) {
                    state.indexes.remove(&name);
                }
            }
            JournalEntry::Add {
                collection,
                key,
                value,
            }
            | JournalEntry::Put {
                collection,
                key,
                value,
            } => {
                if let Some(state) = self.collections.get_mut(&collection) {
                    state.write(key, value);
                }
            }
            JournalEntry::Delete { collection, key } => {
                if let Some(state) = self.collections.get_mut(&collection) {
                    if let Some(old) = state.records.remove(&key) {
                        for index in state.indexes.values_mut() {
                            index.remove(&key, &old);
                        }
                    }
                }
            }
            JournalEntry::Clear { collection } => {
                if let Some(state) = self.collections.get_mut(&collection) {
                    state.records.clear();
                    for index in state.indexes.values_mut() {
                        index.entries.clear();
                    }
                }
            }
        }
    }

    /// Checks then applies an entry.
    pub(crate) fn apply(&mut self, entry: JournalEntry) -> EngineResult<()> {
        self.check(&entry)?;
        self.mutate(entry);
        Ok(())
    }
}
