//! The journaled reference engine.

use crate::backend::StorageBackend;
use crate::config::EngineConfig;
use crate::contract::{
    Connection, OpenEvent, OpenRequest, StorageEngine, VersionChange, VersionChangeEvent,
    VersionChangeHandler,
};
use crate::error::{EngineError, EngineResult};
use crate::file::FileBackend;
use crate::journal::{Journal, JournalEntry};
use crate::memory::InMemoryBackend;
use crate::state::{DatabaseState, IndexDef};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tessera_codec::{Key, Value};

/// File extension of database journals.
pub const JOURNAL_EXTENSION: &str = "tjournal";

const LOCK_FILE: &str = "LOCK";

/// Where journals live.
enum Location {
    Memory,
    Directory { path: PathBuf, _lock: File },
}

/// A storage engine keeping one journal per database.
///
/// Databases are replayed from their journal on first open and kept in
/// memory afterwards. Every commit appends one checksummed frame.
///
/// ```rust
/// use tessera_storage::{Connection, Engine, OpenEvent, StorageEngine, VersionChange};
///
/// let engine = Engine::in_memory();
/// let mut request = engine.open("app", 1);
/// assert!(matches!(request.next_event(), OpenEvent::UpgradeNeeded { old_version: 0, new_version: 1 }));
/// request.transaction().unwrap().create_collection("users", "id").unwrap();
/// let OpenEvent::Success(conn) = request.next_event() else { panic!() };
/// assert_eq!(conn.count("users").unwrap(), 0);
/// ```
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    location: Location,
    config: EngineConfig,
    slots: Mutex<BTreeMap<String, Arc<DatabaseSlot>>>,
}

impl Engine {
    /// Creates an engine whose databases live in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::in_memory_with_config(EngineConfig::default())
    }

    /// Creates an in-memory engine with a custom configuration.
    #[must_use]
    pub fn in_memory_with_config(config: EngineConfig) -> Self {
        Self::with_location(Location::Memory, config)
    }

    /// Opens an engine over a directory, one journal file per database.
    ///
    /// # Errors
    ///
    /// Returns `Locked` if another engine uses the directory, `NotFound`
    /// if it is missing and may not be created, or an I/O error.
    pub fn open_dir(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::open_dir_with_config(path, EngineConfig::default())
    }

    /// Opens a directory engine with a custom configuration.
    ///
    /// # Errors
    ///
    /// As [`open_dir`](Self::open_dir).
    pub fn open_dir_with_config(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            if !config.create_if_missing {
                return Err(EngineError::not_found(format!(
                    "directory {}",
                    path.display()
                )));
            }
            fs::create_dir_all(path)?;
        }
        if !path.is_dir() {
            return Err(EngineError::invalid_state(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock.try_lock_exclusive().is_err() {
            return Err(EngineError::Locked);
        }

        tracing::debug!(path = %path.display(), "engine directory opened");
        Ok(Self::with_location(
            Location::Directory {
                path: path.to_path_buf(),
                _lock: lock,
            },
            config,
        ))
    }

    fn with_location(location: Location, config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                location,
                config,
                slots: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Directory of a directory engine.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match &self.inner.location {
            Location::Memory => None,
            Location::Directory { path, .. } => Some(path),
        }
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

impl EngineInner {
    fn journal_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{name}.{JOURNAL_EXTENSION}"))
    }

    /// Returns the loaded database, replaying its journal on first use.
    fn slot(&self, name: &str) -> EngineResult<Arc<DatabaseSlot>> {
        validate_name(name)?;
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(name) {
            return Ok(Arc::clone(slot));
        }

        let backend: Box<dyn StorageBackend> = match &self.location {
            Location::Memory => Box::new(InMemoryBackend::new()),
            Location::Directory { path, .. } => {
                Box::new(FileBackend::open(&Self::journal_path(path, name))?)
            }
        };
        let mut journal = Journal::new(backend, self.config.sync_on_commit);

        let mut state = DatabaseState::default();
        for batch in journal.replay()? {
            for entry in batch {
                state.apply(entry).map_err(|e| {
                    EngineError::corrupted(format!("journal of '{name}' does not replay: {e}"))
                })?;
            }
        }
        tracing::debug!(
            database = name,
            version = state.version,
            collections = state.collections.len(),
            "database loaded"
        );

        let slot = Arc::new(DatabaseSlot {
            name: name.to_string(),
            state: RwLock::new(state),
            journal: Mutex::new(journal),
            connections: Mutex::new(Vec::new()),
            upgrading: AtomicBool::new(false),
            deleted: AtomicBool::new(false),
        });
        slots.insert(name.to_string(), Arc::clone(&slot));
        Ok(slot)
    }
}

fn validate_name(name: &str) -> EngineResult<()> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':' | '\0'));
    if bad {
        return Err(EngineError::data(format!("invalid database name '{name}'")));
    }
    Ok(())
}

impl StorageEngine for Engine {
    fn open(&self, name: &str, version: u64) -> Box<dyn OpenRequest> {
        Box::new(EngineOpenRequest {
            engine: Arc::clone(&self.inner),
            name: name.to_string(),
            version,
            phase: Phase::Pending,
        })
    }

    fn delete_database(&self, name: &str) -> EngineResult<()> {
        let loaded = self.inner.slots.lock().get(name).cloned();
        if let Some(slot) = loaded {
            if slot.upgrading.load(Ordering::SeqCst) {
                return Err(EngineError::invalid_state(format!(
                    "upgrade of '{name}' in progress"
                )));
            }
            let open = slot.notify_version_change(None);
            if open > 0 {
                tracing::warn!(database = name, open, "delete blocked by open connections");
                return Err(EngineError::Blocked {
                    name: name.to_string(),
                    open,
                });
            }
            slot.deleted.store(true, Ordering::SeqCst);
            self.inner.slots.lock().remove(name);
        }

        if let Location::Directory { path, .. } = &self.inner.location {
            validate_name(name)?;
            let file = EngineInner::journal_path(path, name);
            if file.exists() {
                fs::remove_file(&file)?;
            }
        }
        tracing::debug!(database = name, "database deleted");
        Ok(())
    }

    fn database_names(&self) -> EngineResult<Vec<String>> {
        let mut names = BTreeSet::new();
        let slots = self.inner.slots.lock();
        if let Location::Directory { path, .. } = &self.inner.location {
            for entry in fs::read_dir(path)? {
                let entry = entry?;
                let file = entry.path();
                if file.extension().and_then(|e| e.to_str()) != Some(JOURNAL_EXTENSION) {
                    continue;
                }
                let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                if !slots.contains_key(stem) && entry.metadata()?.len() > 0 {
                    names.insert(stem.to_string());
                }
            }
        }
        for (name, slot) in slots.iter() {
            if slot.state.read().version > 0 {
                names.insert(name.clone());
            }
        }
        Ok(names.into_iter().collect())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("path", &self.path())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

/// A loaded database shared by its open requests and connections.
struct DatabaseSlot {
    name: String,
    state: RwLock<DatabaseState>,
    journal: Mutex<Journal>,
    connections: Mutex<Vec<Weak<EngineConnection>>>,
    upgrading: AtomicBool,
    deleted: AtomicBool,
}

impl DatabaseSlot {
    /// Commits one entry: checked, journaled, then applied.
    fn commit(&self, state: &mut DatabaseState, entry: JournalEntry) -> EngineResult<()> {
        state.check(&entry)?;
        self.journal.lock().commit(std::slice::from_ref(&entry))?;
        state.mutate(entry);
        Ok(())
    }

    /// Runs the version-change callbacks of live connections and returns
    /// how many stayed open.
    fn notify_version_change(&self, new_version: Option<u64>) -> usize {
        let live: Vec<Arc<EngineConnection>> = {
            let mut connections = self.connections.lock();
            connections.retain(|weak| weak.upgrade().is_some_and(|c| !c.is_closed()));
            connections.iter().filter_map(Weak::upgrade).collect()
        };
        for conn in &live {
            conn.notify(VersionChangeEvent {
                old_version: conn.version,
                new_version,
            });
        }
        live.iter().filter(|c| !c.is_closed()).count()
    }

    fn connect(self: &Arc<Self>, version: u64) -> Arc<dyn Connection> {
        let conn = Arc::new(EngineConnection {
            slot: Arc::clone(self),
            version,
            closed: AtomicBool::new(false),
            handler: Mutex::new(None),
        });
        self.connections.lock().push(Arc::downgrade(&conn));
        conn
    }
}

/// Changes staged by an upgrade, applied to a private copy of the state.
struct StagedUpgrade {
    old_version: u64,
    new_version: u64,
    state: DatabaseState,
    entries: Vec<JournalEntry>,
}

impl StagedUpgrade {
    fn stage(&mut self, entry: JournalEntry) -> EngineResult<()> {
        self.state.apply(entry.clone())?;
        self.entries.push(entry);
        Ok(())
    }
}

impl VersionChange for StagedUpgrade {
    fn old_version(&self) -> u64 {
        self.old_version
    }

    fn new_version(&self) -> u64 {
        self.new_version
    }

    fn create_collection(&mut self, name: &str, key_path: &str) -> EngineResult<()> {
        self.stage(JournalEntry::CreateCollection {
            name: name.to_string(),
            key_path: key_path.to_string(),
        })
    }

    fn delete_collection(&mut self, name: &str) -> EngineResult<()> {
        self.stage(JournalEntry::DeleteCollection {
            name: name.to_string(),
        })
    }

    fn create_index(&mut self, collection: &str, index: IndexDef) -> EngineResult<()> {
        self.stage(JournalEntry::CreateIndex {
            collection: collection.to_string(),
            index,
        })
    }

    fn delete_index(&mut self, collection: &str, name: &str) -> EngineResult<()> {
        self.stage(JournalEntry::DeleteIndex {
            collection: collection.to_string(),
            name: name.to_string(),
        })
    }

    fn collection_names(&self) -> Vec<String> {
        self.state.collection_names()
    }

    fn contains_collection(&self, name: &str) -> bool {
        self.state.collections.contains_key(name)
    }

    fn index_names(&self, collection: &str) -> EngineResult<Vec<String>> {
        Ok(self
            .state
            .collection(collection)?
            .indexes
            .keys()
            .cloned()
            .collect())
    }
}

enum Phase {
    Pending,
    Upgrading {
        slot: Arc<DatabaseSlot>,
        staged: StagedUpgrade,
        aborted: Option<String>,
    },
    Finished,
}

struct EngineOpenRequest {
    engine: Arc<EngineInner>,
    name: String,
    version: u64,
    phase: Phase,
}

impl EngineOpenRequest {
    fn start(&mut self) -> EngineResult<OpenEvent> {
        if self.version == 0 {
            return Err(EngineError::InvalidVersion { version: 0 });
        }
        let slot = self.engine.slot(&self.name)?;
        if slot.upgrading.load(Ordering::SeqCst) {
            return Err(EngineError::invalid_state(format!(
                "upgrade of '{}' in progress",
                self.name
            )));
        }

        let current = slot.state.read().version;
        if self.version < current {
            return Err(EngineError::VersionError {
                requested: self.version,
                current,
            });
        }
        if self.version == current {
            tracing::debug!(database = %self.name, version = current, "database opened");
            return Ok(OpenEvent::Success(slot.connect(current)));
        }

        if slot.upgrading.swap(true, Ordering::SeqCst) {
            return Err(EngineError::invalid_state(format!(
                "upgrade of '{}' in progress",
                self.name
            )));
        }
        let open = slot.notify_version_change(Some(self.version));
        if open > 0 {
            slot.upgrading.store(false, Ordering::SeqCst);
            tracing::warn!(database = %self.name, open, "upgrade blocked by open connections");
            return Err(EngineError::Blocked {
                name: self.name.clone(),
                open,
            });
        }

        tracing::debug!(
            database = %self.name,
            old_version = current,
            new_version = self.version,
            "upgrade needed"
        );
        let staged = StagedUpgrade {
            old_version: current,
            new_version: self.version,
            state: slot.state.read().clone(),
            entries: Vec::new(),
        };
        self.phase = Phase::Upgrading {
            slot,
            staged,
            aborted: None,
        };
        Ok(OpenEvent::UpgradeNeeded {
            old_version: current,
            new_version: self.version,
        })
    }

    fn finish_upgrade(slot: &Arc<DatabaseSlot>, staged: StagedUpgrade) -> EngineResult<OpenEvent> {
        let StagedUpgrade {
            new_version,
            mut state,
            mut entries,
            ..
        } = staged;
        let version = JournalEntry::SetVersion {
            version: new_version,
        };
        state.apply(version.clone())?;
        entries.push(version);

        {
            let mut live = slot.state.write();
            slot.journal.lock().commit(&entries)?;
            *live = state;
        }
        tracing::debug!(
            database = %slot.name,
            version = new_version,
            changes = entries.len(),
            "upgrade committed"
        );
        Ok(OpenEvent::Success(slot.connect(new_version)))
    }
}

impl OpenRequest for EngineOpenRequest {
    fn next_event(&mut self) -> OpenEvent {
        let result = match std::mem::replace(&mut self.phase, Phase::Finished) {
            Phase::Pending => self.start(),
            Phase::Upgrading {
                slot,
                staged,
                aborted,
            } => {
                let result = match aborted {
                    Some(reason) => {
                        tracing::debug!(database = %self.name, %reason, "upgrade aborted");
                        Err(EngineError::Aborted { reason })
                    }
                    None => Self::finish_upgrade(&slot, staged),
                };
                slot.upgrading.store(false, Ordering::SeqCst);
                result
            }
            Phase::Finished => Err(EngineError::invalid_state("open request already resolved")),
        };
        result.unwrap_or_else(OpenEvent::Error)
    }

    fn transaction(&mut self) -> Option<&mut dyn VersionChange> {
        match &mut self.phase {
            Phase::Upgrading {
                staged,
                aborted: None,
                ..
            } => Some(staged),
            _ => None,
        }
    }

    fn abort(&mut self, reason: &str) {
        if let Phase::Upgrading { aborted, .. } = &mut self.phase {
            *aborted = Some(reason.to_string());
        }
    }
}

impl Drop for EngineOpenRequest {
    fn drop(&mut self) {
        if let Phase::Upgrading { slot, .. } = &self.phase {
            slot.upgrading.store(false, Ordering::SeqCst);
        }
    }
}

struct EngineConnection {
    slot: Arc<DatabaseSlot>,
    version: u64,
    closed: AtomicBool,
    handler: Mutex<Option<VersionChangeHandler>>,
}

impl EngineConnection {
    fn live(&self) -> EngineResult<&DatabaseSlot> {
        if self.is_closed() || self.slot.deleted.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(&self.slot)
    }

    fn notify(&self, event: VersionChangeEvent) {
        if let Some(handler) = self.handler.lock().as_ref() {
            handler(self as &dyn Connection, event);
        }
    }

    fn write(&self, collection: &str, value: &Value, add: bool) -> EngineResult<Key> {
        let slot = self.live()?;
        let mut state = slot.state.write();
        let key = state.collection(collection)?.key_of(value)?;
        let (collection, value) = (collection.to_string(), value.clone());
        let entry = if add {
            JournalEntry::Add {
                collection,
                key: key.clone(),
                value,
            }
        } else {
            JournalEntry::Put {
                collection,
                key: key.clone(),
                value,
            }
        };
        slot.commit(&mut state, entry)?;
        Ok(key)
    }
}

impl Connection for EngineConnection {
    fn name(&self) -> &str {
        &self.slot.name
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn add(&self, collection: &str, value: &Value) -> EngineResult<Key> {
        self.write(collection, value, true)
    }

    fn put(&self, collection: &str, value: &Value) -> EngineResult<Key> {
        self.write(collection, value, false)
    }

    fn get(&self, collection: &str, key: &Key) -> EngineResult<Option<Value>> {
        let state = self.live()?.state.read();
        Ok(state.collection(collection)?.records.get(key).cloned())
    }

    fn get_key(&self, collection: &str, key: &Key) -> EngineResult<Option<Key>> {
        let state = self.live()?.state.read();
        let records = &state.collection(collection)?.records;
        Ok(records.get_key_value(key).map(|(k, _)| k.clone()))
    }

    fn count(&self, collection: &str) -> EngineResult<u64> {
        let state = self.live()?.state.read();
        Ok(state.collection(collection)?.records.len() as u64)
    }

    fn delete(&self, collection: &str, key: &Key) -> EngineResult<()> {
        let slot = self.live()?;
        let mut state = slot.state.write();
        if !state.collection(collection)?.records.contains_key(key) {
            return Ok(());
        }
        slot.commit(
            &mut state,
            JournalEntry::Delete {
                collection: collection.to_string(),
                key: key.clone(),
            },
        )
    }

    fn clear(&self, collection: &str) -> EngineResult<()> {
        let slot = self.live()?;
        let mut state = slot.state.write();
        slot.commit(
            &mut state,
            JournalEntry::Clear {
                collection: collection.to_string(),
            },
        )
    }

    fn index_keys(&self, collection: &str, index: &str, value: &Key) -> EngineResult<Vec<Key>> {
        let state = self.live()?.state.read();
        let index_state = state
            .collection(collection)?
            .indexes
            .get(index)
            .ok_or_else(|| EngineError::not_found(format!("index '{index}' on '{collection}'")))?;
        Ok(index_state.lookup(value))
    }

    fn collection_names(&self) -> EngineResult<Vec<String>> {
        Ok(self.live()?.state.read().collection_names())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(database = %self.slot.name, version = self.version, "connection closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn on_version_change(&self, handler: VersionChangeHandler) {
        *self.handler.lock() = Some(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_with(
        engine: &Engine,
        name: &str,
        version: u64,
        upgrade: impl FnOnce(&mut dyn VersionChange),
    ) -> Arc<dyn Connection> {
        let mut request = engine.open(name, version);
        match request.next_event() {
            OpenEvent::UpgradeNeeded { .. } => {
                upgrade(request.transaction().unwrap());
                match request.next_event() {
                    OpenEvent::Success(conn) => conn,
                    other => panic!("unexpected {other:?}"),
                }
            }
            OpenEvent::Success(conn) => conn,
            OpenEvent::Error(e) => panic!("open failed: {e}"),
        }
    }

    fn users_v1(tx: &mut dyn VersionChange) {
        tx.create_collection("users", "id").unwrap();
        tx.create_index("users", IndexDef::new("by_email", "email"))
            .unwrap();
    }

    fn user(id: &str, email: &str) -> Value {
        Value::object([("id", id), ("email", email)])
    }

    #[test]
    fn first_open_upgrades_from_zero() {
        let engine = Engine::in_memory();
        let mut request = engine.open("app", 1);
        match request.next_event() {
            OpenEvent::UpgradeNeeded {
                old_version,
                new_version,
            } => {
                assert_eq!((old_version, new_version), (0, 1));
            }
            other => panic!("unexpected {other:?}"),
        }
        let tx = request.transaction().unwrap();
        assert_eq!(tx.old_version(), 0);
        tx.create_collection("users", "id").unwrap();
        assert!(tx.contains_collection("users"));
        let OpenEvent::Success(conn) = request.next_event() else {
            panic!("expected success");
        };
        assert_eq!(conn.version(), 1);
        assert_eq!(conn.collection_names().unwrap(), vec!["users".to_string()]);
        assert_eq!(engine.database_names().unwrap(), vec!["app".to_string()]);
    }

    #[test]
    fn crud_through_connection() {
        let engine = Engine::in_memory();
        let conn = open_with(&engine, "app", 1, users_v1);

        assert_eq!(conn.add("users", &user("1", "a@b.com")).unwrap(), Key::from("1"));
        assert!(matches!(
            conn.add("users", &user("1", "x@y.com")),
            Err(EngineError::Constraint { .. })
        ));
        conn.put("users", &user("1", "x@y.com")).unwrap();
        assert_eq!(conn.count("users").unwrap(), 1);
        assert_eq!(
            conn.get("users", &Key::from("1")).unwrap(),
            Some(user("1", "x@y.com"))
        );
        assert_eq!(
            conn.index_keys("users", "by_email", &Key::from("x@y.com"))
                .unwrap(),
            vec![Key::from("1")]
        );
        assert_eq!(conn.get_key("users", &Key::from("2")).unwrap(), None);

        conn.delete("users", &Key::from("1")).unwrap();
        conn.delete("users", &Key::from("1")).unwrap();
        assert_eq!(conn.count("users").unwrap(), 0);
    }

    #[test]
    fn record_without_key_is_rejected() {
        let engine = Engine::in_memory();
        let conn = open_with(&engine, "app", 1, users_v1);
        let result = conn.add("users", &Value::object([("email", "a@b.com")]));
        assert!(matches!(result, Err(EngineError::Data { .. })));
    }

    #[test]
    fn version_rules() {
        let engine = Engine::in_memory();
        open_with(&engine, "app", 2, users_v1).close();

        let mut request = engine.open("app", 1);
        assert!(matches!(
            request.next_event(),
            OpenEvent::Error(EngineError::VersionError {
                requested: 1,
                current: 2
            })
        ));

        let mut request = engine.open("app", 0);
        assert!(matches!(
            request.next_event(),
            OpenEvent::Error(EngineError::InvalidVersion { version: 0 })
        ));

        let mut request = engine.open("app", 2);
        assert!(matches!(request.next_event(), OpenEvent::Success(_)));
        assert!(matches!(
            request.next_event(),
            OpenEvent::Error(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn abort_commits_nothing() {
        let engine = Engine::in_memory();
        let mut request = engine.open("app", 1);
        assert!(matches!(
            request.next_event(),
            OpenEvent::UpgradeNeeded { .. }
        ));
        request
            .transaction()
            .unwrap()
            .create_collection("users", "id")
            .unwrap();
        request.abort("no handler");
        assert!(request.transaction().is_none());
        assert!(matches!(
            request.next_event(),
            OpenEvent::Error(EngineError::Aborted { .. })
        ));
        assert!(engine.database_names().unwrap().is_empty());

        let conn = open_with(&engine, "app", 1, |tx| {
            assert!(tx.collection_names().is_empty());
            tx.create_collection("other", "id").unwrap();
        });
        assert_eq!(conn.collection_names().unwrap(), vec!["other".to_string()]);
    }

    #[test]
    fn stale_connection_blocks_upgrade() {
        let engine = Engine::in_memory();
        let old = open_with(&engine, "app", 1, users_v1);

        let mut request = engine.open("app", 2);
        assert!(matches!(
            request.next_event(),
            OpenEvent::Error(EngineError::Blocked { open: 1, .. })
        ));
        assert!(!old.is_closed());
    }

    #[test]
    fn version_change_handler_can_close() {
        let engine = Engine::in_memory();
        let old = open_with(&engine, "app", 1, users_v1);
        let seen = Arc::new(Mutex::new(None));
        let seen_in_handler = Arc::clone(&seen);
        old.on_version_change(Box::new(move |conn, event| {
            *seen_in_handler.lock() = Some(event);
            conn.close();
        }));

        let new = open_with(&engine, "app", 2, |tx| {
            tx.delete_index("users", "by_email").unwrap();
        });
        assert_eq!(new.version(), 2);
        assert!(old.is_closed());
        assert!(matches!(old.count("users"), Err(EngineError::Closed)));
        assert_eq!(
            *seen.lock(),
            Some(VersionChangeEvent {
                old_version: 1,
                new_version: Some(2)
            })
        );
    }

    #[test]
    fn failed_staging_leaves_transaction_usable() {
        let engine = Engine::in_memory();
        let conn = open_with(&engine, "app", 1, |tx| {
            tx.create_collection("users", "id").unwrap();
            assert!(matches!(
                tx.create_collection("users", "id"),
                Err(EngineError::AlreadyExists { .. })
            ));
            assert!(matches!(
                tx.create_index("missing", IndexDef::new("i", "x")),
                Err(EngineError::NotFound { .. })
            ));
            assert!(tx.index_names("users").unwrap().is_empty());
        });
        assert_eq!(conn.collection_names().unwrap().len(), 1);
    }

    #[test]
    fn directory_engine_replays_journal() {
        let dir = tempdir().unwrap();
        {
            let engine = Engine::open_dir(dir.path()).unwrap();
            let conn = open_with(&engine, "app", 1, users_v1);
            conn.add("users", &user("1", "a@b.com")).unwrap();
            conn.add("users", &user("2", "c@d.com")).unwrap();
            conn.delete("users", &Key::from("1")).unwrap();
        }

        let engine = Engine::open_dir(dir.path()).unwrap();
        assert_eq!(engine.database_names().unwrap(), vec!["app".to_string()]);
        let conn = open_with(&engine, "app", 1, |_| panic!("no upgrade expected"));
        assert_eq!(conn.count("users").unwrap(), 1);
        assert_eq!(
            conn.index_keys("users", "by_email", &Key::from("c@d.com"))
                .unwrap(),
            vec![Key::from("2")]
        );
    }

    #[test]
    fn directory_is_locked_per_engine() {
        let dir = tempdir().unwrap();
        let _engine = Engine::open_dir(dir.path()).unwrap();
        assert!(matches!(
            Engine::open_dir(dir.path()),
            Err(EngineError::Locked)
        ));
    }

    #[test]
    fn missing_directory_respects_config() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested");
        let config = EngineConfig::new().create_if_missing(false);
        assert!(matches!(
            Engine::open_dir_with_config(&target, config),
            Err(EngineError::NotFound { .. })
        ));
        Engine::open_dir(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn delete_database_removes_journal() {
        let dir = tempdir().unwrap();
        let engine = Engine::open_dir(dir.path()).unwrap();
        let conn = open_with(&engine, "app", 1, users_v1);
        assert!(matches!(
            engine.delete_database("app"),
            Err(EngineError::Blocked { .. })
        ));
        conn.close();
        engine.delete_database("app").unwrap();
        assert!(engine.database_names().unwrap().is_empty());
        assert!(!dir.path().join("app.tjournal").exists());

        let mut request = engine.open("app", 1);
        assert!(matches!(
            request.next_event(),
            OpenEvent::UpgradeNeeded { old_version: 0, .. }
        ));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let engine = Engine::in_memory();
        let mut request = engine.open("../escape", 1);
        assert!(matches!(
            request.next_event(),
            OpenEvent::Error(EngineError::Data { .. })
        ));
    }
}
