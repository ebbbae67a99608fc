//! The storage engine contract.
//!
//! Everything above this crate talks to storage through these traits. The
//! open protocol is event driven: [`StorageEngine::open`] returns an
//! [`OpenRequest`] that yields [`OpenEvent`]s until it resolves. When an
//! upgrade is needed, the request exposes a [`VersionChange`] transaction
//! whose changes commit atomically with the new version on the next call to
//! [`OpenRequest::next_event`].

use crate::error::{EngineError, EngineResult};
use crate::state::IndexDef;
use std::fmt;
use std::sync::Arc;
use tessera_codec::{Key, Value};

/// Notification that another opener wants a different database version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChangeEvent {
    /// Version the connection was opened at.
    pub old_version: u64,
    /// Requested version, or `None` when the database is being deleted.
    pub new_version: Option<u64>,
}

/// Callback run on a connection when a version change is requested.
pub type VersionChangeHandler = Box<dyn Fn(&dyn Connection, VersionChangeEvent) + Send + Sync>;

/// A store of named, versioned databases.
pub trait StorageEngine: Send + Sync {
    /// Starts opening `name` at `version`.
    ///
    /// Failures are delivered as [`OpenEvent::Error`].
    fn open(&self, name: &str, version: u64) -> Box<dyn OpenRequest>;

    /// Deletes a database and everything in it.
    ///
    /// Open connections are notified first; if any stay open the delete
    /// fails with `Blocked`.
    ///
    /// # Errors
    ///
    /// Returns `Blocked` or an I/O error.
    fn delete_database(&self, name: &str) -> EngineResult<()>;

    /// Names of databases that exist (version at least 1).
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the location cannot be listed.
    fn database_names(&self) -> EngineResult<Vec<String>>;
}

/// Event produced by an [`OpenRequest`].
pub enum OpenEvent {
    /// The stored version is lower than the requested one. The upgrade
    /// transaction is available from [`OpenRequest::transaction`].
    UpgradeNeeded {
        /// Stored version (0 for a new database).
        old_version: u64,
        /// Requested version.
        new_version: u64,
    },
    /// The database is open.
    Success(Arc<dyn Connection>),
    /// The open failed. Nothing was committed.
    Error(EngineError),
}

impl fmt::Debug for OpenEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenEvent::UpgradeNeeded {
                old_version,
                new_version,
            } => f
                .debug_struct("UpgradeNeeded")
                .field("old_version", old_version)
                .field("new_version", new_version)
                .finish(),
            OpenEvent::Success(conn) => f
                .debug_tuple("Success")
                .field(&conn.name())
                .field(&conn.version())
                .finish(),
            OpenEvent::Error(e) => f.debug_tuple("Error").field(e).finish(),
        }
    }
}

/// An in-progress open.
pub trait OpenRequest: Send {
    /// Advances the protocol and returns the next event.
    ///
    /// After `UpgradeNeeded`, the next call commits the staged upgrade (or
    /// reports the abort). Calling again after `Success` or `Error` yields
    /// an `InvalidState` error.
    fn next_event(&mut self) -> OpenEvent;

    /// The upgrade transaction, available between `UpgradeNeeded` and the
    /// next call to `next_event`.
    fn transaction(&mut self) -> Option<&mut dyn VersionChange>;

    /// Discards the staged upgrade. The next event is `Error(Aborted)`.
    fn abort(&mut self, reason: &str);
}

/// The version-change transaction: structural changes staged during an
/// upgrade and committed atomically with the new version.
pub trait VersionChange {
    /// Version before the upgrade.
    fn old_version(&self) -> u64;

    /// Version after the upgrade.
    fn new_version(&self) -> u64;

    /// Creates a collection keyed by the dotted `key_path`.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if the collection exists.
    fn create_collection(&mut self, name: &str, key_path: &str) -> EngineResult<()>;

    /// Drops a collection and its indexes.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection does not exist.
    fn delete_collection(&mut self, name: &str) -> EngineResult<()>;

    /// Creates an index over existing and future records.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `AlreadyExists`, or `Constraint` if a unique
    /// index would be violated by existing records.
    fn create_index(&mut self, collection: &str, index: IndexDef) -> EngineResult<()>;

    /// Drops an index.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection or index does not exist.
    fn delete_index(&mut self, collection: &str, name: &str) -> EngineResult<()>;

    /// Collections as staged so far.
    fn collection_names(&self) -> Vec<String>;

    /// Returns true if the collection exists as staged so far.
    fn contains_collection(&self, name: &str) -> bool;

    /// Index names of a collection as staged so far.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the collection does not exist.
    fn index_names(&self, collection: &str) -> EngineResult<Vec<String>>;
}

/// A live connection to one database at one version.
///
/// Every operation on a closed connection fails with `Closed`.
pub trait Connection: Send + Sync {
    /// Database name.
    fn name(&self) -> &str;

    /// Version the connection was opened at.
    fn version(&self) -> u64;

    /// Stores a new record; fails with `Constraint` if its key exists.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Data` (no usable key), `Constraint`, `Closed`
    /// or an I/O error.
    fn add(&self, collection: &str, value: &Value) -> EngineResult<Key>;

    /// Stores a record, replacing any record with the same key.
    ///
    /// # Errors
    ///
    /// As [`add`](Self::add), except an existing key is not an error.
    fn put(&self, collection: &str, value: &Value) -> EngineResult<Key>;

    /// Fetches a record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown collection, or `Closed`.
    fn get(&self, collection: &str, key: &Key) -> EngineResult<Option<Value>>;

    /// Returns the key if a record exists, without fetching it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown collection, or `Closed`.
    fn get_key(&self, collection: &str, key: &Key) -> EngineResult<Option<Key>>;

    /// Number of records in a collection.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown collection, or `Closed`.
    fn count(&self, collection: &str) -> EngineResult<u64>;

    /// Removes a record. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown collection, `Closed` or an I/O error.
    fn delete(&self, collection: &str, key: &Key) -> EngineResult<()>;

    /// Removes every record of a collection.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown collection, `Closed` or an I/O error.
    fn clear(&self, collection: &str) -> EngineResult<()>;

    /// Primary keys of records whose indexed field equals `value`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown collection or index, or `Closed`.
    fn index_keys(&self, collection: &str, index: &str, value: &Key) -> EngineResult<Vec<Key>>;

    /// Collections of the database.
    ///
    /// # Errors
    ///
    /// Returns `Closed`.
    fn collection_names(&self) -> EngineResult<Vec<String>>;

    /// Closes the connection. Idempotent.
    fn close(&self);

    /// Returns true once the connection is closed.
    fn is_closed(&self) -> bool;

    /// Installs the version-change callback, replacing any previous one.
    fn on_version_change(&self, handler: VersionChangeHandler);
}
