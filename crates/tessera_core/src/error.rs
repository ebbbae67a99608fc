//! Error types for Tessera core.

use tessera_schema::Issues;
use tessera_storage::EngineError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Tessera core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value failed schema validation before projection.
    #[error("validation failed: {issues}")]
    Validation {
        /// Every failed field.
        issues: Issues,
    },

    /// A record passed to a store does not match its schema. Nothing was written.
    #[error("record rejected by store '{store}': {issues}")]
    SchemaMismatch {
        /// Store name.
        store: String,
        /// Every failed field.
        issues: Issues,
    },

    /// The store has no open connection.
    #[error("store '{store}' is not connected")]
    NotConnected {
        /// Store name.
        store: String,
    },

    /// The engine refused to open the database.
    #[error("cannot connect to database '{database}': {source}")]
    Connection {
        /// Database name.
        database: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// An upgrade was needed but no handler targets the requested version.
    #[error("no migration registered for version {version} of database '{database}'")]
    MissingMigration {
        /// Database name.
        database: String,
        /// Requested version.
        version: u64,
    },

    /// A read on a store failed in the engine.
    #[error("read from store '{store}' failed: {source}")]
    StoreRead {
        /// Store name.
        store: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// A write on a store failed in the engine.
    #[error("write to store '{store}' failed: {source}")]
    StoreWrite {
        /// Store name.
        store: String,
        /// Engine failure.
        #[source]
        source: EngineError,
    },

    /// An index name is already declared on the store.
    #[error("index '{index}' is already declared on store '{store}'")]
    DuplicateIndex {
        /// Store name.
        store: String,
        /// Index name.
        index: String,
    },

    /// An index targets the store's primary key path.
    #[error("index '{index}' on store '{store}' targets the key path '{path}'")]
    IndexOnKeyPath {
        /// Store name.
        store: String,
        /// Index name.
        index: String,
        /// The key path.
        path: String,
    },

    /// A store has no index with this name.
    #[error("store '{store}' has no index '{index}'")]
    UnknownIndex {
        /// Store name.
        store: String,
        /// Index name.
        index: String,
    },

    /// A shape, filter or index names a field the schema does not declare.
    #[error("unknown field '{field}'")]
    UnknownField {
        /// Dotted path of the field.
        field: String,
    },

    /// A nested selection targets a field that is not an object.
    #[error("cannot nest a selection into non-object field '{field}'")]
    ShapeMismatch {
        /// Dotted path of the field.
        field: String,
    },

    /// A filter value is not assignable to its field.
    #[error("invalid filter on '{field}': {message}")]
    InvalidFilter {
        /// Field name.
        field: String,
        /// Why the value was rejected.
        message: String,
    },

    /// A store, shape or database declaration is malformed.
    #[error("invalid declaration: {message}")]
    InvalidDeclaration {
        /// Description of the problem.
        message: String,
    },

    /// No store with this name is declared on the database.
    #[error("unknown store '{name}'")]
    UnknownStore {
        /// Store name.
        name: String,
    },

    /// An upgrade handler failed; the upgrade was aborted.
    #[error("migration {version} ({name}) failed: {message}")]
    MigrationFailed {
        /// Handler version.
        version: u64,
        /// Handler name.
        name: String,
        /// Failure description.
        message: String,
    },

    /// Engine error outside a store operation.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// A projection could not be converted into the requested type.
    #[error("cannot deserialize projection: {message}")]
    Deserialize {
        /// Deserializer message.
        message: String,
    },
}

impl CoreError {
    /// Creates an invalid declaration error.
    pub fn invalid_declaration(message: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            message: message.into(),
        }
    }

    /// Creates an unknown field error.
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
        }
    }

    /// Creates a migration failure for a handler.
    pub fn migration_failed(version: u64, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MigrationFailed {
            version,
            name: name.into(),
            message: message.into(),
        }
    }
}
