//! Versioned upgrade handlers.
//!
//! A handler pairs a target schema version with a procedure that reshapes
//! collections inside the engine's upgrade transaction. When a database is
//! opened at version `V` and the stored version is lower, every handler
//! registered for exactly `V` runs, in registration order. Handlers for
//! other versions are ignored; if none targets `V` the open fails.
//!
//! ## Usage
//!
//! ```
//! use tessera_core::{MigrationHandler, MigrationManager};
//!
//! let mut manager = MigrationManager::new();
//! manager
//!     .register(Box::new(MigrationHandler::new(1, "create_users", |ctx| {
//!         ctx.create_store("users")
//!     })))
//!     .unwrap();
//! assert!(manager.has_version(1));
//! assert!(manager.for_version(2).is_empty());
//! ```

use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStoreBuilder;
use std::collections::{BTreeMap, BTreeSet};
use tessera_storage::{IndexDef, VersionChange};

/// Version number for migrations.
pub type MigrationVersion = u64;

/// Information about a registered migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    /// Target version.
    pub version: MigrationVersion,
    /// Human-readable name.
    pub name: String,
    /// Description of what this migration does.
    pub description: Option<String>,
}

/// Result of running one handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationResult {
    /// Handler version.
    pub version: MigrationVersion,
    /// Handler name.
    pub name: String,
    /// Structural changes the handler made.
    pub operations: Vec<MigrationOperation>,
}

/// Result of an upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRunResult {
    /// Stored version before the upgrade.
    pub old_version: MigrationVersion,
    /// Version after the upgrade.
    pub new_version: MigrationVersion,
    /// Handlers run, in order.
    pub migrations: Vec<MigrationResult>,
}

impl MigrationRunResult {
    /// Number of handlers run.
    pub fn applied_count(&self) -> usize {
        self.migrations.len()
    }

    /// Every operation of every handler, in order.
    pub fn operations(&self) -> impl Iterator<Item = &MigrationOperation> {
        self.migrations.iter().flat_map(|m| m.operations.iter())
    }
}

/// A structural change made during a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOperation {
    /// Created a collection.
    CreateCollection {
        /// Name of the collection.
        name: String,
    },
    /// Dropped a collection.
    DropCollection {
        /// Name of the collection.
        name: String,
    },
    /// Created an index.
    CreateIndex {
        /// Collection the index is on.
        collection: String,
        /// Name of the index.
        index_name: String,
    },
    /// Dropped an index.
    DropIndex {
        /// Collection the index was on.
        collection: String,
        /// Name of the index.
        index_name: String,
    },
    /// Free-form note recorded by the handler.
    Custom {
        /// Description of the operation.
        description: String,
    },
}

/// What a handler can do during an upgrade.
///
/// Wraps the engine's upgrade transaction and the database's declared
/// stores, and records each change it makes.
pub struct MigrationContext<'a> {
    tx: &'a mut dyn VersionChange,
    stores: &'a BTreeMap<String, ObjectStoreBuilder>,
    operations: Vec<MigrationOperation>,
}

impl<'a> MigrationContext<'a> {
    /// Creates a context over an upgrade transaction.
    pub fn new(
        tx: &'a mut dyn VersionChange,
        stores: &'a BTreeMap<String, ObjectStoreBuilder>,
    ) -> Self {
        Self {
            tx,
            stores,
            operations: Vec::new(),
        }
    }

    /// Stored version before the upgrade (0 for a new database).
    pub fn old_version(&self) -> MigrationVersion {
        self.tx.old_version()
    }

    /// Version being upgraded to.
    pub fn new_version(&self) -> MigrationVersion {
        self.tx.new_version()
    }

    /// A store declared on the database.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStore`.
    pub fn store(&self, name: &str) -> CoreResult<&ObjectStoreBuilder> {
        self.stores.get(name).ok_or_else(|| CoreError::UnknownStore {
            name: name.to_string(),
        })
    }

    /// Creates a declared store with all of its indexes.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStore`, or the engine error if it already exists.
    pub fn create_store(&mut self, name: &str) -> CoreResult<()> {
        let builder = self.store(name)?.clone();
        self.create_store_from(&builder)
    }

    /// Creates a store from a declaration that need not be registered on
    /// the database.
    ///
    /// # Errors
    ///
    /// Returns the engine error if it already exists.
    pub fn create_store_from(&mut self, builder: &ObjectStoreBuilder) -> CoreResult<()> {
        builder.create(self.tx)?;
        self.operations.push(MigrationOperation::CreateCollection {
            name: builder.name().to_string(),
        });
        for index in builder.index_names() {
            self.operations.push(MigrationOperation::CreateIndex {
                collection: builder.name().to_string(),
                index_name: index.to_string(),
            });
        }
        Ok(())
    }

    /// Drops a store.
    ///
    /// # Errors
    ///
    /// Returns the engine error if it does not exist.
    pub fn delete_store(&mut self, name: &str) -> CoreResult<()> {
        self.tx.delete_collection(name)?;
        self.operations.push(MigrationOperation::DropCollection {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Returns true if the store exists at this point of the upgrade.
    pub fn has_store(&self, name: &str) -> bool {
        self.tx.contains_collection(name)
    }

    /// Stores that exist at this point of the upgrade.
    pub fn store_names(&self) -> Vec<String> {
        self.tx.collection_names()
    }

    /// Adds an index to an existing store.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the store is missing, the index exists,
    /// or a unique index is violated by existing records.
    pub fn create_index(&mut self, store: &str, index: IndexDef) -> CoreResult<()> {
        let index_name = index.name.clone();
        self.tx.create_index(store, index)?;
        self.operations.push(MigrationOperation::CreateIndex {
            collection: store.to_string(),
            index_name,
        });
        Ok(())
    }

    /// Drops an index.
    ///
    /// # Errors
    ///
    /// Returns the engine error if the store or index is missing.
    pub fn delete_index(&mut self, store: &str, index_name: &str) -> CoreResult<()> {
        self.tx.delete_index(store, index_name)?;
        self.operations.push(MigrationOperation::DropIndex {
            collection: store.to_string(),
            index_name: index_name.to_string(),
        });
        Ok(())
    }

    /// Records a note.
    pub fn custom(&mut self, description: &str) {
        self.operations.push(MigrationOperation::Custom {
            description: description.to_string(),
        });
    }

    /// Direct access to the upgrade transaction.
    pub fn transaction(&mut self) -> &mut dyn VersionChange {
        self.tx
    }

    /// Operations recorded so far.
    pub fn operations(&self) -> &[MigrationOperation] {
        &self.operations
    }

    fn into_operations(self) -> Vec<MigrationOperation> {
        self.operations
    }
}

/// Trait for defining migrations.
pub trait Migration: Send + Sync {
    /// The version this migration upgrades to.
    fn version(&self) -> MigrationVersion;

    /// Returns the name of this migration.
    fn name(&self) -> &str;

    /// Returns an optional description.
    fn description(&self) -> Option<&str> {
        None
    }

    /// Runs the migration inside the upgrade transaction.
    ///
    /// # Errors
    ///
    /// Any error aborts the whole upgrade.
    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()>;
}

type Procedure = Box<dyn Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync>;

/// A migration defined by a closure.
pub struct MigrationHandler {
    version: MigrationVersion,
    name: String,
    description: Option<String>,
    procedure: Procedure,
}

impl MigrationHandler {
    /// Creates a handler for `version`.
    pub fn new<F>(version: MigrationVersion, name: impl Into<String>, procedure: F) -> Self
    where
        F: Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            version,
            name: name.into(),
            description: None,
            procedure: Box::new(procedure),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Migration for MigrationHandler {
    fn version(&self) -> MigrationVersion {
        self.version
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn up(&self, ctx: &mut MigrationContext<'_>) -> CoreResult<()> {
        (self.procedure)(ctx)
    }
}

impl std::fmt::Debug for MigrationHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationHandler")
            .field("version", &self.version)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registered migrations in registration order.
///
/// Several migrations may target the same version; they run in the order
/// they were registered.
#[derive(Default)]
pub struct MigrationManager {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a migration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeclaration` for version 0, which no database can
    /// be upgraded to.
    pub fn register(&mut self, migration: Box<dyn Migration>) -> CoreResult<()> {
        if migration.version() == 0 {
            return Err(CoreError::invalid_declaration(format!(
                "migration '{}' targets version 0",
                migration.name()
            )));
        }
        self.migrations.push(migration);
        Ok(())
    }

    /// Registered migrations in registration order.
    #[must_use]
    pub fn list(&self) -> Vec<MigrationInfo> {
        self.migrations
            .iter()
            .map(|m| MigrationInfo {
                version: m.version(),
                name: m.name().to_string(),
                description: m.description().map(String::from),
            })
            .collect()
    }

    /// Migrations targeting exactly `version`, in registration order.
    #[must_use]
    pub fn for_version(&self, version: MigrationVersion) -> Vec<&dyn Migration> {
        self.migrations
            .iter()
            .filter(|m| m.version() == version)
            .map(AsRef::as_ref)
            .collect()
    }

    /// Returns true if any migration targets `version`.
    #[must_use]
    pub fn has_version(&self, version: MigrationVersion) -> bool {
        self.migrations.iter().any(|m| m.version() == version)
    }

    /// Distinct target versions, ascending.
    #[must_use]
    pub fn versions(&self) -> Vec<MigrationVersion> {
        let versions: BTreeSet<_> = self.migrations.iter().map(|m| m.version()).collect();
        versions.into_iter().collect()
    }

    /// Number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Runs every migration for the transaction's target version.
    ///
    /// # Errors
    ///
    /// Returns `MigrationFailed` for the first migration that fails. The
    /// caller must abort the transaction; nothing is undone here.
    pub fn run(
        &self,
        tx: &mut dyn VersionChange,
        stores: &BTreeMap<String, ObjectStoreBuilder>,
    ) -> CoreResult<MigrationRunResult> {
        let (old_version, new_version) = (tx.old_version(), tx.new_version());
        let mut results = Vec::new();

        for migration in self.for_version(new_version) {
            tracing::debug!(
                version = migration.version(),
                name = migration.name(),
                "running migration"
            );
            let mut ctx = MigrationContext::new(&mut *tx, stores);
            migration.up(&mut ctx).map_err(|e| {
                CoreError::migration_failed(migration.version(), migration.name(), e.to_string())
            })?;
            results.push(MigrationResult {
                version: migration.version(),
                name: migration.name().to_string(),
                operations: ctx.into_operations(),
            });
        }

        Ok(MigrationRunResult {
            old_version,
            new_version,
            migrations: results,
        })
    }
}

impl std::fmt::Debug for MigrationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.list()).finish()
    }
}
