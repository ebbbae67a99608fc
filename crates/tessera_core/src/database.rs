//! Database declaration and the connect state machine.
//!
//! A [`Database`] is declared once with its name, target version, stores
//! and upgrade handlers. [`Database::connect`] then drives the engine's open
//! request: it runs the handlers for the target version when the stored
//! version is lower, and installs a version-change hook so the connection
//! closes itself when a newer version is opened elsewhere.

use crate::error::{CoreError, CoreResult};
use crate::migration::{
    Migration, MigrationContext, MigrationHandler, MigrationInfo, MigrationManager,
    MigrationRunResult, MigrationVersion,
};
use crate::object_store::ObjectStoreBuilder;
use crate::store::ObjectStore;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak};
use tessera_storage::{
    Connection, EngineError, OpenEvent, OpenRequest, StorageEngine, VersionChangeEvent,
};

/// Where a database session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    /// Open request issued, waiting for the engine.
    Opening,
    /// Upgrade handlers are running.
    Upgrading {
        /// Stored version before the upgrade.
        old_version: u64,
        /// Version being upgraded to.
        new_version: u64,
    },
    /// A live connection is available.
    Connected,
    /// The last connect attempt failed.
    Failed,
    /// The connection was closed, by the caller or by a newer opener.
    Closed,
}

struct Session {
    state: ConnectionState,
    connection: Option<Arc<dyn Connection>>,
    last_upgrade: Option<MigrationRunResult>,
}

/// Collects stores and handlers for a [`Database`].
pub struct DatabaseBuilder {
    name: String,
    version: u64,
    stores: Vec<ObjectStoreBuilder>,
    migrations: Vec<Box<dyn Migration>>,
}

impl DatabaseBuilder {
    /// Declares a store.
    #[must_use]
    pub fn store(mut self, store: ObjectStoreBuilder) -> Self {
        self.stores.push(store);
        self
    }

    /// Registers a migration.
    #[must_use]
    pub fn migration(mut self, migration: Box<dyn Migration>) -> Self {
        self.migrations.push(migration);
        self
    }

    /// Registers a closure handler for `version`.
    #[must_use]
    pub fn handler<F>(self, version: MigrationVersion, name: impl Into<String>, procedure: F) -> Self
    where
        F: Fn(&mut MigrationContext<'_>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.migration(Box::new(MigrationHandler::new(version, name, procedure)))
    }

    /// Validates the declaration and binds it to an engine.
    ///
    /// # Errors
    ///
    /// Returns `InvalidDeclaration` for an empty name, version 0, a store
    /// declared twice, or a migration targeting version 0.
    pub fn build<E: StorageEngine + 'static>(self, engine: E) -> CoreResult<Database> {
        self.build_shared(Arc::new(engine))
    }

    /// Like [`build`](Self::build) for an engine that is already shared.
    ///
    /// # Errors
    ///
    /// Same as [`build`](Self::build).
    pub fn build_shared(self, engine: Arc<dyn StorageEngine>) -> CoreResult<Database> {
        if self.name.is_empty() {
            return Err(CoreError::invalid_declaration("database name is empty"));
        }
        if self.version == 0 {
            return Err(CoreError::invalid_declaration(format!(
                "database '{}' declared with version 0",
                self.name
            )));
        }

        let mut stores = BTreeMap::new();
        for store in self.stores {
            let name = store.name().to_string();
            if stores.insert(name.clone(), store).is_some() {
                return Err(CoreError::invalid_declaration(format!(
                    "store '{name}' declared twice"
                )));
            }
        }

        let mut migrations = MigrationManager::new();
        for migration in self.migrations {
            migrations.register(migration)?;
        }

        Ok(Database {
            name: self.name,
            version: self.version,
            stores,
            migrations,
            engine,
            session: Arc::new(Mutex::new(Session {
                state: ConnectionState::Idle,
                connection: None,
                last_upgrade: None,
            })),
        })
    }
}

/// A declared database and its connection session.
pub struct Database {
    name: String,
    version: u64,
    stores: BTreeMap<String, ObjectStoreBuilder>,
    migrations: MigrationManager,
    engine: Arc<dyn StorageEngine>,
    session: Arc<Mutex<Session>>,
}

impl Database {
    /// Starts a declaration.
    pub fn builder(name: impl Into<String>, version: u64) -> DatabaseBuilder {
        DatabaseBuilder {
            name: name.into(),
            version,
            stores: Vec::new(),
            migrations: Vec::new(),
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Declared store names.
    pub fn store_names(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Registered migrations.
    pub fn migrations(&self) -> Vec<MigrationInfo> {
        self.migrations.list()
    }

    /// Current session state.
    pub fn state(&self) -> ConnectionState {
        self.session.lock().state
    }

    /// Result of the upgrade run by the most recent connect, if any.
    pub fn last_upgrade(&self) -> Option<MigrationRunResult> {
        self.session.lock().last_upgrade.clone()
    }

    /// The live connection, if any.
    pub fn connection(&self) -> Option<Arc<dyn Connection>> {
        let session = self.session.lock();
        session.connection.as_ref().filter(|c| !c.is_closed()).cloned()
    }

    /// Opens the database, upgrading it if needed.
    ///
    /// Returns the existing connection when one is live.
    ///
    /// # Errors
    ///
    /// - `MissingMigration` when an upgrade is needed and no handler
    ///   targets this version
    /// - `MigrationFailed` when a handler fails
    /// - `Connection` when the engine refuses the open
    ///
    /// Nothing is committed on error and the state becomes `Failed`.
    pub fn connect(&self) -> CoreResult<Arc<dyn Connection>> {
        if let Some(conn) = self.connection() {
            return Ok(conn);
        }

        tracing::info!(database = %self.name, version = self.version, "connecting");
        self.set_state(ConnectionState::Opening);
        let mut request = self.engine.open(&self.name, self.version);
        let mut upgrade = None;

        loop {
            match request.next_event() {
                OpenEvent::UpgradeNeeded {
                    old_version,
                    new_version,
                } => {
                    self.set_state(ConnectionState::Upgrading {
                        old_version,
                        new_version,
                    });
                    match self.upgrade(request.as_mut()) {
                        Ok(result) => upgrade = Some(result),
                        Err(e) => {
                            request.abort(&e.to_string());
                            self.finish_abort(request.as_mut());
                            self.set_state(ConnectionState::Failed);
                            tracing::info!(database = %self.name, error = %e, "upgrade failed");
                            return Err(e);
                        }
                    }
                }
                OpenEvent::Success(conn) => {
                    self.install_close_hook(conn.as_ref());
                    let mut session = self.session.lock();
                    session.state = ConnectionState::Connected;
                    session.connection = Some(Arc::clone(&conn));
                    if upgrade.is_some() {
                        session.last_upgrade = upgrade;
                    }
                    tracing::info!(database = %self.name, version = conn.version(), "connected");
                    return Ok(conn);
                }
                OpenEvent::Error(source) => {
                    self.set_state(ConnectionState::Failed);
                    tracing::info!(database = %self.name, error = %source, "connect failed");
                    return Err(CoreError::Connection {
                        database: self.name.clone(),
                        source,
                    });
                }
            }
        }
    }

    fn upgrade(&self, request: &mut dyn OpenRequest) -> CoreResult<MigrationRunResult> {
        let Some(tx) = request.transaction() else {
            return Err(CoreError::Engine(EngineError::invalid_state(
                "upgrade transaction unavailable",
            )));
        };
        if !self.migrations.has_version(tx.new_version()) {
            return Err(CoreError::MissingMigration {
                database: self.name.clone(),
                version: tx.new_version(),
            });
        }
        tracing::info!(
            database = %self.name,
            old_version = tx.old_version(),
            new_version = tx.new_version(),
            "running upgrade"
        );
        self.migrations.run(tx, &self.stores)
    }

    /// Lets the engine discard the staged upgrade.
    fn finish_abort(&self, request: &mut dyn OpenRequest) {
        match request.next_event() {
            OpenEvent::Error(EngineError::Aborted { reason }) => {
                tracing::debug!(database = %self.name, %reason, "upgrade rolled back");
            }
            OpenEvent::Error(e) => {
                tracing::warn!(database = %self.name, error = %e, "unexpected error after abort");
            }
            other => {
                tracing::warn!(database = %self.name, event = ?other, "unexpected event after abort");
            }
        }
    }

    fn install_close_hook(&self, conn: &dyn Connection) {
        let session: Weak<Mutex<Session>> = Arc::downgrade(&self.session);
        let name = self.name.clone();
        conn.on_version_change(Box::new(
            move |conn: &dyn Connection, event: VersionChangeEvent| {
                conn.close();
                tracing::info!(
                    database = %name,
                    old_version = event.old_version,
                    new_version = ?event.new_version,
                    "closed by version change"
                );
                if let Some(session) = session.upgrade() {
                    let mut session = session.lock();
                    if session.connection.as_ref().is_some_and(|c| c.is_closed()) {
                        session.connection = None;
                        session.state = ConnectionState::Closed;
                    }
                }
            },
        ));
    }

    fn set_state(&self, state: ConnectionState) {
        self.session.lock().state = state;
    }

    /// A declared store, bound to the live connection if there is one.
    ///
    /// An unbound store fails every operation with `NotConnected`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStore` if the store was not declared.
    pub fn store(&self, name: &str) -> CoreResult<ObjectStore> {
        let builder = self.stores.get(name).ok_or_else(|| CoreError::UnknownStore {
            name: name.to_string(),
        })?;
        Ok(match self.connection() {
            Some(conn) => builder.bind(conn),
            None => builder.unbound(),
        })
    }

    /// Closes the live connection. Stores bound to it stop working.
    pub fn close(&self) {
        let mut session = self.session.lock();
        if let Some(conn) = session.connection.take() {
            conn.close();
            session.state = ConnectionState::Closed;
            tracing::info!(database = %self.name, "closed");
        }
    }

    /// Closes the connection and deletes the stored database.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the engine refuses, e.g. because other
    /// connections stay open.
    pub fn destroy(&self) -> CoreResult<()> {
        self.close();
        self.engine
            .delete_database(&self.name)
            .map_err(|source| CoreError::Connection {
                database: self.name.clone(),
                source,
            })?;
        self.session.lock().last_upgrade = None;
        tracing::info!(database = %self.name, "destroyed");
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("stores", &self.stores.keys().collect::<Vec<_>>())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::Shape;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tessera_codec::{Key, Value};
    use tessera_schema::{FieldType, ObjectSchema};
    use tessera_storage::{Engine, EngineError};

    fn users() -> ObjectStoreBuilder {
        let schema = ObjectSchema::new()
            .field("id", FieldType::String)
            .optional("name", FieldType::String)
            .field("email", FieldType::String);
        ObjectStoreBuilder::new("users", schema, "id").unwrap()
    }

    fn user(id: &str, email: &str) -> Value {
        Value::object([("id", Value::from(id)), ("email", Value::from(email))])
    }

    fn database(engine: &Engine, version: u64) -> Database {
        Database::builder("app", version)
            .store(users())
            .handler(1, "create_users", |ctx| ctx.create_store("users"))
            .handler(2, "index_email", |ctx| {
                ctx.create_index(
                    "users",
                    tessera_storage::IndexDef::new("by_email", "email"),
                )
            })
            .build(engine.clone())
            .unwrap()
    }

    #[test]
    fn connect_runs_upgrade_and_inserts() {
        let engine = Engine::in_memory();
        let db = database(&engine, 1);
        assert_eq!(db.state(), ConnectionState::Idle);

        db.connect().unwrap();
        assert_eq!(db.state(), ConnectionState::Connected);
        let upgrade = db.last_upgrade().unwrap();
        assert_eq!((upgrade.old_version, upgrade.new_version), (0, 1));
        assert_eq!(upgrade.applied_count(), 1);

        let store = db.store("users").unwrap();
        assert_eq!(store.insert(&user("1", "a@b.com")).unwrap(), Key::from("1"));
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.exists("1").unwrap());
        assert!(!store.exists("2").unwrap());

        let query = db
            .store("users")
            .unwrap()
            .builder()
            .select(Shape::new().include("email"))
            .unwrap();
        let raw = Value::object([
            ("id", Value::from("1")),
            ("name", Value::from("x")),
            ("email", Value::from("a@b.com")),
        ]);
        assert_eq!(
            query.extract_shape(&raw).unwrap(),
            Value::object([("email", Value::from("a@b.com"))])
        );
    }

    #[test]
    fn connect_twice_reuses_connection() {
        let engine = Engine::in_memory();
        let db = database(&engine, 1);
        let first = db.connect().unwrap();
        let second = db.connect().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn only_target_version_handlers_run() {
        let ran = Arc::new(AtomicUsize::new(0));
        let (v1, v2) = (Arc::clone(&ran), Arc::clone(&ran));
        let engine = Engine::in_memory();
        let db = Database::builder("app", 2)
            .store(users())
            .handler(1, "v1", move |_| {
                v1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .handler(2, "v2", move |ctx| {
                v2.fetch_add(10, Ordering::SeqCst);
                ctx.create_store("users")
            })
            .build(engine)
            .unwrap();

        db.connect().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 10);
        let names: Vec<_> = db
            .last_upgrade()
            .unwrap()
            .migrations
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, ["v2"]);
    }

    #[test]
    fn missing_migration_fails_and_commits_nothing() {
        let engine = Engine::in_memory();
        let db = database(&engine, 3);
        match db.connect() {
            Err(CoreError::MissingMigration { database, version }) => {
                assert_eq!(database, "app");
                assert_eq!(version, 3);
            }
            other => panic!("unexpected {:?}", other.err()),
        }
        assert_eq!(db.state(), ConnectionState::Failed);

        // Version 1 is still reachable; nothing was stored.
        let db = database(&engine, 1);
        db.connect().unwrap();
        assert_eq!(db.last_upgrade().unwrap().old_version, 0);
    }

    #[test]
    fn failing_handler_aborts_upgrade() {
        let engine = Engine::in_memory();
        let db = Database::builder("app", 1)
            .store(users())
            .handler(1, "create_then_fail", |ctx| {
                ctx.create_store("users")?;
                Err(CoreError::invalid_declaration("boom"))
            })
            .build(engine.clone())
            .unwrap();

        assert!(matches!(
            db.connect(),
            Err(CoreError::MigrationFailed { version: 1, .. })
        ));
        assert_eq!(db.state(), ConnectionState::Failed);

        let db = database(&engine, 1);
        db.connect().unwrap();
        assert_eq!(db.last_upgrade().unwrap().old_version, 0);
    }

    #[test]
    fn newer_open_closes_older_connection() {
        let engine = Engine::in_memory();
        let old = database(&engine, 1);
        old.connect().unwrap();
        let stale = old.store("users").unwrap();

        let new = database(&engine, 2);
        new.connect().unwrap();

        assert_eq!(old.state(), ConnectionState::Closed);
        assert!(old.connection().is_none());
        assert!(matches!(
            stale.count(),
            Err(CoreError::NotConnected { .. })
        ));
        assert_eq!(new.store("users").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn older_version_is_a_connection_error() {
        let engine = Engine::in_memory();
        database(&engine, 2).connect().unwrap();
        match database(&engine, 1).connect() {
            Err(CoreError::Connection {
                source: EngineError::VersionError { requested, current },
                ..
            }) => assert_eq!((requested, current), (1, 2)),
            other => panic!("unexpected {:?}", other.err()),
        }
    }

    #[test]
    fn unbound_store_when_not_connected() {
        let engine = Engine::in_memory();
        let db = database(&engine, 1);
        let store = db.store("users").unwrap();
        assert!(!store.is_connected());
        assert!(matches!(
            store.insert(&user("1", "a@b.com")),
            Err(CoreError::NotConnected { .. })
        ));
        assert!(matches!(
            db.store("orders"),
            Err(CoreError::UnknownStore { .. })
        ));
    }

    #[test]
    fn close_and_destroy() {
        let engine = Engine::in_memory();
        let db = database(&engine, 1);
        db.connect().unwrap();
        db.store("users").unwrap().insert(&user("1", "a@b.com")).unwrap();

        db.close();
        assert_eq!(db.state(), ConnectionState::Closed);
        db.connect().unwrap();
        assert_eq!(db.store("users").unwrap().count().unwrap(), 1);

        db.destroy().unwrap();
        assert!(engine.database_names().unwrap().is_empty());
        db.connect().unwrap();
        assert_eq!(db.store("users").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn reopen_from_directory_skips_upgrade() {
        let dir = tempfile::tempdir().unwrap();
        {
            let db = database(&Engine::open_dir(dir.path()).unwrap(), 1);
            db.connect().unwrap();
            db.store("users").unwrap().insert(&user("1", "a@b.com")).unwrap();
        }

        let db = database(&Engine::open_dir(dir.path()).unwrap(), 1);
        db.connect().unwrap();
        assert!(db.last_upgrade().is_none());
        assert!(db.store("users").unwrap().exists("1").unwrap());
    }

    #[test]
    fn build_rejects_bad_declarations() {
        let engine = Engine::in_memory();
        assert!(matches!(
            Database::builder("app", 0).build(engine.clone()),
            Err(CoreError::InvalidDeclaration { .. })
        ));
        assert!(matches!(
            Database::builder("app", 1)
                .store(users())
                .store(users())
                .build(engine.clone()),
            Err(CoreError::InvalidDeclaration { .. })
        ));
        assert!(matches!(
            Database::builder("app", 1)
                .handler(0, "zero", |_| Ok(()))
                .build(engine),
            Err(CoreError::InvalidDeclaration { .. })
        ));
    }
}
