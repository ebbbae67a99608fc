//! Test fixtures and database helpers.
//!
//! Provides a sample `users` store, databases over in-memory and
//! temporary-directory engines, and logging setup for tests.

use std::path::Path;
use std::sync::Once;
use tempfile::TempDir;
use tessera_codec::Value;
use tessera_core::{Database, ObjectStoreBuilder};
use tessera_schema::{FieldType, ObjectSchema};
use tessera_storage::Engine;
use tracing_subscriber::EnvFilter;

/// Name of the sample database.
pub const TEST_DB: &str = "testdb";

/// Schema `{id: string, name?: string, email: string}`.
pub fn users_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field("id", FieldType::String)
        .optional("name", FieldType::String)
        .field("email", FieldType::String)
}

/// The `users` store keyed by `id`, with an index on `email`.
pub fn users_store() -> ObjectStoreBuilder {
    ObjectStoreBuilder::new("users", users_schema(), "id")
        .and_then(|users| users.add_index("by_email", "email"))
        .expect("users store declaration is valid")
}

/// A valid user record without a name.
pub fn user(id: &str, email: &str) -> Value {
    Value::object([("id", id), ("email", email)])
}

/// A valid user record with a name.
pub fn named_user(id: &str, name: &str, email: &str) -> Value {
    Value::object([("id", id), ("name", name), ("email", email)])
}

/// Declares the sample database at `version` over `engine`.
///
/// Version 1 creates `users`; later versions only record a note, so any
/// version up to 3 can be opened from an earlier one.
pub fn users_database(engine: &Engine, version: u64) -> Database {
    Database::builder(TEST_DB, version)
        .store(users_store())
        .handler(1, "create_users", |ctx| ctx.create_store("users"))
        .handler(2, "note_v2", |ctx| {
            if !ctx.has_store("users") {
                ctx.create_store("users")?;
            }
            ctx.custom("v2");
            Ok(())
        })
        .handler(3, "note_v3", |ctx| {
            if !ctx.has_store("users") {
                ctx.create_store("users")?;
            }
            ctx.custom("v3");
            Ok(())
        })
        .build(engine.clone())
        .expect("sample database declaration is valid")
}

/// A connected test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Database,
    /// The engine the database lives in.
    pub engine: Engine,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Connects the sample database at version 1 in memory.
    pub fn memory() -> Self {
        let engine = Engine::in_memory();
        let db = users_database(&engine, 1);
        db.connect().expect("failed to connect in-memory database");
        Self {
            db,
            engine,
            _temp_dir: None,
        }
    }

    /// Connects the sample database at version 1 in a temporary directory.
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let engine = Engine::open_dir(temp_dir.path()).expect("failed to open engine");
        let db = users_database(&engine, 1);
        db.connect().expect("failed to connect file database");
        Self {
            db,
            engine,
            _temp_dir: Some(temp_dir),
        }
    }

    /// The engine directory, if file-based.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Drops the engine and database and reconnects from the same
    /// directory, replaying the journal. In-memory databases are returned
    /// unchanged.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self {
            db,
            engine,
            _temp_dir,
        } = self;
        let Some(temp_dir) = _temp_dir else {
            return Self {
                db,
                engine,
                _temp_dir: None,
            };
        };
        let version = db.version();
        drop(db);
        drop(engine);

        let engine = Engine::open_dir(temp_dir.path()).expect("failed to reopen engine");
        let db = users_database(&engine, version);
        db.connect().expect("failed to reconnect");
        Self {
            db,
            engine,
            _temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a connected in-memory database.
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory();
    f(&test_db.db)
}

/// Runs a test with a connected database in a temporary directory.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file();
    let path = test_db.path().expect("file database should have a path");
    f(&test_db.db, path)
}

/// Installs a `tracing` subscriber for tests, filtered by `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// A connected database with `count` users `user-0`, `user-1`, ...
    pub fn populated_database(count: usize) -> TestDatabase {
        let test_db = TestDatabase::memory();
        let users = test_db.store("users").expect("users is declared");
        for i in 0..count {
            users
                .insert(&user(&format!("user-{i}"), &format!("user{i}@example.com")))
                .expect("failed to insert user");
        }
        test_db
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_database() {
        let test_db = TestDatabase::memory();
        assert!(test_db.path().is_none());
        assert_eq!(test_db.store("users").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn test_with_file_db() {
        with_file_db(|db, path| {
            assert!(path.join(format!("{TEST_DB}.tjournal")).exists());
            assert!(db.store("users").unwrap().is_connected());
        });
    }

    #[test]
    fn test_populated_scenario() {
        let test_db = scenarios::populated_database(10);
        let users = test_db.store("users").unwrap();
        assert_eq!(users.count().unwrap(), 10);
        assert!(users.exists("user-9").unwrap());
    }

    #[test]
    fn test_reopen_keeps_records() {
        let test_db = scenarios::populated_database(0);
        assert!(test_db.reopen().path().is_none());

        let test_db = TestDatabase::file();
        test_db.store("users").unwrap().insert(&user("1", "a@b.com")).unwrap();
        let test_db = test_db.reopen();
        assert!(test_db.store("users").unwrap().exists("1").unwrap());
    }
}
