//! # Tessera Core
//!
//! Typed object stores over a versioned storage engine.
//!
//! This crate provides:
//! - shapes and projection of validated records onto them
//! - queries that validate and project in one step
//! - immutable object store declarations with secondary indexes
//! - store operations over a live connection
//! - version-keyed upgrade handlers and the connect state machine
//!
//! ## Example
//!
//! ```rust
//! use tessera_core::{Database, ObjectStoreBuilder, Shape, Value};
//! use tessera_core::{Engine, FieldType, ObjectSchema};
//!
//! let schema = ObjectSchema::new()
//!     .field("id", FieldType::String)
//!     .optional("name", FieldType::String)
//!     .field("email", FieldType::String);
//! let users = ObjectStoreBuilder::new("users", schema, "id")?
//!     .add_index("by_email", "email")?;
//!
//! let db = Database::builder("app", 1)
//!     .store(users.clone())
//!     .handler(1, "create_users", |ctx| ctx.create_store("users"))
//!     .build(Engine::in_memory())?;
//! db.connect()?;
//!
//! let store = db.store("users")?;
//! store.insert(&Value::object([("id", "1"), ("email", "a@b.com")]))?;
//! assert_eq!(store.count()?, 1);
//! assert!(store.exists("1")?);
//!
//! let emails = users.select(Shape::new().include("email"))?;
//! let raw = Value::object([("id", "1"), ("name", "x"), ("email", "a@b.com")]);
//! assert_eq!(
//!     emails.extract_shape(&raw)?,
//!     Value::object([("email", "a@b.com")])
//! );
//! # Ok::<(), tessera_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod database;
mod error;
mod migration;
mod object_store;
mod projection;
mod query;
mod shape;
mod store;

pub use database::{ConnectionState, Database, DatabaseBuilder};
pub use error::{CoreError, CoreResult};
pub use migration::{
    Migration, MigrationContext, MigrationHandler, MigrationInfo, MigrationManager,
    MigrationOperation, MigrationResult, MigrationRunResult, MigrationVersion,
};
pub use object_store::ObjectStoreBuilder;
pub use projection::{extract_shape, project};
pub use query::{FilteredQuery, Query};
pub use shape::{Selection, Shape};
pub use store::ObjectStore;

pub use tessera_codec::{Key, Value};
pub use tessera_schema::{Field, FieldPath, FieldType, Issue, IssueKind, Issues, ObjectSchema};
pub use tessera_storage::{
    Connection, Engine, EngineConfig, EngineError, IndexDef, OpenEvent, OpenRequest,
    StorageEngine, VersionChange, VersionChangeEvent,
};
