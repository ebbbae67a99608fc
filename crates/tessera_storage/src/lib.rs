//! # Tessera Storage
//!
//! The storage engine contract and a journaled reference engine.
//!
//! The layers, bottom up:
//!
//! - [`StorageBackend`]: an opaque append-only byte store
//!   ([`InMemoryBackend`], [`FileBackend`])
//! - the journal: checksummed frames of committed batches over a backend
//! - [`Engine`]: named, versioned databases of keyed collections with
//!   secondary indexes, rebuilt from their journal on open
//! - the contract ([`StorageEngine`], [`OpenRequest`], [`VersionChange`],
//!   [`Connection`]) that callers program against
//!
//! ## Example
//!
//! ```rust
//! use tessera_codec::Value;
//! use tessera_storage::{Connection, Engine, OpenEvent, StorageEngine, VersionChange};
//!
//! let engine = Engine::in_memory();
//! let mut request = engine.open("contacts", 1);
//! if let OpenEvent::UpgradeNeeded { .. } = request.next_event() {
//!     request.transaction().unwrap().create_collection("people", "id").unwrap();
//! }
//! let OpenEvent::Success(conn) = request.next_event() else { unreachable!() };
//!
//! conn.add("people", &Value::object([("id", "1")])).unwrap();
//! assert_eq!(conn.count("people").unwrap(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod config;
mod contract;
mod engine;
mod error;
mod file;
mod journal;
mod memory;
mod state;

pub use backend::StorageBackend;
pub use config::EngineConfig;
pub use contract::{
    Connection, OpenEvent, OpenRequest, StorageEngine, VersionChange, VersionChangeEvent,
    VersionChangeHandler,
};
pub use engine::{Engine, JOURNAL_EXTENSION};
pub use error::{EngineError, EngineResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
pub use state::IndexDef;
