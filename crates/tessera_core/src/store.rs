//! Store operations over a live connection.

use crate::error::{CoreError, CoreResult};
use crate::object_store::ObjectStoreBuilder;
use std::sync::Arc;
use tessera_codec::{Key, Value};
use tessera_storage::{Connection, EngineError};

/// A declared store bound to a connection.
///
/// Writes validate against the store schema before reaching the engine.
/// Every operation fails with `NotConnected` once the connection is
/// closed.
#[derive(Clone)]
pub struct ObjectStore {
    builder: ObjectStoreBuilder,
    connection: Option<Arc<dyn Connection>>,
}

impl ObjectStore {
    pub(crate) fn new(builder: ObjectStoreBuilder, connection: Option<Arc<dyn Connection>>) -> Self {
        Self {
            builder,
            connection,
        }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        self.builder.name()
    }

    /// The store declaration.
    pub fn builder(&self) -> &ObjectStoreBuilder {
        &self.builder
    }

    /// Returns true while the connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection.as_ref().is_some_and(|c| !c.is_closed())
    }

    fn connection(&self) -> CoreResult<&dyn Connection> {
        match &self.connection {
            Some(conn) if !conn.is_closed() => Ok(&**conn),
            _ => Err(CoreError::NotConnected {
                store: self.name().to_string(),
            }),
        }
    }

    fn validate(&self, value: &Value) -> CoreResult<Value> {
        self.builder
            .schema()
            .safe_validate(value)
            .map_err(|issues| CoreError::SchemaMismatch {
                store: self.name().to_string(),
                issues,
            })
    }

    fn read_failed(&self, source: EngineError) -> CoreError {
        match source {
            EngineError::Closed => CoreError::NotConnected {
                store: self.name().to_string(),
            },
            source => CoreError::StoreRead {
                store: self.name().to_string(),
                source,
            },
        }
    }

    fn write_failed(&self, source: EngineError) -> CoreError {
        match source {
            EngineError::Closed => CoreError::NotConnected {
                store: self.name().to_string(),
            },
            source => CoreError::StoreWrite {
                store: self.name().to_string(),
                source,
            },
        }
    }

    /// Validates and stores a new record, returning its key.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` (nothing written), `NotConnected`, or
    /// `StoreWrite` (for example a duplicate key).
    pub fn insert(&self, value: &Value) -> CoreResult<Key> {
        let conn = self.connection()?;
        let record = self.validate(value)?;
        let key = conn
            .add(self.name(), &record)
            .map_err(|e| self.write_failed(e))?;
        tracing::trace!(store = %self.name(), %key, "record inserted");
        Ok(key)
    }

    /// Validates and stores a record, replacing any record with its key.
    ///
    /// # Errors
    ///
    /// As [`insert`](Self::insert), except an existing key is not an error.
    pub fn put(&self, value: &Value) -> CoreResult<Key> {
        let conn = self.connection()?;
        let record = self.validate(value)?;
        conn.put(self.name(), &record)
            .map_err(|e| self.write_failed(e))
    }

    /// Number of records.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or `StoreRead`.
    pub fn count(&self) -> CoreResult<u64> {
        self.connection()?
            .count(self.name())
            .map_err(|e| self.read_failed(e))
    }

    /// Returns true if a record with `key` exists. The record is not fetched.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or `StoreRead`.
    pub fn exists(&self, key: impl Into<Key>) -> CoreResult<bool> {
        let key = key.into();
        let found = self
            .connection()?
            .get_key(self.name(), &key)
            .map_err(|e| self.read_failed(e))?;
        Ok(found.is_some())
    }

    /// Fetches a record.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or `StoreRead`.
    pub fn get(&self, key: impl Into<Key>) -> CoreResult<Option<Value>> {
        let key = key.into();
        self.connection()?
            .get(self.name(), &key)
            .map_err(|e| self.read_failed(e))
    }

    /// Removes a record. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or `StoreWrite`.
    pub fn remove(&self, key: impl Into<Key>) -> CoreResult<()> {
        let key = key.into();
        self.connection()?
            .delete(self.name(), &key)
            .map_err(|e| self.write_failed(e))
    }

    /// Removes every record.
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` or `StoreWrite`.
    pub fn clear(&self) -> CoreResult<()> {
        self.connection()?
            .clear(self.name())
            .map_err(|e| self.write_failed(e))
    }

    /// Records whose indexed field equals `value`, in primary key order.
    ///
    /// # Errors
    ///
    /// Returns `UnknownIndex` if the index is not declared on this store,
    /// `NotConnected` or `StoreRead`.
    pub fn get_by_index(&self, index: &str, value: impl Into<Key>) -> CoreResult<Vec<Value>> {
        if self.builder.index(index).is_none() {
            return Err(CoreError::UnknownIndex {
                store: self.name().to_string(),
                index: index.to_string(),
            });
        }
        let conn = self.connection()?;
        let keys = conn
            .index_keys(self.name(), index, &value.into())
            .map_err(|e| self.read_failed(e))?;

        let mut records = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(record) = conn.get(self.name(), &key).map_err(|e| self.read_failed(e))? {
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("name", &self.name())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_schema::{FieldType, ObjectSchema};
    use tessera_storage::{Engine, OpenEvent, StorageEngine};

    fn users() -> ObjectStoreBuilder {
        let schema = ObjectSchema::new()
            .field("id", FieldType::String)
            .optional("name", FieldType::String)
            .field("email", FieldType::String);
        ObjectStoreBuilder::new("users", schema, "id")
            .unwrap()
            .add_index("by_email", "email")
            .unwrap()
    }

    fn connected() -> ObjectStore {
        let engine = Engine::in_memory();
        let builder = users();
        let mut request = engine.open("test", 1);
        assert!(matches!(
            request.next_event(),
            OpenEvent::UpgradeNeeded { .. }
        ));
        builder.create(request.transaction().unwrap()).unwrap();
        let OpenEvent::Success(conn) = request.next_event() else {
            panic!("open failed");
        };
        builder.bind(conn)
    }

    fn user(id: &str, email: &str) -> Value {
        Value::object([("id", id), ("email", email)])
    }

    #[test]
    fn insert_count_exists() {
        let store = connected();
        assert_eq!(store.insert(&user("1", "a@b.com")).unwrap(), Key::from("1"));
        assert_eq!(store.count().unwrap(), 1);
        assert!(store.exists("1").unwrap());
        assert!(!store.exists("2").unwrap());
    }

    #[test]
    fn missing_collection_is_a_read_error() {
        let engine = Engine::in_memory();
        let mut request = engine.open("test", 1);
        assert!(matches!(
            request.next_event(),
            OpenEvent::UpgradeNeeded { .. }
        ));
        let OpenEvent::Success(conn) = request.next_event() else {
            panic!("open failed");
        };
        let store = users().bind(conn);

        assert!(matches!(
            store.count(),
            Err(CoreError::StoreRead {
                source: EngineError::NotFound { .. },
                ..
            })
        ));
        assert!(matches!(
            store.exists("1"),
            Err(CoreError::StoreRead {
                source: EngineError::NotFound { .. },
                ..
            })
        ));
    }

    #[test]
    fn invalid_record_never_reaches_storage() {
        let store = connected();
        let result = store.insert(&Value::object([("email", "a@b.com")]));
        match result {
            Err(CoreError::SchemaMismatch { store: name, issues }) => {
                assert_eq!(name, "users");
                assert!(issues.at("id").is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn insert_strips_undeclared_fields() {
        let store = connected();
        let mut raw = user("1", "a@b.com");
        raw.insert("extra", true);
        store.insert(&raw).unwrap();
        assert_eq!(store.get("1").unwrap(), Some(user("1", "a@b.com")));
    }

    #[test]
    fn duplicate_key_is_a_write_error() {
        let store = connected();
        store.insert(&user("1", "a@b.com")).unwrap();
        assert!(matches!(
            store.insert(&user("1", "c@d.com")),
            Err(CoreError::StoreWrite {
                source: EngineError::Constraint { .. },
                ..
            })
        ));
        store.put(&user("1", "c@d.com")).unwrap();
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn index_lookup_and_removal() {
        let store = connected();
        store.insert(&user("1", "a@b.com")).unwrap();
        store.insert(&user("2", "a@b.com")).unwrap();
        store.insert(&user("3", "c@d.com")).unwrap();

        let shared = store.get_by_index("by_email", "a@b.com").unwrap();
        assert_eq!(shared, vec![user("1", "a@b.com"), user("2", "a@b.com")]);
        assert!(matches!(
            store.get_by_index("by_name", "x"),
            Err(CoreError::UnknownIndex { .. })
        ));

        store.remove("1").unwrap();
        assert_eq!(store.get_by_index("by_email", "a@b.com").unwrap().len(), 1);
        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn closed_connection_is_not_connected() {
        let store = connected();
        store.connection.as_ref().unwrap().close();
        assert!(!store.is_connected());
        assert!(matches!(
            store.insert(&user("1", "a@b.com")),
            Err(CoreError::NotConnected { .. })
        ));
        assert!(matches!(store.exists("1"), Err(CoreError::NotConnected { .. })));
    }
}
