//! Cross-crate integration test helpers.
//!
//! [`IntegrationHarness`] applies store operations to a live database and
//! to an in-memory model at the same time, and checks that they agree.

use crate::fixtures::TestDatabase;
use crate::generators::StoreOperation;
use std::collections::BTreeMap;
use tessera_codec::{Key, Value};
use tessera_core::{CoreError, ObjectStore};
use tessera_schema::ObjectSchema;
use tessera_storage::EngineError;

/// A test harness for model-based testing of the `users` store.
pub struct IntegrationHarness {
    /// The database under test.
    pub db: TestDatabase,
    users: ObjectStore,
    schema: ObjectSchema,
    model: BTreeMap<Key, Value>,
}

impl IntegrationHarness {
    /// Creates a harness over an in-memory database.
    pub fn new() -> Self {
        Self::over(TestDatabase::memory())
    }

    /// Creates a harness over a database in a temporary directory.
    pub fn file() -> Self {
        Self::over(TestDatabase::file())
    }

    fn over(db: TestDatabase) -> Self {
        let users = db.store("users").expect("users is declared");
        let schema = users.builder().schema().clone();
        Self {
            db,
            users,
            schema,
            model: BTreeMap::new(),
        }
    }

    /// Applies one operation to both sides and asserts they agree.
    pub fn apply(&mut self, op: &StoreOperation) {
        match op {
            StoreOperation::Insert(record) => {
                let key = Self::key_of(record);
                let result = self.users.insert(record);
                if self.model.contains_key(&key) {
                    assert!(
                        matches!(
                            result,
                            Err(CoreError::StoreWrite {
                                source: EngineError::Constraint { .. },
                                ..
                            })
                        ),
                        "duplicate insert of {key} returned {result:?}"
                    );
                } else {
                    assert_eq!(result.expect("insert failed"), key);
                    self.model.insert(key, self.normalize(record));
                }
            }
            StoreOperation::Put(record) => {
                let key = self.users.put(record).expect("put failed");
                assert_eq!(key, Self::key_of(record));
                self.model.insert(key, self.normalize(record));
            }
            StoreOperation::Remove(id) => {
                self.users.remove(id.as_str()).expect("remove failed");
                self.model.remove(&Key::from(id.as_str()));
            }
            StoreOperation::Exists(id) => {
                let exists = self.users.exists(id.as_str()).expect("exists failed");
                assert_eq!(exists, self.model.contains_key(&Key::from(id.as_str())));
            }
        }
    }

    /// Asserts that the store holds exactly the modelled records.
    pub fn verify(&self) {
        let count = self.users.count().expect("count failed");
        assert_eq!(count, self.model.len() as u64, "record count mismatch");
        for (key, expected) in &self.model {
            let actual = self.users.get(key.clone()).expect("get failed");
            assert_eq!(actual.as_ref(), Some(expected), "record mismatch for {key}");
        }
    }

    /// Reopens the database from its journal and rebinds the store.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self {
            db, users, model, ..
        } = self;
        // The bound store keeps the journal open.
        drop(users);
        let mut harness = Self::over(db.reopen());
        harness.model = model;
        harness
    }

    /// Number of modelled records.
    pub fn len(&self) -> usize {
        self.model.len()
    }

    /// Returns true if no records are modelled.
    pub fn is_empty(&self) -> bool {
        self.model.is_empty()
    }

    fn key_of(record: &Value) -> Key {
        record
            .get("id")
            .and_then(Key::from_value)
            .expect("generated records carry an id")
    }

    fn normalize(&self, record: &Value) -> Value {
        self.schema
            .safe_validate(record)
            .expect("generated records are valid")
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::user;

    #[test]
    fn harness_tracks_writes() {
        let mut harness = IntegrationHarness::new();
        harness.apply(&StoreOperation::Insert(user("a", "a@x.com")));
        harness.apply(&StoreOperation::Insert(user("a", "other@x.com")));
        harness.apply(&StoreOperation::Put(user("b", "b@x.com")));
        harness.apply(&StoreOperation::Remove("a".into()));
        harness.apply(&StoreOperation::Exists("a".into()));
        harness.verify();
        assert_eq!(harness.len(), 1);
    }

    #[test]
    fn harness_survives_reopen() {
        let mut harness = IntegrationHarness::file();
        harness.apply(&StoreOperation::Put(user("a", "a@x.com")));
        let harness = harness.reopen();
        harness.verify();
    }
}
