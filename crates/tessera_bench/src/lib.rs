//! Benchmark utilities.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use rand::distributions::Alphanumeric;
use rand::Rng;
use tessera_codec::Value;
use tessera_core::{Database, ObjectStoreBuilder};
use tessera_schema::{FieldType, ObjectSchema};
use tessera_storage::StorageEngine;

/// Schema of the benchmark `people` store.
pub fn people_schema() -> ObjectSchema {
    ObjectSchema::new()
        .field("id", FieldType::Integer)
        .field("name", FieldType::String)
        .field("email", FieldType::String)
        .optional("bio", FieldType::String)
        .optional("tags", FieldType::array(FieldType::String))
        .optional(
            "address",
            FieldType::Object(
                ObjectSchema::new()
                    .field("city", FieldType::String)
                    .field("zip", FieldType::String),
            ),
        )
}

/// The `people` store keyed by `id` with an index on `email`.
pub fn people_store() -> ObjectStoreBuilder {
    ObjectStoreBuilder::new("people", people_schema(), "id")
        .and_then(|store| store.add_index("by_email", "email"))
        .expect("benchmark store declaration is valid")
}

/// Connects a version 1 database holding the `people` store.
pub fn people_database<E: StorageEngine + 'static>(engine: E) -> Database {
    let db = Database::builder("bench", 1)
        .store(people_store())
        .handler(1, "create_people", |ctx| ctx.create_store("people"))
        .build(engine)
        .expect("benchmark database declaration is valid");
    db.connect().expect("failed to connect benchmark database");
    db
}

/// Random alphanumeric text of `len` characters.
pub fn random_text(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// A valid `people` record with a bio of `bio_len` characters.
pub fn person(id: i64, bio_len: usize) -> Value {
    Value::object([
        ("id", Value::from(id)),
        ("name", Value::from(random_text(12))),
        ("email", Value::from(format!("{}@example.com", random_text(8)))),
        ("bio", Value::from(random_text(bio_len))),
        ("tags", Value::from(vec![random_text(5), random_text(5)])),
        (
            "address",
            Value::object([("city", random_text(10)), ("zip", random_text(5))]),
        ),
    ])
}

/// Generate `count` records with ids `0..count`.
pub fn generate_people(count: usize, bio_len: usize) -> Vec<Value> {
    (0..count as i64).map(|id| person(id, bio_len)).collect()
}
