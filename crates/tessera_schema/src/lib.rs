//! # Tessera Schema
//!
//! Declarative record schemas for Tessera.
//!
//! An [`ObjectSchema`] describes one record type. [`ObjectSchema::safe_validate`]
//! turns an untyped [`Value`](tessera_codec::Value) into either a normalized
//! value that conforms to the schema, or [`Issues`] listing every field that
//! failed and why.
//!
//! ```
//! use tessera_codec::Value;
//! use tessera_schema::{FieldType, ObjectSchema};
//!
//! let schema = ObjectSchema::new()
//!     .field("id", FieldType::String)
//!     .field("age", FieldType::Integer);
//!
//! let ok = schema.safe_validate(&Value::object([("id", Value::from("1")), ("age", Value::from(30.0))]));
//! assert_eq!(ok.unwrap().get("age"), Some(&Value::Integer(30)));
//!
//! let err = schema.safe_validate(&Value::object([("id", 1)])).unwrap_err();
//! assert_eq!(err.len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod field;
mod issue;
mod object;
mod path;

pub use field::{Field, FieldType};
pub use issue::{Issue, IssueKind, Issues};
pub use object::ObjectSchema;
pub use path::{FieldPath, PathError};

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tessera_codec::Value;

    fn schema() -> ObjectSchema {
        ObjectSchema::new()
            .field("id", FieldType::String)
            .optional("age", FieldType::Integer)
            .optional("score", FieldType::Number)
            .optional("tags", FieldType::array(FieldType::String))
    }

    fn loose_value() -> impl Strategy<Value = Value> {
        let scalar = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            (-1000i64..1000).prop_map(Value::Integer),
            (-1000i32..1000).prop_map(|n| Value::Float(f64::from(n) / 4.0)),
            "[a-z]{0,4}".prop_map(Value::Text),
        ];
        prop::collection::btree_map(
            prop_oneof![
                Just("id".to_string()),
                Just("age".to_string()),
                Just("score".to_string()),
                Just("extra".to_string()),
            ],
            scalar,
            0..4,
        )
        .prop_map(Value::Object)
    }

    proptest! {
        #[test]
        fn validation_is_idempotent(value in loose_value()) {
            if let Ok(normalized) = schema().safe_validate(&value) {
                prop_assert_eq!(schema().safe_validate(&normalized), Ok(normalized.clone()));
            }
        }

        #[test]
        fn normalized_values_only_hold_declared_fields(value in loose_value()) {
            if let Ok(normalized) = schema().safe_validate(&value) {
                let fields = normalized.as_object().unwrap();
                prop_assert!(fields.keys().all(|k| schema().contains(k)));
            }
        }
    }
}
