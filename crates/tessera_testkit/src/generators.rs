//! Property-based test generators using proptest.
//!
//! Strategies produce records for the sample `users` schema (see
//! [`users_schema`](crate::fixtures::users_schema)), shapes over it, and
//! sequences of store operations.

use proptest::prelude::*;
use tessera_codec::Value;
use tessera_core::Shape;

/// Strategy for primary keys of sample users. A small alphabet so that
/// operation sequences hit the same keys repeatedly.
pub fn user_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-e][0-9]?").expect("Invalid regex")
}

/// Strategy for email addresses.
pub fn email_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z]{1,8}@[a-z]{1,6}\\.(com|org)").expect("Invalid regex")
}

/// Strategy for valid store and index names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,31}").expect("Invalid regex")
}

/// Strategy for values that are not strings.
pub fn non_string_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        Just(Value::from(vec![1, 2])),
        Just(Value::empty_object()),
    ]
}

/// Strategy for records that conform to the sample schema, optionally
/// carrying undeclared keys.
pub fn user_record_strategy() -> impl Strategy<Value = Value> {
    (
        user_id_strategy(),
        prop::option::of("[A-Za-z ]{0,12}"),
        email_strategy(),
        prop::option::of(any::<i64>()),
    )
        .prop_map(|(id, name, email, extra)| {
            let mut record = Value::object([("id", id), ("email", email)]);
            if let Some(name) = name {
                record.insert("name", name);
            }
            if let Some(extra) = extra {
                record.insert("extra", extra);
            }
            record
        })
}

/// Strategy for records that violate the sample schema: a required field
/// is missing or a declared field has the wrong type.
pub fn invalid_user_record_strategy() -> impl Strategy<Value = Value> {
    (user_record_strategy(), 0..3usize, non_string_strategy()).prop_map(
        |(mut record, field, wrong)| {
            let name = ["id", "email", "name"][field];
            if field < 2 && wrong.is_null() {
                record.remove(name);
            } else {
                record.insert(name, wrong);
            }
            record
        },
    )
}

/// Strategy for shapes over the sample schema.
pub fn user_shape_strategy() -> impl Strategy<Value = Shape> {
    prop::collection::vec((0..3usize, any::<bool>()), 0..4).prop_map(|picks| {
        picks.into_iter().fold(Shape::new(), |shape, (field, included)| {
            let name = ["id", "name", "email"][field];
            if included {
                shape.include(name)
            } else {
                shape.exclude(name)
            }
        })
    })
}

/// A store operation for model-based testing.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Insert a record (fails if the key exists).
    Insert(Value),
    /// Insert or replace a record.
    Put(Value),
    /// Remove a key.
    Remove(String),
    /// Check a key.
    Exists(String),
}

/// Strategy for generating store operations.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        3 => user_record_strategy().prop_map(StoreOperation::Insert),
        2 => user_record_strategy().prop_map(StoreOperation::Put),
        1 => user_id_strategy().prop_map(StoreOperation::Remove),
        2 => user_id_strategy().prop_map(StoreOperation::Exists),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::users_schema;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_users_are_valid(record in user_record_strategy()) {
            prop_assert!(users_schema().is_valid(&record));
        }

        #[test]
        fn generated_invalid_users_are_invalid(record in invalid_user_record_strategy()) {
            prop_assert!(!users_schema().is_valid(&record));
        }

        #[test]
        fn generated_shapes_fit_the_schema(shape in user_shape_strategy()) {
            prop_assert!(shape.check(&users_schema()).is_ok());
        }

        #[test]
        fn store_name_starts_with_letter(name in store_name_strategy()) {
            let first = name.chars().next();
            prop_assert!(first.is_some_and(|c| c.is_ascii_alphabetic()));
        }
    }
}
