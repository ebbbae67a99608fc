//! Property tests for projection, declarations and store behaviour.

use proptest::prelude::*;
use tessera_codec::Value;
use tessera_core::{project, CoreError, ObjectStoreBuilder, Query};
use tessera_testkit::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    /// Every selected field present in the validated record is returned
    /// unchanged, and nothing else is.
    #[test]
    fn projection_is_complete_and_sound(
        record in user_record_strategy(),
        shape in user_shape_strategy(),
    ) {
        let query = Query::new(users_schema(), shape.clone()).unwrap();
        let validated = users_schema().safe_validate(&record).unwrap();
        let projected = query.extract_shape(&record).unwrap();
        let fields = projected.as_object().unwrap();

        for (name, selection) in shape.iter() {
            if selection.is_selected() {
                prop_assert_eq!(fields.get(name), validated.get(name));
            } else {
                prop_assert!(!fields.contains_key(name));
            }
        }
        for name in fields.keys() {
            prop_assert!(shape.get(name).is_some_and(|s| s.is_selected()));
        }
    }

    #[test]
    fn projection_is_idempotent(
        record in user_record_strategy(),
        shape in user_shape_strategy(),
    ) {
        let once = project(&users_schema().safe_validate(&record).unwrap(), &shape);
        prop_assert_eq!(project(&once, &shape), once);
    }

    #[test]
    fn invalid_records_are_not_extracted(
        record in invalid_user_record_strategy(),
        shape in user_shape_strategy(),
    ) {
        let query = Query::new(users_schema(), shape).unwrap();
        let result = query.extract_shape(&record);
        prop_assert!(matches!(result, Err(CoreError::Validation { .. })), "expected CoreError::Validation");
    }

    #[test]
    fn add_index_leaves_receiver_untouched(name in store_name_strategy()) {
        let base = ObjectStoreBuilder::new("users", users_schema(), "id").unwrap();
        let before: Vec<String> = base.index_names().map(String::from).collect();

        let extended = base.add_index(&name, "email").unwrap();
        let after: Vec<&str> = extended.index_names().collect();
        prop_assert_eq!(after.len(), before.len() + 1);
        prop_assert!(after.contains(&name.as_str()));
        let unchanged: Vec<String> = base.index_names().map(String::from).collect();
        prop_assert_eq!(unchanged, before);

        let on_key = base.add_index(&name, "id");
        prop_assert!(
            matches!(on_key, Err(CoreError::IndexOnKeyPath { .. })),
            "index on key path accepted"
        );
        prop_assert_eq!(base.index_names().count(), 0);
    }

    #[test]
    fn duplicate_index_rejected_without_side_effects(name in store_name_strategy()) {
        prop_assume!(name != "by_email");
        let first = users_store().add_index(&name, "name").unwrap();
        let again = first.add_index(&name, "email");
        prop_assert!(
            matches!(again, Err(CoreError::DuplicateIndex { .. })),
            "duplicate index accepted"
        );
        prop_assert_eq!(first.index_names().count(), 2);
        prop_assert_eq!(first.index(&name).map(|i| i.path.as_str()), Some("name"));
    }

    #[test]
    fn store_matches_model(ops in operation_sequence_strategy(1, 40)) {
        let mut harness = IntegrationHarness::new();
        for op in &ops {
            harness.apply(op);
        }
        harness.verify();
    }
}

#[test]
fn valid_record_round_trips_through_the_store() {
    with_temp_db(|db| {
        let users = db.store("users").unwrap();
        let mut record = named_user("7", "Grace", "grace@example.com");
        record.insert("unknown", Value::from(1));
        users.insert(&record).unwrap();
        assert_eq!(
            users.get("7").unwrap(),
            Some(named_user("7", "Grace", "grace@example.com"))
        );
    });
}
