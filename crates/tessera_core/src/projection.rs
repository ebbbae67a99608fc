//! Projection of validated records through a shape.

use crate::error::{CoreError, CoreResult};
use crate::shape::{Selection, Shape};
use std::collections::BTreeMap;
use tessera_codec::Value;
use tessera_schema::ObjectSchema;

/// Projects a validated value through `shape`.
///
/// Fields marked `Include(true)` are copied whole, whatever their kind.
/// Nested selections recurse into object fields. Fields that are absent,
/// excluded or unnamed are left out. A non-object input projects to an
/// empty object.
pub fn project(value: &Value, shape: &Shape) -> Value {
    let Some(fields) = value.as_object() else {
        return Value::empty_object();
    };
    let mut out = BTreeMap::new();
    for (name, field) in fields {
        match shape.get(name) {
            Some(Selection::Include(true)) => {
                out.insert(name.clone(), field.clone());
            }
            Some(Selection::Nested(inner)) if field.is_object() => {
                out.insert(name.clone(), project(field, inner));
            }
            _ => {}
        }
    }
    Value::Object(out)
}

/// Checks `shape` against `schema`, validates `raw`, then projects the
/// normalized value.
///
/// # Errors
///
/// Returns `UnknownField` or `ShapeMismatch` if the shape does not fit the
/// schema, and `Validation` with every issue if `raw` does not conform. No
/// projection is attempted in either case.
pub fn extract_shape(schema: &ObjectSchema, shape: &Shape, raw: &Value) -> CoreResult<Value> {
    shape.check(schema)?;
    validate_and_project(schema, shape, raw)
}

/// [`extract_shape`] for a shape already checked against `schema`.
pub(crate) fn validate_and_project(
    schema: &ObjectSchema,
    shape: &Shape,
    raw: &Value,
) -> CoreResult<Value> {
    let validated = schema
        .safe_validate(raw)
        .map_err(|issues| CoreError::Validation { issues })?;
    Ok(project(&validated, shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_schema::FieldType;

    fn user() -> ObjectSchema {
        ObjectSchema::new()
            .field("id", FieldType::String)
            .optional("name", FieldType::String)
            .field("email", FieldType::String)
            .optional("tags", FieldType::array(FieldType::String))
            .optional(
                "meta",
                FieldType::Object(
                    ObjectSchema::new()
                        .field("createdAt", FieldType::String)
                        .field("updatedAt", FieldType::String),
                ),
            )
    }

    fn full() -> Value {
        Value::object([
            ("id", Value::from("1-1-1-1")),
            ("name", Value::from("blah")),
            ("email", Value::from("blah@gmail.com")),
            ("tags", Value::from(vec!["a", "b"])),
            (
                "meta",
                Value::object([("createdAt", "1"), ("updatedAt", "2")]),
            ),
        ])
    }

    #[test]
    fn selects_scalars_and_nested_fields() {
        let shape = Shape::new()
            .include("email")
            .nest("meta", Shape::new().include("createdAt"));
        let projected = extract_shape(&user(), &shape, &full()).unwrap();
        assert_eq!(
            projected,
            Value::object([
                ("email", Value::from("blah@gmail.com")),
                ("meta", Value::object([("createdAt", "1")])),
            ])
        );
    }

    #[test]
    fn include_true_copies_containers_whole() {
        let shape = Shape::new().include("tags").include("meta");
        let projected = extract_shape(&user(), &shape, &full()).unwrap();
        assert_eq!(projected.get("tags"), full().get("tags"));
        assert_eq!(projected.get("meta"), full().get("meta"));
    }

    #[test]
    fn absent_optional_field_stays_absent() {
        let shape = Shape::new().include("name").include("email");
        let raw = Value::object([("id", "1"), ("email", "a@b.com")]);
        let projected = extract_shape(&user(), &shape, &raw).unwrap();
        assert_eq!(projected, Value::object([("email", "a@b.com")]));
    }

    #[test]
    fn invalid_value_is_not_projected() {
        let shape = Shape::new().include("email");
        let raw = Value::object([("email", "a@b.com")]);
        match extract_shape(&user(), &shape, &raw) {
            Err(CoreError::Validation { issues }) => assert!(issues.at("id").is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shape_outside_the_schema_is_an_error() {
        let raw = Value::object([("id", "1"), ("email", "a@b.com")]);

        let typo = Shape::new().include("emial");
        match extract_shape(&user(), &typo, &raw) {
            Err(CoreError::UnknownField { field }) => assert_eq!(field, "emial"),
            other => panic!("unexpected {other:?}"),
        }

        let into_scalar = Shape::new().nest("email", Shape::new().include("x"));
        match extract_shape(&user(), &into_scalar, &raw) {
            Err(CoreError::ShapeMismatch { field }) => assert_eq!(field, "email"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn undeclared_keys_never_leak() {
        let shape = Shape::new().include("email");
        let mut raw = full();
        raw.insert("secret", "x");
        let projected = extract_shape(&user(), &shape, &raw).unwrap();
        assert!(projected.get("secret").is_none());
    }

    #[test]
    fn projection_is_idempotent() {
        let shape = Shape::new()
            .include("id")
            .nest("meta", Shape::new().include("updatedAt"));
        let once = project(&full(), &shape);
        assert_eq!(project(&once, &shape), once);
    }
}
