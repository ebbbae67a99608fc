//! Queries: a schema paired with a selection shape.

use crate::error::{CoreError, CoreResult};
use crate::projection::{project, validate_and_project};
use crate::shape::Shape;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_codec::Value;
use tessera_schema::ObjectSchema;

/// A projection query over one record type.
///
/// The shape is checked against the schema on construction, so every
/// `Query` can project any valid record.
#[derive(Debug, Clone)]
pub struct Query {
    schema: Arc<ObjectSchema>,
    shape: Shape,
    projected: ObjectSchema,
}

impl Query {
    /// Creates a query.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` or `ShapeMismatch` if the shape does not fit
    /// the schema.
    pub fn new(schema: impl Into<Arc<ObjectSchema>>, shape: Shape) -> CoreResult<Self> {
        let schema = schema.into();
        let projected = shape.project_schema(&schema)?;
        Ok(Self {
            schema,
            shape,
            projected,
        })
    }

    /// The record schema.
    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    /// The selection shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Schema of the values [`extract_shape`](Self::extract_shape) returns.
    pub fn projected_schema(&self) -> &ObjectSchema {
        &self.projected
    }

    /// Validates `raw` and returns its projection.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `raw` does not match the schema.
    pub fn extract_shape(&self, raw: &Value) -> CoreResult<Value> {
        validate_and_project(&self.schema, &self.shape, raw)
    }

    /// Like [`extract_shape`](Self::extract_shape), then deserializes the
    /// projection into `T`.
    ///
    /// # Errors
    ///
    /// Returns `Validation`, or `Deserialize` if the projection does not
    /// fit `T`.
    pub fn extract_as<T: DeserializeOwned>(&self, raw: &Value) -> CoreResult<T> {
        let projected = self.extract_shape(raw)?;
        serde_json::from_value(serde_json::Value::from(projected)).map_err(|e| {
            CoreError::Deserialize {
                message: e.to_string(),
            }
        })
    }

    /// Declares an equality filter over the record type.
    ///
    /// `partial` must be an object whose keys are declared fields and whose
    /// values are valid for those fields (`null` is never accepted). The
    /// returned query still yields projections. Filters are only evaluated
    /// against records in hand, see [`FilteredQuery::matches`].
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` or `InvalidFilter`.
    pub fn filter(&self, partial: &Value) -> CoreResult<FilteredQuery> {
        let Some(fields) = partial.as_object() else {
            return Err(CoreError::InvalidFilter {
                field: String::new(),
                message: format!("filter must be an object, found {}", partial.kind_name()),
            });
        };

        let mut conditions = BTreeMap::new();
        for (name, value) in fields {
            let field = self
                .schema
                .get(name)
                .ok_or_else(|| CoreError::unknown_field(name.as_str()))?;
            let normalized = field
                .ty()
                .validate(value)
                .map_err(|issues| CoreError::InvalidFilter {
                    field: name.clone(),
                    message: issues.to_string(),
                })?;
            conditions.insert(name.clone(), normalized);
        }

        Ok(FilteredQuery {
            query: self.clone(),
            conditions,
        })
    }
}

/// A query restricted by an equality filter.
#[derive(Debug, Clone)]
pub struct FilteredQuery {
    query: Query,
    conditions: BTreeMap<String, Value>,
}

impl FilteredQuery {
    /// The underlying query.
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Normalized filter conditions by field.
    pub fn conditions(&self) -> &BTreeMap<String, Value> {
        &self.conditions
    }

    /// Returns true if `record` is valid and equals every condition.
    pub fn matches(&self, record: &Value) -> bool {
        self.query
            .schema
            .safe_validate(record)
            .is_ok_and(|validated| self.matches_validated(&validated))
    }

    fn matches_validated(&self, validated: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(name, expected)| validated.get(name).is_some_and(|v| same_value(v, expected)))
    }

    /// Projects `record` if it matches, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if `record` does not match the schema.
    pub fn extract_shape(&self, record: &Value) -> CoreResult<Option<Value>> {
        let validated = self
            .query
            .schema
            .safe_validate(record)
            .map_err(|issues| CoreError::Validation { issues })?;
        if !self.matches_validated(&validated) {
            return Ok(None);
        }
        Ok(Some(project(&validated, &self.query.shape)))
    }
}

/// Equality where integers and floats compare by numeric value.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Integer(i), Value::Float(f)) | (Value::Float(f), Value::Integer(i)) => {
            *i as f64 == *f
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tessera_schema::FieldType;

    fn user() -> ObjectSchema {
        ObjectSchema::new()
            .field("id", FieldType::String)
            .optional("name", FieldType::String)
            .field("email", FieldType::String)
            .optional("age", FieldType::Integer)
    }

    fn record(id: &str, email: &str) -> Value {
        Value::object([("id", id), ("email", email)])
    }

    #[test]
    fn construction_checks_shape() {
        assert!(Query::new(user(), Shape::new().include("nope")).is_err());
        let query = Query::new(user(), Shape::new().include("email")).unwrap();
        assert_eq!(query.projected_schema().len(), 1);
    }

    #[test]
    fn extract_shape_selects_email() {
        let query = Query::new(user(), Shape::new().include("email")).unwrap();
        let raw = Value::object([("id", "1"), ("name", "x"), ("email", "a@b.com")]);
        assert_eq!(
            query.extract_shape(&raw).unwrap(),
            Value::object([("email", "a@b.com")])
        );
    }

    #[test]
    fn extract_as_typed() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Contact {
            email: String,
            name: Option<String>,
        }

        let query = Query::new(user(), Shape::new().include("email").include("name")).unwrap();
        let contact: Contact = query.extract_as(&record("1", "a@b.com")).unwrap();
        assert_eq!(
            contact,
            Contact {
                email: "a@b.com".into(),
                name: None
            }
        );

        let wrong: CoreResult<u32> = query.extract_as(&record("1", "a@b.com"));
        assert!(matches!(wrong, Err(CoreError::Deserialize { .. })));
    }

    #[test]
    fn filter_rejects_unknown_and_mistyped_fields() {
        let query = Query::new(user(), Shape::new().include("email")).unwrap();
        assert!(matches!(
            query.filter(&Value::object([("nope", 1)])),
            Err(CoreError::UnknownField { .. })
        ));
        assert!(matches!(
            query.filter(&Value::object([("age", "old")])),
            Err(CoreError::InvalidFilter { .. })
        ));
        assert!(matches!(
            query.filter(&Value::object([("name", Value::Null)])),
            Err(CoreError::InvalidFilter { .. })
        ));
        assert!(query.filter(&Value::from(3)).is_err());
    }

    #[test]
    fn filter_matches_in_hand_records() {
        let query = Query::new(user(), Shape::new().include("email")).unwrap();
        let filtered = query
            .filter(&Value::object([("email", Value::from("a@b.com")), ("age", Value::from(30.0))]))
            .unwrap();
        assert_eq!(filtered.conditions()["age"], Value::Integer(30));

        let mut hit = record("1", "a@b.com");
        hit.insert("age", 30);
        let miss = record("2", "a@b.com");

        assert!(filtered.matches(&hit));
        assert!(!filtered.matches(&miss));
        assert_eq!(
            filtered.extract_shape(&hit).unwrap(),
            Some(Value::object([("email", "a@b.com")]))
        );
        assert_eq!(filtered.extract_shape(&miss).unwrap(), None);
    }

    #[test]
    fn filtered_extract_matches_the_normalized_record() {
        let query = Query::new(user(), Shape::new().include("age")).unwrap();
        let filtered = query.filter(&Value::object([("age", 30)])).unwrap();

        let mut hit = record("1", "a@b.com");
        hit.insert("age", 30.0);
        assert_eq!(
            filtered.extract_shape(&hit).unwrap(),
            Some(Value::object([("age", 30)]))
        );
        assert!(matches!(
            filtered.extract_shape(&Value::object([("age", 30)])),
            Err(CoreError::Validation { .. })
        ));
    }

    #[test]
    fn empty_filter_matches_every_valid_record() {
        let query = Query::new(user(), Shape::new()).unwrap();
        let filtered = query.filter(&Value::empty_object()).unwrap();
        assert!(filtered.matches(&record("1", "a@b.com")));
        assert!(!filtered.matches(&Value::object([("id", "1")])));
    }
}
