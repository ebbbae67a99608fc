//! Selection shapes.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use tessera_schema::{Field, FieldPath, FieldType, ObjectSchema};

/// What a shape says about one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Include (`true`) or exclude (`false`) the whole field.
    Include(bool),
    /// Include the object field, keeping only the nested selection.
    Nested(Shape),
}

impl Selection {
    /// Returns true unless the field is explicitly excluded.
    pub fn is_selected(&self) -> bool {
        match self {
            Selection::Include(flag) => *flag,
            Selection::Nested(_) => true,
        }
    }
}

/// A recursive selection of fields from a record.
///
/// Fields not named in the shape are left out of the projection.
///
/// ```
/// use tessera_core::Shape;
///
/// let shape = Shape::new()
///     .include("email")
///     .nest("meta", Shape::new().include("createdAt"));
/// assert_eq!(shape.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Shape {
    fields: BTreeMap<String, Selection>,
}

impl Shape {
    /// Creates an empty shape.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Includes a field whole.
    #[must_use]
    pub fn include(self, field: impl Into<String>) -> Self {
        self.with(field, Selection::Include(true))
    }

    /// Marks a field excluded. Same as leaving it out.
    #[must_use]
    pub fn exclude(self, field: impl Into<String>) -> Self {
        self.with(field, Selection::Include(false))
    }

    /// Selects part of an object field.
    #[must_use]
    pub fn nest(self, field: impl Into<String>, shape: Shape) -> Self {
        self.with(field, Selection::Nested(shape))
    }

    /// Sets the selection for a field.
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, selection: Selection) -> Self {
        self.fields.insert(field.into(), selection);
        self
    }

    /// Selection for a field, if named.
    pub fn get(&self, field: &str) -> Option<&Selection> {
        self.fields.get(field)
    }

    /// Named fields and their selections.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Selection)> {
        self.fields.iter().map(|(name, sel)| (name.as_str(), sel))
    }

    /// Number of named fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is named.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks that every named field exists in `schema` and that nested
    /// selections only target object fields.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` or `ShapeMismatch` with the dotted path.
    pub fn check(&self, schema: &ObjectSchema) -> CoreResult<()> {
        self.check_at(schema, &FieldPath::root())
    }

    fn check_at(&self, schema: &ObjectSchema, at: &FieldPath) -> CoreResult<()> {
        for (name, selection) in &self.fields {
            let path = at.child(name.as_str());
            let field = schema
                .get(name)
                .ok_or_else(|| CoreError::unknown_field(path.to_string()))?;
            if let Selection::Nested(inner) = selection {
                let nested = field.ty().as_object().ok_or_else(|| CoreError::ShapeMismatch {
                    field: path.to_string(),
                })?;
                inner.check_at(nested, &path)?;
            }
        }
        Ok(())
    }

    /// Computes the schema of projections of `schema` through this shape.
    ///
    /// Included fields keep their type and optionality; nested selections
    /// narrow the nested object schema.
    ///
    /// # Errors
    ///
    /// As [`check`](Self::check).
    pub fn project_schema(&self, schema: &ObjectSchema) -> CoreResult<ObjectSchema> {
        self.check(schema)?;
        Ok(self.project_checked(schema))
    }

    fn project_checked(&self, schema: &ObjectSchema) -> ObjectSchema {
        let mut projected = if schema.is_strict() {
            ObjectSchema::new().strict()
        } else {
            ObjectSchema::new()
        };
        for (name, selection) in &self.fields {
            let Some(field) = schema.get(name) else {
                continue;
            };
            match selection {
                Selection::Include(false) => {}
                Selection::Include(true) => projected = projected.with(name.as_str(), field.clone()),
                Selection::Nested(inner) => {
                    if let Some(nested) = field.ty().as_object() {
                        let ty = FieldType::Object(inner.project_checked(nested));
                        let narrowed = if field.is_optional() {
                            Field::optional(ty)
                        } else {
                            Field::required(ty)
                        };
                        projected = projected.with(name.as_str(), narrowed);
                    }
                }
            }
        }
        projected
    }
}

impl TryFrom<serde_json::Value> for Shape {
    type Error = CoreError;

    /// Reads a shape written as JSON: `{"email": true, "meta": {"createdAt": true}}`.
    fn try_from(value: serde_json::Value) -> CoreResult<Self> {
        let serde_json::Value::Object(map) = value else {
            return Err(CoreError::invalid_declaration("a shape must be a JSON object"));
        };
        let mut shape = Shape::new();
        for (name, entry) in map {
            let selection = match entry {
                serde_json::Value::Bool(flag) => Selection::Include(flag),
                nested @ serde_json::Value::Object(_) => Selection::Nested(Shape::try_from(nested)?),
                other => {
                    return Err(CoreError::invalid_declaration(format!(
                        "selection for '{name}' must be a boolean or an object, found {other}"
                    )))
                }
            };
            shape = shape.with(name, selection);
        }
        Ok(shape)
    }
}
