//! Object schemas.

use crate::field::{Field, FieldType};
use crate::issue::{Issue, IssueKind, Issues};
use crate::path::FieldPath;
use std::collections::BTreeMap;
use tessera_codec::Value;

/// Schema for an object: named fields plus a policy for undeclared keys.
///
/// Built with a fluent builder:
///
/// ```
/// use tessera_schema::{FieldType, ObjectSchema};
///
/// let user = ObjectSchema::new()
///     .field("id", FieldType::String)
///     .optional("name", FieldType::String)
///     .field("email", FieldType::String);
/// assert_eq!(user.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    fields: BTreeMap<String, Field>,
    strict: bool,
}

impl ObjectSchema {
    /// Creates an empty schema that strips undeclared keys.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.with(name, Field::required(ty))
    }

    /// Adds an optional field.
    #[must_use]
    pub fn optional(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.with(name, Field::optional(ty))
    }

    /// Adds a field, replacing any field of the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }

    /// Rejects undeclared keys instead of stripping them.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    /// Returns true if undeclared keys are rejected.
    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Looks up a top-level field.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    /// Returns true if a top-level field is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Resolves a dotted path through nested object fields.
    pub fn resolve(&self, path: &FieldPath) -> Option<&Field> {
        let (last, parents) = path.segments().split_last()?;
        let mut schema = self;
        for segment in parents {
            schema = schema.get(segment)?.ty().as_object()?;
        }
        schema.get(last)
    }

    /// Declared fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    /// Declared field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Validates `value` and returns its normalized form.
    ///
    /// Normalization strips undeclared keys (for non-strict schemas) and
    /// turns integral floats into integers for integer fields. Absent
    /// optional fields stay absent; `null` is never accepted in place of a
    /// value. Validation has no side effects and is deterministic.
    ///
    /// # Errors
    ///
    /// Returns every issue found; nothing is returned partially.
    pub fn safe_validate(&self, value: &Value) -> Result<Value, Issues> {
        let mut issues = Issues::default();
        match self.check(value, &FieldPath::root(), &mut issues) {
            Some(normalized) if issues.is_empty() => Ok(normalized),
            _ => Err(issues),
        }
    }

    /// Returns true if `value` validates.
    pub fn is_valid(&self, value: &Value) -> bool {
        self.safe_validate(value).is_ok()
    }

    pub(crate) fn check(&self, value: &Value, path: &FieldPath, issues: &mut Issues) -> Option<Value> {
        let Some(input) = value.as_object() else {
            issues.push(Issue::new(
                path.clone(),
                IssueKind::TypeMismatch {
                    expected: "object",
                    found: value.kind_name(),
                },
            ));
            return None;
        };

        let before = issues.len();
        let mut out = BTreeMap::new();
        for (name, field) in &self.fields {
            let child = path.child(name.as_str());
            match input.get(name) {
                None if field.is_optional() => {}
                None => issues.push(Issue::new(child, IssueKind::Missing)),
                Some(raw) => {
                    if let Some(normalized) = field.ty().check(raw, &child, issues) {
                        out.insert(name.clone(), normalized);
                    }
                }
            }
        }
        if self.strict {
            for name in input.keys().filter(|k| !self.fields.contains_key(*k)) {
                issues.push(Issue::new(path.child(name.as_str()), IssueKind::UnknownField));
            }
        }

        (issues.len() == before).then_some(Value::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ObjectSchema {
        ObjectSchema::new()
            .field("id", FieldType::String)
            .optional("name", FieldType::String)
            .field("email", FieldType::String)
            .optional(
                "meta",
                FieldType::Object(
                    ObjectSchema::new()
                        .field("createdAt", FieldType::String)
                        .field("updatedAt", FieldType::String),
                ),
            )
    }

    #[test]
    fn minimal_record_validates() {
        let value = Value::object([("id", "1"), ("email", "a@b.com")]);
        assert_eq!(user().safe_validate(&value), Ok(value));
    }

    #[test]
    fn missing_required_field_reported_by_path() {
        let value = Value::object([("email", "a@b.com")]);
        let issues = user().safe_validate(&value).unwrap_err();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues.at("id").unwrap().kind, IssueKind::Missing);
    }

    #[test]
    fn optional_null_is_rejected() {
        let value = Value::object([
            ("id", Value::from("1")),
            ("email", Value::from("a@b.com")),
            ("name", Value::Null),
        ]);
        let issues = user().safe_validate(&value).unwrap_err();
        assert!(matches!(
            issues.at("name").unwrap().kind,
            IssueKind::TypeMismatch { found: "null", .. }
        ));
    }

    #[test]
    fn unknown_keys_are_stripped() {
        let value = Value::object([("id", "1"), ("email", "a@b.com"), ("extra", "x")]);
        let normalized = user().safe_validate(&value).unwrap();
        assert!(normalized.get("extra").is_none());
        assert_eq!(normalized.get("id"), Some(&Value::from("1")));
    }

    #[test]
    fn strict_schema_rejects_unknown_keys() {
        let value = Value::object([("id", "1"), ("email", "a@b.com"), ("extra", "x")]);
        let issues = user().strict().safe_validate(&value).unwrap_err();
        assert_eq!(issues.at("extra").unwrap().kind, IssueKind::UnknownField);
    }

    #[test]
    fn nested_issues_carry_full_path() {
        let value = Value::object([
            ("id", Value::from("1")),
            ("email", Value::from("a@b.com")),
            ("meta", Value::object([("createdAt", Value::from(5))])),
        ]);
        let issues = user().safe_validate(&value).unwrap_err();
        assert_eq!(issues.len(), 2);
        assert!(issues.at("meta.createdAt").is_some());
        assert_eq!(issues.at("meta.updatedAt").unwrap().kind, IssueKind::Missing);
    }

    #[test]
    fn non_object_root_rejected() {
        let issues = user().safe_validate(&Value::from("nope")).unwrap_err();
        assert_eq!(issues.to_string(), "(root): expected object, found string");
    }

    #[test]
    fn resolve_nested_path() {
        let schema = user();
        let path = FieldPath::parse("meta.createdAt").unwrap();
        assert_eq!(schema.resolve(&path).unwrap().ty(), &FieldType::String);
        assert!(schema.resolve(&FieldPath::parse("id.x").unwrap()).is_none());
        assert!(schema.resolve(&FieldPath::parse("missing").unwrap()).is_none());
    }
}
