//! Field types and their validation.

use crate::issue::{Issue, IssueKind, Issues};
use crate::object::ObjectSchema;
use crate::path::FieldPath;
use tessera_codec::Value;

/// Largest float magnitude accepted as an integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// The declared type of a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldType {
    /// UTF-8 text.
    String,
    /// Whole number. Integral floats are normalized to integers.
    Integer,
    /// Any finite number.
    Number,
    /// `true` or `false`.
    Boolean,
    /// Nested object with its own schema.
    Object(ObjectSchema),
    /// Homogeneous array.
    Array(Box<FieldType>),
}

impl FieldType {
    /// Array of `item`.
    #[must_use]
    pub fn array(item: FieldType) -> Self {
        FieldType::Array(Box::new(item))
    }

    /// Name used in validation messages.
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Object(_) => "object",
            FieldType::Array(_) => "array",
        }
    }

    /// Returns true for text, number and boolean fields.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::Integer | FieldType::Number | FieldType::Boolean
        )
    }

    /// Returns true if every valid value of this type converts to a key.
    ///
    /// `Number` is excluded: a fractional value validates but has no key.
    pub fn is_key_compatible(&self) -> bool {
        matches!(self, FieldType::String | FieldType::Integer)
    }

    /// Nested schema of an object field.
    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match self {
            FieldType::Object(schema) => Some(schema),
            _ => None,
        }
    }

    /// Validates a single value against this type, treating it as required.
    ///
    /// `null` is always rejected.
    ///
    /// # Errors
    ///
    /// Returns every issue found.
    pub fn validate(&self, value: &Value) -> Result<Value, Issues> {
        let mut issues = Issues::default();
        match self.check(value, &FieldPath::root(), &mut issues) {
            Some(normalized) if issues.is_empty() => Ok(normalized),
            _ => Err(issues),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn check(&self, value: &Value, path: &FieldPath, issues: &mut Issues) -> Option<Value> {
        match (self, value) {
            (FieldType::String, Value::Text(_)) | (FieldType::Boolean, Value::Bool(_)) => {
                Some(value.clone())
            }
            (FieldType::Integer | FieldType::Number, Value::Integer(_)) => Some(value.clone()),
            (FieldType::Number, Value::Float(f)) if f.is_finite() => Some(value.clone()),
            (FieldType::Integer, Value::Float(f))
                if f.fract() == 0.0 && f.abs() <= MAX_SAFE_INTEGER =>
            {
                Some(Value::Integer(*f as i64))
            }
            (FieldType::Integer | FieldType::Number, Value::Float(f)) if !f.is_finite() => {
                issues.push(Issue::new(path.clone(), IssueKind::NotFinite));
                None
            }
            (FieldType::Object(schema), Value::Object(_)) => schema.check(value, path, issues),
            (FieldType::Array(item), Value::Array(items)) => {
                let mut out = Vec::with_capacity(items.len());
                let mut ok = true;
                for (i, element) in items.iter().enumerate() {
                    match item.check(element, &path.child(i.to_string()), issues) {
                        Some(normalized) => out.push(normalized),
                        None => ok = false,
                    }
                }
                ok.then_some(Value::Array(out))
            }
            _ => {
                issues.push(Issue::new(
                    path.clone(),
                    IssueKind::TypeMismatch {
                        expected: self.name(),
                        found: value.kind_name(),
                    },
                ));
                None
            }
        }
    }
}

/// A declared field: its type and whether it may be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    ty: FieldType,
    optional: bool,
}

impl Field {
    /// A field that must be present.
    #[must_use]
    pub fn required(ty: FieldType) -> Self {
        Self {
            ty,
            optional: false,
        }
    }

    /// A field that may be absent.
    #[must_use]
    pub fn optional(ty: FieldType) -> Self {
        Self { ty, optional: true }
    }

    /// The declared type.
    pub fn ty(&self) -> &FieldType {
        &self.ty
    }

    /// Returns true if the field may be absent.
    pub fn is_optional(&self) -> bool {
        self.optional
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_accepts_integral_float() {
        assert_eq!(
            FieldType::Integer.validate(&Value::Float(3.0)),
            Ok(Value::Integer(3))
        );
        assert!(FieldType::Integer.validate(&Value::Float(3.5)).is_err());
    }

    #[test]
    fn number_accepts_both_representations() {
        assert_eq!(
            FieldType::Number.validate(&Value::Integer(2)),
            Ok(Value::Integer(2))
        );
        assert_eq!(
            FieldType::Number.validate(&Value::Float(2.5)),
            Ok(Value::Float(2.5))
        );
    }

    #[test]
    fn non_finite_numbers_rejected() {
        let issues = FieldType::Number
            .validate(&Value::Float(f64::INFINITY))
            .unwrap_err();
        assert_eq!(issues.iter().next().unwrap().kind, IssueKind::NotFinite);
    }

    #[test]
    fn null_is_a_type_mismatch() {
        let issues = FieldType::String.validate(&Value::Null).unwrap_err();
        assert_eq!(
            issues.iter().next().unwrap().kind,
            IssueKind::TypeMismatch {
                expected: "string",
                found: "null"
            }
        );
    }

    #[test]
    fn array_reports_each_bad_element() {
        let value = Value::from(vec![Value::from("a"), Value::from(1), Value::from(false)]);
        let issues = FieldType::array(FieldType::String)
            .validate(&value)
            .unwrap_err();
        assert_eq!(issues.len(), 2);
        assert!(issues.at("1").is_some());
        assert!(issues.at("2").is_some());
    }

    #[test]
    fn key_compatibility() {
        assert!(FieldType::String.is_key_compatible());
        assert!(FieldType::Integer.is_key_compatible());
        assert!(!FieldType::Number.is_key_compatible());
        assert!(!FieldType::Boolean.is_key_compatible());
        assert!(!FieldType::array(FieldType::String).is_key_compatible());
    }
}
