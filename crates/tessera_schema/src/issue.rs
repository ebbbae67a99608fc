//! Structured validation failures.

use crate::path::FieldPath;
use std::fmt;

/// What went wrong at one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// A required field is absent.
    Missing,
    /// The value has the wrong kind.
    TypeMismatch {
        /// Kind the schema declares.
        expected: &'static str,
        /// Kind that was found.
        found: &'static str,
    },
    /// A number is NaN or infinite.
    NotFinite,
    /// A key is not declared by a strict schema.
    UnknownField,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Missing => f.write_str("required field is missing"),
            IssueKind::TypeMismatch { expected, found } => {
                write!(f, "expected {expected}, found {found}")
            }
            IssueKind::NotFinite => f.write_str("number is not finite"),
            IssueKind::UnknownField => f.write_str("field is not declared"),
        }
    }
}

/// One validation failure at one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Where the failure occurred.
    pub path: FieldPath,
    /// What the failure is.
    pub kind: IssueKind,
}

impl Issue {
    /// Creates an issue.
    #[must_use]
    pub fn new(path: FieldPath, kind: IssueKind) -> Self {
        Self { path, kind }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

/// Every failure found while validating one value.
///
/// Never empty when returned from validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Issues(Vec<Issue>);

impl Issues {
    /// Wraps a list of issues.
    #[must_use]
    pub fn new(issues: Vec<Issue>) -> Self {
        Self(issues)
    }

    /// The individual issues, in discovery order.
    pub fn iter(&self) -> std::slice::Iter<'_, Issue> {
        self.0.iter()
    }

    /// Number of issues.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no issues.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the issue reported for `path`, if any.
    pub fn at(&self, path: &str) -> Option<&Issue> {
        self.0.iter().find(|issue| issue.path.to_string() == path)
    }

    pub(crate) fn push(&mut self, issue: Issue) {
        self.0.push(issue);
    }
}

impl fmt::Display for Issues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, issue) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Issues {}

impl<'a> IntoIterator for &'a Issues {
    type Item = &'a Issue;
    type IntoIter = std::slice::Iter<'a, Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl IntoIterator for Issues {
    type Item = Issue;
    type IntoIter = std::vec::IntoIter<Issue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
