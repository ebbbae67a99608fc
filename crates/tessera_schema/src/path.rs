//! Dotted field paths.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors produced when parsing a field path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path was empty.
    #[error("field path is empty")]
    Empty,

    /// The path contained an empty segment (`a..b`, `.a`, `a.`).
    #[error("field path '{path}' has an empty segment")]
    EmptySegment {
        /// The offending path.
        path: String,
    },
}

/// A path into nested object fields, written `meta.createdAt`.
///
/// The empty path addresses the record itself and only appears in
/// validation issues.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// The path of the record itself.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a dotted path.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty path or an empty segment.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PathError::EmptySegment {
                path: path.to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// Builds a path from already split segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// The path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The first segment, if any.
    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    /// Returns true for the root path.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Returns true for the root path.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("(root)");
        }
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_nested() {
        let path = FieldPath::parse("meta.createdAt").unwrap();
        assert_eq!(path.segments(), ["meta", "createdAt"]);
        assert_eq!(path.to_string(), "meta.createdAt");
        assert_eq!(path.first(), Some("meta"));
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert_eq!(FieldPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            FieldPath::parse("a..b"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(FieldPath::parse(".a").is_err());
        assert!(FieldPath::parse("a.").is_err());
    }

    #[test]
    fn child_extends_without_mutating() {
        let parent = FieldPath::parse("tags").unwrap();
        let child = parent.child("0");
        assert_eq!(parent.len(), 1);
        assert_eq!(child.to_string(), "tags.0");
    }

    #[test]
    fn root_display() {
        assert_eq!(FieldPath::root().to_string(), "(root)");
        assert!(FieldPath::root().is_root());
    }
}
