//! Error types for schema compilation and data operations.

use thiserror::Error;

use crate::base::Position;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by parsers, the schema compiler, the type engine and the
/// data validator.
///
/// Every variant carries a human-readable message; where available, a source
/// position (module text) or a data/schema path is attached so callers can
/// point at the offending node.
#[derive(Debug, Error)]
pub enum Error {
    /// Unexpected end of input.
    #[error("unexpected end of input: {message}")]
    InputExhausted { message: String, pos: Option<Position> },

    /// Malformed module or instance text.
    #[error("syntax error: {message}")]
    Syntax { message: String, pos: Option<Position> },

    /// A value does not conform to its type.
    #[error("invalid value: {message}")]
    InvalidValue { message: String, path: Option<String> },

    /// A referenced module, node, typedef, identity or instance is missing.
    #[error("not found: {message}")]
    NotFound { message: String, path: Option<String> },

    /// Duplicate module, node name, list key tuple or leaf-list value.
    #[error("duplicate: {message}")]
    Duplicate { message: String, path: Option<String> },

    /// A when/must/unique/mandatory/cardinality constraint failed.
    #[error("constraint violated: {message}")]
    Constraint {
        message: String,
        path: Option<String>,
        /// `error-app-tag` from the schema, when supplied.
        app_tag: Option<String>,
    },

    /// A value's type does not match what the schema requires.
    #[error("type mismatch: {message}")]
    TypeMismatch { message: String, path: Option<String> },

    /// Schema-level rule violation (bad augment target, config conflict...).
    #[error("semantic error: {message}")]
    Semantic { message: String, pos: Option<Position> },

    /// A union value matched none of its member types.
    #[error("invalid union value: {message}")]
    UnionNoMatch {
        message: String,
        path: Option<String>,
        /// Per-member store failures, in member declaration order.
        causes: Vec<Error>,
    },

    /// Valid YANG that this implementation does not support.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Internal invariant violation. Always a bug.
    #[error("internal error: {0}")]
    Internal(String),

    /// IO error while reading a module from a search directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Error::Syntax { message: format!("XML error: {e}"), pos: None }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Syntax { message: format!("JSON error: {e}"), pos: None }
    }
}

impl Error {
    /// Create a syntax error without a position.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax { message: message.into(), pos: None }
    }

    /// Create a syntax error at a position.
    pub fn syntax_at(message: impl Into<String>, pos: Position) -> Self {
        Self::Syntax { message: message.into(), pos: Some(pos) }
    }

    /// Create an invalid-value error.
    pub fn value(message: impl Into<String>) -> Self {
        Self::InvalidValue { message: message.into(), path: None }
    }

    /// Create a reference-not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into(), path: None }
    }

    /// Create a duplicate error.
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::Duplicate { message: message.into(), path: None }
    }

    /// Create a constraint-violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint { message: message.into(), path: None, app_tag: None }
    }

    /// Create a semantic error without a position.
    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic { message: message.into(), pos: None }
    }

    /// Create a semantic error at a position.
    pub fn semantic_at(message: impl Into<String>, pos: Position) -> Self {
        Self::Semantic { message: message.into(), pos: Some(pos) }
    }

    /// Attach a data/schema path to errors that can carry one.
    pub fn with_path(mut self, p: impl Into<String>) -> Self {
        match &mut self {
            Error::InvalidValue { path, .. }
            | Error::NotFound { path, .. }
            | Error::Duplicate { path, .. }
            | Error::Constraint { path, .. }
            | Error::TypeMismatch { path, .. }
            | Error::UnionNoMatch { path, .. } => *path = Some(p.into()),
            _ => {}
        }
        self
    }

    /// The data/schema path attached to this error, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Error::InvalidValue { path, .. }
            | Error::NotFound { path, .. }
            | Error::Duplicate { path, .. }
            | Error::Constraint { path, .. }
            | Error::TypeMismatch { path, .. }
            | Error::UnionNoMatch { path, .. } => path.as_deref(),
            _ => None,
        }
    }

    /// The source position attached to this error, if any.
    pub fn position(&self) -> Option<Position> {
        match self {
            Error::InputExhausted { pos, .. }
            | Error::Syntax { pos, .. }
            | Error::Semantic { pos, .. } => *pos,
            _ => None,
        }
    }
}

/// Accumulator for collect-all validation.
///
/// In strict mode the validator returns the first error; in collect-all mode
/// it pushes every violation here and the caller inspects the batch.
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<Error>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: Error) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    /// First collected error, consuming the batch. `Ok(())` when empty.
    pub fn into_result(mut self) -> Result<()> {
        if self.errors.is_empty() { Ok(()) } else { Err(self.errors.remove(0)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::constraint("must condition false").with_path("/c/l2");
        assert_eq!(err.to_string(), "constraint violated: must condition false");
        assert_eq!(err.path(), Some("/c/l2"));
    }

    #[test]
    fn test_union_causes() {
        let err = Error::UnionNoMatch {
            message: "no member type matched \"x\"".into(),
            path: None,
            causes: vec![Error::value("not an int8"), Error::value("pattern mismatch")],
        };
        match err {
            Error::UnionNoMatch { causes, .. } => assert_eq!(causes.len(), 2),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_diagnostics_collects() {
        let mut diag = Diagnostics::new();
        assert!(diag.is_empty());
        diag.push(Error::duplicate("list entry"));
        diag.push(Error::constraint("unique"));
        assert_eq!(diag.len(), 2);
        assert!(diag.into_result().is_err());
    }
}
