//! Error types for translation.
//!
//! ```text
//! CompilationError
//! ├── SemanticGap                - the oracle is missing a fact we need
//! ├── UnsupportedConstruct       - a construct with no lowering
//! ├── ImportFailure              - an import could not be resolved
//! └── InternalInvariantViolation - the translator broke its own contract
//! ```
//!
//! The first two are fatal to one function only: the package assembler
//! records them and keeps translating sibling declarations. The last two
//! abort the whole unit.

use thiserror::Error;

use crate::span::Span;

/// Errors raised while translating a package.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompilationError {
    /// A construct arrived without the type or object information it needs.
    #[error("at {span}: missing semantic information for {what}")]
    SemanticGap { what: String, span: Span },

    /// A construct the translator has no lowering for.
    #[error("at {span}: unsupported construct: {construct}")]
    UnsupportedConstruct { construct: String, span: Span },

    /// An import could not be resolved.
    #[error("could not import \"{path}\": {reason}")]
    ImportFailure { path: String, reason: String },

    /// The translator reached a state its own bookkeeping rules out.
    #[error("internal error: {message}")]
    InternalInvariantViolation { message: String },
}

impl CompilationError {
    pub fn semantic_gap(what: impl Into<String>, span: Span) -> Self {
        CompilationError::SemanticGap {
            what: what.into(),
            span,
        }
    }

    pub fn unsupported(construct: impl Into<String>, span: Span) -> Self {
        CompilationError::UnsupportedConstruct {
            construct: construct.into(),
            span,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        CompilationError::InternalInvariantViolation {
            message: message.into(),
        }
    }

    /// Errors that only fail the function being translated.
    pub fn is_function_level(&self) -> bool {
        matches!(
            self,
            CompilationError::SemanticGap { .. } | CompilationError::UnsupportedConstruct { .. }
        )
    }

    /// Source position, when the error has one.
    pub fn span(&self) -> Option<Span> {
        match self {
            CompilationError::SemanticGap { span, .. }
            | CompilationError::UnsupportedConstruct { span, .. } => Some(*span),
            CompilationError::ImportFailure { .. }
            | CompilationError::InternalInvariantViolation { .. } => None,
        }
    }
}

/// Result alias for translation.
pub type Result<T> = std::result::Result<T, CompilationError>;

/// Function-level errors collected while a unit keeps translating.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    errors: Vec<CompilationError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: CompilationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[CompilationError] {
        &self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompilationError> {
        self.errors.iter()
    }

    pub fn into_vec(self) -> Vec<CompilationError> {
        self.errors
    }
}

impl IntoIterator for Diagnostics {
    type Item = CompilationError;
    type IntoIter = std::vec::IntoIter<CompilationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let err = CompilationError::unsupported("goto statement", Span::new(4, 2, 4));
        assert_eq!(err.to_string(), "at 4:2: unsupported construct: goto statement");

        let err = CompilationError::semantic_gap("type of expression", Span::default());
        assert_eq!(
            err.to_string(),
            "at <unknown>: missing semantic information for type of expression"
        );
    }

    #[test]
    fn function_level_classification() {
        assert!(CompilationError::semantic_gap("x", Span::default()).is_function_level());
        assert!(CompilationError::unsupported("x", Span::default()).is_function_level());
        assert!(!CompilationError::internal("x").is_function_level());
        let import = CompilationError::ImportFailure {
            path: "fmt".into(),
            reason: "not found".into(),
        };
        assert!(!import.is_function_level());
        assert_eq!(import.span(), None);
    }

    #[test]
    fn diagnostics_keep_order() {
        let mut diags = Diagnostics::new();
        diags.push(CompilationError::unsupported("a", Span::point(1, 1)));
        diags.push(CompilationError::unsupported("b", Span::point(2, 1)));
        assert_eq!(diags.len(), 2);
        let spans: Vec<_> = diags.iter().filter_map(|e| e.span()).collect();
        assert_eq!(spans, vec![Span::point(1, 1), Span::point(2, 1)]);
    }
}
