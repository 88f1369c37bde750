//! Error types for every translation phase.
//!
//! Each phase has its own error so callers can tell a lexing problem from a
//! resolution problem; [`TranslateError`] wraps them all for the driver.

use serde::Serialize;
use std::fmt;

/// Source position attached to diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Coord {
    pub file: String,
    pub line: usize,
    pub column: Option<usize>,
}

impl Coord {
    pub fn new(file: impl Into<String>, line: usize, column: Option<usize>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, line {}", self.file, self.line)?;
        if let Some(column) = self.column {
            write!(f, ", column {}", column)?;
        }
        Ok(())
    }
}

/// An unrecognised character in the source text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}, column {column}: {message}")]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// The token stream could not be reduced by the grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{coord}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub coord: Coord,
}

/// A model mutation that violates the target language's structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{coord}: {message}")]
pub struct StructuralError {
    pub message: String,
    pub coord: Coord,
}

/// A scoped name that does not exist in the module forest.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{coord}: unresolved name `{name}` (no `{segment}` in scope)")]
pub struct UnresolvedNameError {
    pub name: String,
    pub segment: String,
    pub coord: Coord,
}

/// Misuse of the scope stack.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    #[error("`{name}` redeclared as a {now} in the same scope (was a {was})")]
    Redeclaration {
        name: String,
        was: &'static str,
        now: &'static str,
    },

    #[error("internal error: scope stack underflow")]
    Underflow,
}

/// A malformed preprocessor directive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{coord}: {message}")]
pub struct PreprocessError {
    pub message: String,
    pub coord: Coord,
}

/// Any failure that aborts a translation run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("{file}, {source}")]
    Lex {
        file: String,
        #[source]
        source: LexError,
    },

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Unresolved(#[from] UnresolvedNameError),

    #[error(transparent)]
    Preprocess(#[from] PreprocessError),

    #[error("{coord}: {source}")]
    Scope {
        coord: Coord,
        #[source]
        source: ScopeError,
    },

    #[error("{coord}: unsupported construct: {kind}")]
    Unsupported { kind: String, coord: Coord },

    #[error("unknown module `{0}`")]
    UnknownModule(String),
}

impl TranslateError {
    /// Position of the failure, if it has one.
    pub fn coord(&self) -> Option<Coord> {
        match self {
            TranslateError::Lex { file, source } => {
                Some(Coord::new(file.clone(), source.line, Some(source.column)))
            }
            TranslateError::Syntax(e) => Some(e.coord.clone()),
            TranslateError::Structural(e) => Some(e.coord.clone()),
            TranslateError::Unresolved(e) => Some(e.coord.clone()),
            TranslateError::Preprocess(e) => Some(e.coord.clone()),
            TranslateError::Scope { coord, .. } => Some(coord.clone()),
            TranslateError::Unsupported { coord, .. } => Some(coord.clone()),
            TranslateError::UnknownModule(_) => None,
        }
    }

    pub(crate) fn unsupported(kind: impl Into<String>, coord: Coord) -> Self {
        TranslateError::Unsupported {
            kind: kind.into(),
            coord,
        }
    }
}

pub type Result<T, E = TranslateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coord_display_with_and_without_column() {
        assert_eq!(
            Coord::new("a.cpp", 3, Some(7)).to_string(),
            "a.cpp, line 3, column 7"
        );
        assert_eq!(Coord::new("a.cpp", 3, None).to_string(), "a.cpp, line 3");
    }

    #[test]
    fn lex_error_renders_as_diagnostic_line() {
        let err = TranslateError::Lex {
            file: "x.cpp".into(),
            source: LexError {
                message: "unexpected character '@'".into(),
                line: 2,
                column: 5,
            },
        };
        assert_eq!(
            err.to_string(),
            "x.cpp, line 2, column 5: unexpected character '@'"
        );
    }
}
