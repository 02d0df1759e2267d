use thiserror::Error;

use crate::ast::Location;

/// Result type for weavec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the weavec compiler
///
/// The first error aborts compilation of the unit; no partial instruction
/// stream is ever returned to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed token sequence (unexpected token or end of input)
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    /// Semantic failure: unresolved name, illegal cast, no matching overload,
    /// illegal meta-variable usage, bad l-value, inaccessible member
    #[error("compile error at line {line}, column {column}: {message}")]
    Compile {
        line: usize,
        column: usize,
        message: String,
    },

    /// Programming error inside the compiler (e.g. a node reached the code
    /// generator without a type annotation)
    #[error("internal compiler error: {message}")]
    Internal { message: String },
}

impl Error {
    /// Create a syntax error at a source location
    pub fn syntax(loc: Location, message: impl Into<String>) -> Self {
        Self::Syntax {
            line: loc.line,
            column: loc.column,
            message: message.into(),
        }
    }

    /// Create a compile error at a source location
    pub fn compile(loc: Location, message: impl Into<String>) -> Self {
        Self::Compile {
            line: loc.line,
            column: loc.column,
            message: message.into(),
        }
    }

    /// Create an internal compiler error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Line number the error points at, if it carries a position
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Syntax { line, .. } | Self::Compile { line, .. } => Some(*line),
            Self::Internal { .. } => None,
        }
    }
}
