//! Unified error types for verileak.
//!
//! Library code uses `Error` and `Result<T>`.
//! Binary code (`main.rs`) uses `anyhow` for ergonomic CLI error handling.

use std::path::PathBuf;
use thiserror::Error as ThisError;

/// Unified error type for verileak library operations.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Failed to parse Verilog source code.
    #[error("{}:{line}:{col}: parse error: {message}", path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// 1-based line of the offending token.
        line: usize,
        /// 1-based column of the offending token.
        col: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Malformed query or bad driver input.
    #[error("usage error: {0}")]
    Usage(String),

    /// Query names a module the design does not contain.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// Query names an identifier the module never mentions.
    #[error("unknown identifier: {module}.{id}")]
    UnknownId {
        /// Module the query named.
        module: String,
        /// Identifier the query named.
        id: String,
    },

    /// A model invariant was violated.
    ///
    /// These indicate either a bug or a corner of the language the analyzer
    /// does not yet cover; they are never silently approximated.
    #[error("invariant violation: {0}")]
    Invariant(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Batch specification parse error.
    #[error("failed to parse batch spec: {0}")]
    BatchSpec(#[from] serde_json::Error),
}

impl Error {
    /// Create a parse error.
    pub fn parse(
        path: impl Into<PathBuf>,
        line: usize,
        col: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            col,
            message: message.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }

    /// Create an invariant-violation error.
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }
}

/// Result type alias for verileak library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::parse("top.v", 3, 7, "unexpected token");
        assert_eq!(err.to_string(), "top.v:3:7: parse error: unexpected token");

        let err = Error::UnknownModule("cpu".into());
        assert_eq!(err.to_string(), "unknown module: cpu");

        let err = Error::UnknownId {
            module: "cpu".into(),
            id: "q".into(),
        };
        assert_eq!(err.to_string(), "unknown identifier: cpu.q");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
