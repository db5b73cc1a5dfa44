//! Text persistence for PRVAG graphs.
//!
//! - [`TokenReader`] and [`write_tokens`] implement the whitespace-separated
//!   token stream used by vertex and factor records.
//! - [`G2oLoader`] reads and writes whole graphs in a g2o dialect with
//!   `VERTEX_PRVAG` and `EDGE_PRVAG_IMU_PRE_INTEGRATION` lines.

use crate::core::graph::Graph;
use std::path::Path;
use thiserror::Error;
use tracing::error;

pub mod g2o;
pub mod tokens;

pub use g2o::G2oLoader;
pub use tokens::{write_tokens, TokenReader};

/// Errors that can occur while reading or writing records and graph files
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid number format at line {line}: {value}")]
    InvalidNumber { line: usize, value: String },

    #[error("Missing required fields at line {line}")]
    MissingFields { line: usize },

    #[error("Unexpected end of record: expected {expected} tokens, found {found}")]
    UnexpectedEof { expected: usize, found: usize },

    #[error("Duplicate vertex ID: {id}")]
    DuplicateVertex { id: usize },

    #[error("Edge at line {line} references unknown vertex {id}")]
    UnknownVertex { line: usize, id: usize },
}

impl IoError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }

    /// Log the error together with the context it was raised in
    #[must_use]
    pub fn log_with_source<E: std::fmt::Debug>(self, source_error: E) -> Self {
        error!("{} | Source: {:?}", self, source_error);
        self
    }
}

/// Trait for graph file loaders and writers
pub trait GraphLoader {
    /// Load a graph from a file
    fn load<P: AsRef<Path>>(path: P) -> Result<Graph, IoError>;

    /// Write a graph to a file
    fn write<P: AsRef<Path>>(graph: &Graph, path: P) -> Result<(), IoError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display() {
        let error = IoError::UnexpectedEof {
            expected: 139,
            found: 20,
        };
        assert_eq!(
            error.to_string(),
            "Unexpected end of record: expected 139 tokens, found 20"
        );

        let error = IoError::InvalidNumber {
            line: 3,
            value: "1.2.3".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid number format at line 3: 1.2.3");
    }

    #[test]
    fn test_log_returns_same_error() {
        let error = IoError::DuplicateVertex { id: 9 }.log();
        assert!(matches!(error, IoError::DuplicateVertex { id: 9 }));

        let error = IoError::MissingFields { line: 2 }.log_with_source("while parsing vertex");
        assert!(matches!(error, IoError::MissingFields { line: 2 }));
    }
}
