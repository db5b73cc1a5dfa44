//! Error types for the apex-imu library
//!
//! This module provides the main error and result types used throughout the library.
//! Module-level errors (`ManifoldError`, `IoError`, `FactorError`) fold into
//! [`ApexImuError`] through `From`, so `?` works across layers.

use crate::{factors::FactorError, io::IoError, manifold::ManifoldError};
use thiserror::Error;

/// Main result type used throughout the apex-imu library
pub type ApexImuResult<T> = Result<T, ApexImuError>;

/// Main error type for the apex-imu library
#[derive(Debug, Clone, Error)]
pub enum ApexImuError {
    /// IO related errors (file loading, parsing, etc.)
    #[error("IO error: {0}")]
    Io(String),

    /// Manifold operations errors
    #[error("Manifold error: {0}")]
    Manifold(String),

    /// Factor evaluation errors
    #[error("Factor error: {0}")]
    Factor(String),

    /// A vertex id was registered twice in the same graph
    #[error("Duplicate vertex ID: {id}")]
    DuplicateVertex { id: usize },

    /// An edge refers to a vertex the graph does not own
    #[error("Missing vertex ID: {id}")]
    MissingVertex { id: usize },
}

// Convert module-specific errors to ApexImuError

impl From<ManifoldError> for ApexImuError {
    fn from(err: ManifoldError) -> Self {
        ApexImuError::Manifold(err.to_string())
    }
}

impl From<IoError> for ApexImuError {
    fn from(err: IoError) -> Self {
        ApexImuError::Io(err.to_string())
    }
}

impl From<FactorError> for ApexImuError {
    fn from(err: FactorError) -> Self {
        ApexImuError::Factor(err.to_string())
    }
}
