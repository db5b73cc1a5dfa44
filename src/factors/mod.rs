//! Factor implementations for PRVAG graph optimization.
//!
//! Factors (also called constraints or error functions) represent measurements or prior
//! knowledge that constrain the values of variables in the optimization problem.
//!
//! # Factor Types
//!
//! - [`ImuPreIntegrationFactor`]: pre-integrated IMU measurement between two
//!   consecutive PRVAG states. 15-dimensional residual.
//!
//! Jacobians are obtained by finite differences along the state retraction,
//! see [`numeric_diff`].

use crate::error::ApexImuResult;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;
use tracing::error;

pub mod imu_pre_integration;
pub mod numeric_diff;

pub use imu_pre_integration::{ImuPreIntegrationFactor, RECORD_LEN};
pub use numeric_diff::NumericDiffConfig;

/// Factor-specific error types
#[derive(Debug, Clone, Error)]
pub enum FactorError {
    /// Invalid dimension mismatch between expected and actual
    #[error("Invalid dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },
}

impl FactorError {
    /// Log the error with tracing::error and return self for chaining
    #[must_use]
    pub fn log(self) -> Self {
        error!("{}", self);
        self
    }
}

/// Trait for factor (constraint) implementations in factor graph optimization.
///
/// A factor computes the residual (error) and Jacobian for the current variable
/// values, which an optimizer uses to minimize the total cost.
///
/// Factors must be `Send + Sync` so residuals can be evaluated in parallel.
pub trait Factor: Send + Sync {
    /// Compute the residual and Jacobian at the given parameter values.
    ///
    /// # Arguments
    ///
    /// * `params` - Slice of variable values (one `DVector` per connected variable)
    /// * `compute_jacobian` - Whether to compute the Jacobian matrix
    ///
    /// # Returns
    ///
    /// Tuple `(residual, jacobian)` where:
    /// - `residual`: N-dimensional error vector
    /// - `jacobian`: N × M matrix where M is the total DOF of all variables
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> ApexImuResult<(DVector<f64>, Option<DMatrix<f64>>)>;

    /// Get the dimension of the residual vector.
    fn get_dimension(&self) -> usize;
}
