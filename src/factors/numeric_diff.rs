//! Finite-difference Jacobians along the PRVAG retraction.
//!
//! Column k of ∂r/∂x is obtained by perturbing the state with `x ⊞ h·eₖ`,
//! so the rotation block is differentiated in the tangent space rather than
//! on raw quaternion coefficients.

use crate::core::vertex::{PrvagState, Vector15, DOF};
use nalgebra::SMatrix;

/// ∂r/∂x for one 15-DOF state.
pub type StateJacobian = SMatrix<f64, 15, 15>;

/// [∂r/∂x_i | ∂r/∂x_j] for a binary edge.
pub type EdgeJacobian = SMatrix<f64, 15, 30>;

/// Configuration for finite-difference Jacobians
#[derive(Debug, Clone, PartialEq)]
pub struct NumericDiffConfig {
    /// Perturbation applied to each tangent coordinate
    pub step_size: f64,
    /// Central (two-sided) differences instead of forward differences
    pub central_differences: bool,
}

impl Default for NumericDiffConfig {
    fn default() -> Self {
        Self {
            step_size: 1e-6,
            central_differences: true,
        }
    }
}

impl NumericDiffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_step_size(mut self, step_size: f64) -> Self {
        self.step_size = step_size;
        self
    }

    pub fn with_central_differences(mut self, central_differences: bool) -> Self {
        self.central_differences = central_differences;
        self
    }

    /// Jacobian of `residual` with respect to `state`.
    pub fn state_jacobian<F>(&self, state: &PrvagState, residual: F) -> StateJacobian
    where
        F: Fn(&PrvagState) -> Vector15,
    {
        let h = self.step_size;
        let base = if self.central_differences {
            None
        } else {
            Some(residual(state))
        };

        let mut jacobian = StateJacobian::zeros();
        for k in 0..DOF {
            let mut delta = Vector15::zeros();
            delta[k] = h;
            let forward = residual(&state.plus(&delta));

            let column = match &base {
                Some(r0) => (forward - r0) / h,
                None => {
                    let backward = residual(&state.plus(&(-delta)));
                    (forward - backward) / (2.0 * h)
                }
            };
            jacobian.set_column(k, &column);
        }
        jacobian
    }

    /// Jacobian of a binary residual with respect to both endpoints.
    pub fn edge_jacobian<F>(
        &self,
        state_i: &PrvagState,
        state_j: &PrvagState,
        residual: F,
    ) -> EdgeJacobian
    where
        F: Fn(&PrvagState, &PrvagState) -> Vector15,
    {
        let jacobian_i = self.state_jacobian(state_i, |x| residual(x, state_j));
        let jacobian_j = self.state_jacobian(state_j, |x| residual(state_i, x));

        let mut jacobian = EdgeJacobian::zeros();
        jacobian.fixed_columns_mut::<15>(0).copy_from(&jacobian_i);
        jacobian.fixed_columns_mut::<15>(15).copy_from(&jacobian_j);
        jacobian
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::vertex::{block, INDEX_P, INDEX_V};
    use nalgebra::Vector3;

    const TOLERANCE: f64 = 1e-8;

    #[test]
    fn test_config_builder() {
        let config = NumericDiffConfig::new()
            .with_step_size(1e-4)
            .with_central_differences(false);
        assert_eq!(config.step_size, 1e-4);
        assert!(!config.central_differences);
        assert_eq!(NumericDiffConfig::default().step_size, 1e-6);
        assert!(NumericDiffConfig::default().central_differences);
    }

    #[test]
    fn test_linear_residual_has_exact_jacobian() {
        // r = 2·p − v, zero elsewhere
        let residual = |x: &PrvagState| {
            let mut r = Vector15::zeros();
            r.fixed_rows_mut::<3>(INDEX_P)
                .copy_from(&(2.0 * x.position - x.velocity));
            r
        };
        let state = PrvagState {
            position: Vector3::new(1.0, 2.0, 3.0),
            velocity: Vector3::new(-1.0, 0.5, 0.0),
            ..PrvagState::default()
        };

        for config in [
            NumericDiffConfig::default(),
            NumericDiffConfig::default().with_central_differences(false),
        ] {
            let jacobian = config.state_jacobian(&state, residual);
            for i in 0..3 {
                assert!((jacobian[(i, INDEX_P + i)] - 2.0).abs() < 1e-6);
                assert!((jacobian[(i, INDEX_V + i)] + 1.0).abs() < 1e-6);
            }
            assert!(jacobian.fixed_rows::<12>(3).norm() < TOLERANCE);
        }
    }

    #[test]
    fn test_edge_jacobian_layout() {
        // r = p_j − p_i
        let residual = |xi: &PrvagState, xj: &PrvagState| {
            let mut r = Vector15::zeros();
            r.fixed_rows_mut::<3>(INDEX_P)
                .copy_from(&(xj.position - xi.position));
            r
        };
        let config = NumericDiffConfig::default();
        let jacobian = config.edge_jacobian(&PrvagState::default(), &PrvagState::default(), residual);

        for i in 0..3 {
            assert!((jacobian[(i, i)] + 1.0).abs() < TOLERANCE);
            assert!((jacobian[(i, 15 + i)] - 1.0).abs() < TOLERANCE);
        }
        let r = residual(&PrvagState::default(), &PrvagState::default());
        assert_eq!(block(&r, INDEX_P), Vector3::zeros());
    }
}
