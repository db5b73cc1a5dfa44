//! Manifold representations for optimization on non-Euclidean spaces.
//!
//! The PRVAG state only carries one non-Euclidean component, its orientation,
//! so this module provides the rotation group:
//! - **SO(3)**: Special Orthogonal group (rotations)
//!
//! Lie group M,° | size   | dim | X ∈ M                   | Constraint      | T_E M             | T_X M                 | Exp(T)             | Comp. | Action
//! ------------- | ------ | --- | ----------------------- | --------------- | ----------------- | --------------------- | ------------------ | ----- | ------
//! 3-sphere      | S³,.   | 4   | 3   | q ∈ H             | q*q = 1         | θ/2 ∈ Hp          | θ ∈ R³                | q = exp(uθ/2)      | q₁q₂  | qxq*
//! Rotation      | SO(3),.| 9   | 3   | R                 | RᵀR = I         | [θ]x ∈ so(3)      | [θ] ∈ R³              | R = exp([θ]x)      | R₁R₂  | Rx
//!
//! The design is inspired by the [manif](https://github.com/artivis/manif) C++ library
//! and provides:
//! - Analytic Jacobian computations for the group operations
//! - Right perturbation model (used by the PRVAG retraction)
//! - Composition and inverse operations
//! - Exponential and logarithmic maps
//!
//! Orientation is never added component-wise. Every update goes through
//! `compose`, `right_plus` or the exponential map.

use nalgebra::{Matrix3, Vector3};
use std::fmt::Debug;
use thiserror::Error;

pub mod so3;

pub use so3::{SO3, SO3Tangent};

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifoldError {
    /// Parameter vector does not match the element's representation size
    #[error("Invalid representation size: expected {expected}, got {actual}")]
    InvalidRepresentationSize { expected: usize, actual: usize },

    /// Invalid manifold element (e.g. a zero quaternion)
    #[error("Invalid manifold element: {0}")]
    InvalidElement(String),
}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Core trait for Lie group operations.
///
/// Associated types define the mathematical structure:
/// - `Element`: The Lie group element type
/// - `TangentVector`: The tangent space vector type
/// - `JacobianMatrix`: The Jacobian matrix type for this Lie group
/// - `LieAlgebra`: Associated Lie algebra type
///
/// Three key dimensions characterize each Lie group:
/// - `DIM`: Space dimension - dimension of ambient space
/// - `DOF`: Degrees of freedom - tangent space dimension
/// - `REP_SIZE`: Representation size - underlying data size
pub trait LieGroup: Clone + Debug + PartialEq {
    /// The Lie group element type
    type Element: Clone + Debug + PartialEq;

    /// The tangent space vector type
    type TangentVector: Tangent<Self>;

    /// The Jacobian matrix type
    type JacobianMatrix: Clone + Debug + PartialEq;

    /// Associated Lie algebra type
    type LieAlgebra: Clone + Debug + PartialEq;

    /// Space dimension - dimension of the ambient space that the group acts on
    const DIM: usize;

    /// Degrees of freedom - dimension of the tangent space
    const DOF: usize;

    /// Representation size - size of the underlying data representation
    const REP_SIZE: usize;

    /// Get the identity element of the group.
    fn identity() -> Self::Element;

    /// Compute the inverse of this manifold element.
    ///
    /// # Arguments
    /// * `jacobian` - Optional mutable reference to store the Jacobian ∂(g⁻¹)/∂g
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::Element;

    /// Compose this element with another (group multiplication).
    ///
    /// # Arguments
    /// * `other` - The right operand for composition
    /// * `jacobian_self` - Optional Jacobian ∂(g₁ ∘ g₂)/∂g₁
    /// * `jacobian_other` - Optional Jacobian ∂(g₁ ∘ g₂)/∂g₂
    fn compose(
        &self,
        other: &Self::Element,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::Element;

    /// Logarithmic map from manifold to tangent space.
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂log(g)^∨/∂g
    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector;

    /// Right plus operation: g ⊞ φ = g ∘ exp(φ^∧).
    fn right_plus(
        &self,
        tangent: &Self::TangentVector,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_tangent: Option<&mut Self::JacobianMatrix>,
    ) -> Self::Element;

    /// Right minus operation: g₁ ⊟ g₂ = log(g₂⁻¹ ∘ g₁)^∨.
    fn right_minus(
        &self,
        other: &Self::Element,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::TangentVector;

    /// Convenience method for right_plus. Equivalent to g ⊞ φ.
    fn plus(
        &self,
        tangent: &Self::TangentVector,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_tangent: Option<&mut Self::JacobianMatrix>,
    ) -> Self::Element {
        self.right_plus(tangent, jacobian_self, jacobian_tangent)
    }

    /// Convenience method for right_minus. Equivalent to g₁ ⊟ g₂.
    fn minus(
        &self,
        other: &Self::Element,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::TangentVector {
        self.right_minus(other, jacobian_self, jacobian_other)
    }

    /// Compute g₁⁻¹ ∘ g₂ (relative transformation).
    fn between(
        &self,
        other: &Self::Element,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::Element;

    /// Act on a vector v: g ⊙ v.
    ///
    /// # Arguments
    /// * `vector` - Vector to transform
    /// * `jacobian_self` - Optional Jacobian ∂(g ⊙ v)/∂g
    /// * `jacobian_vector` - Optional Jacobian ∂(g ⊙ v)/∂v
    fn act(
        &self,
        vector: &Vector3<f64>,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_vector: Option<&mut Matrix3<f64>>,
    ) -> Vector3<f64>;

    /// Generate a random element (useful for testing and initialization).
    fn random() -> Self::Element;

    /// Normalize/project the element to the manifold.
    fn normalize(&mut self);

    /// Check if the element is approximately on the manifold.
    fn is_valid(&self, tolerance: f64) -> bool;
}

/// Trait for Lie algebra operations.
pub trait Tangent<G: LieGroup>: Clone + Debug + PartialEq {
    /// Exponential map to Lie group: exp(φ^∧).
    ///
    /// # Arguments
    /// * `jacobian` - Optional Jacobian ∂exp(φ^∧)/∂φ
    fn exp(&self, jacobian: Option<&mut G::JacobianMatrix>) -> G::Element;

    /// Right Jacobian Jr.
    fn right_jacobian(&self) -> G::JacobianMatrix;

    /// Left Jacobian Jl.
    fn left_jacobian(&self) -> G::JacobianMatrix;

    /// Inverse of right Jacobian Jr⁻¹.
    fn right_jacobian_inv(&self) -> G::JacobianMatrix;

    /// Inverse of left Jacobian Jl⁻¹.
    fn left_jacobian_inv(&self) -> G::JacobianMatrix;

    /// Hat operator: φ^∧ (vector to matrix).
    fn hat(&self) -> G::LieAlgebra;
}
