//! SO(3) - Special Orthogonal Group in 3D
//!
//! This module implements the Special Orthogonal group SO(3), which represents
//! rotations in 3D space.
//!
//! SO(3) elements are represented using nalgebra's UnitQuaternion internally.
//! SO(3) tangent elements are represented as axis-angle vectors in R³,
//! where the direction gives the axis of rotation and the magnitude gives the angle.
//!
//! # Logarithm near π
//!
//! `q` and `-q` describe the same rotation. [`SO3::log`] always works on the
//! representative with `w >= 0`, so the returned angle stays in `[0, π]` and
//! the map does not blow up when the rotation approaches half a turn.

use crate::manifold::{LieGroup, Tangent};
use nalgebra::{Matrix3, Quaternion, Unit, UnitQuaternion, Vector3};
use std::fmt;
use std::ops::Mul;

/// SO(3) group element representing rotations in 3D.
///
/// Internally represented using nalgebra's UnitQuaternion<f64> for efficient rotations.
#[derive(Clone, Debug, PartialEq)]
pub struct SO3 {
    /// Internal representation as a unit quaternion
    quaternion: UnitQuaternion<f64>,
}

impl fmt::Display for SO3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let q = self.quaternion.quaternion();
        write!(
            f,
            "SO3(quaternion: [w: {:.4}, x: {:.4}, y: {:.4}, z: {:.4}])",
            q.w, q.i, q.j, q.k
        )
    }
}

/// SO(3) tangent space element representing elements in the Lie algebra so(3).
///
/// Internally represented as axis-angle vectors in R³ where:
/// - Direction: axis of rotation (unit vector)
/// - Magnitude: angle of rotation (radians)
#[derive(Clone, Debug, PartialEq)]
pub struct SO3Tangent {
    /// Internal data: axis-angle vector [θx, θy, θz]
    data: Vector3<f64>,
}

impl fmt::Display for SO3Tangent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "so3(axis-angle: [{:.4}, {:.4}, {:.4}])",
            self.data.x, self.data.y, self.data.z
        )
    }
}

/// Skew-symmetric matrix [v]ₓ of a 3-vector.
fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

impl SO3 {
    /// Create a new SO(3) element from a unit quaternion.
    pub fn new(quaternion: UnitQuaternion<f64>) -> Self {
        SO3 { quaternion }
    }

    /// Create SO(3) from quaternion coefficients in g2o order `[x, y, z, w]`.
    ///
    /// The coefficients are normalized; a zero quaternion yields the identity.
    pub fn from_quaternion_coeffs(x: f64, y: f64, z: f64, w: f64) -> Self {
        let q = Quaternion::new(w, x, y, z);
        match UnitQuaternion::try_new(q, f64::EPSILON) {
            Some(quaternion) => SO3::new(quaternion),
            None => SO3::identity(),
        }
    }

    /// Create SO(3) from Euler angles (roll, pitch, yaw).
    pub fn from_euler_angles(roll: f64, pitch: f64, yaw: f64) -> Self {
        SO3::new(UnitQuaternion::from_euler_angles(roll, pitch, yaw))
    }

    /// Create SO(3) from axis-angle representation.
    pub fn from_axis_angle(axis: &Vector3<f64>, angle: f64) -> Self {
        let unit_axis = Unit::new_normalize(*axis);
        SO3::new(UnitQuaternion::from_axis_angle(&unit_axis, angle))
    }

    /// Create SO(3) from a rotation vector (exponential map).
    pub fn from_scaled_axis(axis_angle: Vector3<f64>) -> Self {
        SO3Tangent::new(axis_angle).exp(None)
    }

    /// Get the quaternion representation.
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        self.quaternion
    }

    /// Get the x component of the quaternion.
    pub fn x(&self) -> f64 {
        self.quaternion.i
    }

    /// Get the y component of the quaternion.
    pub fn y(&self) -> f64 {
        self.quaternion.j
    }

    /// Get the z component of the quaternion.
    pub fn z(&self) -> f64 {
        self.quaternion.k
    }

    /// Get the w component of the quaternion.
    pub fn w(&self) -> f64 {
        self.quaternion.w
    }

    /// Quaternion coefficients in g2o order `[x, y, z, w]`.
    pub fn coeffs(&self) -> [f64; 4] {
        let q = self.quaternion.quaternion();
        [q.i, q.j, q.k, q.w]
    }

    /// Get the rotation matrix (3x3).
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.quaternion.to_rotation_matrix().into_inner()
    }

    /// Geodesic distance ‖log(self⁻¹ ∘ other)‖.
    pub fn distance(&self, other: &SO3) -> f64 {
        self.between(other, None, None).log(None).angle()
    }
}

impl LieGroup for SO3 {
    type Element = SO3;
    type TangentVector = SO3Tangent;
    type JacobianMatrix = Matrix3<f64>;
    type LieAlgebra = Matrix3<f64>;

    const DIM: usize = 3;
    const DOF: usize = 3;
    const REP_SIZE: usize = 4;

    fn identity() -> Self::Element {
        SO3 {
            quaternion: UnitQuaternion::identity(),
        }
    }

    /// SO3 inverse.
    ///
    /// # Notes
    /// R⁻¹ = Rᵀ, for quaternions: q⁻¹ = q*
    ///
    /// J_R⁻¹_R = -Adj(R) = -R
    fn inverse(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::Element {
        if let Some(jac) = jacobian {
            *jac = -self.rotation_matrix();
        }

        SO3 {
            quaternion: self.quaternion.inverse(),
        }
    }

    /// SO3 composition.
    ///
    /// # Notes
    /// J_QR_R = Adj(Q⁻¹) = Qᵀ
    /// J_QR_Q = I
    fn compose(
        &self,
        other: &Self::Element,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::Element {
        if let Some(jac_self) = jacobian_self {
            *jac_self = other.rotation_matrix().transpose();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix3::identity();
        }

        SO3 {
            quaternion: self.quaternion * other.quaternion,
        }
    }

    /// Get the SO3 corresponding Lie algebra element in vector form.
    ///
    /// # Notes
    /// θu = Log(q) = (2 / ‖v‖) · v · atan2(‖v‖, w), evaluated on the
    /// representative with w ≥ 0. For ‖v‖ → 0 the coefficient follows the
    /// series 2/w − (2/3)‖v‖²/w³.
    fn log(&self, jacobian: Option<&mut Self::JacobianMatrix>) -> Self::TangentVector {
        let q = self.quaternion.quaternion();
        let (w, v) = if q.w < 0.0 {
            (-q.w, Vector3::new(-q.i, -q.j, -q.k))
        } else {
            (q.w, Vector3::new(q.i, q.j, q.k))
        };

        let sin_half_squared = v.norm_squared();
        let log_coeff = if sin_half_squared > f64::EPSILON {
            let sin_half = sin_half_squared.sqrt();
            2.0 * f64::atan2(sin_half, w) / sin_half
        } else {
            2.0 / w - (2.0 / 3.0) * sin_half_squared / (w * w * w)
        };

        let axis_angle = SO3Tangent::new(v * log_coeff);

        if let Some(jac) = jacobian {
            *jac = axis_angle.right_jacobian_inv();
        }

        axis_angle
    }

    /// Right plus: R ⊕ φ = R · exp(φ)
    ///
    /// # Notes
    /// J_R⊕θ_R = R(θ)ᵀ
    /// J_R⊕θ_θ = J_r(θ)
    fn right_plus(
        &self,
        tangent: &Self::TangentVector,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_tangent: Option<&mut Self::JacobianMatrix>,
    ) -> Self::Element {
        let exp_tangent = tangent.exp(None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = exp_tangent.rotation_matrix().transpose();
        }

        if let Some(jac_tangent) = jacobian_tangent {
            *jac_tangent = tangent.right_jacobian();
        }

        self.compose(&exp_tangent, None, None)
    }

    /// Right minus: R1 ⊖ R2 = log(R2ᵀ · R1)
    ///
    /// # Notes
    /// J_Q⊖R_Q = J_r⁻¹(θ)
    /// J_Q⊖R_R = -J_l⁻¹(θ)
    fn right_minus(
        &self,
        other: &Self::Element,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::TangentVector {
        let result = other.between(self, None, None).log(None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = result.right_jacobian_inv();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = -result.left_jacobian_inv();
        }

        result
    }

    fn between(
        &self,
        other: &Self::Element,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_other: Option<&mut Self::JacobianMatrix>,
    ) -> Self::Element {
        // R1ᵀ · R2
        let result = self.inverse(None).compose(other, None, None);

        if let Some(jac_self) = jacobian_self {
            *jac_self = -result.rotation_matrix().transpose();
        }

        if let Some(jac_other) = jacobian_other {
            *jac_other = Matrix3::identity();
        }

        result
    }

    fn act(
        &self,
        vector: &Vector3<f64>,
        jacobian_self: Option<&mut Self::JacobianMatrix>,
        jacobian_vector: Option<&mut Matrix3<f64>>,
    ) -> Vector3<f64> {
        if let Some(jac_self) = jacobian_self {
            // -R · [v]ₓ
            *jac_self = -self.rotation_matrix() * skew(vector);
        }

        if let Some(jac_vector) = jacobian_vector {
            *jac_vector = self.rotation_matrix();
        }

        self.quaternion * vector
    }

    fn random() -> Self::Element {
        SO3 {
            quaternion: UnitQuaternion::from_scaled_axis(Vector3::new(
                rand::random::<f64>() * 2.0 - 1.0,
                rand::random::<f64>() * 2.0 - 1.0,
                rand::random::<f64>() * 2.0 - 1.0,
            )),
        }
    }

    fn normalize(&mut self) {
        self.quaternion.renormalize();
    }

    fn is_valid(&self, tolerance: f64) -> bool {
        (self.quaternion.quaternion().norm() - 1.0).abs() < tolerance
    }
}

impl Mul for SO3 {
    type Output = SO3;

    fn mul(self, rhs: SO3) -> SO3 {
        self.compose(&rhs, None, None)
    }
}

impl<'a> Mul<&'a SO3> for &'a SO3 {
    type Output = SO3;

    fn mul(self, rhs: &'a SO3) -> SO3 {
        self.compose(rhs, None, None)
    }
}

impl Mul<Vector3<f64>> for &SO3 {
    type Output = Vector3<f64>;

    fn mul(self, rhs: Vector3<f64>) -> Vector3<f64> {
        self.act(&rhs, None, None)
    }
}

impl SO3Tangent {
    /// Create a new SO3Tangent from axis-angle vector.
    pub fn new(axis_angle: Vector3<f64>) -> Self {
        SO3Tangent { data: axis_angle }
    }

    /// Create SO3Tangent from individual components.
    pub fn from_components(x: f64, y: f64, z: f64) -> Self {
        SO3Tangent::new(Vector3::new(x, y, z))
    }

    /// Get the axis-angle vector.
    pub fn axis_angle(&self) -> Vector3<f64> {
        self.data
    }

    /// Get the angle of rotation.
    pub fn angle(&self) -> f64 {
        self.data.norm()
    }

    pub fn x(&self) -> f64 {
        self.data.x
    }

    pub fn y(&self) -> f64 {
        self.data.y
    }

    pub fn z(&self) -> f64 {
        self.data.z
    }
}

impl From<Vector3<f64>> for SO3Tangent {
    fn from(data: Vector3<f64>) -> Self {
        SO3Tangent::new(data)
    }
}

impl From<SO3Tangent> for Vector3<f64> {
    fn from(tangent: SO3Tangent) -> Self {
        tangent.data
    }
}

impl Tangent<SO3> for SO3Tangent {
    /// SO3 exponential map.
    ///
    /// # Notes
    /// q = Exp(θu) = cos(θ/2) + u sin(θ/2) ∈ H
    ///
    /// J_R(θ) = I - (1 - cos θ)/θ² [θ]ₓ + (θ - sin θ)/θ³ [θ]ₓ²
    fn exp(
        &self,
        jacobian: Option<&mut <SO3 as LieGroup>::JacobianMatrix>,
    ) -> <SO3 as LieGroup>::Element {
        let theta_squared = self.data.norm_squared();

        let quaternion = if theta_squared > f64::EPSILON {
            UnitQuaternion::from_scaled_axis(self.data)
        } else {
            UnitQuaternion::from_quaternion(Quaternion::new(
                1.0,
                self.data.x / 2.0,
                self.data.y / 2.0,
                self.data.z / 2.0,
            ))
        };

        if let Some(jac) = jacobian {
            *jac = self.right_jacobian();
        }

        SO3 { quaternion }
    }

    fn right_jacobian(&self) -> <SO3 as LieGroup>::JacobianMatrix {
        self.left_jacobian().transpose()
    }

    /// Left Jacobian for SO(3)
    ///
    /// # Notes
    /// J_l(θ) = I + (1 - cos θ)/θ² [θ]ₓ + (θ - sin θ)/θ³ [θ]ₓ²
    fn left_jacobian(&self) -> <SO3 as LieGroup>::JacobianMatrix {
        let theta_squared = self.data.norm_squared();
        let tangent_skew = self.hat();

        if theta_squared <= f64::EPSILON {
            Matrix3::identity() + 0.5 * tangent_skew
        } else {
            let theta = theta_squared.sqrt();
            let (sin_theta, cos_theta) = theta.sin_cos();

            Matrix3::identity()
                + (1.0 - cos_theta) / theta_squared * tangent_skew
                + (theta - sin_theta) / (theta_squared * theta) * tangent_skew * tangent_skew
        }
    }

    fn right_jacobian_inv(&self) -> <SO3 as LieGroup>::JacobianMatrix {
        self.left_jacobian_inv().transpose()
    }

    /// Left Jacobian inverse for SO(3)
    ///
    /// # Notes
    /// J_l⁻¹(θ) = I - ½[θ]ₓ + (1/θ² - (1 + cos θ)/(2θ sin θ)) [θ]ₓ²
    fn left_jacobian_inv(&self) -> <SO3 as LieGroup>::JacobianMatrix {
        let theta_squared = self.data.norm_squared();
        let tangent_skew = self.hat();

        if theta_squared <= f64::EPSILON {
            Matrix3::identity() - 0.5 * tangent_skew
        } else {
            let theta = theta_squared.sqrt();
            let (sin_theta, cos_theta) = theta.sin_cos();

            Matrix3::identity() - 0.5 * tangent_skew
                + (1.0 / theta_squared - (1.0 + cos_theta) / (2.0 * theta * sin_theta))
                    * tangent_skew
                    * tangent_skew
        }
    }

    /// [θ]ₓ = [0 -θz θy; θz 0 -θx; -θy θx 0]
    fn hat(&self) -> <SO3 as LieGroup>::LieAlgebra {
        skew(&self.data)
    }
}
