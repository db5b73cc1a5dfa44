//! PRVAG state: position, rotation, velocity, accelerometer bias, gyro bias.
//!
//! The state lives on the product manifold R³ × SO(3) × R³ × R³ × R³ and has
//! 15 degrees of freedom. The same five-block layout is shared by the state
//! tangent, the IMU measurement and the factor residual:
//!
//! | Block | Offset | Content            |
//! |-------|--------|--------------------|
//! | P     | 0      | position           |
//! | R     | 3      | orientation        |
//! | V     | 6      | velocity           |
//! | A     | 9      | accelerometer bias |
//! | G     | 12     | gyroscope bias     |
//!
//! Parameter vectors handed to [`crate::factors::Factor::linearize`] use the
//! 16-value representation `px py pz qx qy qz qw vx vy vz bax bay baz bgx bgy bgz`.

use crate::io::{IoError, TokenReader};
use crate::manifold::{LieGroup, ManifoldError, ManifoldResult, SO3, SO3Tangent};
use nalgebra::{DVector, SMatrix, SVector, Vector3};
use std::fmt;

/// 15-dimensional vector in PRVAG block layout.
pub type Vector15 = SVector<f64, 15>;

/// 15×15 matrix in PRVAG block layout.
pub type Matrix15 = SMatrix<f64, 15, 15>;

pub const INDEX_P: usize = 0;
pub const INDEX_R: usize = 3;
pub const INDEX_V: usize = 6;
pub const INDEX_A: usize = 9;
pub const INDEX_G: usize = 12;

/// Degrees of freedom of a PRVAG state.
pub const DOF: usize = 15;

/// Number of scalars in the parameter/text representation.
pub const REP_SIZE: usize = 16;

/// Extract the 3-block starting at `index`.
pub fn block(vector: &Vector15, index: usize) -> Vector3<f64> {
    vector.fixed_rows::<3>(index).into_owned()
}

/// Overwrite the 3-block starting at `index`.
pub fn set_block(vector: &mut Vector15, index: usize, value: &Vector3<f64>) {
    vector.fixed_rows_mut::<3>(index).copy_from(value);
}

/// Estimate held by a PRVAG vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct PrvagState {
    pub position: Vector3<f64>,
    pub orientation: SO3,
    pub velocity: Vector3<f64>,
    pub accel_bias: Vector3<f64>,
    pub gyro_bias: Vector3<f64>,
}

impl Default for PrvagState {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: SO3::identity(),
            velocity: Vector3::zeros(),
            accel_bias: Vector3::zeros(),
            gyro_bias: Vector3::zeros(),
        }
    }
}

impl fmt::Display for PrvagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PRVAG(p: [{:.4}, {:.4}, {:.4}], {}, v: [{:.4}, {:.4}, {:.4}], b_a: [{:.4}, {:.4}, {:.4}], b_g: [{:.4}, {:.4}, {:.4}])",
            self.position.x,
            self.position.y,
            self.position.z,
            self.orientation,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z,
            self.accel_bias.x,
            self.accel_bias.y,
            self.accel_bias.z,
            self.gyro_bias.x,
            self.gyro_bias.y,
            self.gyro_bias.z,
        )
    }
}

impl PrvagState {
    pub fn new(
        position: Vector3<f64>,
        orientation: SO3,
        velocity: Vector3<f64>,
        accel_bias: Vector3<f64>,
        gyro_bias: Vector3<f64>,
    ) -> Self {
        Self {
            position,
            orientation,
            velocity,
            accel_bias,
            gyro_bias,
        }
    }

    /// Retraction x ⊞ δ.
    ///
    /// Euclidean blocks are added; orientation is right-perturbed as
    /// `R · exp(δθ)`.
    pub fn plus(&self, delta: &Vector15) -> Self {
        let delta_theta = SO3Tangent::new(block(delta, INDEX_R));
        Self {
            position: self.position + block(delta, INDEX_P),
            orientation: self.orientation.right_plus(&delta_theta, None, None),
            velocity: self.velocity + block(delta, INDEX_V),
            accel_bias: self.accel_bias + block(delta, INDEX_A),
            gyro_bias: self.gyro_bias + block(delta, INDEX_G),
        }
    }

    /// Local coordinates x ⊟ other, the inverse of [`PrvagState::plus`].
    pub fn minus(&self, other: &PrvagState) -> Vector15 {
        let mut delta = Vector15::zeros();
        set_block(&mut delta, INDEX_P, &(self.position - other.position));
        set_block(
            &mut delta,
            INDEX_R,
            &self
                .orientation
                .right_minus(&other.orientation, None, None)
                .axis_angle(),
        );
        set_block(&mut delta, INDEX_V, &(self.velocity - other.velocity));
        set_block(&mut delta, INDEX_A, &(self.accel_bias - other.accel_bias));
        set_block(&mut delta, INDEX_G, &(self.gyro_bias - other.gyro_bias));
        delta
    }

    /// Build a state from its 16-value representation.
    ///
    /// Rejects slices of the wrong length and quaternions that cannot be
    /// normalized.
    pub fn from_slice(values: &[f64]) -> ManifoldResult<Self> {
        if values.len() != REP_SIZE {
            return Err(ManifoldError::InvalidRepresentationSize {
                expected: REP_SIZE,
                actual: values.len(),
            });
        }

        let quaternion = &values[3..7];
        let norm_squared: f64 = quaternion.iter().map(|q| q * q).sum();
        if !norm_squared.is_finite() || norm_squared <= f64::EPSILON {
            return Err(ManifoldError::InvalidElement(format!(
                "quaternion [{}, {}, {}, {}] cannot be normalized",
                quaternion[0], quaternion[1], quaternion[2], quaternion[3]
            )));
        }

        Ok(Self {
            position: Vector3::new(values[0], values[1], values[2]),
            orientation: SO3::from_quaternion_coeffs(
                quaternion[0],
                quaternion[1],
                quaternion[2],
                quaternion[3],
            ),
            velocity: Vector3::new(values[7], values[8], values[9]),
            accel_bias: Vector3::new(values[10], values[11], values[12]),
            gyro_bias: Vector3::new(values[13], values[14], values[15]),
        })
    }

    /// 16-value representation, quaternion in `x y z w` order.
    pub fn to_vector(&self) -> DVector<f64> {
        let [qx, qy, qz, qw] = self.orientation.coeffs();
        DVector::from_vec(vec![
            self.position.x,
            self.position.y,
            self.position.z,
            qx,
            qy,
            qz,
            qw,
            self.velocity.x,
            self.velocity.y,
            self.velocity.z,
            self.accel_bias.x,
            self.accel_bias.y,
            self.accel_bias.z,
            self.gyro_bias.x,
            self.gyro_bias.y,
            self.gyro_bias.z,
        ])
    }

    /// Read the 16 state tokens from `reader`.
    pub fn read(reader: &mut TokenReader<'_>) -> Result<Self, IoError> {
        let line = reader.line();
        reader.begin_record(REP_SIZE);
        let values = reader.next_f64_array::<REP_SIZE>()?;
        Self::from_slice(&values).map_err(|e| IoError::Parse {
            line,
            message: e.to_string(),
        })
    }

    /// Write the 16 state tokens, single-space separated, without a trailing newline.
    pub fn write<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<()> {
        crate::io::write_tokens(out, self.to_vector().iter().copied())
    }
}

/// Graph vertex owning one PRVAG estimate.
#[derive(Clone, Debug, PartialEq)]
pub struct VertexPrvag {
    pub id: usize,
    estimate: PrvagState,
}

impl VertexPrvag {
    pub fn new(id: usize, estimate: PrvagState) -> Self {
        Self { id, estimate }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn estimate(&self) -> &PrvagState {
        &self.estimate
    }

    pub fn set_estimate(&mut self, estimate: PrvagState) {
        self.estimate = estimate;
    }

    /// Apply an update along the 15-DOF retraction.
    pub fn oplus(&mut self, delta: &Vector15) {
        self.estimate = self.estimate.plus(delta);
    }
}

impl fmt::Display for VertexPrvag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VertexPrvag [ id: {}, estimate: {} ]", self.id, self.estimate)
    }
}
