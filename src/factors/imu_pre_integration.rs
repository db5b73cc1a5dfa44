use super::numeric_diff::{EdgeJacobian, NumericDiffConfig};
use super::{Factor, FactorError};
use crate::core::graph::Graph;
use crate::core::vertex::{
    block, set_block, Matrix15, PrvagState, Vector15, DOF, INDEX_A, INDEX_G, INDEX_P, INDEX_R,
    INDEX_V,
};
use crate::error::ApexImuResult;
use crate::io::{write_tokens, IoError, TokenReader};
use crate::manifold::{LieGroup, SO3Tangent, Tangent};
use nalgebra::{DMatrix, DVector, Vector3};
use tracing::{debug, warn};

/// Number of upper-triangle entries of the 15×15 information matrix.
pub const INFORMATION_ENTRIES: usize = DOF * (DOF + 1) / 2;

/// Tokens in one serialized factor: `T`, gravity, measurement, information.
pub const RECORD_LEN: usize = 1 + 3 + DOF + INFORMATION_ENTRIES;

/// IMU pre-integration factor between two PRVAG states.
///
/// Binds state `i` (earlier) to state `j` (later) through a pre-integrated
/// IMU measurement covering an interval of `T` seconds.
///
/// # Mathematical Formulation
///
/// With the measurement split into `α` (block P), `θ` (block R) and `β`
/// (block V), the 15-dimensional residual is:
///
/// ```text
/// r_P = R_i⁻¹ (p_j − p_i − (v_i − ½ g T) T) − α
/// r_R = log( exp(θ)⁻¹ R_i⁻¹ R_j )
/// r_V = R_i⁻¹ (v_j − v_i + g T) − β
/// r_A = b_a_j − b_a_i
/// r_G = b_g_j − b_g_i
/// ```
///
/// The A and G blocks of the measurement are carried and persisted but the
/// bias residuals only model a random walk between the two states.
///
/// # Jacobian Computation
///
/// No analytic Jacobian is provided. [`ImuPreIntegrationFactor::jacobians`]
/// differentiates the residual numerically along the 15-DOF retraction of
/// each endpoint, giving a 15×30 matrix `[∂r/∂x_i | ∂r/∂x_j]`.
///
/// # Text Record
///
/// ```text
/// T gx gy gz  m0 … m14  Ω(0,0) Ω(0,1) … Ω(0,14) Ω(1,1) … Ω(14,14)
/// ```
///
/// 139 whitespace-separated numbers. The measurement is written in strict
/// P/R/V/A/G order and the information matrix as its upper triangle in
/// row-major order; reading mirrors it into the lower triangle.
///
/// # Examples
///
/// ```
/// use apex_imu::factors::ImuPreIntegrationFactor;
/// use apex_imu::core::PrvagState;
/// use nalgebra::Vector3;
///
/// let state_i = PrvagState::default();
/// let state_j = PrvagState {
///     position: Vector3::new(0.1, 0.0, 0.0),
///     ..PrvagState::default()
/// };
///
/// let mut factor = ImuPreIntegrationFactor::new(0, 1);
/// factor.set_t(0.1);
/// factor.set_measurement(ImuPreIntegrationFactor::predict_measurement(
///     &state_i,
///     &state_j,
///     0.1,
///     &Vector3::zeros(),
/// ));
///
/// assert!(factor.residual(&state_i, &state_j).norm() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ImuPreIntegrationFactor {
    vertices: [usize; 2],
    t: f64,
    gravity: Vector3<f64>,
    measurement: Vector15,
    information: Matrix15,
    error: Vector15,
    numeric_diff: NumericDiffConfig,
}

impl Default for ImuPreIntegrationFactor {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

impl ImuPreIntegrationFactor {
    /// Create a factor from vertex `i` to vertex `j`.
    ///
    /// `T` and gravity start at zero, the measurement at the zero vector and
    /// the information at identity.
    pub fn new(vertex_i: usize, vertex_j: usize) -> Self {
        Self {
            vertices: [vertex_i, vertex_j],
            t: 0.0,
            gravity: Vector3::zeros(),
            measurement: Vector15::zeros(),
            information: Matrix15::identity(),
            error: Vector15::zeros(),
            numeric_diff: NumericDiffConfig::default(),
        }
    }

    /// Parse a factor from a single 139-token record.
    ///
    /// Vertex ids are not part of the record; set them with
    /// [`ImuPreIntegrationFactor::set_vertices`].
    pub fn from_record(record: &str) -> Result<Self, IoError> {
        let mut reader = TokenReader::new(record);
        let mut factor = Self::default();
        factor.read(&mut reader)?;
        if !reader.is_exhausted() {
            return Err(IoError::Parse {
                line: reader.line(),
                message: format!("trailing tokens after {RECORD_LEN}-token record"),
            });
        }
        Ok(factor)
    }

    pub fn with_numeric_diff(mut self, config: NumericDiffConfig) -> Self {
        self.numeric_diff = config;
        self
    }

    pub fn vertices(&self) -> [usize; 2] {
        self.vertices
    }

    pub fn set_vertices(&mut self, vertex_i: usize, vertex_j: usize) {
        self.vertices = [vertex_i, vertex_j];
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    /// Set the pre-integration interval.
    ///
    /// Any value is stored. Non-positive intervals make the gravity terms
    /// degenerate and are reported with a warning.
    pub fn set_t(&mut self, t: f64) {
        if t <= 0.0 {
            warn!(
                "IMU edge {} -> {}: non-positive pre-integration interval T = {}",
                self.vertices[0], self.vertices[1], t
            );
        }
        self.t = t;
    }

    pub fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }

    pub fn set_gravity(&mut self, gravity: Vector3<f64>) {
        self.gravity = gravity;
    }

    pub fn measurement(&self) -> &Vector15 {
        &self.measurement
    }

    pub fn set_measurement(&mut self, measurement: Vector15) {
        self.measurement = measurement;
    }

    pub fn information(&self) -> &Matrix15 {
        &self.information
    }

    pub fn set_information(&mut self, information: Matrix15) {
        self.information = information;
    }

    /// Residual cached by the last [`ImuPreIntegrationFactor::compute_error`].
    pub fn error(&self) -> &Vector15 {
        &self.error
    }

    pub(crate) fn set_error(&mut self, error: Vector15) {
        self.error = error;
    }

    /// Measurement that makes the residual vanish for the given states.
    ///
    /// Bias blocks are left at zero.
    pub fn predict_measurement(
        state_i: &PrvagState,
        state_j: &PrvagState,
        t: f64,
        gravity: &Vector3<f64>,
    ) -> Vector15 {
        let rotation_i_inv = state_i.orientation.inverse(None);

        let alpha = rotation_i_inv.act(
            &(state_j.position - state_i.position - (state_i.velocity - 0.5 * gravity * t) * t),
            None,
            None,
        );
        let theta = rotation_i_inv
            .compose(&state_j.orientation, None, None)
            .log(None)
            .axis_angle();
        let beta = rotation_i_inv.act(
            &(state_j.velocity - state_i.velocity + gravity * t),
            None,
            None,
        );

        let mut measurement = Vector15::zeros();
        set_block(&mut measurement, INDEX_P, &alpha);
        set_block(&mut measurement, INDEX_R, &theta);
        set_block(&mut measurement, INDEX_V, &beta);
        measurement
    }

    /// Residual of the factor for the given endpoint states.
    pub fn residual(&self, state_i: &PrvagState, state_j: &PrvagState) -> Vector15 {
        let t = self.t;
        let gravity = &self.gravity;
        let rotation_i_inv = state_i.orientation.inverse(None);

        let alpha = block(&self.measurement, INDEX_P);
        let theta = SO3Tangent::new(block(&self.measurement, INDEX_R));
        let beta = block(&self.measurement, INDEX_V);

        let position = rotation_i_inv.act(
            &(state_j.position - state_i.position - (state_i.velocity - 0.5 * gravity * t) * t),
            None,
            None,
        ) - alpha;

        let relative_rotation = rotation_i_inv.compose(&state_j.orientation, None, None);
        let rotation = theta
            .exp(None)
            .inverse(None)
            .compose(&relative_rotation, None, None)
            .log(None)
            .axis_angle();

        let velocity = rotation_i_inv.act(
            &(state_j.velocity - state_i.velocity + gravity * t),
            None,
            None,
        ) - beta;

        let mut residual = Vector15::zeros();
        set_block(&mut residual, INDEX_P, &position);
        set_block(&mut residual, INDEX_R, &rotation);
        set_block(&mut residual, INDEX_V, &velocity);
        set_block(
            &mut residual,
            INDEX_A,
            &(state_j.accel_bias - state_i.accel_bias),
        );
        set_block(
            &mut residual,
            INDEX_G,
            &(state_j.gyro_bias - state_i.gyro_bias),
        );
        residual
    }

    /// Residual against the current estimates stored in `graph`.
    pub fn evaluate(&self, graph: &Graph) -> ApexImuResult<Vector15> {
        let state_i = graph.estimate(self.vertices[0])?;
        let state_j = graph.estimate(self.vertices[1])?;
        Ok(self.residual(state_i, state_j))
    }

    /// Evaluate against `graph` and cache the result in [`ImuPreIntegrationFactor::error`].
    pub fn compute_error(&mut self, graph: &Graph) -> ApexImuResult<&Vector15> {
        self.error = self.evaluate(graph)?;
        Ok(&self.error)
    }

    /// χ² = eᵀ Ω e of the cached residual.
    pub fn chi2(&self) -> f64 {
        self.error.dot(&(self.information * self.error))
    }

    /// Numeric Jacobian `[∂r/∂x_i | ∂r/∂x_j]` (15×30).
    pub fn jacobians(&self, state_i: &PrvagState, state_j: &PrvagState) -> EdgeJacobian {
        self.numeric_diff
            .edge_jacobian(state_i, state_j, |xi, xj| self.residual(xi, xj))
    }

    /// Read `T`, gravity, measurement and information from `reader`.
    ///
    /// Fields are only updated once the whole record has been parsed.
    pub fn read(&mut self, reader: &mut TokenReader<'_>) -> Result<(), IoError> {
        reader.begin_record(RECORD_LEN);

        let t = reader.next_f64()?;
        let gravity = reader.next_vector3()?;
        let measurement = Vector15::from(reader.next_f64_array::<DOF>()?);

        let mut information = Matrix15::zeros();
        for i in 0..DOF {
            for j in i..DOF {
                let value = reader.next_f64()?;
                information[(i, j)] = value;
                information[(j, i)] = value;
            }
        }

        self.set_t(t);
        self.gravity = gravity;
        self.measurement = measurement;
        self.information = information;
        debug!(
            "read IMU edge {} -> {} (T = {})",
            self.vertices[0], self.vertices[1], self.t
        );
        Ok(())
    }

    /// The 139 record values in write order.
    fn record_values(&self) -> impl Iterator<Item = f64> + '_ {
        let upper_triangle =
            (0..DOF).flat_map(move |i| (i..DOF).map(move |j| self.information[(i, j)]));

        std::iter::once(self.t)
            .chain(self.gravity.iter().copied())
            .chain(self.measurement.iter().copied())
            .chain(upper_triangle)
    }

    /// Write the record as single-space separated tokens, without a trailing newline.
    ///
    /// Numbers use Rust's shortest round-trip `f64` formatting. Text written by
    /// another tool (e.g. `1e-05` or `0.50`) reads back to equal values, but is
    /// re-emitted as `0.00001` and `0.5`, so `write(read(s)) == s` only holds for
    /// records that `write` produced.
    pub fn write<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<()> {
        write_tokens(out, self.record_values())
    }

    /// The record as a string, identical to what [`ImuPreIntegrationFactor::write`] emits.
    pub fn to_record(&self) -> String {
        self.record_values()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Factor for ImuPreIntegrationFactor {
    /// `params` holds the two endpoint states in their 16-value representation.
    fn linearize(
        &self,
        params: &[DVector<f64>],
        compute_jacobian: bool,
    ) -> ApexImuResult<(DVector<f64>, Option<DMatrix<f64>>)> {
        if params.len() != 2 {
            return Err(FactorError::InvalidDimension {
                expected: 2,
                actual: params.len(),
            }
            .log()
            .into());
        }

        let state_i = PrvagState::from_slice(params[0].as_slice())?;
        let state_j = PrvagState::from_slice(params[1].as_slice())?;

        let residual = self.residual(&state_i, &state_j);
        let jacobian = if compute_jacobian {
            let jacobian = self.jacobians(&state_i, &state_j);
            Some(DMatrix::from_column_slice(DOF, 2 * DOF, jacobian.as_slice()))
        } else {
            None
        };

        Ok((DVector::from_column_slice(residual.as_slice()), jacobian))
    }

    fn get_dimension(&self) -> usize {
        DOF
    }
}
