//! End-to-end tests: build PRVAG graphs, persist them as g2o, reload and
//! evaluate IMU residuals.

use apex_imu::core::vertex::{Matrix15, Vector15, INDEX_R};
use apex_imu::core::{Graph, PrvagState, VertexPrvag};
use apex_imu::factors::Factor;
use apex_imu::manifold::SO3;
use apex_imu::{G2oLoader, GraphLoader, ImuPreIntegrationFactor};
use nalgebra::{SMatrix, Vector3};
use std::io::Write;
use tempfile::NamedTempFile;

const T: f64 = 0.05;

fn gravity() -> Vector3<f64> {
    Vector3::new(0.0, 0.0, -9.81)
}

/// Turning trajectory with slowly drifting biases.
fn trajectory(len: usize) -> Vec<PrvagState> {
    (0..len)
        .map(|k| {
            let t = k as f64 * T;
            PrvagState {
                position: Vector3::new(2.0 * t.sin(), 2.0 * (1.0 - t.cos()), 0.1 * t - 4.905 * t * t),
                orientation: SO3::from_euler_angles(0.02 * t, 0.01 * t, t),
                velocity: Vector3::new(2.0 * t.cos(), 2.0 * t.sin(), 0.1 - 9.81 * t),
                accel_bias: Vector3::new(1e-4, -2e-4, 5e-5),
                gyro_bias: Vector3::new(-1e-5, 1e-5, 2e-5),
            }
        })
        .collect()
}

fn build_graph(states: &[PrvagState]) -> Result<Graph, Box<dyn std::error::Error>> {
    let mut graph = Graph::new();
    for (id, state) in states.iter().enumerate() {
        graph.add_vertex(VertexPrvag::new(id, state.clone()))?;
    }

    let mut information = Matrix15::identity() * 100.0;
    information[(INDEX_R, INDEX_R + 1)] = 5.0;
    information[(INDEX_R + 1, INDEX_R)] = 5.0;

    for i in 0..states.len() - 1 {
        let mut edge = ImuPreIntegrationFactor::new(i, i + 1);
        edge.set_t(T);
        edge.set_gravity(gravity());
        edge.set_measurement(ImuPreIntegrationFactor::predict_measurement(
            &states[i],
            &states[i + 1],
            T,
            &gravity(),
        ));
        edge.set_information(information);
        graph.add_edge(edge)?;
    }
    Ok(graph)
}

#[test]
fn test_consistent_graph_has_zero_chi2() -> Result<(), Box<dyn std::error::Error>> {
    let mut graph = build_graph(&trajectory(50))?;
    let chi2 = graph.compute_errors()?;
    assert!(chi2 < 1e-16, "chi2 = {chi2}");
    Ok(())
}

#[test]
fn test_g2o_roundtrip_preserves_chi2() -> Result<(), Box<dyn std::error::Error>> {
    let states = trajectory(20);
    let mut graph = build_graph(&states)?;

    let vertex = graph.vertex_mut(7).ok_or("vertex 7 missing")?;
    let mut delta = Vector15::zeros();
    delta[0] = 0.05;
    delta[INDEX_R + 2] = 0.02;
    vertex.oplus(&delta);
    let chi2 = graph.compute_errors()?;
    assert!(chi2 > 0.1);

    let file = NamedTempFile::new()?;
    G2oLoader::write(&graph, file.path())?;
    let mut reloaded = G2oLoader::load(file.path())?;

    assert_eq!(reloaded.vertex_count(), 20);
    assert_eq!(reloaded.edge_count(), 19);
    let reloaded_chi2 = reloaded.compute_errors()?;
    assert!((reloaded_chi2 - chi2).abs() < 1e-9 * chi2.max(1.0));

    for (original, loaded) in graph.edges().iter().zip(reloaded.edges()) {
        assert_eq!(original.to_record(), loaded.to_record());
        assert_eq!(original.vertices(), loaded.vertices());
    }
    Ok(())
}

#[test]
fn test_load_handwritten_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut edge = ImuPreIntegrationFactor::new(0, 1);
    edge.set_t(0.1);
    edge.set_gravity(gravity());
    let mut measurement = Vector15::zeros();
    measurement[0] = 1.0;
    edge.set_measurement(measurement);

    let mut file = NamedTempFile::new()?;
    writeln!(file, "# two states, one IMU edge")?;
    writeln!(file, "VERTEX_PRVAG 0 0 0 0 0 0 0 1 1 0 0 0 0 0 0 0 0")?;
    writeln!(file, "VERTEX_PRVAG 1 1.1 0 0.04905 0 0 0 1 1 0 0.981 0 0 0 0 0 0")?;
    writeln!(file, "EDGE_PRVAG_IMU_PRE_INTEGRATION 0 1 {}", edge.to_record())?;
    file.flush()?;

    let mut graph = G2oLoader::load(file.path())?;
    let chi2 = graph.compute_errors()?;
    assert!(chi2 < 1e-18, "chi2 = {chi2}");
    Ok(())
}

#[test]
fn test_gauss_newton_step_reduces_chi2() -> Result<(), Box<dyn std::error::Error>> {
    let states = trajectory(2);
    let graph = build_graph(&states)?;
    let edge = graph.edge(0).ok_or("edge 0 missing")?;

    let mut perturbation = Vector15::zeros();
    perturbation[1] = 0.03;
    perturbation[INDEX_R] = -0.02;
    perturbation[7] = 0.1;
    let state_j = states[1].plus(&perturbation);

    let params = vec![states[0].to_vector(), state_j.to_vector()];
    let (residual, jacobian) = edge.linearize(&params, true)?;
    let jacobian = jacobian.ok_or("Jacobian should be computed")?;

    let r = Vector15::from_column_slice(residual.as_slice());
    let j_j = SMatrix::<f64, 15, 15>::from_fn(|row, col| jacobian[(row, 15 + col)]);
    let omega = edge.information();

    let hessian = j_j.transpose() * omega * j_j;
    let gradient = j_j.transpose() * omega * r;
    let step = hessian.cholesky().ok_or("normal equations not positive definite")?.solve(&(-gradient));

    let before = r.dot(&(omega * r));
    let updated = state_j.plus(&step);
    let r_after = edge.residual(&states[0], &updated);
    let after = r_after.dot(&(omega * r_after));

    assert!(after < 1e-6 * before, "before = {before}, after = {after}");
    assert!(updated.minus(&states[1]).norm() < 1e-4);
    Ok(())
}
