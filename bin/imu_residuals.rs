//! IMU Residual Evaluation Binary
//!
//! Loads a g2o file with PRVAG vertices and IMU pre-integration edges,
//! evaluates every edge against the stored estimates and reports χ².
//!
//! # Usage
//! ```bash
//! cargo run --release --bin imu_residuals -- path/to/graph.g2o
//!
//! # Also report numeric Jacobian norms and rewrite the graph in canonical form:
//! cargo run --release --bin imu_residuals -- graph.g2o --jacobian -o canonical.g2o
//! ```

use apex_imu::core::vertex::{block, INDEX_A, INDEX_G, INDEX_P, INDEX_R, INDEX_V};
use apex_imu::{
    init_logger_with_level, ApexImuError, ApexImuResult, G2oLoader, GraphLoader, NumericDiffConfig,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, Level};

/// Evaluate IMU pre-integration residuals of a PRVAG graph
#[derive(Parser)]
#[command(name = "imu_residuals")]
#[command(about = "Evaluate IMU pre-integration residuals of a PRVAG g2o graph")]
struct Args {
    /// G2O file path (required, positional)
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Write the graph back in canonical form
    #[arg(short, long, value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Also compute numeric Jacobians for every edge
    #[arg(short, long)]
    jacobian: bool,

    /// Finite-difference step for --jacobian
    #[arg(long, default_value = "1e-6")]
    step_size: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ApexImuResult<()> {
    let args = Args::parse();

    init_logger_with_level(if args.verbose { Level::DEBUG } else { Level::INFO });

    if !args.file.exists() {
        return Err(ApexImuError::Io(format!("File not found: {}", args.file.display())));
    }

    let start_load = Instant::now();
    let mut graph = G2oLoader::load(&args.file)?;
    info!("{} loaded in {:?}", graph, start_load.elapsed());

    let start_eval = Instant::now();
    let total_chi2 = graph.compute_errors()?;
    let eval_time = start_eval.elapsed();

    for (index, edge) in graph.edges().iter().enumerate() {
        let [from, to] = edge.vertices();
        let error = edge.error();
        info!(
            "edge {:>5} ({} -> {}): chi2 = {:.6e}  |r_P| = {:.3e}  |r_R| = {:.3e}  |r_V| = {:.3e}  |r_A| = {:.3e}  |r_G| = {:.3e}",
            index,
            from,
            to,
            edge.chi2(),
            block(error, INDEX_P).norm(),
            block(error, INDEX_R).norm(),
            block(error, INDEX_V).norm(),
            block(error, INDEX_A).norm(),
            block(error, INDEX_G).norm(),
        );
    }

    info!("Total chi2: {:.6e} ({} edges, {:?})", total_chi2, graph.edge_count(), eval_time);

    if args.jacobian {
        let config = NumericDiffConfig::new().with_step_size(args.step_size);
        for (index, edge) in graph.edges().iter().enumerate() {
            let [from, to] = edge.vertices();
            let edge = edge.clone().with_numeric_diff(config.clone());
            let jacobian = edge.jacobians(graph.estimate(from)?, graph.estimate(to)?);
            debug!("edge {} jacobian:\n{}", index, jacobian);
            info!(
                "edge {:>5} ({} -> {}): |J_i| = {:.6e}  |J_j| = {:.6e}",
                index,
                from,
                to,
                jacobian.fixed_columns::<15>(0).norm(),
                jacobian.fixed_columns::<15>(15).norm(),
            );
        }
    }

    if let Some(output) = args.output {
        G2oLoader::write(&graph, &output)?;
    }

    Ok(())
}
