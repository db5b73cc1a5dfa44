//! IMU pre-integration factor for PRVAG factor graphs.
//!
//! A PRVAG state bundles position, rotation, velocity, accelerometer bias and
//! gyroscope bias. [`factors::ImuPreIntegrationFactor`] links two consecutive
//! states through a pre-integrated IMU measurement and produces a
//! 15-dimensional residual weighted by a 15×15 information matrix.

pub mod core;
pub mod error;
pub mod factors;
pub mod io;
pub mod logger;
pub mod manifold;

pub use crate::core::{Graph, PrvagState, VertexPrvag};
pub use error::{ApexImuError, ApexImuResult};
pub use factors::{Factor, ImuPreIntegrationFactor, NumericDiffConfig};
pub use io::{G2oLoader, GraphLoader, IoError};
pub use logger::{init_logger, init_logger_with_level};
