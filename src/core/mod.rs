//! Core graph components for the apex-imu library
//!
//! - [`vertex`]: the PRVAG state, its 15-DOF retraction and block layout
//! - [`graph`]: the arena that owns vertices and IMU edges

pub mod graph;
pub mod vertex;

pub use graph::{Graph, VertexId};
pub use vertex::{
    Matrix15, PrvagState, Vector15, VertexPrvag, DOF, INDEX_A, INDEX_G, INDEX_P, INDEX_R,
    INDEX_V, REP_SIZE,
};
