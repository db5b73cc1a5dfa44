//! Arena owning every PRVAG vertex and the IMU edges between them.
//!
//! Edges never hold their endpoints. They store vertex ids and look the
//! states up in the [`Graph`] whenever a residual is evaluated.

use crate::core::vertex::{PrvagState, Vector15, VertexPrvag};
use crate::error::{ApexImuError, ApexImuResult};
use crate::factors::ImuPreIntegrationFactor;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Unique identifier for vertices in the graph
pub type VertexId = usize;

/// PRVAG factor graph: vertex arena plus IMU pre-integration edges
#[derive(Debug, Clone, Default)]
pub struct Graph {
    vertices: HashMap<VertexId, VertexPrvag>,
    edges: Vec<ImuPreIntegrationFactor>,
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Graph [ vertices: {}, imu edges: {} ]",
            self.vertices.len(),
            self.edges.len()
        )
    }
}

impl Graph {
    /// Creates a new, empty graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertices: usize, edges: usize) -> Self {
        Self {
            vertices: HashMap::with_capacity(vertices),
            edges: Vec::with_capacity(edges),
        }
    }

    /// Register a vertex. Ids must be unique.
    pub fn add_vertex(&mut self, vertex: VertexPrvag) -> ApexImuResult<()> {
        let id = vertex.id();
        if self.vertices.contains_key(&id) {
            return Err(ApexImuError::DuplicateVertex { id });
        }
        self.vertices.insert(id, vertex);
        Ok(())
    }

    /// Register an edge and return its index. Both endpoints must already exist.
    pub fn add_edge(&mut self, edge: ImuPreIntegrationFactor) -> ApexImuResult<usize> {
        for id in edge.vertices() {
            if !self.vertices.contains_key(&id) {
                return Err(ApexImuError::MissingVertex { id });
            }
        }
        self.edges.push(edge);
        Ok(self.edges.len() - 1)
    }

    pub fn vertex(&self, id: VertexId) -> Option<&VertexPrvag> {
        self.vertices.get(&id)
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> Option<&mut VertexPrvag> {
        self.vertices.get_mut(&id)
    }

    /// Current estimate of vertex `id`.
    pub fn estimate(&self, id: VertexId) -> ApexImuResult<&PrvagState> {
        self.vertices
            .get(&id)
            .map(VertexPrvag::estimate)
            .ok_or(ApexImuError::MissingVertex { id })
    }

    /// Vertex ids in ascending order.
    pub fn vertex_ids(&self) -> Vec<VertexId> {
        let mut ids: Vec<VertexId> = self.vertices.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn vertices(&self) -> impl Iterator<Item = &VertexPrvag> {
        self.vertices.values()
    }

    pub fn edges(&self) -> &[ImuPreIntegrationFactor] {
        &self.edges
    }

    pub fn edge(&self, index: usize) -> Option<&ImuPreIntegrationFactor> {
        self.edges.get(index)
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Evaluate every edge against the current estimates, cache the
    /// residuals, and return the total χ² = Σ eᵀ Ω e.
    pub fn compute_errors(&mut self) -> ApexImuResult<f64> {
        let graph: &Graph = self;
        let residuals: Vec<Vector15> = graph
            .edges
            .par_iter()
            .map(|edge| edge.evaluate(graph))
            .collect::<ApexImuResult<_>>()?;

        let mut total = 0.0;
        for (index, (edge, residual)) in self.edges.iter_mut().zip(residuals).enumerate() {
            edge.set_error(residual);
            let chi2 = edge.chi2();
            debug!(
                "edge {} ({} -> {}): chi2 = {:.6e}",
                index,
                edge.vertices()[0],
                edge.vertices()[1],
                chi2
            );
            total += chi2;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::SO3;
    use nalgebra::Vector3;

    fn state_at(x: f64) -> PrvagState {
        PrvagState {
            position: Vector3::new(x, 0.0, 0.0),
            ..PrvagState::default()
        }
    }

    #[test]
    fn test_add_vertex_rejects_duplicates() {
        let mut graph = Graph::new();
        assert!(graph.add_vertex(VertexPrvag::new(0, state_at(0.0))).is_ok());
        let result = graph.add_vertex(VertexPrvag::new(0, state_at(1.0)));
        assert!(matches!(result, Err(ApexImuError::DuplicateVertex { id: 0 })));
        assert_eq!(graph.vertex_count(), 1);
    }

    #[test]
    fn test_add_edge_requires_both_endpoints() {
        let mut graph = Graph::new();
        assert!(graph.add_vertex(VertexPrvag::new(0, state_at(0.0))).is_ok());

        let result = graph.add_edge(ImuPreIntegrationFactor::new(0, 1));
        assert!(matches!(result, Err(ApexImuError::MissingVertex { id: 1 })));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn test_vertex_lookup_and_mutation() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_vertex(VertexPrvag::new(3, state_at(0.0)))?;
        graph.add_vertex(VertexPrvag::new(1, state_at(1.0)))?;
        assert_eq!(graph.vertex_ids(), vec![1, 3]);

        let vertex = graph.vertex_mut(3).ok_or("vertex 3 missing")?;
        vertex.set_estimate(PrvagState {
            orientation: SO3::from_euler_angles(0.0, 0.0, 0.5),
            ..state_at(2.0)
        });
        assert_eq!(graph.estimate(3)?.position.x, 2.0);
        assert!(graph.vertex(7).is_none());
        assert!(matches!(
            graph.estimate(7),
            Err(ApexImuError::MissingVertex { id: 7 })
        ));
        Ok(())
    }

    #[test]
    fn test_compute_errors_sums_edge_chi2() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::new();
        graph.add_vertex(VertexPrvag::new(0, state_at(0.0)))?;
        graph.add_vertex(VertexPrvag::new(1, state_at(2.0)))?;

        // zero velocity, zero gravity: position residual equals the displacement
        let mut edge = ImuPreIntegrationFactor::new(0, 1);
        edge.set_t(0.1);
        graph.add_edge(edge)?;

        let total = graph.compute_errors()?;
        assert!((total - 4.0).abs() < 1e-12);
        let edge = graph.edge(0).ok_or("edge 0 missing")?;
        assert!((edge.error()[0] - 2.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_display() -> Result<(), Box<dyn std::error::Error>> {
        let mut graph = Graph::with_capacity(2, 1);
        graph.add_vertex(VertexPrvag::new(0, state_at(0.0)))?;
        assert_eq!(graph.to_string(), "Graph [ vertices: 1, imu edges: 0 ]");
        Ok(())
    }
}
