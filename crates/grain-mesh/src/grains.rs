//! Per-grain registry: centroid, bounding box and edge flag.

use nalgebra::{Point3, Vector3};
use serde::Serialize;
use tracing::{debug, warn};

use crate::adjacency::SurfaceAdjacency;
use crate::types::{GrainId, SurfaceMesh};

/// Summary geometry of one grain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grain {
    pub id: GrainId,
    pub centroid: Point3<f64>,
    pub min: Point3<f64>,
    pub max: Point3<f64>,
    /// Volume enclosed by the boundary, from the volume estimator.
    pub volume: f64,
    /// Any boundary node lies on the domain edge.
    pub on_edge: bool,
    /// Longest edge among the grain's live boundary triangles.
    pub max_edge_length: f64,
    pub node_count: usize,
}

impl Grain {
    #[inline]
    pub fn extent(&self) -> Vector3<f64> {
        self.max - self.min
    }
}

/// Grains 1..=N indexed by id. Grains without live boundary nodes are absent.
#[derive(Debug, Clone, Default)]
pub struct GrainRegistry {
    grains: Vec<Option<Grain>>,
}

impl GrainRegistry {
    /// Compute centroid, bounds and edge flag for every grain.
    pub fn build(mesh: &SurfaceMesh, adjacency: &SurfaceAdjacency) -> Self {
        let mut grains = Vec::with_capacity(mesh.num_grains as usize);
        let mut empty = 0;

        for id in 1..=mesh.num_grains {
            let nodes: Vec<_> = adjacency
                .nodes_of_grain(id)
                .iter()
                .map(|n| &mesh.nodes[*n as usize])
                .filter(|n| n.is_alive())
                .collect();
            if nodes.is_empty() {
                empty += 1;
                grains.push(None);
                continue;
            }

            let mut sum = Vector3::zeros();
            let mut min = nodes[0].position;
            let mut max = nodes[0].position;
            let mut on_edge = false;
            for node in &nodes {
                let p = &node.position;
                sum += p.coords;
                min = min.inf(p);
                max = max.sup(p);
                on_edge |= node.edge;
            }

            grains.push(Some(Grain {
                id,
                centroid: Point3::from(sum / nodes.len() as f64),
                min,
                max,
                volume: 0.0,
                on_edge,
                max_edge_length: 0.0,
                node_count: nodes.len(),
            }));
        }

        if empty > 0 {
            warn!("{} grains have no boundary triangles and are skipped", empty);
        }
        debug!("Registered {} grains", grains.len() - empty);
        Self { grains }
    }

    #[inline]
    pub fn get(&self, id: GrainId) -> Option<&Grain> {
        self.grains.get((id as usize).checked_sub(1)?)?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: GrainId) -> Option<&mut Grain> {
        self.grains.get_mut((id as usize).checked_sub(1)?)?.as_mut()
    }

    /// Registered grains in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Grain> + '_ {
        self.grains.iter().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Grain> + '_ {
        self.grains.iter_mut().flatten()
    }

    /// Number of registered (non-empty) grains.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `id` names an edge grain. Unknown ids are not edge grains.
    pub fn is_edge_grain(&self, id: GrainId) -> bool {
        self.get(id).map(|g| g.on_edge).unwrap_or(false)
    }

    /// Recompute bounds from current node positions.
    pub fn refresh_bounds(&mut self, mesh: &SurfaceMesh, adjacency: &SurfaceAdjacency) {
        for grain in self.grains.iter_mut().flatten() {
            let mut iter = adjacency
                .nodes_of_grain(grain.id)
                .iter()
                .map(|n| &mesh.nodes[*n as usize])
                .filter(|n| n.is_alive());
            if let Some(first) = iter.next() {
                let (mut min, mut max) = (first.position, first.position);
                for node in iter {
                    min = min.inf(&node.position);
                    max = max.sup(&node.position);
                }
                grain.min = min;
                grain.max = max;
            }
        }
    }
}
