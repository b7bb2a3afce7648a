//! Grain volume estimation from the boundary surface.
//!
//! Each boundary triangle, wound toward its grain, forms a tetrahedron with
//! the grain centroid. The signed volumes sum to the enclosed volume for a
//! closed, consistently wound boundary.

use tracing::{debug, info};

use crate::adjacency::SurfaceAdjacency;
use crate::geometry::signed_volume;
use crate::grains::GrainRegistry;
use crate::types::SurfaceMesh;

/// Compute per-triangle contributions and per-grain volumes.
///
/// Also refreshes each grain's bounds and longest boundary edge. Returns
/// the summed volume of all grains.
pub fn estimate_volumes(
    mesh: &mut SurfaceMesh,
    adjacency: &SurfaceAdjacency,
    registry: &mut GrainRegistry,
) -> f64 {
    registry.refresh_bounds(mesh, adjacency);

    for tri in mesh.triangles.iter_mut() {
        tri.left_volume = 0.0;
        tri.right_volume = 0.0;
    }

    let mut total = 0.0;
    for grain in registry.iter_mut() {
        let mut volume = 0.0;
        let mut max_edge: f64 = 0.0;
        for &t in adjacency.triangles_of_grain(grain.id) {
            let tri = &mesh.triangles[t as usize];
            if !tri.is_alive() {
                continue;
            }
            let Some(winding) = tri.winding_for(grain.id) else {
                continue;
            };
            let [a, b, c] = mesh.points(winding);
            let v = signed_volume(&a, &b, &c, &grain.centroid);
            max_edge = max_edge.max(tri.geometry.max_edge_length);

            let tri = &mut mesh.triangles[t as usize];
            if tri.left_grain == grain.id {
                tri.left_volume = v;
            } else {
                tri.right_volume = v;
            }
            volume += v;
        }
        grain.volume = volume;
        grain.max_edge_length = max_edge;
        total += volume;
        debug!("Grain {} volume {:.6}", grain.id, volume);
    }

    info!("Surface mesh volume: {:.6}", total);
    total
}
