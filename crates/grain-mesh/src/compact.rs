//! Dense renumbering of a repaired surface mesh.

use rand::Rng;
use tracing::{info, warn};

use crate::adjacency::SurfaceAdjacency;
use crate::types::{Domain, NodeId, SurfaceMesh};

/// Copy the live part of `mesh` into fresh dense arenas.
///
/// Every kept node and triangle records its new index in `final_number`.
/// Coordinates not lying on a face of `domain` are shifted by up to
/// `jitter`, one random draw per node, so that no two seed points coincide
/// exactly. Adjacency is rebuilt from the compacted triangles.
pub fn compact<R: Rng + ?Sized>(
    mesh: &SurfaceMesh,
    domain: &Domain,
    jitter: f64,
    rng: &mut R,
) -> (SurfaceMesh, SurfaceAdjacency) {
    let mut out = SurfaceMesh::new(mesh.num_grains);
    let mut remap: Vec<Option<NodeId>> = vec![None; mesh.nodes.len()];

    for (id, node) in mesh.live_nodes() {
        let new_id = out.nodes.len() as NodeId;
        remap[id as usize] = Some(new_id);

        let mut node = node.clone();
        node.final_number = Some(new_id);
        if jitter > 0.0 {
            let r = 2.0 * (rng.gen::<f64>() - 0.5);
            let original = node.position;
            if !domain.on_face_along(&original, 0) {
                node.position.x += jitter * r;
            }
            if !domain.on_face_along(&original, 1) {
                node.position.y -= jitter * r;
            }
            if !domain.on_face_along(&original, 2) {
                node.position.z += jitter * r;
            }
        }
        out.nodes.push(node);
    }

    let mut dangling = 0;
    for (_, tri) in mesh.live_triangles() {
        let mapped = [
            remap[tri.nodes[0] as usize],
            remap[tri.nodes[1] as usize],
            remap[tri.nodes[2] as usize],
        ];
        let [Some(a), Some(b), Some(c)] = mapped else {
            dangling += 1;
            continue;
        };
        let mut tri = tri.clone();
        tri.nodes = [a, b, c];
        tri.final_number = Some(out.triangles.len() as u32);
        out.triangles.push(tri);
    }
    if dangling > 0 {
        warn!("Dropped {} triangles referencing removed nodes", dangling);
    }

    let degenerate = out.refresh_all_triangles();
    if degenerate > 0 {
        warn!("{} triangles became degenerate after jitter", degenerate);
    }

    let adjacency = SurfaceAdjacency::build(&out);
    info!(
        "Compacted surface mesh: {} nodes, {} triangles",
        out.node_count(),
        out.triangle_count()
    );
    (out, adjacency)
}
