//! Surface mesh repair: fold-aware decimation and sliver cleanup.
//!
//! Both passes remove triangles by collapsing an edge onto the endpoint that
//! touches more grains, so triple and quad junction nodes survive.

use nalgebra::Point3;
use tracing::{debug, info, warn};

use crate::adjacency::SurfaceAdjacency;
use crate::config::PipelineConfig;
use crate::geometry::angle_between_unit;
use crate::types::{NodeId, SurfaceMesh, TriangleId};

/// Thresholds for surface repair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RepairParams {
    /// Any neighbour fold angle below this keeps the triangle.
    pub min_fold_angle: f64,
    /// A mean neighbour fold angle at or below this keeps the triangle.
    pub mean_fold_angle: f64,
    /// Triangles under this fraction of the mean area are always removed.
    pub small_area_fraction: f64,
    /// Sliver threshold for interior angles.
    pub min_triangle_angle: f64,
    pub max_clean_passes: usize,
}

impl Default for RepairParams {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RepairParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_fold_angle: config.min_fold_angle,
            mean_fold_angle: config.mean_fold_angle,
            small_area_fraction: config.small_area_fraction,
            min_triangle_angle: config.min_triangle_angle,
            max_clean_passes: config.max_clean_passes,
        }
    }
}

/// Nodes of triangle edge `edge` (0: n1-n2, 1: n1-n3, 2: n2-n3).
#[inline]
fn edge_nodes(nodes: [NodeId; 3], edge: usize) -> (NodeId, NodeId) {
    match edge {
        0 => (nodes[0], nodes[1]),
        1 => (nodes[0], nodes[2]),
        _ => (nodes[1], nodes[2]),
    }
}

/// Index of the shortest edge, first wins on ties.
fn shortest_edge(lengths: &[f64; 3]) -> usize {
    let mut best = 0;
    for i in 1..3 {
        if lengths[i] < lengths[best] {
            best = i;
        }
    }
    best
}

/// Merge nodes `a` and `b` at their midpoint.
///
/// The endpoint with more incident grains survives (the first on a tie).
/// Triangles of the removed node are re-linked to the survivor; any that
/// become degenerate are killed. Returns the survivor.
pub fn collapse_edge(
    mesh: &mut SurfaceMesh,
    adjacency: &mut SurfaceAdjacency,
    a: NodeId,
    b: NodeId,
) -> NodeId {
    let (keep, drop) = if mesh.nodes[b as usize].numgrains > mesh.nodes[a as usize].numgrains {
        (b, a)
    } else {
        (a, b)
    };

    let mid = Point3::from((mesh.position(keep).coords + mesh.position(drop).coords) / 2.0);
    let dropped = mesh.nodes[drop as usize].clone();
    {
        let survivor = &mut mesh.nodes[keep as usize];
        survivor.position = mid;
        survivor.edge |= dropped.edge;
        survivor.triple |= dropped.triple;
    }
    mesh.nodes[drop as usize].killed = true;

    for &t in &adjacency.node_triangles[drop as usize] {
        let tri = &mut mesh.triangles[t as usize];
        if tri.is_alive() {
            tri.replace_node(drop, keep);
            if tri.has_repeated_node() {
                tri.killed = true;
            }
        }
    }
    adjacency.merge_node(drop, keep);

    let incident: Vec<TriangleId> = adjacency.node_triangles[keep as usize].clone();
    for t in incident {
        mesh.refresh_triangle(t);
    }
    adjacency.node_triangles[keep as usize].retain(|&t| mesh.triangles[t as usize].is_alive());

    keep
}

/// Live triangles on the same grain boundary sharing a node with `id`.
fn boundary_neighbors(mesh: &SurfaceMesh, adjacency: &SurfaceAdjacency, id: TriangleId) -> Vec<TriangleId> {
    let tri = &mesh.triangles[id as usize];
    let pair = tri.grain_pair();
    let mut out: Vec<TriangleId> = tri
        .nodes
        .iter()
        .flat_map(|n| adjacency.node_triangles[*n as usize].iter().copied())
        .filter(|&j| {
            let other = &mesh.triangles[j as usize];
            j != id && other.is_alive() && other.grain_pair() == pair && other.shares_node_with(tri)
        })
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Remove triangles that lie flat within their grain boundary.
///
/// A triangle is kept when a neighbour on the same boundary is folded
/// sharper than `min_fold_angle`, or when the mean fold angle is at or below
/// `mean_fold_angle`. A triangle with no live neighbour on its boundary has
/// no fold to average and is kept. Triangles smaller than
/// `small_area_fraction` of the mean area are removed regardless. Edge
/// triangles are never touched.
///
/// Returns the number of collapsed triangles.
pub fn delete_triangles(
    mesh: &mut SurfaceMesh,
    adjacency: &mut SurfaceAdjacency,
    params: &RepairParams,
) -> usize {
    let mean_area = mesh.mean_triangle_area();
    let area_floor = params.small_area_fraction * mean_area;
    let mut collapsed = 0;

    for i in 0..mesh.triangles.len() {
        let id = i as TriangleId;
        if !mesh.triangles[i].is_alive() || mesh.triangles[i].on_edge {
            continue;
        }

        let anchor = mesh.triangles[i].clone();
        let mut keep = false;
        let mut sum = 0.0;
        let mut count = 0usize;
        for j in boundary_neighbors(mesh, adjacency, id) {
            let other = &mesh.triangles[j as usize];
            let fix = if anchor.left_grain == other.right_grain { -1.0 } else { 1.0 };
            let angle = 180.0 - angle_between_unit(&anchor.geometry.normal, &(other.geometry.normal * fix));
            sum += angle;
            count += 1;
            if angle < params.min_fold_angle {
                keep = true;
                break;
            }
        }

        if count == 0 {
            keep = true;
        } else {
            let avg = sum / count as f64;
            mesh.triangles[i].avg_misorientation = avg;
            if avg <= params.mean_fold_angle {
                keep = true;
            }
        }
        if anchor.geometry.area < area_floor {
            keep = false;
        }
        if keep {
            continue;
        }

        let (a, b) = edge_nodes(anchor.nodes, shortest_edge(&anchor.geometry.edge_lengths));
        mesh.triangles[i].killed = true;
        collapse_edge(mesh, adjacency, a, b);
        collapsed += 1;
    }

    if collapsed > 0 {
        info!("Decimated {} flat or undersized triangles", collapsed);
    }
    collapsed
}

/// Outcome of [`clean_triangles`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanSummary {
    pub smoothed_nodes: usize,
    pub collapsed_triangles: usize,
    pub passes: usize,
}

/// Move each interior node to the centroid of its live neighbours.
///
/// Nodes are updated in place, so later nodes see earlier moves. Returns the
/// number of nodes moved.
pub fn smooth_nodes(mesh: &mut SurfaceMesh, adjacency: &SurfaceAdjacency) -> usize {
    let mut moved = 0;
    for n in 0..mesh.nodes.len() {
        let node = &mesh.nodes[n];
        if node.killed || node.edge {
            continue;
        }
        let mut sum = nalgebra::Vector3::zeros();
        let mut count = 0usize;
        for &nb in &adjacency.node_neighbors[n] {
            let neighbor = &mesh.nodes[nb as usize];
            if neighbor.is_alive() {
                sum += neighbor.position.coords;
                count += 1;
            }
        }
        if count > 0 {
            mesh.nodes[n].position = Point3::from(sum / count as f64);
            moved += 1;
        }
    }
    moved
}

/// Smooth interior nodes, then collapse slivers until none remain.
///
/// A live, non-edge triangle with an interior angle below
/// `min_triangle_angle` has the edge opposite its smallest angle collapsed.
/// The loop ends when a pass makes no collapse or after `max_clean_passes`.
pub fn clean_triangles(
    mesh: &mut SurfaceMesh,
    adjacency: &mut SurfaceAdjacency,
    params: &RepairParams,
) -> CleanSummary {
    let mut summary = CleanSummary {
        smoothed_nodes: smooth_nodes(mesh, adjacency),
        ..Default::default()
    };
    let killed = mesh.refresh_all_triangles();
    if killed > 0 {
        warn!("Smoothing flattened {} triangles", killed);
    }

    loop {
        if summary.passes >= params.max_clean_passes {
            warn!(
                "Sliver cleanup stopped after {} passes with collapses still pending",
                summary.passes
            );
            break;
        }
        summary.passes += 1;

        let mut count = 0;
        for i in 0..mesh.triangles.len() {
            let tri = &mesh.triangles[i];
            if !tri.is_alive() || tri.on_edge {
                continue;
            }
            let smallest = tri.geometry.smallest_angle();
            if tri.geometry.angles[smallest] >= params.min_triangle_angle {
                continue;
            }
            // The edge opposite vertex k is the one not containing it.
            let (a, b) = edge_nodes(tri.nodes, 2 - smallest);
            mesh.triangles[i].killed = true;
            collapse_edge(mesh, adjacency, a, b);
            count += 1;
        }
        debug!("Sliver pass {}: {} collapses", summary.passes, count);
        summary.collapsed_triangles += count;
        if count == 0 {
            break;
        }
    }

    info!(
        "Smoothed {} nodes, collapsed {} slivers in {} passes",
        summary.smoothed_nodes, summary.collapsed_triangles, summary.passes
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Node, SurfaceTriangle};

    /// A fan of four triangles around node 4 on the plane z = 0, all on the
    /// boundary between grains 1 and 2.
    fn flat_fan() -> SurfaceMesh {
        let mut mesh = SurfaceMesh::new(2);
        for (p, g) in [
            (Point3::new(0.0, 0.0, 0.0), 3),
            (Point3::new(2.0, 0.0, 0.0), 3),
            (Point3::new(2.0, 2.0, 0.0), 3),
            (Point3::new(0.0, 2.0, 0.0), 3),
            (Point3::new(1.0, 1.0, 0.0), 2),
        ] {
            mesh.nodes.push(Node::surface(p, g));
        }
        mesh.triangles.push(SurfaceTriangle::new([0, 1, 4], 1, 2));
        mesh.triangles.push(SurfaceTriangle::new([1, 2, 4], 1, 2));
        mesh.triangles.push(SurfaceTriangle::new([2, 3, 4], 1, 2));
        mesh.triangles.push(SurfaceTriangle::new([3, 0, 4], 1, 2));
        mesh.refresh_all_triangles();
        mesh
    }

    #[test]
    fn test_collapse_edge_keeps_junction_node() {
        let mut mesh = flat_fan();
        let mut adj = SurfaceAdjacency::build(&mesh);
        let survivor = collapse_edge(&mut mesh, &mut adj, 4, 0);

        assert_eq!(survivor, 0);
        assert!(mesh.nodes[4].killed);
        assert_eq!(mesh.nodes[0].position, Point3::new(0.5, 0.5, 0.0));
        // Triangles 0 and 3 contained both nodes and are now degenerate
        assert!(mesh.triangles[0].killed);
        assert!(mesh.triangles[3].killed);
        assert_eq!(mesh.triangles[1].nodes, [1, 2, 0]);
        assert_eq!(mesh.triangles[2].nodes, [2, 3, 0]);
        assert!(mesh.triangles[1].is_alive());
        assert!(adj.node_triangles[4].is_empty());
        assert_eq!(adj.node_triangles[0], vec![1, 2]);
    }

    #[test]
    fn test_collapse_edge_tie_keeps_first() {
        let mut mesh = flat_fan();
        let mut adj = SurfaceAdjacency::build(&mesh);
        let survivor = collapse_edge(&mut mesh, &mut adj, 1, 0);
        assert_eq!(survivor, 1);
        assert!(mesh.nodes[0].killed);
    }

    #[test]
    fn test_delete_triangles_flat_region() {
        let mut mesh = flat_fan();
        let mut adj = SurfaceAdjacency::build(&mesh);
        let removed = delete_triangles(&mut mesh, &mut adj, &RepairParams::default());
        assert!(removed >= 1);
        assert!(mesh.live_triangle_count() < 4);
        for (_, tri) in mesh.live_triangles() {
            assert!((tri.geometry.normal.norm() - 1.0).abs() < 1e-12);
            assert!(tri.geometry.area > 0.0);
        }
    }

    #[test]
    fn test_delete_triangles_keeps_folds() {
        let mut mesh = flat_fan();
        // Lift the centre so every neighbour pair is folded sharply
        mesh.nodes[4].position.z = 3.0;
        mesh.refresh_all_triangles();
        let mut adj = SurfaceAdjacency::build(&mesh);
        let removed = delete_triangles(&mut mesh, &mut adj, &RepairParams::default());
        assert_eq!(removed, 0);
        assert_eq!(mesh.live_triangle_count(), 4);
    }

    #[test]
    fn test_delete_triangles_keeps_isolated_triangle() {
        let mut mesh = SurfaceMesh::new(2);
        for p in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ] {
            mesh.nodes.push(Node::surface(p, 2));
        }
        mesh.triangles.push(SurfaceTriangle::new([0, 1, 2], 1, 2));
        mesh.refresh_all_triangles();
        let mut adj = SurfaceAdjacency::build(&mesh);
        assert_eq!(delete_triangles(&mut mesh, &mut adj, &RepairParams::default()), 0);
        assert!(mesh.triangles[0].is_alive());
    }

    #[test]
    fn test_delete_triangles_skips_edge_triangles() {
        let mut mesh = flat_fan();
        for tri in mesh.triangles.iter_mut() {
            tri.on_edge = true;
        }
        let mut adj = SurfaceAdjacency::build(&mesh);
        assert_eq!(delete_triangles(&mut mesh, &mut adj, &RepairParams::default()), 0);
    }

    #[test]
    fn test_near_colinear_triangle_is_collapsed() {
        let mut mesh = SurfaceMesh::new(3);
        for (p, g) in [
            (Point3::new(0.0, 0.0, 0.0), 2),
            (Point3::new(4.0, 0.0, 0.0), 2),
            (Point3::new(2.0, 1e-4, 0.0), 2),
            (Point3::new(2.0, 3.0, 0.0), 2),
            (Point3::new(2.0, -3.0, 1.0), 2),
        ] {
            mesh.nodes.push(Node::surface(p, g));
        }
        // Sliver between two well-shaped triangles folded against it
        mesh.triangles.push(SurfaceTriangle::new([0, 1, 2], 1, 2));
        mesh.triangles.push(SurfaceTriangle::new([0, 2, 3], 1, 2));
        mesh.triangles.push(SurfaceTriangle::new([1, 0, 4], 1, 2));
        mesh.refresh_all_triangles();
        assert!(mesh.triangles[0].is_alive());

        let mut adj = SurfaceAdjacency::build(&mesh);
        delete_triangles(&mut mesh, &mut adj, &RepairParams::default());
        assert!(mesh.triangles[0].killed);
    }

    #[test]
    fn test_smooth_nodes() {
        let mut mesh = flat_fan();
        mesh.nodes[4].position = Point3::new(1.5, 0.5, 0.0);
        for i in 0..4 {
            mesh.nodes[i].edge = true;
        }
        let adj = SurfaceAdjacency::build(&mesh);
        assert_eq!(smooth_nodes(&mut mesh, &adj), 1);
        assert_eq!(mesh.nodes[4].position, Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_clean_triangles_removes_slivers() {
        let mut mesh = flat_fan();
        for i in 0..4 {
            mesh.nodes[i].edge = true;
        }
        // Centre node almost on the bottom edge makes two slivers
        mesh.nodes[4].position = Point3::new(1.0, 0.05, 0.0);
        mesh.refresh_all_triangles();
        let mut adj = SurfaceAdjacency::build(&mesh);
        let mut params = RepairParams::default();
        params.max_clean_passes = 10;

        let summary = clean_triangles(&mut mesh, &mut adj, &params);
        // Smoothing recentres node 4, which removes the slivers
        assert_eq!(summary.smoothed_nodes, 1);
        assert_eq!(summary.collapsed_triangles, 0);
        assert_eq!(mesh.live_triangle_count(), 4);
    }

    #[test]
    fn test_clean_triangles_collapses_pinned_sliver() {
        let mut mesh = SurfaceMesh::new(2);
        for p in [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.0),
            Point3::new(2.0, 0.2, 0.0),
        ] {
            let mut node = Node::surface(p, 2);
            node.edge = true;
            mesh.nodes.push(node);
        }
        mesh.triangles.push(SurfaceTriangle::new([0, 1, 2], 1, 2));
        mesh.refresh_all_triangles();
        let mut adj = SurfaceAdjacency::build(&mesh);

        let summary = clean_triangles(&mut mesh, &mut adj, &RepairParams::default());
        assert_eq!(summary.smoothed_nodes, 0);
        assert_eq!(summary.collapsed_triangles, 1);
        assert!(mesh.triangles[0].killed);
        // The longest edge (0,1) is opposite the wide angle; a short one went
        assert_eq!(mesh.live_node_count(), 2);
    }
}
