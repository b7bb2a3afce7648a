//! Surface mesh inspection and reporting.

use hashbrown::HashMap;
use nalgebra::Point3;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::adjacency::SurfaceAdjacency;
use crate::types::{GrainId, NodeId, SurfaceMesh};

/// Inspection report for a grain-boundary surface mesh.
#[derive(Debug, Clone, Serialize)]
pub struct SurfaceReport {
    /// Total node count, including killed nodes.
    pub node_count: usize,

    /// Total triangle count, including killed triangles.
    pub triangle_count: usize,

    pub live_node_count: usize,
    pub live_triangle_count: usize,

    /// Declared number of grains.
    pub num_grains: u32,

    /// Grains bounded by at least one live triangle.
    pub populated_grains: usize,

    /// Triangles facing the exterior.
    pub edge_triangle_count: usize,

    /// Triangles with two or more triple-junction nodes.
    pub triple_triangle_count: usize,

    /// Edges used by a single triangle.
    pub open_edge_count: usize,

    /// Edges shared by more than two triangles (triple lines).
    pub junction_edge_count: usize,

    /// Grains whose boundary has an edge used an odd number of times.
    pub open_grains: Vec<GrainId>,

    /// Bounding box as (min_corner, max_corner).
    pub bounds: Option<(Point3<f64>, Point3<f64>)>,
}

impl SurfaceReport {
    /// Every grain boundary is closed.
    pub fn is_closed(&self) -> bool {
        self.open_grains.is_empty()
    }
}

impl std::fmt::Display for SurfaceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Surface Mesh Report:")?;
        writeln!(
            f,
            "  Nodes: {} ({} live)",
            self.node_count, self.live_node_count
        )?;
        writeln!(
            f,
            "  Triangles: {} ({} live, {} on edge, {} triple)",
            self.triangle_count,
            self.live_triangle_count,
            self.edge_triangle_count,
            self.triple_triangle_count
        )?;
        writeln!(
            f,
            "  Grains: {} ({} with boundary)",
            self.num_grains, self.populated_grains
        )?;

        if let Some((min, max)) = &self.bounds {
            writeln!(
                f,
                "  Bounds: [{:.1}, {:.1}, {:.1}] to [{:.1}, {:.1}, {:.1}]",
                min.x, min.y, min.z, max.x, max.y, max.z
            )?;
        }

        writeln!(f, "  Open edges: {}", self.open_edge_count)?;
        writeln!(f, "  Triple-line edges: {}", self.junction_edge_count)?;
        writeln!(
            f,
            "  Closed grains: {}",
            if self.is_closed() {
                "yes".to_string()
            } else {
                format!("NO ({} open)", self.open_grains.len())
            }
        )?;

        Ok(())
    }
}

/// Grains whose live triangles leave some edge used an odd number of times.
fn open_grains(mesh: &SurfaceMesh, adjacency: &SurfaceAdjacency) -> Vec<GrainId> {
    let mut open = Vec::new();
    for grain in 1..=mesh.num_grains {
        let mut uses: HashMap<(NodeId, NodeId), usize> = HashMap::new();
        for &t in adjacency.triangles_of_grain(grain) {
            let [a, b, c] = mesh.triangles[t as usize].nodes;
            for (u, v) in [(a, b), (b, c), (c, a)] {
                *uses.entry((u.min(v), u.max(v))).or_insert(0) += 1;
            }
        }
        if uses.values().any(|n| n % 2 == 1) {
            open.push(grain);
        }
    }
    open
}

/// Inspect a surface mesh and return a report.
pub fn inspect_surface(mesh: &SurfaceMesh) -> SurfaceReport {
    let adjacency = SurfaceAdjacency::build(mesh);
    let live = || mesh.live_triangles().map(|(_, t)| t);

    let report = SurfaceReport {
        node_count: mesh.node_count(),
        triangle_count: mesh.triangle_count(),
        live_node_count: mesh.live_node_count(),
        live_triangle_count: mesh.live_triangle_count(),
        num_grains: mesh.num_grains,
        populated_grains: (1..=mesh.num_grains)
            .filter(|g| !adjacency.triangles_of_grain(*g).is_empty())
            .count(),
        edge_triangle_count: live().filter(|t| t.on_edge).count(),
        triple_triangle_count: live().filter(|t| t.triple).count(),
        open_edge_count: adjacency.open_edges().count(),
        junction_edge_count: adjacency.junction_edges().count(),
        open_grains: open_grains(mesh, &adjacency),
        bounds: mesh.bounds(),
    };

    if !report.is_closed() {
        warn!(
            "{} grains have open boundaries: {:?}",
            report.open_grains.len(),
            report.open_grains
        );
    }
    info!(
        "Surface: {} nodes, {} triangles, {} grains",
        report.live_node_count, report.live_triangle_count, report.populated_grains
    );
    debug!("{}", report);

    report
}
