//! Edge-collapse improvement of badly shaped tetrahedra.

use tracing::{info, warn};

use crate::adjacency::sort_unique;
use crate::config::PipelineConfig;
use crate::geometry::{shortest_tet_edge, tet_edge_lengths, TET_EDGES};
use crate::quality::orient_and_measure;
use crate::tetmesh::{TetId, VolumeMesh};
use crate::types::NodeId;

/// Dihedral bounds and pass limit for [`improve_mesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImproveParams {
    pub min_dihedral: f64,
    pub max_dihedral: f64,
    pub max_passes: usize,
}

impl Default for ImproveParams {
    fn default() -> Self {
        Self {
            min_dihedral: 10.0,
            max_dihedral: 170.0,
            max_passes: 100,
        }
    }
}

impl From<&PipelineConfig> for ImproveParams {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            min_dihedral: config.dihedral_bounds[0],
            max_dihedral: config.dihedral_bounds[1],
            max_passes: config.max_improve_passes,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImproveSummary {
    pub passes: usize,
    pub collapsed_edges: usize,
}

impl ImproveParams {
    fn accepts(&self, angles: &[f64; 6]) -> bool {
        angles
            .iter()
            .all(|a| *a >= self.min_dihedral && *a <= self.max_dihedral)
    }
}

/// Merge node `drop` into `keep` at their midpoint and re-link tets.
///
/// Tets that end up with a repeated node are killed; the rest touching
/// `keep` are re-measured.
fn collapse_tet_edge(
    volume: &mut VolumeMesh,
    node_tets: &mut [Vec<TetId>],
    keep: NodeId,
    drop: NodeId,
) {
    let (k, d) = (keep as usize, drop as usize);
    let midpoint = nalgebra::center(&volume.nodes[k].position, &volume.nodes[d].position);
    volume.nodes[k].position = midpoint;
    volume.nodes[k].edge |= volume.nodes[d].edge;
    volume.nodes[k].surface |= volume.nodes[d].surface;
    volume.nodes[d].killed = true;

    let extra = std::mem::take(&mut volume.memberships[d]);
    volume.memberships[k].extend(extra);
    sort_unique(&mut volume.memberships[k]);

    let moved = std::mem::take(&mut node_tets[d]);
    for u in moved {
        let tet = &mut volume.tets[u as usize];
        if tet.killed {
            continue;
        }
        for n in tet.nodes.iter_mut() {
            if *n == drop {
                *n = keep;
            }
        }
        if tet.has_repeated_node() {
            tet.killed = true;
        } else {
            node_tets[k].push(u);
        }
    }
    sort_unique(&mut node_tets[k]);
    node_tets[k].retain(|u| !volume.tets[*u as usize].killed);

    for u in node_tets[k].clone() {
        orient_and_measure(volume, u as usize);
    }
}

/// Collapse the shortest edge of every tet with a dihedral angle out of
/// bounds, repeating until a pass makes no change.
pub fn improve_mesh(volume: &mut VolumeMesh, params: ImproveParams) -> ImproveSummary {
    let mut summary = ImproveSummary::default();
    let mut node_tets = volume.node_tets();

    for t in 0..volume.tets.len() {
        if volume.tets[t].is_alive() && volume.tets[t].measure.is_none() {
            orient_and_measure(volume, t);
        }
    }

    loop {
        if summary.passes >= params.max_passes {
            warn!(
                "Stopped improving after {} passes with tetrahedra still out of bounds",
                summary.passes
            );
            break;
        }
        summary.passes += 1;

        let mut collapsed = 0;
        for t in 0..volume.tets.len() {
            let tet = &volume.tets[t];
            if tet.killed {
                continue;
            }
            let lengths = match &tet.measure {
                Some(m) if params.accepts(&m.dihedral_angles) => continue,
                Some(m) => m.edge_lengths,
                None => tet_edge_lengths(&volume.tet_points(tet)),
            };
            let (i, j) = TET_EDGES[shortest_tet_edge(&lengths)];
            let (a, b) = (tet.nodes[i], tet.nodes[j]);
            let (keep, drop) =
                if volume.nodes[b as usize].numgrains > volume.nodes[a as usize].numgrains {
                    (b, a)
                } else {
                    (a, b)
                };
            collapse_tet_edge(volume, &mut node_tets, keep, drop);
            collapsed += 1;
        }

        summary.collapsed_edges += collapsed;
        if collapsed == 0 {
            break;
        }
    }

    volume.refresh_tet_flags();
    info!(
        "Improved mesh: {} edges collapsed in {} passes, {} tetrahedra left",
        summary.collapsed_edges,
        summary.passes,
        volume.live_tet_count()
    );
    summary
}
