//! Grain assignment of tessellated tetrahedra.
//!
//! A tetrahedron belongs to the grain that all four of its nodes are
//! members of. Before voting, edges joining nodes of two different
//! single-grain interiors are repaired by snapping one endpoint onto the
//! grain boundary the edge crosses.

use tracing::{debug, info, warn};

use crate::adjacency::{share_any, sort_unique, SurfaceAdjacency};
use crate::geometry::{segment_triangle_intersection, TET_EDGES};
use crate::tetmesh::{Classification, TetId, Tetrahedron, VolumeMesh};
use crate::types::{GrainId, NodeId, SurfaceMesh, EXTERIOR};

/// Counts from one tessellate/classify cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub tets: usize,
    pub degenerate: usize,
    pub snapped: usize,
    pub resolved_on_second_pass: usize,
    pub unresolved: usize,
}

/// The grain every membership list contains, highest id on a tie.
///
/// The exterior never wins.
pub fn vote(memberships: [&[GrainId]; 4]) -> Option<GrainId> {
    let [first, rest @ ..] = memberships;
    first
        .iter()
        .copied()
        .filter(|g| *g != EXTERIOR)
        .filter(|g| rest.iter().all(|m| m.binary_search(g).is_ok()))
        .max()
}

fn vote_tet(volume: &VolumeMesh, tet: &Tetrahedron) -> Option<GrainId> {
    let [a, b, c, d] = tet.nodes.map(|n| volume.memberships[n as usize].as_slice());
    vote([a, b, c, d])
}

/// Snap interior nodes of the tet's cross-grain edges onto the boundary.
///
/// Returns the number of nodes moved.
pub fn repair_tet(
    volume: &mut VolumeMesh,
    surface: &SurfaceMesh,
    adjacency: &SurfaceAdjacency,
    nodes: [NodeId; 4],
) -> usize {
    let mut snapped = 0;
    for (i, j) in TET_EDGES {
        let (first, second) = (nodes[i], nodes[j]);
        let mf = &volume.memberships[first as usize];
        let ms = &volume.memberships[second as usize];
        if mf.len() != 1 || ms.len() != 1 || share_any(mf, ms) {
            continue;
        }
        let grain = mf[0];
        if grain == EXTERIOR {
            continue;
        }

        let from = volume.position(first);
        let to = volume.position(second);
        let hit = adjacency
            .triangles_of_grain(grain)
            .iter()
            .map(|t| &surface.triangles[*t as usize])
            .filter(|tri| tri.is_alive())
            .find_map(|tri| {
                let pts = surface.points(tri.left_winding());
                segment_triangle_intersection(&from, &to, &pts, &tri.geometry.normal)
            });
        let Some(hit) = hit else {
            continue;
        };

        let (moved, other) = if hit.r <= 0.5 {
            (first, second)
        } else {
            (second, first)
        };
        volume.nodes[moved as usize].position = hit.point;
        let extra = volume.memberships[other as usize].clone();
        let list = &mut volume.memberships[moved as usize];
        list.extend(extra);
        sort_unique(list);
        snapped += 1;
    }
    snapped
}

/// Replace the volume mesh's tetrahedra with `records` and classify them.
///
/// Repair runs when `repair` is set. Every tet is voted on in order, then
/// unresolved tets are voted on again once all snaps are done. Tets still
/// unresolved are numbered from zero.
pub fn classify_cycle(
    volume: &mut VolumeMesh,
    surface: &SurfaceMesh,
    adjacency: &SurfaceAdjacency,
    records: &[[NodeId; 4]],
    repair: bool,
) -> CycleSummary {
    let mut summary = CycleSummary::default();
    volume.tets.clear();
    for nodes in records {
        let tet = Tetrahedron::new(*nodes);
        if tet.has_repeated_node() {
            summary.degenerate += 1;
            continue;
        }
        volume.tets.push(tet);
    }
    if summary.degenerate > 0 {
        warn!("Skipped {} degenerate tetrahedra", summary.degenerate);
    }
    summary.tets = volume.tets.len();

    let mut pending = Vec::new();
    for t in 0..volume.tets.len() {
        if repair {
            let nodes = volume.tets[t].nodes;
            summary.snapped += repair_tet(volume, surface, adjacency, nodes);
        }
        let verdict = vote_tet(volume, &volume.tets[t]);
        match verdict {
            Some(grain) => volume.tets[t].class = Classification::Grain(grain),
            None => pending.push(t),
        }
    }

    let mut ordinal = 0;
    for t in pending {
        let verdict = vote_tet(volume, &volume.tets[t]);
        match verdict {
            Some(grain) => {
                volume.tets[t].class = Classification::Grain(grain);
                summary.resolved_on_second_pass += 1;
            }
            None => {
                volume.tets[t].class = Classification::Unresolved { ordinal };
                ordinal += 1;
            }
        }
    }
    summary.unresolved = ordinal as usize;

    volume.refresh_tet_flags();
    info!(
        "Classified {} tetrahedra: {} snapped nodes, {} unresolved",
        summary.tets, summary.snapped, summary.unresolved
    );
    if summary.unresolved > 0 {
        warn!("{} tetrahedra have no owning grain", summary.unresolved);
    }
    summary
}

/// Collapse each unresolved tet onto its node with the most grains.
///
/// The other three nodes are killed. Tets sharing two or more of the four
/// nodes are killed, tets sharing one are re-linked to the survivor.
/// Returns the number of collapsed tets.
pub fn collapse_unresolved(volume: &mut VolumeMesh) -> usize {
    let mut node_tets = volume.node_tets();
    let targets: Vec<TetId> = volume
        .live_tets()
        .filter(|(_, t)| t.class.is_unresolved())
        .map(|(id, _)| id)
        .collect();

    let mut collapsed = 0;
    for t in targets {
        let tet = &volume.tets[t as usize];
        if tet.killed || tet.nodes.iter().any(|n| volume.nodes[*n as usize].killed) {
            continue;
        }
        let quad = tet.nodes;
        let mut survivor = quad[0];
        for &n in &quad[1..] {
            if volume.memberships[n as usize].len() > volume.memberships[survivor as usize].len() {
                survivor = n;
            }
        }
        let victims: Vec<NodeId> = quad.iter().copied().filter(|n| *n != survivor).collect();

        let mut touching: Vec<TetId> = victims
            .iter()
            .flat_map(|v| node_tets[*v as usize].iter().copied())
            .collect();
        sort_unique(&mut touching);

        for u in touching {
            let other = &mut volume.tets[u as usize];
            if other.killed {
                continue;
            }
            match other.count_in(&quad) {
                0 => {}
                1 => {
                    for n in other.nodes.iter_mut() {
                        if victims.contains(n) {
                            *n = survivor;
                        }
                    }
                    node_tets[survivor as usize].push(u);
                }
                _ => other.killed = true,
            }
        }
        for v in victims {
            volume.nodes[v as usize].killed = true;
            node_tets[v as usize].clear();
        }
        collapsed += 1;
    }

    if collapsed > 0 {
        volume.refresh_tet_flags();
        info!("Collapsed {} unresolved tetrahedra", collapsed);
    }
    debug!("{} live tetrahedra after collapse", volume.live_tet_count());
    collapsed
}
