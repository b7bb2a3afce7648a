//! Tetrahedral volume mesh types.

use nalgebra::Point3;
use serde::Serialize;
use tracing::warn;

use crate::adjacency::SurfaceAdjacency;
use crate::geometry::TetMeasure;
use crate::types::{GrainId, Node, NodeId, SurfaceMesh};

/// Index of a tetrahedron.
pub type TetId = u32;

/// Grain assignment of a tetrahedron.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Classification {
    /// Not yet voted on.
    Unclassified,
    /// All four nodes agree on this grain.
    Grain(GrainId),
    /// No grain reached a full vote. `ordinal` counts unresolved tets from 0.
    Unresolved { ordinal: u32 },
}

impl Classification {
    #[inline]
    pub fn grain(&self) -> Option<GrainId> {
        match self {
            Classification::Grain(g) => Some(*g),
            _ => None,
        }
    }

    #[inline]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Classification::Unresolved { .. })
    }

    /// Integer label written to output files: the grain id, or a negative
    /// sentinel (-1, -2, ...) for unresolved tets.
    pub fn vtk_id(&self) -> i64 {
        match self {
            Classification::Unclassified => 0,
            Classification::Grain(g) => i64::from(*g),
            Classification::Unresolved { ordinal } => -(i64::from(*ordinal) + 1),
        }
    }
}

/// A tetrahedral element.
#[derive(Debug, Clone, PartialEq)]
pub struct Tetrahedron {
    pub nodes: [NodeId; 4],
    pub class: Classification,
    pub killed: bool,
    /// Any node lies on the domain boundary.
    pub on_edge: bool,
    /// Number of nodes taken from the original surface mesh.
    pub original_node_count: u8,
    /// Dihedral angles, edge lengths and volume, set by quality analysis.
    pub measure: Option<TetMeasure>,
}

impl Tetrahedron {
    pub fn new(nodes: [NodeId; 4]) -> Self {
        Self {
            nodes,
            class: Classification::Unclassified,
            killed: false,
            on_edge: false,
            original_node_count: 0,
            measure: None,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.killed
    }

    /// True if the four node ids are not all distinct.
    pub fn has_repeated_node(&self) -> bool {
        let n = &self.nodes;
        (0..4).any(|i| (i + 1..4).any(|j| n[i] == n[j]))
    }

    /// How many of this tet's nodes appear in `set`.
    pub fn count_in(&self, set: &[NodeId]) -> usize {
        self.nodes.iter().filter(|n| set.contains(n)).count()
    }
}

/// Nodes, grain memberships and tetrahedra of the volume mesh.
///
/// Node ids `0..surface_node_count` coincide with the compacted surface
/// mesh, seeded nodes follow.
#[derive(Debug, Clone, Default)]
pub struct VolumeMesh {
    pub nodes: Vec<Node>,
    /// Sorted grain ids each node belongs to.
    pub memberships: Vec<Vec<GrainId>>,
    pub tets: Vec<Tetrahedron>,
    pub surface_node_count: usize,
}

impl VolumeMesh {
    /// Start a volume mesh from a compacted surface mesh.
    pub fn from_surface(mesh: &SurfaceMesh, adjacency: &SurfaceAdjacency) -> Self {
        Self {
            nodes: mesh.nodes.clone(),
            memberships: adjacency.node_grains.clone(),
            tets: Vec::new(),
            surface_node_count: mesh.nodes.len(),
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Append a node seeded inside `grain`.
    pub fn add_seed(&mut self, position: Point3<f64>, grain: GrainId) -> NodeId {
        self.nodes.push(Node::seeded(position, grain));
        self.memberships.push(vec![grain]);
        (self.nodes.len() - 1) as NodeId
    }

    /// Number of seeded nodes owned by `grain`.
    pub fn seeded_count(&self, grain: GrainId) -> usize {
        self.nodes[self.surface_node_count..]
            .iter()
            .filter(|n| n.grain == grain && n.is_alive())
            .count()
    }

    #[inline]
    pub fn position(&self, node: NodeId) -> Point3<f64> {
        self.nodes[node as usize].position
    }

    pub fn tet_points(&self, tet: &Tetrahedron) -> [Point3<f64>; 4] {
        tet.nodes.map(|n| self.position(n))
    }

    pub fn live_tets(&self) -> impl Iterator<Item = (TetId, &Tetrahedron)> + '_ {
        self.tets
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_alive())
            .map(|(i, t)| (i as TetId, t))
    }

    pub fn live_tet_count(&self) -> usize {
        self.tets.iter().filter(|t| t.is_alive()).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.live_tets()
            .filter(|(_, t)| t.class.is_unresolved())
            .count()
    }

    /// Node → live tetrahedra incident on it.
    pub fn node_tets(&self) -> Vec<Vec<TetId>> {
        let mut map = vec![Vec::new(); self.nodes.len()];
        for (id, tet) in self.live_tets() {
            for n in tet.nodes {
                map[n as usize].push(id);
            }
        }
        for list in map.iter_mut() {
            list.dedup();
        }
        map
    }

    /// Set per-tet flags derived from node attributes.
    pub fn refresh_tet_flags(&mut self) {
        for tet in self.tets.iter_mut() {
            tet.on_edge = tet.nodes.iter().any(|n| self.nodes[*n as usize].edge);
            tet.original_node_count = tet
                .nodes
                .iter()
                .filter(|n| self.nodes[**n as usize].surface)
                .count() as u8;
        }
    }

    /// Dense copy without killed nodes or tetrahedra.
    ///
    /// Each kept node records its new index in `final_number`. Live tets that
    /// still reference a killed node are dropped.
    pub fn compacted(&self) -> VolumeMesh {
        let mut remap = vec![None; self.nodes.len()];
        let mut out = VolumeMesh::default();

        for (i, node) in self.nodes.iter().enumerate() {
            if node.killed {
                continue;
            }
            let new_id = out.nodes.len() as NodeId;
            remap[i] = Some(new_id);
            let mut node = node.clone();
            node.final_number = Some(new_id);
            out.nodes.push(node);
            out.memberships.push(self.memberships[i].clone());
            if i < self.surface_node_count {
                out.surface_node_count += 1;
            }
        }

        let mut dropped = 0;
        for (_, tet) in self.live_tets() {
            let mapped: Option<Vec<NodeId>> =
                tet.nodes.iter().map(|n| remap[*n as usize]).collect();
            match mapped {
                Some(ids) => {
                    let mut copy = tet.clone();
                    copy.nodes = [ids[0], ids[1], ids[2], ids[3]];
                    out.tets.push(copy);
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            warn!("Dropped {} tetrahedra referencing removed nodes", dropped);
        }

        out
    }
}
