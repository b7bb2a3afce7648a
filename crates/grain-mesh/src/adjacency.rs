//! Surface topology queries via adjacency structures.

use hashbrown::HashMap;

use crate::types::{GrainId, NodeId, SurfaceMesh, TriangleId};

/// Node and grain adjacency for a surface mesh.
///
/// Every list is sorted and de-duplicated. Grain-indexed lists have
/// `num_grains + 1` entries; entry 0 collects edge triangles facing the
/// exterior.
#[derive(Debug, Clone, Default)]
pub struct SurfaceAdjacency {
    /// Node → live triangles using it.
    pub node_triangles: Vec<Vec<TriangleId>>,

    /// Node → nodes sharing a live triangle with it.
    pub node_neighbors: Vec<Vec<NodeId>>,

    /// Node → grains bounded by its live triangles.
    pub node_grains: Vec<Vec<GrainId>>,

    /// Grain → live triangles bounding it.
    pub grain_triangles: Vec<Vec<TriangleId>>,

    /// Grain → nodes of its live boundary triangles.
    pub grain_nodes: Vec<Vec<NodeId>>,

    /// Edge (min, max) → live triangles sharing it.
    pub edge_triangles: HashMap<(NodeId, NodeId), Vec<TriangleId>>,
}

impl SurfaceAdjacency {
    /// Build adjacency from the live triangles of `mesh`.
    pub fn build(mesh: &SurfaceMesh) -> Self {
        let nodes = mesh.node_count();
        let grains = mesh.num_grains as usize + 1;

        let mut adj = Self {
            node_triangles: vec![Vec::new(); nodes],
            node_neighbors: vec![Vec::new(); nodes],
            node_grains: vec![Vec::new(); nodes],
            grain_triangles: vec![Vec::new(); grains],
            grain_nodes: vec![Vec::new(); grains],
            edge_triangles: HashMap::new(),
        };

        for (id, tri) in mesh.live_triangles() {
            let [a, b, c] = tri.nodes;
            for grain in [tri.left_grain, tri.right_grain] {
                let g = grain as usize;
                adj.grain_triangles[g].push(id);
                adj.grain_nodes[g].extend_from_slice(&tri.nodes);
            }
            for &n in &tri.nodes {
                let n = n as usize;
                adj.node_triangles[n].push(id);
                adj.node_grains[n].push(tri.left_grain);
                adj.node_grains[n].push(tri.right_grain);
            }
            adj.node_neighbors[a as usize].extend_from_slice(&[b, c]);
            adj.node_neighbors[b as usize].extend_from_slice(&[a, c]);
            adj.node_neighbors[c as usize].extend_from_slice(&[a, b]);

            for (u, v) in [(a, b), (b, c), (c, a)] {
                let key = if u < v { (u, v) } else { (v, u) };
                adj.edge_triangles.entry(key).or_default().push(id);
            }
        }

        for list in adj
            .node_triangles
            .iter_mut()
            .chain(adj.node_neighbors.iter_mut())
            .chain(adj.node_grains.iter_mut())
            .chain(adj.grain_triangles.iter_mut())
            .chain(adj.grain_nodes.iter_mut())
        {
            sort_unique(list);
        }

        adj
    }

    /// Grains bounded by the node's triangles.
    #[inline]
    pub fn grains_of(&self, node: NodeId) -> &[GrainId] {
        &self.node_grains[node as usize]
    }

    /// Triangles bounding a grain.
    #[inline]
    pub fn triangles_of_grain(&self, grain: GrainId) -> &[TriangleId] {
        self.grain_triangles
            .get(grain as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Nodes on a grain's boundary.
    #[inline]
    pub fn nodes_of_grain(&self, grain: GrainId) -> &[NodeId] {
        self.grain_nodes
            .get(grain as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Edges used by exactly one live triangle.
    pub fn open_edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.edge_triangles
            .iter()
            .filter(|(_, tris)| tris.len() == 1)
            .map(|(&edge, _)| edge)
    }

    /// Edges shared by more than two live triangles (grain junction lines).
    pub fn junction_edges(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.edge_triangles
            .iter()
            .filter(|(_, tris)| tris.len() > 2)
            .map(|(&edge, _)| edge)
    }

    /// Re-target node `from` onto `to` after an edge collapse.
    ///
    /// `to` inherits the triangle, neighbour and grain lists of `from`, which
    /// are emptied.
    pub fn merge_node(&mut self, from: NodeId, to: NodeId) {
        let (f, t) = (from as usize, to as usize);

        let tris = std::mem::take(&mut self.node_triangles[f]);
        self.node_triangles[t].extend(tris);
        sort_unique(&mut self.node_triangles[t]);

        let neighbors = std::mem::take(&mut self.node_neighbors[f]);
        for &n in &neighbors {
            let list = &mut self.node_neighbors[n as usize];
            for entry in list.iter_mut() {
                if *entry == from {
                    *entry = to;
                }
            }
            sort_unique(list);
        }
        self.node_neighbors[t].extend(neighbors);
        self.node_neighbors[t].retain(|&n| n != from && n != to);
        sort_unique(&mut self.node_neighbors[t]);

        let grains = std::mem::take(&mut self.node_grains[f]);
        self.node_grains[t].extend(grains);
        sort_unique(&mut self.node_grains[t]);
    }
}

pub(crate) fn sort_unique<T: Ord>(list: &mut Vec<T>) {
    list.sort_unstable();
    list.dedup();
}

/// Whether two sorted membership lists share an entry.
pub(crate) fn share_any(a: &[GrainId], b: &[GrainId]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}
