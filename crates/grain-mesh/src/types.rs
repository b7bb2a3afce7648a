//! Core surface mesh data types.

use nalgebra::{Point3, Vector3};

use crate::geometry::TriangleGeometry;

/// Index of a node in a node arena.
pub type NodeId = u32;

/// Index of a triangle in a triangle arena.
pub type TriangleId = u32;

/// Grain label. Zero is reserved for the exterior.
pub type GrainId = u32;

/// The reserved "outside the domain" grain id.
pub const EXTERIOR: GrainId = 0;

/// A mesh node.
///
/// Surface nodes come from the input file; seeded nodes are created inside
/// a single grain during interior point seeding.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub position: Point3<f64>,

    /// Number of grains meeting at this node (1 for grain interior).
    pub numgrains: u32,

    /// Tombstone flag. Killed nodes stay in the arena until compaction.
    pub killed: bool,

    /// True where three or more grains meet.
    pub triple: bool,

    /// True if the node lies on the domain boundary.
    pub edge: bool,

    /// True for nodes of the original surface mesh.
    pub surface: bool,

    /// Owning grain of a seeded node, [`EXTERIOR`] for surface nodes.
    pub grain: GrainId,

    /// Dense index assigned by compaction.
    pub final_number: Option<u32>,
}

impl Node {
    /// Create a surface node read from the input.
    pub fn surface(position: Point3<f64>, numgrains: u32) -> Self {
        Self {
            position,
            numgrains,
            killed: false,
            triple: numgrains > 2,
            edge: false,
            surface: true,
            grain: EXTERIOR,
            final_number: None,
        }
    }

    /// Create an interior node seeded inside `grain`.
    pub fn seeded(position: Point3<f64>, grain: GrainId) -> Self {
        Self {
            position,
            numgrains: 1,
            killed: false,
            triple: false,
            edge: false,
            surface: false,
            grain,
            final_number: None,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.killed
    }
}

/// A grain-boundary triangle.
///
/// The same facet bounds two grains with opposite orientation: the stored
/// node order is the left-grain winding, the right-grain winding swaps the
/// last two nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceTriangle {
    /// Left-grain winding (n1, n2, n3).
    pub nodes: [NodeId; 3],
    pub left_grain: GrainId,
    pub right_grain: GrainId,
    /// Geometry of the left-grain winding.
    pub geometry: TriangleGeometry,
    pub killed: bool,
    /// One of the adjacent grains was outside the domain in the input.
    pub on_edge: bool,
    /// At least two of the nodes are triple-junction nodes.
    pub triple: bool,
    /// Mean fold angle against same-boundary neighbours, set by decimation.
    pub avg_misorientation: f64,
    /// Signed volume contribution toward the left grain's centroid.
    pub left_volume: f64,
    /// Signed volume contribution toward the right grain's centroid.
    pub right_volume: f64,
    /// Dense index assigned by compaction.
    pub final_number: Option<u32>,
}

impl SurfaceTriangle {
    pub fn new(nodes: [NodeId; 3], left_grain: GrainId, right_grain: GrainId) -> Self {
        Self {
            nodes,
            left_grain,
            right_grain,
            geometry: TriangleGeometry::empty(),
            killed: false,
            on_edge: false,
            triple: false,
            avg_misorientation: 0.0,
            left_volume: 0.0,
            right_volume: 0.0,
            final_number: None,
        }
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.killed
    }

    /// Left-grain winding (n1, n2, n3).
    #[inline]
    pub fn left_winding(&self) -> [NodeId; 3] {
        self.nodes
    }

    /// Right-grain winding (n1, n3, n2).
    #[inline]
    pub fn right_winding(&self) -> [NodeId; 3] {
        [self.nodes[0], self.nodes[2], self.nodes[1]]
    }

    /// Winding whose normal faces into `grain`, if the triangle bounds it.
    pub fn winding_for(&self, grain: GrainId) -> Option<[NodeId; 3]> {
        if self.left_grain == grain {
            Some(self.left_winding())
        } else if self.right_grain == grain {
            Some(self.right_winding())
        } else {
            None
        }
    }

    /// Unordered grain pair, smaller id first.
    #[inline]
    pub fn grain_pair(&self) -> (GrainId, GrainId) {
        if self.left_grain <= self.right_grain {
            (self.left_grain, self.right_grain)
        } else {
            (self.right_grain, self.left_grain)
        }
    }

    #[inline]
    pub fn bounds_grain(&self, grain: GrainId) -> bool {
        self.left_grain == grain || self.right_grain == grain
    }

    #[inline]
    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    #[inline]
    pub fn shares_node_with(&self, other: &SurfaceTriangle) -> bool {
        self.nodes.iter().any(|n| other.contains_node(*n))
    }

    /// Replace every occurrence of `from` with `to`. Returns true if changed.
    pub fn replace_node(&mut self, from: NodeId, to: NodeId) -> bool {
        let mut changed = false;
        for n in self.nodes.iter_mut() {
            if *n == from {
                *n = to;
                changed = true;
            }
        }
        changed
    }

    /// True if any node appears twice.
    #[inline]
    pub fn has_repeated_node(&self) -> bool {
        let [a, b, c] = self.nodes;
        a == b || b == c || a == c
    }
}

/// Axis-aligned simulation domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Domain {
    pub origin: Point3<f64>,
    pub dims: Vector3<f64>,
}

impl Domain {
    /// Tolerance used when deciding if a coordinate sits on a domain face.
    pub const FACE_TOLERANCE: f64 = 1e-9;

    pub fn new(origin: Point3<f64>, dims: Vector3<f64>) -> Self {
        Self { origin, dims }
    }

    #[inline]
    pub fn max(&self) -> Point3<f64> {
        self.origin + self.dims
    }

    /// Whether coordinate `axis` of `p` lies on the low or high domain face.
    pub fn on_face_along(&self, p: &Point3<f64>, axis: usize) -> bool {
        let max = self.max();
        (p[axis] - self.origin[axis]).abs() <= Self::FACE_TOLERANCE
            || (p[axis] - max[axis]).abs() <= Self::FACE_TOLERANCE
    }

    /// Whether `p` lies on any face of the domain box.
    pub fn on_face(&self, p: &Point3<f64>) -> bool {
        (0..3).any(|axis| self.on_face_along(p, axis))
    }

    /// Whether `p` lies inside the closed domain box.
    pub fn contains(&self, p: &Point3<f64>) -> bool {
        let max = self.max();
        (0..3).all(|axis| {
            p[axis] >= self.origin[axis] - Self::FACE_TOLERANCE
                && p[axis] <= max[axis] + Self::FACE_TOLERANCE
        })
    }
}

/// A grain-boundary surface mesh stored as tombstoned arenas.
#[derive(Debug, Clone, Default)]
pub struct SurfaceMesh {
    pub nodes: Vec<Node>,
    pub triangles: Vec<SurfaceTriangle>,
    /// Highest grain id; grains are labelled 1..=num_grains.
    pub num_grains: u32,
}

impl SurfaceMesh {
    pub fn new(num_grains: u32) -> Self {
        Self {
            nodes: Vec::new(),
            triangles: Vec::new(),
            num_grains,
        }
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_alive()).count()
    }

    pub fn live_triangle_count(&self) -> usize {
        self.triangles.iter().filter(|t| t.is_alive()).count()
    }

    /// Iterate live triangles with their ids.
    pub fn live_triangles(&self) -> impl Iterator<Item = (TriangleId, &SurfaceTriangle)> + '_ {
        self.triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_alive())
            .map(|(i, t)| (i as TriangleId, t))
    }

    /// Iterate live nodes with their ids.
    pub fn live_nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_alive())
            .map(|(i, n)| (i as NodeId, n))
    }

    #[inline]
    pub fn position(&self, node: NodeId) -> Point3<f64> {
        self.nodes[node as usize].position
    }

    /// Positions of a winding's three nodes.
    pub fn points(&self, winding: [NodeId; 3]) -> [Point3<f64>; 3] {
        winding.map(|n| self.position(n))
    }

    /// Recompute a triangle's geometry from its current node positions.
    ///
    /// A triangle that has become degenerate is killed. Returns whether the
    /// triangle is still alive.
    pub fn refresh_triangle(&mut self, id: TriangleId) -> bool {
        let [a, b, c] = self.points(self.triangles[id as usize].nodes);
        let tri = &mut self.triangles[id as usize];
        if tri.killed {
            return false;
        }
        if tri.has_repeated_node() {
            tri.killed = true;
            return false;
        }
        match TriangleGeometry::compute(&a, &b, &c) {
            Some(geometry) => {
                tri.geometry = geometry;
                true
            }
            None => {
                tri.killed = true;
                false
            }
        }
    }

    /// Recompute geometry of every live triangle. Returns the number killed.
    pub fn refresh_all_triangles(&mut self) -> usize {
        let mut killed = 0;
        for id in 0..self.triangles.len() {
            if self.triangles[id].is_alive() && !self.refresh_triangle(id as TriangleId) {
                killed += 1;
            }
        }
        killed
    }

    /// Mean area of live triangles, or zero for an empty mesh.
    pub fn mean_triangle_area(&self) -> f64 {
        let (sum, count) = self
            .live_triangles()
            .fold((0.0, 0usize), |(s, c), (_, t)| (s + t.geometry.area, c + 1));
        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }

    /// Bounding box of live nodes.
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut iter = self.live_nodes();
        let (_, first) = iter.next()?;
        let mut min = first.position;
        let mut max = first.position;
        for (_, node) in iter {
            let p = &node.position;
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some((min, max))
    }

    /// Flag nodes on the domain boundary or on an edge triangle.
    ///
    /// Returns the number of edge nodes.
    pub fn mark_edge_nodes(&mut self, domain: &Domain) -> usize {
        for node in self.nodes.iter_mut() {
            node.edge = node.is_alive() && domain.on_face(&node.position);
        }
        for t in 0..self.triangles.len() {
            let tri = &self.triangles[t];
            if tri.is_alive() && tri.on_edge {
                for n in tri.nodes {
                    self.nodes[n as usize].edge = true;
                }
            }
        }
        self.nodes.iter().filter(|n| n.is_alive() && n.edge).count()
    }

    /// Flag triangles with two or more triple-junction nodes.
    pub fn mark_triple_triangles(&mut self) {
        for t in 0..self.triangles.len() {
            let count = self.triangles[t]
                .nodes
                .iter()
                .filter(|n| self.nodes[**n as usize].triple)
                .count();
            self.triangles[t].triple = count >= 2;
        }
    }
}
