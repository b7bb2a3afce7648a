//! Geometry kernel shared by every meshing stage.
//!
//! All functions are pure. Angles are returned in degrees.

use nalgebra::{Point3, Vector3};

/// Vertex pairs for the six edges of a tetrahedron, in output order.
pub const TET_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Face pairs for the six dihedral angles of a tetrahedron, in output order.
const DIHEDRAL_PAIRS: [(usize, usize); 6] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Angle between two unit vectors, clamped so rounding never yields NaN.
#[inline]
pub fn angle_between_unit(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    a.dot(b).clamp(-1.0, 1.0).acos().to_degrees()
}

/// Interior angle at `at` formed with `a` and `b`.
///
/// Returns `None` when either edge has zero length.
pub fn face_angle(at: &Point3<f64>, a: &Point3<f64>, b: &Point3<f64>) -> Option<f64> {
    let ea = (a - at).try_normalize(0.0)?;
    let eb = (b - at).try_normalize(0.0)?;
    Some(angle_between_unit(&ea, &eb))
}

/// Derived geometry of a surface triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriangleGeometry {
    /// Unit normal of the (n1, n2, n3) winding.
    pub normal: Vector3<f64>,
    /// Plane constant with `normal · x == d` on the triangle.
    pub d: f64,
    pub area: f64,
    /// Lengths of (n1,n2), (n1,n3), (n2,n3).
    pub edge_lengths: [f64; 3],
    pub avg_edge_length: f64,
    pub max_edge_length: f64,
    pub centroid: Point3<f64>,
    /// Interior angles at n1, n2, n3.
    pub angles: [f64; 3],
}

impl TriangleGeometry {
    /// Placeholder geometry for a triangle that has not been measured.
    pub fn empty() -> Self {
        Self {
            normal: Vector3::zeros(),
            d: 0.0,
            area: 0.0,
            edge_lengths: [0.0; 3],
            avg_edge_length: 0.0,
            max_edge_length: 0.0,
            centroid: Point3::origin(),
            angles: [0.0; 3],
        }
    }

    /// Compute the geometry of the triangle (p1, p2, p3).
    ///
    /// Returns `None` for a zero-area or non-finite triangle.
    pub fn compute(p1: &Point3<f64>, p2: &Point3<f64>, p3: &Point3<f64>) -> Option<Self> {
        let cross = (p2 - p1).cross(&(p3 - p1));
        let len = cross.norm();
        if !(len > 0.0 && len.is_finite()) {
            return None;
        }
        let normal = cross / len;
        let edge_lengths = [(p2 - p1).norm(), (p3 - p1).norm(), (p3 - p2).norm()];
        let angles = [
            face_angle(p1, p2, p3)?,
            face_angle(p2, p1, p3)?,
            face_angle(p3, p1, p2)?,
        ];

        Some(Self {
            normal,
            d: normal.dot(&p1.coords),
            area: len / 2.0,
            edge_lengths,
            avg_edge_length: edge_lengths.iter().sum::<f64>() / 3.0,
            max_edge_length: edge_lengths.iter().copied().fold(0.0, f64::max),
            centroid: Point3::from((p1.coords + p2.coords + p3.coords) / 3.0),
            angles,
        })
    }

    /// Index (0..3) of the smallest interior angle.
    pub fn smallest_angle(&self) -> usize {
        let mut best = 0;
        for i in 1..3 {
            if self.angles[i] < self.angles[best] {
                best = i;
            }
        }
        best
    }
}

/// Signed volume of the tetrahedron formed by a wound triangle and an apex.
///
/// Positive when the winding's normal points toward `apex`.
pub fn signed_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>, apex: &Point3<f64>) -> f64 {
    let a1 = b - a;
    let a2 = c - b;
    let a3 = apex - c;
    a1.dot(&a2.cross(&a3)) / 6.0
}

/// Unsigned volume of a tetrahedron.
pub fn tet_volume(p: &[Point3<f64>; 4]) -> f64 {
    let a = p[0] - p[1];
    let b = p[1] - p[2];
    let c = p[2] - p[3];
    (a.dot(&b.cross(&c)) / 6.0).abs()
}

/// Whether the tetrahedron's node order is negatively oriented.
pub fn tet_is_inverted(p: &[Point3<f64>; 4]) -> bool {
    (p[0] - p[1]).cross(&(p[0] - p[2])).dot(&(p[0] - p[3])) < 0.0
}

/// Lengths of the six tetrahedron edges in [`TET_EDGES`] order.
pub fn tet_edge_lengths(p: &[Point3<f64>; 4]) -> [f64; 6] {
    TET_EDGES.map(|(a, b)| (p[a] - p[b]).norm())
}

/// Index of the shortest tetrahedron edge.
pub fn shortest_tet_edge(lengths: &[f64; 6]) -> usize {
    let mut best = 0;
    for i in 1..6 {
        if lengths[i] < lengths[best] {
            best = i;
        }
    }
    best
}

/// Face normals of a tetrahedron, ordered to follow its orientation.
///
/// Each normal is built from two edges anchored at one vertex. For an
/// inverted tetrahedron the second and third normals trade places so that
/// pairs keep measuring the same edges.
pub fn tet_face_normals(p: &[Point3<f64>; 4]) -> [Vector3<f64>; 4] {
    let n1 = (p[0] - p[2]).cross(&(p[0] - p[1]));
    let n2 = (p[1] - p[2]).cross(&(p[1] - p[3]));
    let n3 = (p[2] - p[0]).cross(&(p[2] - p[3]));
    let n4 = (p[3] - p[0]).cross(&(p[3] - p[1]));
    if tet_is_inverted(p) {
        [n1, n3, n2, n4]
    } else {
        [n1, n2, n3, n4]
    }
}

/// The six dihedral angles of a tetrahedron.
///
/// Returns `None` if any face is degenerate.
pub fn tet_dihedral_angles(p: &[Point3<f64>; 4]) -> Option<[f64; 6]> {
    let normals = tet_face_normals(p);
    let mut units = [Vector3::zeros(); 4];
    for (unit, n) in units.iter_mut().zip(normals.iter()) {
        *unit = n.try_normalize(0.0)?;
    }
    Some(DIHEDRAL_PAIRS.map(|(i, j)| 180.0 - angle_between_unit(&units[i], &units[j])))
}

/// Full per-tetrahedron measurements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TetMeasure {
    pub dihedral_angles: [f64; 6],
    pub edge_lengths: [f64; 6],
    pub volume: f64,
}

impl TetMeasure {
    pub fn compute(p: &[Point3<f64>; 4]) -> Option<Self> {
        Some(Self {
            dihedral_angles: tet_dihedral_angles(p)?,
            edge_lengths: tet_edge_lengths(p),
            volume: tet_volume(p),
        })
    }

    pub fn min_dihedral(&self) -> f64 {
        self.dihedral_angles.iter().copied().fold(f64::INFINITY, f64::min)
    }

    pub fn max_dihedral(&self) -> f64 {
        self.dihedral_angles.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Intersection of the segment `from → to` with a triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentHit {
    /// Parameter along the segment, in [0, 1].
    pub r: f64,
    pub point: Point3<f64>,
}

/// Intersect a segment with triangle `tri` whose plane has unit `normal`.
///
/// The hit is found on the triangle's plane, then accepted when its
/// barycentric coordinates lie inside the triangle (boundary inclusive).
pub fn segment_triangle_intersection(
    from: &Point3<f64>,
    to: &Point3<f64>,
    tri: &[Point3<f64>; 3],
    normal: &Vector3<f64>,
) -> Option<SegmentHit> {
    let dir = to - from;
    let denom = normal.dot(&dir);
    if denom == 0.0 {
        return None;
    }
    let r = normal.dot(&(tri[0] - from)) / denom;
    if !(0.0..=1.0).contains(&r) {
        return None;
    }
    let point = from + dir * r;

    let u = tri[1] - tri[0];
    let v = tri[2] - tri[0];
    let w = point - tri[0];
    let uv = u.dot(&v);
    let uu = u.dot(&u);
    let vv = v.dot(&v);
    let wu = w.dot(&u);
    let wv = w.dot(&v);
    let denominator = uv * uv - uu * vv;
    if denominator == 0.0 {
        return None;
    }
    let s = (uv * wv - wu * vv) / denominator;
    let t = (uv * wu - wv * uu) / denominator;
    if !(0.0..=1.0).contains(&s) || !(0.0..=1.0).contains(&t) || s + t > 1.0 {
        return None;
    }
    Some(SegmentHit { r, point })
}

/// 2D point-in-triangle test used by the height-field rasterizer.
///
/// Solves `p = a + s·e1 + t·e2` for the affine coordinates. When the first
/// edge has no extent along the first axis the system is solved in the
/// other order. Boundary points count as inside.
pub fn point_in_triangle_2d(p: [f64; 2], a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> bool {
    let e1 = [b[0] - a[0], b[1] - a[1]];
    let e2 = [c[0] - a[0], c[1] - a[1]];
    let q = [p[0] - a[0], p[1] - a[1]];

    let (s, t) = if e1[0] == 0.0 {
        if e2[0] == 0.0 || e1[1] == 0.0 {
            return false;
        }
        let t = q[0] / e2[0];
        let s = (q[1] - t * e2[1]) / e1[1];
        (s, t)
    } else {
        let denom = e2[1] - e2[0] * e1[1] / e1[0];
        if denom == 0.0 {
            return false;
        }
        let t = (q[1] - q[0] * e1[1] / e1[0]) / denom;
        let s = (q[0] - t * e2[0]) / e1[0];
        (s, t)
    };

    s >= 0.0 && t >= 0.0 && s + t <= 1.0
}
