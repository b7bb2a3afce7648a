//! Per-grain height fields used as a containment test.
//!
//! A grain's bounding box is normalized to the unit cube and its boundary is
//! rasterized along each axis into a pair of height fields holding the
//! lowest and highest boundary crossing per cell. A point is inside the
//! grain when it lies between both heights in all three projections.

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::adjacency::SurfaceAdjacency;
use crate::error::{MeshError, MeshResult};
use crate::geometry::point_in_triangle_2d;
use crate::grains::Grain;
use crate::types::{GrainId, SurfaceMesh};

/// One projection: the two indexing axes and the height axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    pub axes: (usize, usize),
    pub height: usize,
}

/// The three projections in plane order: z over (x, y), y over (x, z),
/// x over (y, z).
pub const PROJECTIONS: [Projection; 3] = [
    Projection { axes: (0, 1), height: 2 },
    Projection { axes: (0, 2), height: 1 },
    Projection { axes: (1, 2), height: 0 },
];

/// Six height planes of one grain.
#[derive(Debug, Clone)]
pub struct ZBuffer {
    pub grain: GrainId,
    pub resolution: usize,
    min: Point3<f64>,
    extent: Vector3<f64>,
    /// Planes `2k` and `2k + 1` are the low and high heights of projection `k`.
    planes: [Vec<f64>; 6],
}

impl ZBuffer {
    /// Rasterize the live boundary triangles of `grain`.
    pub fn build(
        mesh: &SurfaceMesh,
        adjacency: &SurfaceAdjacency,
        grain: &Grain,
        resolution: usize,
    ) -> MeshResult<Self> {
        let extent = grain.extent();
        if extent.iter().any(|e| !(*e > 0.0)) {
            return Err(MeshError::DegenerateGeometry {
                details: format!("grain {} has a flat bounding box", grain.id),
            });
        }

        let cells = resolution * resolution;
        let mut zbuffer = Self {
            grain: grain.id,
            resolution,
            min: grain.min,
            extent,
            planes: std::array::from_fn(|p| {
                vec![if p % 2 == 0 { f64::INFINITY } else { 0.0 }; cells]
            }),
        };

        let mut rasterized = 0;
        for &t in adjacency.triangles_of_grain(grain.id) {
            let tri = &mesh.triangles[t as usize];
            if !tri.is_alive() {
                continue;
            }
            let world = mesh.points(tri.nodes);
            zbuffer.rasterize(&world, &tri.geometry.normal, tri.geometry.d);
            rasterized += 1;
        }
        debug!(
            "Grain {}: rasterized {} triangles at resolution {}",
            grain.id, rasterized, resolution
        );
        Ok(zbuffer)
    }

    /// Map a world point into the grain's unit box.
    #[inline]
    pub fn normalize(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from((p - self.min).component_div(&self.extent))
    }

    /// Map a unit-box point back to world coordinates.
    #[inline]
    pub fn denormalize(&self, p: &Point3<f64>) -> Point3<f64> {
        self.min + p.coords.component_mul(&self.extent)
    }

    #[inline]
    fn index(&self, i: usize, j: usize) -> usize {
        i * self.resolution + j
    }

    /// Cell bin of a unit coordinate. The upper face maps to the last bin.
    fn bin(&self, v: f64) -> Option<usize> {
        if !(0.0..=1.0).contains(&v) {
            return None;
        }
        Some(((v * self.resolution as f64) as usize).min(self.resolution - 1))
    }

    /// Cell range covering `[lo, hi]` with one cell of padding each side.
    fn cell_range(&self, lo: f64, hi: f64) -> std::ops::Range<usize> {
        let res = self.resolution as f64;
        let start = (lo * res - 1.0).clamp(0.0, res) as usize;
        let end = (hi * res + 1.0).clamp(0.0, res) as usize;
        start..end
    }

    /// Update all six planes with one triangle given in world coordinates.
    fn rasterize(&mut self, world: &[Point3<f64>; 3], normal: &Vector3<f64>, d: f64) {
        let local = world.map(|p| self.normalize(&p));
        let res = self.resolution as f64;

        for (k, proj) in PROJECTIONS.iter().enumerate() {
            let (a, b) = proj.axes;
            let h = proj.height;
            if normal[h] == 0.0 {
                continue;
            }
            let corners = local.map(|p| [p[a], p[b]]);
            let lo_a = corners.iter().map(|c| c[0]).fold(f64::INFINITY, f64::min);
            let hi_a = corners.iter().map(|c| c[0]).fold(f64::NEG_INFINITY, f64::max);
            let lo_b = corners.iter().map(|c| c[1]).fold(f64::INFINITY, f64::min);
            let hi_b = corners.iter().map(|c| c[1]).fold(f64::NEG_INFINITY, f64::max);

            for i in self.cell_range(lo_a, hi_a) {
                let ca = (i as f64 + 0.5) / res;
                for j in self.cell_range(lo_b, hi_b) {
                    let cb = (j as f64 + 0.5) / res;
                    if !point_in_triangle_2d([ca, cb], corners[0], corners[1], corners[2]) {
                        continue;
                    }
                    let wa = self.min[a] + ca * self.extent[a];
                    let wb = self.min[b] + cb * self.extent[b];
                    let wh = (d - normal[a] * wa - normal[b] * wb) / normal[h];
                    let height = (wh - self.min[h]) / self.extent[h];

                    let idx = self.index(i, j);
                    let low = &mut self.planes[2 * k][idx];
                    *low = low.min(height);
                    let high = &mut self.planes[2 * k + 1][idx];
                    *high = high.max(height);
                }
            }
        }
    }

    /// Low and high heights of projection `k` at the cell holding `p`.
    pub fn heights(&self, k: usize, p: &Point3<f64>) -> Option<(f64, f64)> {
        let (a, b) = PROJECTIONS[k].axes;
        let idx = self.index(self.bin(p[a])?, self.bin(p[b])?);
        Some((self.planes[2 * k][idx], self.planes[2 * k + 1][idx]))
    }

    /// Whether unit point `p` lies between the heights of projection `k`.
    pub fn contains_in(&self, k: usize, p: &Point3<f64>, strict: bool) -> bool {
        let Some((low, high)) = self.heights(k, p) else {
            return false;
        };
        let v = p[PROJECTIONS[k].height];
        if strict {
            low < v && v < high
        } else {
            low <= v && v <= high
        }
    }

    /// Containment of unit point `p` in all three projections.
    ///
    /// Voxel classification uses the inclusive test, seeding the strict one.
    pub fn contains(&self, p: &Point3<f64>, strict: bool) -> bool {
        (0..3).all(|k| self.contains_in(k, p, strict))
    }

    /// Smallest distance from unit point `p` to any of its six heights.
    pub fn boundary_distance(&self, p: &Point3<f64>) -> Option<f64> {
        let mut dist = f64::INFINITY;
        for (k, proj) in PROJECTIONS.iter().enumerate() {
            let (low, high) = self.heights(k, p)?;
            let v = p[proj.height];
            dist = dist.min(v - low).min(high - v);
        }
        Some(dist)
    }
}
