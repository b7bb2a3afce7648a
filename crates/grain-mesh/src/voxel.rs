//! Global voxel grid labelled with grain ids.

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::config::VoxelOverlap;
use crate::grains::Grain;
use crate::types::{Domain, GrainId, EXTERIOR};
use crate::zbuffer::ZBuffer;

/// Regular grid over the domain. Unclaimed voxels hold [`EXTERIOR`].
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    pub dims: [usize; 3],
    pub origin: Point3<f64>,
    pub spacing: Vector3<f64>,
    data: Vec<GrainId>,
    /// Distance from each voxel centre to the centroid of its current grain.
    best_dist: Vec<f64>,
}

impl VoxelGrid {
    /// Grid covering `domain` with voxel edge lengths `spacing`.
    pub fn new(domain: &Domain, spacing: Vector3<f64>) -> Self {
        let dims = [0, 1, 2].map(|a| ((domain.dims[a] / spacing[a]) as usize).max(1));
        let count = dims[0] * dims[1] * dims[2];
        Self {
            dims,
            origin: domain.origin,
            spacing,
            data: vec![EXTERIOR; count],
            best_dist: vec![f64::INFINITY; count],
        }
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize, k: usize) -> GrainId {
        self.data[self.index(i, j, k)]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn centre(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.origin
            + Vector3::new(
                (i as f64 + 0.5) * self.spacing.x,
                (j as f64 + 0.5) * self.spacing.y,
                (k as f64 + 0.5) * self.spacing.z,
            )
    }

    /// Number of voxels holding `grain`.
    pub fn count(&self, grain: GrainId) -> usize {
        self.data.iter().filter(|g| **g == grain).count()
    }

    /// Voxel index range along `axis` whose centres may fall in `[lo, hi]`.
    fn axis_range(&self, axis: usize, lo: f64, hi: f64) -> std::ops::Range<usize> {
        let n = self.dims[axis] as f64;
        let start = ((lo - self.origin[axis]) / self.spacing[axis] - 0.5)
            .floor()
            .clamp(0.0, n) as usize;
        let end = ((hi - self.origin[axis]) / self.spacing[axis] + 0.5)
            .ceil()
            .clamp(0.0, n) as usize;
        start..end
    }

    /// Label every voxel whose centre passes the grain's inclusive
    /// containment test. Returns the number of voxels claimed.
    pub fn stamp_grain(&mut self, zbuffer: &ZBuffer, grain: &Grain, overlap: VoxelOverlap) -> usize {
        let xs = self.axis_range(0, grain.min.x, grain.max.x);
        let ys = self.axis_range(1, grain.min.y, grain.max.y);
        let zs = self.axis_range(2, grain.min.z, grain.max.z);

        let mut claimed = 0;
        for k in zs {
            for j in ys.clone() {
                for i in xs.clone() {
                    let centre = self.centre(i, j, k);
                    if !zbuffer.contains(&zbuffer.normalize(&centre), false) {
                        continue;
                    }
                    let idx = self.index(i, j, k);
                    match overlap {
                        VoxelOverlap::LastWrite => {
                            self.data[idx] = grain.id;
                            claimed += 1;
                        }
                        VoxelOverlap::NearestCentroid => {
                            let dist = (centre - grain.centroid).norm();
                            if dist < self.best_dist[idx] {
                                self.best_dist[idx] = dist;
                                self.data[idx] = grain.id;
                                claimed += 1;
                            }
                        }
                    }
                }
            }
        }
        debug!("Grain {} claimed {} voxels", grain.id, claimed);
        claimed
    }
}
