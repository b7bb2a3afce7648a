//! Element quality measurement and histograms.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::geometry::{tet_is_inverted, TetMeasure};
use crate::grains::GrainRegistry;
use crate::tetmesh::{Classification, VolumeMesh};
use crate::types::GrainId;

/// One bucket per integer degree.
pub const DIHEDRAL_BINS: usize = 180;

/// Bin edges for tet volume over mean volume. A ratio falls in the bin
/// numbered by how many edges it reaches.
pub const VOLUME_RATIO_EDGES: [f64; 24] = [
    1.0 / 10.0,
    1.0 / 9.0,
    1.0 / 8.0,
    1.0 / 7.0,
    1.0 / 6.0,
    1.0 / 5.0,
    1.0 / 4.0,
    1.0 / 3.0,
    1.0 / 2.0,
    1.0,
    2.0,
    3.0,
    4.0,
    5.0,
    6.0,
    7.0,
    8.0,
    9.0,
    10.0,
    11.0,
    12.0,
    13.0,
    14.0,
    15.0,
];

pub const VOLUME_BINS: usize = VOLUME_RATIO_EDGES.len() + 1;

/// Dihedral bucket of an angle in degrees.
#[inline]
pub fn dihedral_bin(angle: f64) -> usize {
    (angle.max(0.0) as usize).min(DIHEDRAL_BINS - 1)
}

/// Volume-ratio bucket.
#[inline]
pub fn volume_bin(ratio: f64) -> usize {
    VOLUME_RATIO_EDGES.iter().filter(|e| **e <= ratio).count()
}

/// Quality summary of a classified volume mesh.
///
/// "Surface" tets have at least one node from the original surface mesh,
/// "bulk" tets have none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub dihedral_surface: Vec<u64>,
    pub dihedral_bulk: Vec<u64>,
    pub volume_surface: Vec<u64>,
    pub volume_bulk: Vec<u64>,
    pub node_count: usize,
    pub tet_count: usize,
    pub unresolved_count: usize,
    pub degenerate_count: usize,
    pub min_dihedral: f64,
    pub max_dihedral: f64,
    pub mean_tet_volume: f64,
    /// Sum over all live tetrahedra.
    pub mesh_volume: f64,
    /// Volume of unresolved tetrahedra, excluded from grain totals.
    pub unresolved_volume: f64,
    pub grain_volumes: BTreeMap<GrainId, f64>,
    /// Grain volume enclosed by the boundary surface.
    pub surface_volume: f64,
}

impl QualityReport {
    fn empty(surface_volume: f64) -> Self {
        Self {
            dihedral_surface: vec![0; DIHEDRAL_BINS],
            dihedral_bulk: vec![0; DIHEDRAL_BINS],
            volume_surface: vec![0; VOLUME_BINS],
            volume_bulk: vec![0; VOLUME_BINS],
            node_count: 0,
            tet_count: 0,
            unresolved_count: 0,
            degenerate_count: 0,
            min_dihedral: f64::INFINITY,
            max_dihedral: f64::NEG_INFINITY,
            mean_tet_volume: 0.0,
            mesh_volume: 0.0,
            unresolved_volume: 0.0,
            grain_volumes: BTreeMap::new(),
            surface_volume,
        }
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Volume Mesh Report:")?;
        writeln!(f, "  Nodes: {}", self.node_count)?;
        writeln!(f, "  Tetrahedra: {}", self.tet_count)?;
        writeln!(
            f,
            "  Unresolved: {} (volume {:.4})",
            self.unresolved_count, self.unresolved_volume
        )?;
        if self.degenerate_count > 0 {
            writeln!(f, "  Degenerate: {}", self.degenerate_count)?;
        }
        if self.min_dihedral <= self.max_dihedral {
            writeln!(
                f,
                "  Dihedral angles: {:.2} to {:.2} degrees",
                self.min_dihedral, self.max_dihedral
            )?;
        }
        writeln!(f, "  Mean tet volume: {:.6}", self.mean_tet_volume)?;
        writeln!(
            f,
            "  Volume: {:.4} (surface estimate {:.4})",
            self.mesh_volume, self.surface_volume
        )?;
        writeln!(f, "  Grains: {}", self.grain_volumes.len())?;
        for (grain, volume) in &self.grain_volumes {
            writeln!(f, "    {:>6}: {:.4}", grain, volume)?;
        }
        Ok(())
    }
}

/// Give tet `t` positive orientation and store its measure.
///
/// An inverted tet has its second and third nodes swapped.
pub(crate) fn orient_and_measure(volume: &mut VolumeMesh, t: usize) -> Option<TetMeasure> {
    let mut pts = volume.tet_points(&volume.tets[t]);
    if tet_is_inverted(&pts) {
        volume.tets[t].nodes.swap(1, 2);
        pts.swap(1, 2);
    }
    let measure = TetMeasure::compute(&pts);
    volume.tets[t].measure = measure;
    measure
}

/// Orient, measure and histogram every live tetrahedron.
///
/// Each tet's measure is stored on it for later stages.
pub fn analyze(
    volume: &mut VolumeMesh,
    registry: &GrainRegistry,
    surface_volume: f64,
) -> QualityReport {
    let mut report = QualityReport::empty(surface_volume);
    report.node_count = volume.nodes.iter().filter(|n| n.is_alive()).count();

    for t in 0..volume.tets.len() {
        if volume.tets[t].killed {
            continue;
        }
        let measure = orient_and_measure(volume, t);
        let tet = &volume.tets[t];
        report.tet_count += 1;

        let Some(measure) = measure else {
            report.degenerate_count += 1;
            continue;
        };
        let histogram = if tet.original_node_count > 0 {
            &mut report.dihedral_surface
        } else {
            &mut report.dihedral_bulk
        };
        for angle in measure.dihedral_angles {
            histogram[dihedral_bin(angle)] += 1;
        }
        report.min_dihedral = report.min_dihedral.min(measure.min_dihedral());
        report.max_dihedral = report.max_dihedral.max(measure.max_dihedral());

        report.mesh_volume += measure.volume;
        match tet.class {
            Classification::Grain(g) => {
                *report.grain_volumes.entry(g).or_insert(0.0) += measure.volume;
            }
            Classification::Unresolved { .. } => {
                report.unresolved_count += 1;
                report.unresolved_volume += measure.volume;
            }
            Classification::Unclassified => {}
        }
    }

    let measured = report.tet_count - report.degenerate_count;
    if measured > 0 {
        report.mean_tet_volume = report.mesh_volume / measured as f64;
    }
    if report.mean_tet_volume > 0.0 {
        for (_, tet) in volume.live_tets() {
            let (Some(measure), Some(grain)) = (tet.measure, tet.class.grain()) else {
                continue;
            };
            if registry.is_edge_grain(grain) {
                continue;
            }
            let bin = volume_bin(measure.volume / report.mean_tet_volume);
            if tet.original_node_count > 0 {
                report.volume_surface[bin] += 1;
            } else {
                report.volume_bulk[bin] += 1;
            }
        }
    }

    if report.degenerate_count > 0 {
        warn!("{} flat tetrahedra could not be measured", report.degenerate_count);
    }
    info!(
        "Measured {} tetrahedra, dihedral range {:.2} to {:.2}",
        report.tet_count, report.min_dihedral, report.max_dihedral
    );
    report
}
