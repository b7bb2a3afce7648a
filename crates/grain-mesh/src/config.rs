//! Pipeline configuration.
//!
//! Every parameter of the meshing pipeline lives in [`PipelineConfig`], which
//! can be written to and read from TOML or JSON. Missing keys take their
//! default values.
//!
//! ```toml
//! box_dims = [48.0, 48.0, 48.0]
//! origin = [0.5, 0.5, 0.5]
//! voxel_resolution = [1.0, 1.0, 1.0]
//! refinement_cycles = 4
//! seed = 42
//!
//! [tessellator]
//! program = "qdelaunay"
//! args = ["s", "i", "TO", "{tets}"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, MeshResult};

/// How the voxel grid resolves a voxel claimed by more than one grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoxelOverlap {
    /// The grain whose centroid is closest to the voxel centre wins.
    #[default]
    NearestCentroid,
    /// The grain processed last wins.
    LastWrite,
}

/// External tessellator invocation.
///
/// `{points}` and `{tets}` in `args` are replaced with the seed-point and
/// tetrahedra file paths. The seed-point file is also piped to stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TessellatorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for TessellatorConfig {
    fn default() -> Self {
        Self {
            program: "qdelaunay".to_string(),
            args: ["s", "i", "TO", "{tets}"].iter().map(|s| s.to_string()).collect(),
            timeout_secs: 600,
        }
    }
}

/// Parameters for surface repair, seeding, classification and improvement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Domain extent. Defaults to the extent of the input nodes.
    pub box_dims: Option<[f64; 3]>,
    /// Domain origin. Defaults to the minimum input node coordinate.
    pub origin: Option<[f64; 3]>,
    /// Voxel edge length along x, y, z.
    pub voxel_resolution: [f64; 3],
    /// Number of grains. Defaults to the largest grain id in the input.
    pub num_grains: Option<u32>,
    /// Tessellate/classify rounds; only the last round's tets are kept.
    pub refinement_cycles: u32,
    /// Cells per axis of each z-buffer plane.
    pub zbuffer_resolution: usize,
    /// Seeding stops once a grain has this many nodes.
    pub target_nodes_per_grain: usize,
    /// Random draws per grain before seeding gives up.
    pub max_seed_attempts: u64,
    /// Random generator seed.
    pub seed: u64,
    /// Amplitude of the coordinate jitter applied at compaction.
    pub jitter: f64,

    pub decimate: bool,
    pub smooth: bool,
    /// A neighbour fold sharper than this keeps a triangle.
    pub min_fold_angle: f64,
    /// A mean neighbour fold at or below this keeps a triangle.
    pub mean_fold_angle: f64,
    /// Triangles smaller than this fraction of the mean area always collapse.
    pub small_area_fraction: f64,
    /// Interior triangle angles below this collapse the opposite edge.
    pub min_triangle_angle: f64,
    pub max_clean_passes: usize,

    pub improve: bool,
    /// Acceptable dihedral range in degrees.
    pub dihedral_bounds: [f64; 2],
    pub max_improve_passes: usize,

    /// Collapse unresolved tetrahedra onto their best-connected node.
    pub collapse_unresolved: bool,
    /// Return an error instead of writing unresolved tetrahedra.
    pub fail_on_unresolved: bool,

    pub write_voxels: bool,
    pub voxel_overlap: VoxelOverlap,
    pub tessellator: TessellatorConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            box_dims: None,
            origin: None,
            voxel_resolution: [1.0; 3],
            num_grains: None,
            refinement_cycles: 4,
            zbuffer_resolution: 500,
            target_nodes_per_grain: 3500,
            max_seed_attempts: 10_000_000,
            seed: 0,
            jitter: 0.01,
            decimate: true,
            smooth: true,
            min_fold_angle: 165.0,
            mean_fold_angle: 172.5,
            small_area_fraction: 0.25,
            min_triangle_angle: 20.0,
            max_clean_passes: 100,
            improve: false,
            dihedral_bounds: [10.0, 170.0],
            max_improve_passes: 100,
            collapse_unresolved: false,
            fail_on_unresolved: false,
            write_voxels: true,
            voxel_overlap: VoxelOverlap::NearestCentroid,
            tessellator: TessellatorConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse a config from TOML.
    pub fn from_toml(input: &str) -> MeshResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| MeshError::config(format!("TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a config from JSON.
    pub fn from_json(input: &str) -> MeshResult<Self> {
        let config: Self =
            serde_json::from_str(input).map_err(|e| MeshError::config(format!("JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file, choosing the format from its extension.
    pub fn load(path: &Path) -> MeshResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| MeshError::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_toml(&text),
        }
    }

    pub fn to_toml(&self) -> MeshResult<String> {
        toml::to_string_pretty(self).map_err(|e| MeshError::config(format!("TOML: {}", e)))
    }

    pub fn to_json(&self) -> MeshResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| MeshError::config(format!("JSON: {}", e)))
    }

    /// Check value ranges.
    pub fn validate(&self) -> MeshResult<()> {
        if let Some(dims) = self.box_dims {
            if dims.iter().any(|d| !(*d > 0.0)) {
                return Err(MeshError::config("box_dims must be positive"));
            }
        }
        if self.voxel_resolution.iter().any(|r| !(*r > 0.0)) {
            return Err(MeshError::config("voxel_resolution must be positive"));
        }
        if self.refinement_cycles == 0 {
            return Err(MeshError::config("refinement_cycles must be at least 1"));
        }
        if self.zbuffer_resolution == 0 {
            return Err(MeshError::config("zbuffer_resolution must be at least 1"));
        }
        if !(self.jitter >= 0.0) {
            return Err(MeshError::config("jitter must be non-negative"));
        }
        if !(self.small_area_fraction > 0.0 && self.small_area_fraction <= 1.0) {
            return Err(MeshError::config("small_area_fraction must be in (0, 1]"));
        }
        if !(self.min_triangle_angle > 0.0 && self.min_triangle_angle < 60.0) {
            return Err(MeshError::config("min_triangle_angle must be in (0, 60)"));
        }
        let [lo, hi] = self.dihedral_bounds;
        if !(lo > 0.0 && lo < hi && hi < 180.0) {
            return Err(MeshError::config(format!(
                "dihedral_bounds must satisfy 0 < lo < hi < 180, got [{}, {}]",
                lo, hi
            )));
        }
        if self.tessellator.program.is_empty() {
            return Err(MeshError::config("tessellator.program is empty"));
        }
        Ok(())
    }
}
