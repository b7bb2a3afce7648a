//! Tetrahedral volume meshing of polycrystalline grain structures.
//!
//! This crate turns a grain-boundary surface mesh (triangles labelled with the
//! grains on either side) into a tetrahedral mesh where every element belongs
//! to one grain. The main stages are:
//!
//! - **Surface repair**: decimate flat boundary regions, smooth and collapse slivers
//! - **Seeding**: rasterize each grain into z-buffers and fill it with random nodes
//! - **Classification**: tessellate with an external Delaunay tool and vote each
//!   tetrahedron into a grain, snapping boundary-crossing edges onto the surface
//! - **Quality**: dihedral and volume histograms, optional edge-collapse improvement
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use grain_mesh::{ExternalTessellator, MeshGenerationContext, PipelineConfig};
//!
//! let config = PipelineConfig::load(Path::new("mesh.toml")).unwrap();
//! let mut tessellator = ExternalTessellator::new(config.tessellator.clone());
//!
//! let mut ctx = MeshGenerationContext::load(
//!     config,
//!     Path::new("nodes.txt"),
//!     Path::new("triangles.txt"),
//! )
//! .unwrap();
//! let report = ctx.run(&mut tessellator, Path::new("out")).unwrap();
//! println!("{}", report);
//! ```

mod error;
mod types;

pub mod adjacency;
pub mod classify;
pub mod compact;
pub mod config;
pub mod geometry;
pub mod grains;
pub mod improve;
pub mod io;
pub mod pipeline;
pub mod quality;
pub mod repair;
pub mod seed;
pub mod tessellate;
pub mod tetmesh;
pub mod validate;
pub mod volume;
pub mod voxel;
pub mod zbuffer;

#[cfg(test)]
mod testutil;

pub use error::{MeshError, MeshResult};
pub use types::{Domain, GrainId, Node, NodeId, SurfaceMesh, SurfaceTriangle, TriangleId, EXTERIOR};

pub use adjacency::SurfaceAdjacency;
pub use config::{PipelineConfig, TessellatorConfig, VoxelOverlap};
pub use grains::{Grain, GrainRegistry};
pub use io::load_surface;
pub use pipeline::{MeshGenerationContext, OutputPaths};
pub use quality::QualityReport;
pub use tessellate::{ExistingTessellation, ExternalTessellator, Tessellator};
pub use tetmesh::{Classification, Tetrahedron, VolumeMesh};
pub use validate::{inspect_surface, SurfaceReport};

impl SurfaceMesh {
    /// Load a surface mesh from node and triangle files.
    pub fn load(
        nodes: impl AsRef<std::path::Path>,
        triangles: impl AsRef<std::path::Path>,
    ) -> MeshResult<Self> {
        io::load_surface(nodes.as_ref(), triangles.as_ref(), None)
    }

    /// Inspect the mesh and return a report.
    pub fn inspect(&self) -> SurfaceReport {
        validate::inspect_surface(self)
    }

    /// Write the surface as a legacy VTK file.
    pub fn save_vtk(&self, path: impl AsRef<std::path::Path>) -> MeshResult<()> {
        io::write_surface_vtk(path.as_ref(), self)
    }
}
