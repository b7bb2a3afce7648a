//! End-to-end volume meshing.
//!
//! [`MeshGenerationContext`] owns every piece of state the stages share and
//! runs them in order:
//!
//! 1. mark edge nodes and repair the surface
//! 2. register grains, compact the surface and estimate grain volumes
//! 3. rasterize each grain, stamp the voxel grid and seed interior nodes
//! 4. tessellate and classify for the configured number of cycles
//! 5. measure quality, optionally improve, and write the outputs

use std::path::{Path, PathBuf};

use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use crate::adjacency::SurfaceAdjacency;
use crate::classify::{self, CycleSummary};
use crate::compact::compact;
use crate::config::PipelineConfig;
use crate::error::{MeshError, MeshResult};
use crate::grains::{Grain, GrainRegistry};
use crate::improve::{improve_mesh, ImproveParams};
use crate::io;
use crate::quality::{analyze, QualityReport};
use crate::repair::{self, RepairParams};
use crate::seed::{seed_grain, SeedParams};
use crate::tessellate::Tessellator;
use crate::tetmesh::VolumeMesh;
use crate::types::{Domain, SurfaceMesh};
use crate::voxel::VoxelGrid;
use crate::volume::estimate_volumes;
use crate::zbuffer::ZBuffer;

/// File names written into the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub points: PathBuf,
    pub tets: PathBuf,
    pub mesh: PathBuf,
    pub histogram: PathBuf,
    pub voxels: PathBuf,
    pub surface: PathBuf,
}

impl OutputPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            points: dir.join("points.txt"),
            tets: dir.join("tets.txt"),
            mesh: dir.join("mesh.vtk"),
            histogram: dir.join("histogram.txt"),
            voxels: dir.join("voxels.vtk"),
            surface: dir.join("surface_mesh.vtk"),
        }
    }
}

/// Domain from the config, falling back to the bounds of the input nodes.
fn input_domain(config: &PipelineConfig, surface: &SurfaceMesh) -> MeshResult<Domain> {
    let (min, max) = surface
        .bounds()
        .ok_or_else(|| MeshError::malformed("surface mesh has no nodes"))?;
    let origin = config.origin.map(Point3::from).unwrap_or(min);
    let dims = config.box_dims.map(Vector3::from).unwrap_or(max - origin);
    Ok(Domain::new(origin, dims))
}

/// Shared state of one meshing run.
#[derive(Debug)]
pub struct MeshGenerationContext {
    pub config: PipelineConfig,
    rng: StdRng,
    domain: Domain,
    pub surface: SurfaceMesh,
    pub adjacency: SurfaceAdjacency,
    pub registry: GrainRegistry,
    pub volume: VolumeMesh,
    pub voxels: Option<VoxelGrid>,
    /// Grain volume enclosed by the repaired surface.
    pub surface_volume: f64,
    pub report: Option<QualityReport>,
}

impl MeshGenerationContext {
    /// Start a run on an already loaded surface mesh.
    ///
    /// The domain is fixed here, from the config or the input node bounds.
    pub fn new(config: PipelineConfig, surface: SurfaceMesh) -> MeshResult<Self> {
        config.validate()?;
        let domain = input_domain(&config, &surface)?;
        let adjacency = SurfaceAdjacency::build(&surface);
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            domain,
            config,
            surface,
            adjacency,
            registry: GrainRegistry::default(),
            volume: VolumeMesh::default(),
            voxels: None,
            surface_volume: 0.0,
            report: None,
        })
    }

    /// Load the surface mesh from node and triangle files.
    pub fn load(config: PipelineConfig, nodes: &Path, triangles: &Path) -> MeshResult<Self> {
        let surface = io::load_surface(nodes, triangles, config.num_grains)?;
        Self::new(config, surface)
    }

    /// Simulation domain.
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Flag surface nodes on the domain boundary.
    pub fn mark_edges(&mut self) -> usize {
        let count = self.surface.mark_edge_nodes(&self.domain);
        info!("Marked {} edge nodes", count);
        count
    }

    /// Decimate flat boundary regions and collapse slivers, as configured.
    pub fn repair_surface(&mut self) -> usize {
        let params = RepairParams::from(&self.config);
        self.adjacency = SurfaceAdjacency::build(&self.surface);
        let mut collapsed = 0;
        if self.config.decimate {
            collapsed += repair::delete_triangles(&mut self.surface, &mut self.adjacency, &params);
        }
        if self.config.smooth {
            let summary =
                repair::clean_triangles(&mut self.surface, &mut self.adjacency, &params);
            collapsed += summary.collapsed_triangles;
        }
        collapsed
    }

    /// Register grains, compact the surface and estimate grain volumes.
    pub fn prepare_grains(&mut self) {
        self.adjacency = SurfaceAdjacency::build(&self.surface);
        self.registry = GrainRegistry::build(&self.surface, &self.adjacency);

        let (surface, adjacency) =
            compact(&self.surface, &self.domain, self.config.jitter, &mut self.rng);
        self.surface = surface;
        self.adjacency = adjacency;
        self.surface_volume =
            estimate_volumes(&mut self.surface, &self.adjacency, &mut self.registry);
    }

    /// Rasterize every grain, stamp voxels and seed interior nodes.
    ///
    /// Returns the number of seeded nodes. Grains with a flat bounding box
    /// are skipped.
    pub fn seed_grains(&mut self) -> MeshResult<usize> {
        self.volume = VolumeMesh::from_surface(&self.surface, &self.adjacency);
        self.voxels = if self.config.write_voxels {
            Some(VoxelGrid::new(
                &self.domain,
                Vector3::from(self.config.voxel_resolution),
            ))
        } else {
            None
        };

        let params = SeedParams::from(&self.config);
        let grains: Vec<Grain> = self.registry.iter().cloned().collect();
        let mut seeded = 0;
        for grain in &grains {
            let zbuffer = match ZBuffer::build(
                &self.surface,
                &self.adjacency,
                grain,
                self.config.zbuffer_resolution,
            ) {
                Ok(zbuffer) => zbuffer,
                Err(e) if !e.is_fatal() => {
                    warn!("Skipping grain {}: {}", grain.id, e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            if let Some(grid) = self.voxels.as_mut() {
                grid.stamp_grain(&zbuffer, grain, self.config.voxel_overlap);
            }
            let boundary = self.adjacency.nodes_of_grain(grain.id).len();
            seeded += seed_grain(&mut self.volume, &zbuffer, boundary, params, &mut self.rng);
        }
        info!(
            "Seeded {} interior nodes, {} nodes in total",
            seeded,
            self.volume.node_count()
        );
        Ok(seeded)
    }

    /// Tessellate and classify `refinement_cycles` times.
    ///
    /// Boundary repair runs on every cycle but the last; only the last
    /// cycle's tetrahedra are kept.
    pub fn run_cycles(
        &mut self,
        tessellator: &mut dyn Tessellator,
        points: &Path,
        tets: &Path,
    ) -> MeshResult<CycleSummary> {
        let cycles = self.config.refinement_cycles;
        let mut summary = CycleSummary::default();
        for cycle in 0..cycles {
            info!("Refinement cycle {} of {}", cycle + 1, cycles);
            io::write_points(points, &self.volume.nodes)?;
            tessellator.tessellate(points, tets)?;
            let records = io::read_tets(tets, self.volume.node_count())?;
            summary = classify::classify_cycle(
                &mut self.volume,
                &self.surface,
                &self.adjacency,
                &records,
                cycle + 1 < cycles,
            );
        }

        if self.config.collapse_unresolved {
            classify::collapse_unresolved(&mut self.volume);
        }
        let unresolved = self.volume.unresolved_count();
        if self.config.fail_on_unresolved && unresolved > 0 {
            return Err(MeshError::UnresolvedClassification { count: unresolved });
        }
        self.volume = self.volume.compacted();
        Ok(summary)
    }

    /// Measure element quality, improving the mesh first when configured.
    pub fn analyze_quality(&mut self) -> &QualityReport {
        if self.config.improve {
            analyze(&mut self.volume, &self.registry, self.surface_volume);
            improve_mesh(&mut self.volume, ImproveParams::from(&self.config));
            self.volume = self.volume.compacted();
        }
        let report = analyze(&mut self.volume, &self.registry, self.surface_volume);
        self.report.insert(report)
    }

    /// Write the volume mesh, histograms, surface and voxel files.
    pub fn write_outputs(&self, paths: &OutputPaths) -> MeshResult<()> {
        io::write_volume_vtk(&paths.mesh, &self.volume)?;
        if let Some(report) = &self.report {
            io::write_histograms(&paths.histogram, report)?;
        }
        io::write_surface_vtk(&paths.surface, &self.surface)?;
        if let Some(grid) = &self.voxels {
            io::write_voxels_vtk(&paths.voxels, grid)?;
        }
        info!("Wrote outputs to {:?}", paths.mesh.parent().unwrap_or(Path::new(".")));
        Ok(())
    }

    /// Run every stage and write the outputs into `out_dir`.
    pub fn run(
        &mut self,
        tessellator: &mut dyn Tessellator,
        out_dir: &Path,
    ) -> MeshResult<&QualityReport> {
        std::fs::create_dir_all(out_dir).map_err(|e| MeshError::IoWrite {
            path: out_dir.to_path_buf(),
            source: e,
        })?;
        let paths = OutputPaths::in_dir(out_dir);

        self.mark_edges();
        self.repair_surface();
        self.prepare_grains();
        self.seed_grains()?;
        self.run_cycles(tessellator, &paths.points, &paths.tets)?;
        self.analyze_quality();
        self.write_outputs(&paths)?;

        self.report
            .as_ref()
            .ok_or_else(|| MeshError::malformed("quality analysis produced no report"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tetmesh::Classification;
    use crate::testutil::{box_grain, two_box_grains};
    use approx::assert_relative_eq;

    /// Writes a fixed tetrahedra file and counts calls.
    struct FixedTessellation {
        contents: String,
        calls: usize,
    }

    impl FixedTessellation {
        fn new(contents: &str) -> Self {
            Self {
                contents: contents.to_string(),
                calls: 0,
            }
        }
    }

    impl Tessellator for FixedTessellation {
        fn tessellate(&mut self, points: &Path, tets: &Path) -> MeshResult<()> {
            let text = std::fs::read_to_string(points).unwrap();
            assert!(text.starts_with("3\n"));
            std::fs::write(tets, &self.contents).unwrap();
            self.calls += 1;
            Ok(())
        }
    }

    /// Six tets filling the box corners 0..8 (x = bit 0, y = bit 1, z = bit 2).
    const BOX_TETS: &str = "6\n0 1 3 7\n0 1 5 7\n0 2 3 7\n0 2 6 7\n0 4 5 7\n0 4 6 7\n";

    fn config() -> PipelineConfig {
        PipelineConfig {
            refinement_cycles: 2,
            zbuffer_resolution: 20,
            target_nodes_per_grain: 30,
            max_seed_attempts: 100_000,
            seed: 7,
            ..Default::default()
        }
    }

    #[test]
    fn test_full_run_on_box() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = MeshGenerationContext::new(config(), box_grain()).unwrap();
        let mut tessellator = FixedTessellation::new(BOX_TETS);
        let report = ctx.run(&mut tessellator, dir.path()).unwrap().clone();

        assert_eq!(tessellator.calls, 2);
        assert_eq!(report.tet_count, 6);
        assert_eq!(report.unresolved_count, 0);
        assert_relative_eq!(report.grain_volumes[&1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(report.surface_volume, 2.0, epsilon = 1e-9);
        assert_eq!(ctx.volume.node_count(), 30);
        for (_, tet) in ctx.volume.live_tets() {
            assert_eq!(tet.class, Classification::Grain(1));
            assert!(tet.on_edge);
        }

        let paths = OutputPaths::in_dir(dir.path());
        for path in [&paths.points, &paths.tets, &paths.mesh, &paths.surface, &paths.voxels] {
            assert!(path.exists(), "{:?} missing", path);
        }
        let histogram = std::fs::read_to_string(&paths.histogram).unwrap();
        assert_eq!(histogram.lines().count(), 180);

        let grid = ctx.voxels.as_ref().unwrap();
        assert_eq!(grid.dims, [2, 1, 1]);
        assert_eq!(grid.count(1), 2);
    }

    #[test]
    fn test_domain_from_config() {
        let mut config = config();
        config.origin = Some([-1.0, -1.0, -1.0]);
        let ctx = MeshGenerationContext::new(config, box_grain()).unwrap();
        let domain = ctx.domain();
        assert_eq!(domain.origin, Point3::new(-1.0, -1.0, -1.0));
        assert_eq!(domain.dims, Vector3::new(3.0, 2.0, 2.0));

        let empty = MeshGenerationContext::new(PipelineConfig::default(), SurfaceMesh::new(0));
        assert!(matches!(empty, Err(MeshError::MalformedInput { .. })));
    }

    #[test]
    fn test_domain_fixed_from_input_nodes() {
        let mut ctx = MeshGenerationContext::new(config(), box_grain()).unwrap();
        let before = ctx.domain();
        assert_eq!(before.dims, Vector3::new(2.0, 1.0, 1.0));

        // Removing every x = 2 node shrinks the live bounds but not the domain.
        for n in [1, 3, 5, 7] {
            ctx.surface.nodes[n].killed = true;
        }
        ctx.mark_edges();
        assert_eq!(ctx.domain(), before);
        ctx.seed_grains().unwrap();
        assert_eq!(ctx.voxels.as_ref().unwrap().dims, [2, 1, 1]);
    }

    #[test]
    fn test_flat_grain_skipped_when_seeding() {
        let mut mesh = box_grain();
        mesh.num_grains = 2;
        for p in [
            Point3::new(0.0, 0.0, 0.5),
            Point3::new(1.0, 0.0, 0.5),
            Point3::new(0.0, 1.0, 0.5),
        ] {
            mesh.nodes.push(crate::types::Node::surface(p, 2));
        }
        let mut flat = crate::types::SurfaceTriangle::new([8, 9, 10], 2, 0);
        flat.on_edge = true;
        mesh.triangles.push(flat);
        mesh.refresh_all_triangles();

        let mut config = config();
        config.jitter = 0.0;
        let mut ctx = MeshGenerationContext::new(config, mesh).unwrap();
        ctx.mark_edges();
        ctx.prepare_grains();
        assert!(ctx.registry.get(2).is_some());

        let seeded = ctx.seed_grains().unwrap();
        assert_eq!(seeded, 22);
        assert_eq!(ctx.volume.seeded_count(1), 22);
        assert_eq!(ctx.volume.seeded_count(2), 0);
    }

    #[test]
    fn test_strict_mode_rejects_unresolved() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.decimate = false;
        config.fail_on_unresolved = true;
        let mut ctx = MeshGenerationContext::new(config, two_box_grains()).unwrap();
        // Corners of grain 1 at x = 0 and grain 2 at x = 2, plus a shared-face node.
        let mut tessellator = FixedTessellation::new("1\n0 2 4 6\n");
        assert!(matches!(
            ctx.run(&mut tessellator, dir.path()),
            Err(MeshError::UnresolvedClassification { count: 1 })
        ));
    }

    #[test]
    fn test_unresolved_kept_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        // The flat shared face would otherwise be decimated and renumbered.
        config.decimate = false;
        let mut ctx = MeshGenerationContext::new(config, two_box_grains()).unwrap();
        let mut tessellator = FixedTessellation::new("1\n0 2 4 6\n");
        let report = ctx.run(&mut tessellator, dir.path()).unwrap();
        assert_eq!(report.unresolved_count, 1);
        assert!(report.grain_volumes.is_empty());
    }

    #[test]
    fn test_short_tets_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = MeshGenerationContext::new(config(), box_grain()).unwrap();
        let mut tessellator = FixedTessellation::new("5\n0 1 3 7\n");
        assert!(matches!(
            ctx.run(&mut tessellator, dir.path()),
            Err(MeshError::ExternalToolFailure { .. })
        ));
    }

    #[test]
    fn test_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let mesh = box_grain();
        let nodes = dir.path().join("nodes.txt");
        let triangles = dir.path().join("triangles.txt");

        let mut text = format!("{}\n", mesh.nodes.len());
        for (i, n) in mesh.nodes.iter().enumerate() {
            let p = n.position;
            text += &format!("{} {} {} {} {}\n", i, n.numgrains, p.x, p.y, p.z);
        }
        std::fs::write(&nodes, text).unwrap();

        let mut text = format!("{}\n", mesh.triangles.len());
        for (i, t) in mesh.triangles.iter().enumerate() {
            let [a, b, c] = t.nodes;
            text += &format!("{} {} {} {} 0 0 0 {} -1\n", i, a, b, c, t.left_grain);
        }
        std::fs::write(&triangles, text).unwrap();

        let mut ctx = MeshGenerationContext::load(config(), &nodes, &triangles).unwrap();
        assert_eq!(ctx.surface.num_grains, 1);
        assert!(ctx.surface.triangles.iter().all(|t| t.on_edge));
        let report = ctx
            .run(&mut FixedTessellation::new(BOX_TETS), &dir.path().join("out"))
            .unwrap();
        assert_eq!(report.tet_count, 6);
    }
}
