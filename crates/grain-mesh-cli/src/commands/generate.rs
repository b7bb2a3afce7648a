//! Generate a per-grain volume mesh.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tracing::debug;

use grain_mesh::{
    ExistingTessellation, ExternalTessellator, MeshGenerationContext, PipelineConfig, Tessellator,
};

use crate::output;
use crate::OutputFormat;

#[derive(Args)]
pub struct GenerateArgs {
    /// Node file: a count, then `<id> <numgrains> <x> <y> <z>` per line
    #[arg(long)]
    pub nodes: PathBuf,

    /// Triangle file: a count, then `<id> <n1> <n2> <n3> <e1> <e2> <e3> <g1> <g2>` per line
    #[arg(long)]
    pub triangles: PathBuf,

    /// Pipeline config (TOML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for points.txt, tets.txt, mesh.vtk and the other outputs
    #[arg(short, long, default_value = "out")]
    pub out_dir: PathBuf,

    /// Reuse an existing tetrahedra file instead of running the tessellator
    #[arg(long)]
    pub tets: Option<PathBuf>,

    /// Domain extent
    #[arg(long = "box", num_args = 3, value_names = ["X", "Y", "Z"])]
    pub box_dims: Option<Vec<f64>>,

    /// Domain origin
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"])]
    pub origin: Option<Vec<f64>>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of tessellate/classify cycles
    #[arg(long)]
    pub cycles: Option<u32>,

    /// Collapse edges of badly shaped tetrahedra after classification
    #[arg(long)]
    pub improve: bool,

    /// Fail if any tetrahedron cannot be assigned to a grain
    #[arg(long)]
    pub strict: bool,
}

fn triple(values: &[f64]) -> Option<[f64; 3]> {
    match values {
        [x, y, z] => Some([*x, *y, *z]),
        _ => None,
    }
}

impl GenerateArgs {
    /// Config file contents with command-line overrides applied.
    fn config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(dims) = self.box_dims.as_deref().and_then(triple) {
            config.box_dims = Some(dims);
        }
        if let Some(origin) = self.origin.as_deref().and_then(triple) {
            config.origin = Some(origin);
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(cycles) = self.cycles {
            config.refinement_cycles = cycles;
        }
        config.improve |= self.improve;
        config.fail_on_unresolved |= self.strict;

        config.validate()?;
        Ok(config)
    }
}

pub fn run(args: GenerateArgs, format: OutputFormat, quiet: bool) -> Result<()> {
    let config = args.config()?;
    debug!("Resolved configuration: {:?}", config);
    let mut tessellator: Box<dyn Tessellator> = match &args.tets {
        Some(path) => Box::new(ExistingTessellation::new(path.clone())),
        None => Box::new(ExternalTessellator::new(config.tessellator.clone())),
    };

    let mut ctx = MeshGenerationContext::load(config, &args.nodes, &args.triangles)
        .with_context(|| format!("loading surface mesh from {}", args.nodes.display()))?;
    let report = ctx
        .run(tessellator.as_mut(), &args.out_dir)
        .context("volume meshing failed")?;

    output::report(report, format, quiet);
    if report.unresolved_count > 0 {
        output::warning(
            &format!(
                "{} tetrahedra could not be assigned to a grain",
                report.unresolved_count
            ),
            format,
            quiet,
        );
    }
    output::success(
        &format!("Volume mesh written to {}", args.out_dir.display()),
        format,
        quiet,
    );
    Ok(())
}
