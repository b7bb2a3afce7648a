//! Inspect a surface mesh.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use grain_mesh::{inspect_surface, load_surface};

use crate::output;
use crate::OutputFormat;

#[derive(Args)]
pub struct InspectArgs {
    /// Node file: a count, then `<id> <numgrains> <x> <y> <z>` per line
    #[arg(long)]
    pub nodes: PathBuf,

    /// Triangle file: a count, then `<id> <n1> <n2> <n3> <e1> <e2> <e3> <g1> <g2>` per line
    #[arg(long)]
    pub triangles: PathBuf,

    /// Number of grains; defaults to the largest grain id
    #[arg(long)]
    pub num_grains: Option<u32>,
}

pub fn run(args: InspectArgs, format: OutputFormat, quiet: bool) -> Result<()> {
    let mesh = load_surface(&args.nodes, &args.triangles, args.num_grains)
        .with_context(|| format!("loading surface mesh from {}", args.nodes.display()))?;
    let report = inspect_surface(&mesh);
    output::report(&report, format, quiet);

    if !report.is_closed() {
        output::warning(
            &format!(
                "{} grains have open boundaries and will not seed reliably",
                report.open_grains.len()
            ),
            format,
            quiet,
        );
    }
    Ok(())
}
