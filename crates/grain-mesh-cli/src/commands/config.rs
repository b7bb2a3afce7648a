//! Print or check pipeline configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use grain_mesh::PipelineConfig;

use crate::output;
use crate::OutputFormat;

#[derive(Args)]
pub struct ConfigArgs {
    /// Config file to check instead of printing the defaults
    #[arg(long)]
    pub check: Option<PathBuf>,
}

pub fn run(args: ConfigArgs, format: OutputFormat, quiet: bool) -> Result<()> {
    let config = match &args.check {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("checking {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let text = match format {
        OutputFormat::Text => config.to_toml()?,
        OutputFormat::Json => config.to_json()?,
    };
    if let Some(path) = &args.check {
        output::success(&format!("{} is valid", path.display()), format, quiet);
    }
    if !quiet {
        println!("{}", text);
    }
    Ok(())
}
