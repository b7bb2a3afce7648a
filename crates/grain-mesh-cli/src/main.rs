//! Command-line front end for grain volume meshing.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

/// Build per-grain tetrahedral meshes from grain-boundary surface meshes
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output format for reports
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Print debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a volume mesh from node and triangle files
    Generate(commands::generate::GenerateArgs),

    /// Report statistics and closure of a surface mesh
    Inspect(commands::inspect::InspectArgs),

    /// Print the default configuration or check a config file
    Config(commands::config::ConfigArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.quiet, cli.verbose);

    match cli.command {
        Command::Generate(args) => commands::generate::run(args, cli.format, cli.quiet),
        Command::Inspect(args) => commands::inspect::run(args, cli.format, cli.quiet),
        Command::Config(args) => commands::config::run(args, cli.format, cli.quiet),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "grain-mesh",
            "inspect",
            "--nodes",
            "n.txt",
            "--triangles",
            "t.txt",
            "--format",
            "json",
            "-q",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.quiet);
        assert!(matches!(cli.command, Command::Inspect(_)));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["grain-mesh", "-q", "-v", "config"]).is_err());
    }
}
