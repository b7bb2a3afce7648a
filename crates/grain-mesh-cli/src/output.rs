//! Output formatting utilities for the CLI.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a report as text or JSON.
pub fn report<T: Serialize + std::fmt::Display>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }

    match format {
        OutputFormat::Text => print!("{}", value),
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{} failed to serialize report: {}", "error:".red().bold(), e),
        },
    }
}

/// Print a success message.
pub fn success(msg: &str, format: OutputFormat, quiet: bool) {
    if quiet || format == OutputFormat::Json {
        return;
    }
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print a warning message to stderr.
pub fn warning(msg: &str, format: OutputFormat, quiet: bool) {
    if quiet || format == OutputFormat::Json {
        return;
    }
    eprintln!("{} {}", "⚠".yellow().bold(), msg);
}
