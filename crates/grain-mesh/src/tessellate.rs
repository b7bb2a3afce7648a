//! Boundary to the external Delaunay tessellator.
//!
//! The pipeline writes the seed points to a file, hands both paths to a
//! [`Tessellator`] and reads the tetrahedra file back once it returns.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::TessellatorConfig;
use crate::error::{MeshError, MeshResult};

/// Produces a tetrahedra file from a seed-point file.
pub trait Tessellator {
    fn tessellate(&mut self, points: &Path, tets: &Path) -> MeshResult<()>;
}

/// Runs an external program synchronously.
///
/// The points file is piped to stdin. `{points}` and `{tets}` in the
/// arguments are replaced with the two paths; without a `{tets}` argument
/// the program's stdout becomes the tetrahedra file.
#[derive(Debug, Clone)]
pub struct ExternalTessellator {
    config: TessellatorConfig,
    poll_interval: Duration,
}

impl ExternalTessellator {
    pub fn new(config: TessellatorConfig) -> Self {
        Self {
            config,
            poll_interval: Duration::from_millis(50),
        }
    }

    fn args(&self, points: &Path, tets: &Path) -> Vec<String> {
        let points = points.display().to_string();
        let tets = tets.display().to_string();
        self.config
            .args
            .iter()
            .map(|a| a.replace("{points}", &points).replace("{tets}", &tets))
            .collect()
    }

    fn wait(&self, child: &mut std::process::Child) -> MeshResult<ExitStatus> {
        let timeout = Duration::from_secs(self.config.timeout_secs);
        let start = Instant::now();
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if start.elapsed() >= timeout => {
                    // Best effort: the process may exit between the poll and the kill.
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(MeshError::external(format!(
                        "{} timed out after {}s",
                        self.config.program, self.config.timeout_secs
                    )));
                }
                Ok(None) => thread::sleep(self.poll_interval),
                Err(e) => {
                    return Err(MeshError::external(format!(
                        "failed to wait for {}: {}",
                        self.config.program, e
                    )))
                }
            }
        }
    }
}

impl Tessellator for ExternalTessellator {
    fn tessellate(&mut self, points: &Path, tets: &Path) -> MeshResult<()> {
        let stdin = File::open(points).map_err(|e| MeshError::IoRead {
            path: points.to_path_buf(),
            source: e,
        })?;
        let stdout = if self.config.args.iter().any(|a| a.contains("{tets}")) {
            Stdio::null()
        } else {
            Stdio::from(File::create(tets).map_err(|e| MeshError::IoWrite {
                path: tets.to_path_buf(),
                source: e,
            })?)
        };

        let args = self.args(points, tets);
        info!("Running {} {}", self.config.program, args.join(" "));
        let mut child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::from(stdin))
            .stdout(stdout)
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                MeshError::external(format!("failed to start {}: {}", self.config.program, e))
            })?;

        let status = self.wait(&mut child)?;
        if !status.success() {
            return Err(MeshError::external(format!(
                "{} exited with {}",
                self.config.program, status
            )));
        }
        if !tets.exists() {
            return Err(MeshError::external(format!(
                "{} did not produce {}",
                self.config.program,
                tets.display()
            )));
        }
        debug!("Tessellator finished with {}", status);
        Ok(())
    }
}

/// Uses a tetrahedra file produced ahead of time.
#[derive(Debug, Clone)]
pub struct ExistingTessellation {
    pub path: PathBuf,
}

impl ExistingTessellation {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Tessellator for ExistingTessellation {
    fn tessellate(&mut self, _points: &Path, tets: &Path) -> MeshResult<()> {
        if !self.path.is_file() {
            return Err(MeshError::external(format!(
                "tetrahedra file {} not found",
                self.path.display()
            )));
        }
        if self.path != tets {
            std::fs::copy(&self.path, tets).map_err(|e| MeshError::IoWrite {
                path: tets.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }
}
