//! Error types for grain meshing.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for meshing operations.
pub type MeshResult<T> = Result<T, MeshError>;

/// Errors that can occur while building a volume mesh.
#[derive(Debug, Error)]
pub enum MeshError {
    /// Error reading from a file.
    #[error("failed to read {path}: {source}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error writing to a file.
    #[error("failed to write {path}: {source}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record in an input file could not be parsed.
    #[error("failed to parse {path} (line {line}): {details}")]
    ParseError {
        path: PathBuf,
        line: usize,
        details: String,
    },

    /// Input parsed but references ids outside the declared range.
    #[error("malformed input: {details}")]
    MalformedInput { details: String },

    /// A stage could not proceed because its geometry is degenerate.
    #[error("degenerate geometry: {details}")]
    DegenerateGeometry { details: String },

    /// Tetrahedra left without an owning grain when strict classification is requested.
    #[error("{count} tetrahedra could not be assigned to a grain")]
    UnresolvedClassification { count: usize },

    /// The external tessellator failed, timed out, or produced unusable output.
    #[error("external tessellator failed: {details}")]
    ExternalToolFailure { details: String },

    /// Invalid pipeline configuration.
    #[error("invalid configuration: {details}")]
    Config { details: String },
}

impl MeshError {
    pub(crate) fn malformed(details: impl Into<String>) -> Self {
        MeshError::MalformedInput {
            details: details.into(),
        }
    }

    pub(crate) fn config(details: impl Into<String>) -> Self {
        MeshError::Config {
            details: details.into(),
        }
    }

    pub(crate) fn external(details: impl Into<String>) -> Self {
        MeshError::ExternalToolFailure {
            details: details.into(),
        }
    }

    /// Whether this error aborts the pipeline rather than a single element.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MeshError::DegenerateGeometry { .. })
    }
}
