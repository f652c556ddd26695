//! Error types for export and publishing

use std::path::{Path, PathBuf};

use speechport_graph::TraceError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

/// Failure while producing a graph in the staging area
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Invalid export specification: {0}")]
    InvalidSpec(String),

    #[error("Tracing failed: {0}")]
    Trace(#[from] TraceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    pub fn invalid_spec<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSpec(msg.into())
    }
}

/// Failure while moving a staged graph to its public path.
///
/// `retained` holds the staging directory when it was kept for inspection.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
        retained: Option<PathBuf>,
    },

    #[error("Failed to move artifact to {path}: {source}")]
    Rename {
        path: PathBuf,
        source: std::io::Error,
        retained: Option<PathBuf>,
    },
}

impl PublishError {
    pub fn retained_staging(&self) -> Option<&Path> {
        match self {
            PublishError::CreateDir { retained, .. } | PublishError::Rename { retained, .. } => {
                retained.as_deref()
            }
        }
    }
}

/// Failure anywhere in export + publish
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}
