//! Publishing staged graphs
//!
//! The staged file reaches its public path through a single `rename`, so a
//! reader either sees the previous artifact or the complete new one.

use std::path::{Path, PathBuf};

use speechport_graph::{ArtifactError, ArtifactInfo};
use tracing::{info, warn};

use crate::error::PublishError;
use crate::exporter::StagedArtifact;
use crate::staging::StagingArea;

/// Metadata keys written into every exported graph
pub mod metadata {
    pub const MODEL_ID: &str = "speechport.model_id";
    pub const ARCHITECTURE: &str = "speechport.architecture";
    pub const SAMPLE_RATE: &str = "speechport.sample_rate";
    /// Shortest input (in samples) producing one output frame
    pub const MIN_INPUT_LENGTH: &str = "speechport.min_input_length";
    pub const VOCAB_SIZE: &str = "speechport.vocab_size";
    pub const INPUT_DYNAMIC_AXES: &str = "speechport.input_dynamic_axes";
    pub const OUTPUT_DYNAMIC_AXES: &str = "speechport.output_dynamic_axes";
}

/// A published graph
#[derive(Debug, Clone)]
pub struct GraphArtifact {
    pub path: PathBuf,
    pub info: ArtifactInfo,
}

impl GraphArtifact {
    /// Inspect an artifact already on disk
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let path = path.as_ref().to_path_buf();
        let info = ArtifactInfo::read(&path)?;
        Ok(Self { path, info })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArtifactManager {
    keep_failed_staging: bool,
}

impl ArtifactManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the staging directory on disk when publishing fails
    pub fn keep_failed_staging(mut self, keep: bool) -> Self {
        self.keep_failed_staging = keep;
        self
    }

    /// Move `staged` to `destination`, replacing any earlier artifact, then
    /// release the staging area
    pub fn publish(
        &self,
        staged: StagedArtifact,
        staging: StagingArea,
        destination: &Path,
    ) -> Result<GraphArtifact, PublishError> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(source) = std::fs::create_dir_all(parent) {
                return Err(PublishError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                    retained: self.release(staging),
                });
            }
        }

        if let Err(source) = std::fs::rename(&staged.path, destination) {
            return Err(PublishError::Rename {
                path: destination.to_path_buf(),
                source,
                retained: self.release(staging),
            });
        }

        drop(staging);
        info!("Published {}", destination.display());

        Ok(GraphArtifact {
            path: destination.to_path_buf(),
            info: staged.info,
        })
    }

    fn release(&self, staging: StagingArea) -> Option<PathBuf> {
        if self.keep_failed_staging {
            let kept = staging.retain();
            warn!("Keeping staging directory {}", kept.display());
            Some(kept)
        } else {
            None
        }
    }
}
