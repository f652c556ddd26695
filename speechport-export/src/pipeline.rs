//! Export followed by publish

use std::path::{Path, PathBuf};

use speechport_model::AcousticModel;

use crate::artifact::{ArtifactManager, GraphArtifact};
use crate::error::PipelineError;
use crate::exporter::Exporter;
use crate::spec::{ExportSpec, Probe};
use crate::staging::StagingArea;

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Where staging directories are created; defaults to the destination's
    /// directory
    pub staging_root: Option<PathBuf>,
    pub keep_failed_staging: bool,
}

/// Trace `model`, stage the graph and publish it at `destination`.
///
/// The staging area is released on every path; a failed export never
/// touches `destination`.
pub fn export_and_publish(
    model: &dyn AcousticModel,
    model_id: &str,
    spec: ExportSpec,
    probe: Probe,
    destination: &Path,
    options: &PublishOptions,
) -> Result<GraphArtifact, PipelineError> {
    let exporter = Exporter::new(spec)?;

    let staging_root = match &options.staging_root {
        Some(root) => root.clone(),
        None => destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let staging = StagingArea::new_in(&staging_root).map_err(crate::ExportError::from)?;

    let staged = exporter.export(model, model_id, probe, &staging)?;

    let manager = ArtifactManager::new().keep_failed_staging(options.keep_failed_staging);
    Ok(manager.publish(staged, staging, destination)?)
}
