//! Export, publish and (optionally) validate one model

use std::path::Path;

use anyhow::{Context, Result};
use speechport_export::{export_and_publish, GraphArtifact, Probe, PublishOptions};
use speechport_model::{DecodingConfig, ModelRepository};
use speechport_paths::artifact_path;
use speechport_validate::{RunnerConfig, ValidationError, ValidationReport, ValidationRunner};
use tracing::{error, info};

use crate::config::CliConfig;

/// Result of a run. Validation is independent of the export: a failed
/// validation leaves the published artifact in place.
#[derive(Debug)]
pub struct RunOutcome {
    pub artifact: GraphArtifact,
    pub validation: Option<Result<ValidationReport, ValidationError>>,
}

impl RunOutcome {
    /// True unless validation ran and failed
    pub fn validation_ok(&self) -> bool {
        !matches!(self.validation, Some(Err(_)))
    }
}

/// Run the pipeline described by `config` against `repository`.
///
/// Errors are export or publish failures only.
pub fn run(repository: &dyn ModelRepository, config: &CliConfig) -> Result<RunOutcome> {
    let resolved = repository
        .resolve(&config.model_id)
        .with_context(|| format!("Failed to load model {}", config.model_id))?;
    let model = resolved.model.as_ref();

    let destination = artifact_path(&config.output_dir);
    let probe = Probe::for_model(model, config.export.probe_seconds);
    let options = PublishOptions {
        staging_root: config.publish.staging_dir.clone(),
        keep_failed_staging: config.publish.keep_failed_staging,
    };

    let artifact = export_and_publish(
        model,
        &resolved.id,
        config.export.to_spec(),
        probe,
        &destination,
        &options,
    )
    .with_context(|| format!("Failed to export {} to {}", resolved.id, destination.display()))?;

    info!("Exported {} to {}", resolved.id, artifact.path.display());

    let validation = config.validation.test_audio.as_deref().map(|audio| {
        validate(&artifact.path, audio, &resolved.decoding, config)
    });

    Ok(RunOutcome {
        artifact,
        validation,
    })
}

fn validate(
    artifact: &Path,
    audio: &Path,
    decoding: &DecodingConfig,
    config: &CliConfig,
) -> Result<ValidationReport, ValidationError> {
    info!("Validating {} with {}", artifact.display(), audio.display());

    let runner = ValidationRunner::new(
        RunnerConfig::new()
            .num_threads(config.validation.num_threads)
            .input_name(config.export.input_name.as_str())
            .output_name(config.export.output_name.as_str()),
    );
    let result = runner.validate_with(artifact, audio, decoding);
    if let Err(e) = &result {
        error!("Validation failed: {}", e);
    }
    result
}

