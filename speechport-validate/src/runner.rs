//! Validation runner
//!
//! Loads a published artifact into ONNX Runtime, feeds it a real audio clip
//! and greedily decodes the result with the model's own tokenizer. The
//! artifact is only ever read.

use std::path::Path;
use std::time::Instant;

use ndarray::{s, Array2};
use speechport_export::metadata;
use speechport_graph::{ArtifactInfo, TensorDecl};
use speechport_model::{DecodingConfig, ModelRepository};
use tracing::{debug, info, warn};

use crate::decode;
use crate::error::{Result, ValidationError};
use crate::report::{self, ValidationReport, Verdict};
use crate::session::InferenceSession;

/// Runner settings
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// ONNX Runtime intra-op threads
    pub num_threads: usize,
    /// Graph input to feed; defaults to the artifact's only input
    pub input_name: Option<String>,
    /// Graph output to decode; defaults to the artifact's only output
    pub output_name: Option<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            num_threads: 1,
            input_name: None,
            output_name: None,
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }

    pub fn input_name<S: Into<String>>(mut self, name: S) -> Self {
        self.input_name = Some(name.into());
        self
    }

    pub fn output_name<S: Into<String>>(mut self, name: S) -> Self {
        self.output_name = Some(name.into());
        self
    }
}

pub struct ValidationRunner {
    config: RunnerConfig,
}

impl ValidationRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Validate `artifact` against `audio`, taking the tokenizer and
    /// preprocessor settings of `model_id` from `repository`
    pub fn validate(
        &self,
        artifact: &Path,
        audio: &Path,
        repository: &dyn ModelRepository,
        model_id: &str,
    ) -> Result<ValidationReport> {
        let decoding = repository
            .decoding_config(model_id)
            .map_err(|e| ValidationError::config(format!("{}: {}", model_id, e)))?;
        self.validate_with(artifact, audio, &decoding)
    }

    /// Validate with an already resolved decoding configuration
    pub fn validate_with(
        &self,
        artifact: &Path,
        audio: &Path,
        decoding: &DecodingConfig,
    ) -> Result<ValidationReport> {
        let prepared = decoding.preprocessor.prepare_file(audio, 0)?;

        let info = ArtifactInfo::read(artifact)
            .map_err(|e| ValidationError::artifact_load(format!("{}: {}", artifact.display(), e)))?;

        let sampling_rate = decoding.preprocessor.sampling_rate;
        if let Some(rate) = info.metadata_value(metadata::SAMPLE_RATE) {
            if rate.parse::<u32>().ok() != Some(sampling_rate) {
                return Err(ValidationError::config(format!(
                    "artifact expects {} Hz audio, preprocessor produces {} Hz",
                    rate, sampling_rate
                )));
            }
        }

        let min_samples = info
            .metadata_value(metadata::MIN_INPUT_LENGTH)
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1);
        let input = pad_input(prepared.input, min_samples, decoding.preprocessor.padding_value);
        let input_samples = input.ncols();

        let input_name = select_name(self.config.input_name.as_deref(), &info.inputs, "input")?;
        let output_name = select_name(self.config.output_name.as_deref(), &info.outputs, "output")?;

        if let Some(decl) = info.input(&input_name) {
            decl.accepts(input.shape()).map_err(ValidationError::shape)?;
        }

        let mut session =
            InferenceSession::load(artifact, &input_name, &output_name, self.config.num_threads)?;

        let start = Instant::now();
        let logits = session.run(input)?;
        let inference_time = start.elapsed();

        let shape = logits.shape();
        let output_shape = [shape[0], shape[1], shape[2]];
        info!(
            "Inference produced {:?} in {:.1} ms",
            output_shape,
            inference_time.as_secs_f64() * 1000.0
        );

        let non_finite = logits.iter().filter(|v| !v.is_finite()).count();
        let predicted_ids = match decode::predicted_ids(logits.view()) {
            Ok(ids) => ids,
            Err(e) if non_finite > 0 => {
                warn!("Could not decode logits: {}", e);
                vec![Vec::new(); output_shape[0]]
            }
            Err(e) => return Err(e),
        };
        debug!("Predicted ids: {:?}", predicted_ids);

        let transcripts = decoding.tokenizer.batch_decode(&predicted_ids);
        let verdict = report::verdict(&transcripts, non_finite);
        if let Verdict::Suspicious(reason) = &verdict {
            warn!("Validation output looks wrong: {}", reason);
        }

        Ok(ValidationReport {
            artifact: artifact.to_path_buf(),
            audio: audio.to_path_buf(),
            transcripts,
            predicted_ids,
            input_samples,
            audio_samples: prepared.samples,
            output_shape,
            inference_time,
            verdict,
        })
    }
}

impl Default for ValidationRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

/// Right-pad every row to `min_samples` with `padding_value`
fn pad_input(input: Array2<f32>, min_samples: usize, padding_value: f32) -> Array2<f32> {
    if input.ncols() >= min_samples {
        return input;
    }
    debug!("Padding input from {} to {} samples", input.ncols(), min_samples);
    let mut padded = Array2::from_elem((input.nrows(), min_samples), padding_value);
    padded.slice_mut(s![.., ..input.ncols()]).assign(&input);
    padded
}

/// Use the requested tensor name, or the artifact's only one
fn select_name(
    requested: Option<&str>,
    declared: &[TensorDecl],
    kind: &str,
) -> Result<String> {
    match (requested, declared) {
        (Some(name), _) => Ok(name.to_string()),
        (None, [only]) => Ok(only.name.clone()),
        (None, _) => Err(ValidationError::artifact_load(format!(
            "artifact declares {} {}s, name the one to use",
            declared.len(),
            kind
        ))),
    }
}
