//! Acoustic model capability and architecture registry

use std::path::Path;

use serde::Deserialize;
use speechport_graph::{Tracer, Value};
use tracing::info;

use crate::conv_ctc::ConvCtcForSpeech;
use crate::error::{RepositoryError, Result};
use crate::fixed_sequence::FixedSequence;

/// A speech model that can describe its forward pass to a [`Tracer`].
///
/// `forward` receives a `(batch, samples)` waveform value and must return
/// `(batch, frames, vocab_size)` logits. Implementations never mutate
/// themselves while tracing.
pub trait AcousticModel {
    /// Architecture name as written in `config.json`
    fn architecture(&self) -> &str;

    /// Sample rate of the expected input waveform
    fn sample_rate(&self) -> u32;

    /// Width of the logit axis
    fn vocab_size(&self) -> usize;

    /// Shortest input producing at least one output frame
    fn min_input_samples(&self) -> usize {
        1
    }

    fn forward(&self, tracer: &mut Tracer, input: Value) -> speechport_graph::Result<Value>;
}

#[derive(Debug, Deserialize)]
struct ArchitectureHeader {
    #[serde(default)]
    architectures: Vec<String>,
    #[serde(default)]
    model_type: Option<String>,
}

/// Architectures this workspace can trace
pub const SUPPORTED_ARCHITECTURES: &[&str] = &[ConvCtcForSpeech::NAME, FixedSequence::NAME];

/// Architecture name declared by a parsed `config.json`
pub fn architecture_of(config: &serde_json::Value) -> Result<String> {
    let header: ArchitectureHeader = serde_json::from_value(config.clone())
        .map_err(|e| RepositoryError::config(format!("Invalid config.json: {}", e)))?;

    header
        .architectures
        .into_iter()
        .next()
        .or(header.model_type)
        .ok_or_else(|| RepositoryError::config("config.json declares no architecture"))
}

/// Whether an architecture reads `model.safetensors`
pub fn needs_weights(architecture: &str) -> bool {
    architecture == ConvCtcForSpeech::NAME
}

/// Build a model from a Hugging Face style directory
pub fn load_model(dir: &Path, sample_rate: u32) -> Result<Box<dyn AcousticModel>> {
    let config_path = dir.join("config.json");
    let contents = std::fs::read_to_string(&config_path).map_err(|e| {
        RepositoryError::not_found(format!("{}: {}", config_path.display(), e))
    })?;
    let config: serde_json::Value = serde_json::from_str(&contents)
        .map_err(|e| RepositoryError::config(format!("Failed to parse config.json: {}", e)))?;

    let architecture = architecture_of(&config)?;
    info!("Loading {} from {}", architecture, dir.display());

    let model: Box<dyn AcousticModel> = match architecture.as_str() {
        ConvCtcForSpeech::NAME => Box::new(ConvCtcForSpeech::load(dir, config, sample_rate)?),
        FixedSequence::NAME => Box::new(FixedSequence::from_config(config, sample_rate)?),
        other => {
            return Err(RepositoryError::UnsupportedArchitecture(format!(
                "{} (supported: {})",
                other,
                SUPPORTED_ARCHITECTURES.join(", ")
            )))
        }
    };
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_architecture_from_list_or_model_type() {
        let config = json!({"architectures": ["Wav2Vec2ForCTC"], "model_type": "wav2vec2"});
        assert_eq!(architecture_of(&config).unwrap(), "Wav2Vec2ForCTC");

        let config = json!({"model_type": "FixedSequence"});
        assert_eq!(architecture_of(&config).unwrap(), "FixedSequence");

        assert!(architecture_of(&json!({})).is_err());
    }

    #[test]
    fn test_unsupported_architecture() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("config.json"),
            r#"{"architectures": ["Wav2Vec2ForCTC"], "vocab_size": 1205}"#,
        )
        .unwrap();

        let err = load_model(tmp.path(), 16000).err().unwrap();
        assert!(matches!(err, RepositoryError::UnsupportedArchitecture(_)));
    }

    #[test]
    fn test_missing_config_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = load_model(tmp.path(), 16000).err().unwrap();
        assert!(matches!(err, RepositoryError::ModelNotFound(_)));
    }
}
