//! Raw-waveform feature extraction for wav2vec2-style models
//!
//! These models consume the waveform directly: the only preprocessing is an
//! optional per-utterance zero-mean / unit-variance normalization. The
//! settings come from the model's `preprocessor_config.json`.

use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AudioError, Result};
use crate::loader;
use crate::resampler;

/// Default sample rate for wav2vec2-family models
pub const SAMPLE_RATE: u32 = 16000;

/// Variance floor used by the normalization
const NORM_EPSILON: f32 = 1e-7;

/// Feature extractor settings (`preprocessor_config.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureExtractorConfig {
    /// Values per time step; raw-waveform models use 1
    pub feature_size: usize,
    /// Sample rate the model was trained on
    pub sampling_rate: u32,
    /// Value used to pad short inputs
    pub padding_value: f32,
    /// Apply zero-mean / unit-variance normalization per utterance
    pub do_normalize: bool,
    /// Whether the model takes an attention mask (informational)
    pub return_attention_mask: bool,
}

impl Default for FeatureExtractorConfig {
    fn default() -> Self {
        Self {
            feature_size: 1,
            sampling_rate: SAMPLE_RATE,
            padding_value: 0.0,
            do_normalize: true,
            return_attention_mask: false,
        }
    }
}

impl FeatureExtractorConfig {
    /// Load from a `preprocessor_config.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents).map_err(|e| {
            AudioError::invalid_config(format!(
                "Failed to parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the settings describe a raw-waveform extractor
    pub fn validate(&self) -> Result<()> {
        if self.sampling_rate == 0 {
            return Err(AudioError::invalid_config("sampling_rate must be positive"));
        }

        if self.feature_size != 1 {
            return Err(AudioError::invalid_config(format!(
                "Only raw-waveform extractors (feature_size = 1) are supported, got {}",
                self.feature_size
            )));
        }

        Ok(())
    }

    /// Convert mono samples at `sampling_rate` into a `(1, samples)` model input.
    ///
    /// Inputs shorter than `min_samples` are right-padded with
    /// `padding_value` after normalization.
    pub fn to_model_input(&self, samples: &[f32], min_samples: usize) -> Array2<f32> {
        let mut values = if self.do_normalize {
            zero_mean_unit_var_norm(samples)
        } else {
            samples.to_vec()
        };

        if values.len() < min_samples {
            debug!(
                "Padding input from {} to {} samples",
                values.len(),
                min_samples
            );
            values.resize(min_samples, self.padding_value);
        }

        Array1::from(values).insert_axis(Axis(0))
    }

    /// Load, resample and convert an audio file in one step
    pub fn prepare_file<P: AsRef<Path>>(&self, path: P, min_samples: usize) -> Result<PreparedAudio> {
        let clip = loader::load(path.as_ref())?;
        let source_rate = clip.sample_rate;

        let samples = if clip.sample_rate != self.sampling_rate {
            resampler::resample(&clip.samples, clip.sample_rate, self.sampling_rate)?
        } else {
            clip.samples
        };

        info!(
            "Prepared {} samples ({:.2}s at {} Hz)",
            samples.len(),
            samples.len() as f32 / self.sampling_rate as f32,
            self.sampling_rate
        );

        let input = self.to_model_input(&samples, min_samples);
        Ok(PreparedAudio {
            input,
            source_rate,
            samples: samples.len(),
        })
    }
}

/// Model input produced from an audio file
#[derive(Debug, Clone)]
pub struct PreparedAudio {
    /// `(1, samples)` tensor ready for the graph input
    pub input: Array2<f32>,
    /// Sample rate of the source file before resampling
    pub source_rate: u32,
    /// Number of real (unpadded) samples after resampling
    pub samples: usize,
}

/// Normalize to zero mean and unit variance (`(x - mean) / sqrt(var + 1e-7)`)
pub fn zero_mean_unit_var_norm(samples: &[f32]) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let n = samples.len() as f64;
    let mean = samples.iter().map(|&x| x as f64).sum::<f64>() / n;
    let var = samples
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let denom = (var + NORM_EPSILON as f64).sqrt();

    samples
        .iter()
        .map(|&x| ((x as f64 - mean) / denom) as f32)
        .collect()
}
