//! Convolutional CTC acoustic model
//!
//! A single strided 1-D convolution over the raw waveform followed by an
//! activation and a linear CTC head:
//!
//! ```text
//! input [B, T] -> Unsqueeze [B, 1, T] -> Conv [B, H, F] -> act
//!              -> Transpose [B, F, H] -> Linear [B, F, V]
//! ```

use std::path::Path;

use ndarray::ArrayD;
use serde::Deserialize;
use speechport_graph::{Conv1dParams, TraceError, Tracer, Value};
use tracing::debug;

use crate::error::{RepositoryError, Result};
use crate::model::AcousticModel;
use crate::weights::Weights;

fn default_kernel() -> usize {
    400
}

fn default_stride() -> usize {
    320
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Gelu,
}

/// Hyper-parameters from `config.json`
#[derive(Debug, Clone, Deserialize)]
pub struct ConvCtcConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    #[serde(default = "default_kernel")]
    pub conv_kernel: usize,
    #[serde(default = "default_stride")]
    pub conv_stride: usize,
    #[serde(default)]
    pub activation: Activation,
}

pub struct ConvCtcForSpeech {
    config: ConvCtcConfig,
    sample_rate: u32,
    conv_weight: ArrayD<f32>,
    conv_bias: ArrayD<f32>,
    head_weight: ArrayD<f32>,
    head_bias: ArrayD<f32>,
}

impl ConvCtcForSpeech {
    pub const NAME: &'static str = "ConvCtcForSpeech";

    /// Load hyper-parameters from `config` and weights from `model.safetensors`
    pub fn load(dir: &Path, config: serde_json::Value, sample_rate: u32) -> Result<Self> {
        let config: ConvCtcConfig = serde_json::from_value(config)
            .map_err(|e| RepositoryError::config(format!("Invalid {} config: {}", Self::NAME, e)))?;
        let weights = Weights::from_file(dir.join("model.safetensors"))?;
        Self::from_weights(config, weights, sample_rate)
    }

    pub fn from_weights(config: ConvCtcConfig, mut weights: Weights, sample_rate: u32) -> Result<Self> {
        if config.vocab_size == 0 || config.hidden_size == 0 {
            return Err(RepositoryError::config("vocab_size and hidden_size must be positive"));
        }
        if config.conv_kernel == 0 || config.conv_stride == 0 {
            return Err(RepositoryError::config("conv_kernel and conv_stride must be positive"));
        }

        let (h, v, k) = (config.hidden_size, config.vocab_size, config.conv_kernel);
        let conv_weight = weights.take("conv.weight", &[h, 1, k])?;
        let conv_bias = weights.take("conv.bias", &[h])?;
        let head_weight = weights.take("lm_head.weight", &[v, h])?;
        let head_bias = weights.take("lm_head.bias", &[v])?;

        if !weights.is_empty() {
            debug!("Ignoring {} unused tensors", weights.len());
        }

        Ok(Self {
            config,
            sample_rate,
            conv_weight,
            conv_bias,
            head_weight,
            head_bias,
        })
    }

    pub fn config(&self) -> &ConvCtcConfig {
        &self.config
    }
}

impl AcousticModel for ConvCtcForSpeech {
    fn architecture(&self) -> &str {
        Self::NAME
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn min_input_samples(&self) -> usize {
        self.config.conv_kernel
    }

    fn forward(&self, t: &mut Tracer, input: Value) -> std::result::Result<Value, TraceError> {
        let x = t.unsqueeze(input, &[1])?;

        let w = t.constant("conv.weight", self.conv_weight.clone());
        let b = t.constant("conv.bias", self.conv_bias.clone());
        let params = Conv1dParams {
            stride: self.config.conv_stride,
            ..Default::default()
        };
        let h = t.conv1d(x, w, Some(b), params)?;
        let h = match self.config.activation {
            Activation::Relu => t.relu(h)?,
            Activation::Gelu => t.gelu(h)?,
        };

        let h = t.transpose(h, &[0, 2, 1])?;
        let w = t.constant("lm_head.weight", self.head_weight.clone());
        let b = t.constant("lm_head.bias", self.head_bias.clone());
        t.linear(h, w, Some(b))
    }
}
