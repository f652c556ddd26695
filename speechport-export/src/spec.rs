//! Export specification and probe input

use std::collections::HashSet;

use speechport_graph::{TensorBinding, MAX_OPSET, MIN_OPSET};
use speechport_model::AcousticModel;

use crate::error::{ExportError, Result};

/// Opset used when none is requested
pub const DEFAULT_OPSET: i64 = 15;

/// Probe length used when none is requested
pub const DEFAULT_PROBE_SECONDS: f32 = 10.0;

/// Rank of the waveform input `(batch, samples)`
pub const INPUT_RANK: usize = 2;

/// Rank of the logits output `(batch, frames, vocab)`
pub const OUTPUT_RANK: usize = 3;

/// Names, dynamic axes and graph format options for one export
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSpec {
    pub input: TensorBinding,
    pub output: TensorBinding,
    pub opset_version: i64,
    pub constant_folding: bool,
}

impl Default for ExportSpec {
    fn default() -> Self {
        Self {
            input: TensorBinding::new("input")
                .with_dynamic_axis(0, "batch_size")
                .with_dynamic_axis(1, "sequence_length"),
            output: TensorBinding::new("output")
                .with_dynamic_axis(0, "batch_size")
                .with_dynamic_axis(1, "output_sequence"),
            opset_version: DEFAULT_OPSET,
            constant_folding: true,
        }
    }
}

impl ExportSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opset_version(mut self, opset: i64) -> Self {
        self.opset_version = opset;
        self
    }

    pub fn constant_folding(mut self, enabled: bool) -> Self {
        self.constant_folding = enabled;
        self
    }

    pub fn input(mut self, binding: TensorBinding) -> Self {
        self.input = binding;
        self
    }

    pub fn output(mut self, binding: TensorBinding) -> Self {
        self.output = binding;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(MIN_OPSET..=MAX_OPSET).contains(&self.opset_version) {
            return Err(ExportError::invalid_spec(format!(
                "opset_version must be between {} and {}, got {}",
                MIN_OPSET, MAX_OPSET, self.opset_version
            )));
        }

        for (binding, rank) in [(&self.input, INPUT_RANK), (&self.output, OUTPUT_RANK)] {
            if binding.name.is_empty() {
                return Err(ExportError::invalid_spec("tensor names cannot be empty"));
            }
            if let Some(axis) = binding.dynamic_axes.keys().find(|&&a| a >= rank) {
                return Err(ExportError::invalid_spec(format!(
                    "dynamic axis {} of {} exceeds rank {}",
                    axis, binding.name, rank
                )));
            }
            let mut labels = HashSet::new();
            for label in binding.dynamic_axes.values() {
                if label.is_empty() || !labels.insert(label) {
                    return Err(ExportError::invalid_spec(format!(
                        "dynamic axis labels of {} must be non-empty and distinct",
                        binding.name
                    )));
                }
            }
        }

        if self.input.name == self.output.name {
            return Err(ExportError::invalid_spec(format!(
                "input and output share the name {}",
                self.input.name
            )));
        }

        Ok(())
    }
}

/// Concrete input shape driving the trace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub batch: usize,
    pub samples: usize,
}

impl Probe {
    pub fn new(batch: usize, samples: usize) -> Self {
        Self { batch, samples }
    }

    /// One clip of `seconds` at the model's sample rate, never shorter than
    /// the model's receptive field
    pub fn for_model(model: &dyn AcousticModel, seconds: f32) -> Self {
        let samples = (seconds.max(0.0) * model.sample_rate() as f32).round() as usize;
        Self {
            batch: 1,
            samples: samples.max(model.min_input_samples()).max(1),
        }
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.batch, self.samples]
    }
}
