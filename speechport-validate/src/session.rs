//! ONNX Runtime session over an exported graph

use std::path::Path;

use ndarray::{Array2, Array3, ArrayView3};
use ort::{
    execution_providers::CPUExecutionProvider,
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use tracing::{debug, info};

use crate::error::{Result, ValidationError};

/// A loaded graph bound to one input and one output name
pub struct InferenceSession {
    session: Session,
    input_name: String,
    output_name: String,
}

impl InferenceSession {
    /// Load `path` into ONNX Runtime on the CPU provider.
    ///
    /// Fails with [`ValidationError::ArtifactLoad`] if the engine rejects the
    /// file or it does not declare `input_name` and `output_name`.
    pub fn load(path: &Path, input_name: &str, output_name: &str, num_threads: usize) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e| ValidationError::artifact_load(format!("Failed to create session builder: {}", e)))?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .map_err(|e| ValidationError::artifact_load(format!("Failed to set CPU provider: {}", e)))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ValidationError::artifact_load(format!("Failed to set optimization level: {}", e)))?
            .with_intra_threads(num_threads.max(1))
            .map_err(|e| ValidationError::artifact_load(format!("Failed to set thread count: {}", e)))?
            .commit_from_file(path)
            .map_err(|e| ValidationError::artifact_load(format!("Failed to load {}: {}", path.display(), e)))?;

        for input in session.inputs.iter() {
            debug!("Graph input '{}' ({:?})", input.name, input.input_type);
        }
        for output in session.outputs.iter() {
            debug!("Graph output '{}' ({:?})", output.name, output.output_type);
        }

        if !session.inputs.iter().any(|i| i.name == input_name) {
            return Err(ValidationError::artifact_load(format!(
                "graph has no input named '{}'",
                input_name
            )));
        }
        if !session.outputs.iter().any(|o| o.name == output_name) {
            return Err(ValidationError::artifact_load(format!(
                "graph has no output named '{}'",
                output_name
            )));
        }

        info!("Loaded {} into ONNX Runtime", path.display());

        Ok(Self {
            session,
            input_name: input_name.to_string(),
            output_name: output_name.to_string(),
        })
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Run one `(batch, samples)` input and return `(batch, frames, vocab)` logits
    pub fn run(&mut self, input: Array2<f32>) -> Result<Array3<f32>> {
        let input_value = Tensor::from_array(input)
            .map_err(|e| ValidationError::inference(format!("Failed to create input: {}", e)))?;

        let outputs = self
            .session
            .run(inputs![self.input_name.as_str() => input_value])
            .map_err(|e| run_error(e.to_string()))?;

        let logits: ArrayView3<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .map_err(|e| ValidationError::inference(format!("Failed to extract logits: {}", e)))?
            .into_dimensionality()
            .map_err(|e| ValidationError::shape(format!("logits are not rank 3: {}", e)))?;

        Ok(logits.to_owned())
    }
}

/// ONNX Runtime reports inputs that contradict the declared graph shape as
/// "Got invalid dimensions" or "Invalid rank"; anything else is an engine failure.
fn run_error(message: String) -> ValidationError {
    let lower = message.to_lowercase();
    if lower.contains("invalid dimensions") || lower.contains("invalid rank") {
        ValidationError::shape(format!("input rejected by the graph: {}", message))
    } else {
        ValidationError::inference(format!("Failed to run inference: {}", message))
    }
}
