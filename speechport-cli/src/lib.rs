//! `speechport` command-line pipeline
//!
//! Resolves a model, exports it to `<output_dir>/onnx/model.onnx` and, when a
//! test clip is configured, validates the artifact under ONNX Runtime.

pub mod config;
pub mod pipeline;

pub use config::{CliConfig, DEFAULT_MODEL_ID};
pub use pipeline::{run, RunOutcome};
