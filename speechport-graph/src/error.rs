//! Error types for graph tracing and artifact inspection

use std::path::PathBuf;

use thiserror::Error;

/// Failure while recording a model's computation into a graph
#[derive(Error, Debug)]
pub enum TraceError {
    #[error("Unsupported opset version {opset} (supported range {min}..={max})")]
    UnsupportedOpset { opset: i64, min: i64, max: i64 },

    #[error("Operator {op} is not available before opset {since} (target opset {opset})")]
    UnsupportedOperator {
        op: &'static str,
        since: i64,
        opset: i64,
    },

    #[error("{op}: {message}")]
    Shape { op: &'static str, message: String },

    #[error("{op}: expected {expected} tensor, got {actual}")]
    ElementType {
        op: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid graph signature: {0}")]
    Signature(String),

    #[error("Model cannot be expressed as a graph: {0}")]
    Model(String),
}

impl TraceError {
    pub fn shape(op: &'static str, message: impl Into<String>) -> Self {
        Self::Shape {
            op,
            message: message.into(),
        }
    }

    pub fn signature(message: impl Into<String>) -> Self {
        Self::Signature(message.into())
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }
}

/// Failure while reading a serialized graph back
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact not found: {0}")]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to decode ONNX model: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("Malformed ONNX model: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, TraceError>;
