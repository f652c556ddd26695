//! Error types for validation runs

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Failure of one validation step. None of these touch the artifact.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Decoding configuration error: {0}")]
    Config(String),

    #[error("Audio file not found: {0}")]
    AudioNotFound(PathBuf),

    #[error("Audio decoding error: {0}")]
    AudioDecode(String),

    #[error("Failed to load artifact: {0}")]
    ArtifactLoad(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Decoding error: {0}")]
    Decode(String),
}

impl ValidationError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn artifact_load<S: Into<String>>(msg: S) -> Self {
        Self::ArtifactLoad(msg.into())
    }

    pub fn shape<S: Into<String>>(msg: S) -> Self {
        Self::ShapeMismatch(msg.into())
    }

    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }
}

impl From<speechport_audio::AudioError> for ValidationError {
    fn from(e: speechport_audio::AudioError) -> Self {
        match e {
            speechport_audio::AudioError::NotFound(path) => Self::AudioNotFound(path),
            other => Self::AudioDecode(other.to_string()),
        }
    }
}
