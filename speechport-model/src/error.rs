//! Error types for model acquisition

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    #[error("Weight loading error: {0}")]
    Weights(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RepositoryError {
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::ModelNotFound(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    pub fn weights<S: Into<String>>(msg: S) -> Self {
        Self::Weights(msg.into())
    }
}

impl From<speechport_audio::AudioError> for RepositoryError {
    fn from(e: speechport_audio::AudioError) -> Self {
        Self::Config(e.to_string())
    }
}
