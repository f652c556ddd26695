//! Acoustic models and their decoding configuration
//!
//! - [`AcousticModel`]: a model that describes its forward pass to the graph
//!   tracer
//! - [`CtcTokenizer`]: greedy CTC decoding of predicted ids
//! - [`ModelRepository`]: resolves an identifier into both, from a local
//!   directory or (feature `hub`) the Hugging Face Hub

pub mod conv_ctc;
pub mod error;
pub mod fixed_sequence;
pub mod model;
pub mod repository;
pub mod tokenizer;
pub mod weights;

pub use conv_ctc::{Activation, ConvCtcConfig, ConvCtcForSpeech};
pub use error::{RepositoryError, Result};
pub use fixed_sequence::FixedSequence;
pub use model::{load_model, AcousticModel, SUPPORTED_ARCHITECTURES};
pub use repository::{
    load_directory, DecodingConfig, LocalRepository, ModelRepository, ResolvedModel,
};
#[cfg(feature = "hub")]
pub use repository::HubRepository;
pub use tokenizer::{CtcTokenizer, TokenizerConfig};
pub use weights::Weights;
