//! Audio preprocessing for speechport
//!
//! Loads a clip from disk, resamples it to the model's rate and turns it into
//! the `(batch, samples)` tensor a raw-waveform acoustic model expects.
//!
//! ```no_run
//! use speechport_audio::FeatureExtractorConfig;
//!
//! let config = FeatureExtractorConfig::default();
//! let prepared = config.prepare_file("speech.wav", 400)?;
//! println!("input shape: {:?}", prepared.input.shape());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod features;
pub mod loader;
pub mod resampler;

pub use error::{AudioError, Result};
pub use features::{FeatureExtractorConfig, PreparedAudio, SAMPLE_RATE};
pub use loader::{load, AudioClip};
pub use resampler::{resample, Resampler};
