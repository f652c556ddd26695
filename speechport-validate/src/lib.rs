//! End-to-end validation of exported graphs
//!
//! Runs a published ONNX artifact under ONNX Runtime on a real audio clip and
//! decodes the output with the source model's tokenizer. A validation
//! failure is reported through [`ValidationError`] and never modifies the
//! artifact.
//!
//! ```no_run
//! use std::path::Path;
//! use speechport_model::LocalRepository;
//! use speechport_validate::{RunnerConfig, ValidationRunner};
//!
//! let runner = ValidationRunner::new(RunnerConfig::new().num_threads(2));
//! let report = runner.validate(
//!     Path::new("out/onnx/model.onnx"),
//!     Path::new("clip.wav"),
//!     &LocalRepository::new(),
//!     "models/tiny-ctc",
//! )?;
//! println!("{}", report.transcript());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod decode;
pub mod error;
pub mod report;
pub mod runner;
pub mod session;

pub use decode::{argmax, predicted_ids};
pub use error::{Result, ValidationError};
pub use report::{ValidationReport, Verdict};
pub use runner::{RunnerConfig, ValidationRunner};
pub use session::InferenceSession;
