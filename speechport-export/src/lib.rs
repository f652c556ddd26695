//! ONNX export of acoustic models
//!
//! [`Exporter`] traces a model into a staging area, [`ArtifactManager`]
//! publishes the result atomically. [`export_and_publish`] runs both.
//!
//! ```no_run
//! use std::path::Path;
//! use speechport_export::{export_and_publish, ExportSpec, Probe, PublishOptions};
//! use speechport_model::{LocalRepository, ModelRepository};
//!
//! let resolved = LocalRepository::new().resolve("models/tiny-ctc")?;
//! let probe = Probe::for_model(resolved.model.as_ref(), 10.0);
//! let artifact = export_and_publish(
//!     resolved.model.as_ref(),
//!     &resolved.id,
//!     ExportSpec::default(),
//!     probe,
//!     Path::new("out/onnx/model.onnx"),
//!     &PublishOptions::default(),
//! )?;
//! println!("{}", artifact.path.display());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod artifact;
pub mod error;
pub mod exporter;
pub mod pipeline;
pub mod spec;
pub mod staging;

pub use artifact::{metadata, ArtifactManager, GraphArtifact};
pub use error::{ExportError, PipelineError, PublishError, Result};
pub use exporter::{Exporter, StagedArtifact};
pub use pipeline::{export_and_publish, PublishOptions};
pub use spec::{ExportSpec, Probe, DEFAULT_OPSET, DEFAULT_PROBE_SECONDS};
pub use staging::StagingArea;
