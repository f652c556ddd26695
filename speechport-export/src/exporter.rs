//! Graph exporter
//!
//! Traces an [`AcousticModel`] with a probe input and writes one ONNX file
//! into a staging area.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;

use speechport_graph::{ArtifactInfo, ModelProto, TraceError, Tracer};
use speechport_model::AcousticModel;
use speechport_paths::ARTIFACT_FILE_NAME;
use tracing::info;

use crate::artifact::metadata;
use crate::error::{ExportError, Result};
use crate::spec::{ExportSpec, Probe, OUTPUT_RANK};
use crate::staging::StagingArea;

/// A graph written to a staging area, not yet published
#[derive(Debug, Clone)]
pub struct StagedArtifact {
    pub path: PathBuf,
    pub info: ArtifactInfo,
    pub size_bytes: usize,
}

pub struct Exporter {
    spec: ExportSpec,
}

impl Exporter {
    pub fn new(spec: ExportSpec) -> Result<Self> {
        spec.validate()?;
        Ok(Self { spec })
    }

    pub fn spec(&self) -> &ExportSpec {
        &self.spec
    }

    /// Record the model's forward pass as an ONNX model
    pub fn trace(&self, model: &dyn AcousticModel, model_id: &str, probe: Probe) -> Result<ModelProto> {
        if probe.batch == 0 || probe.samples < model.min_input_samples().max(1) {
            return Err(ExportError::invalid_spec(format!(
                "probe {:?} is smaller than the model's minimum input of {} samples",
                probe.shape(),
                model.min_input_samples()
            )));
        }

        info!(
            "Tracing {} with probe {:?} at opset {}",
            model.architecture(),
            probe.shape(),
            self.spec.opset_version
        );

        let mut tracer = Tracer::new(self.spec.opset_version, self.spec.constant_folding)?;
        let input = tracer.input(&self.spec.input, &probe.shape())?;
        let output = model.forward(&mut tracer, input)?;

        let out_shape = tracer.shape(output).to_vec();
        if out_shape.len() != OUTPUT_RANK {
            return Err(TraceError::signature(format!(
                "model output has rank {} ({:?}), expected {}",
                out_shape.len(),
                out_shape,
                OUTPUT_RANK
            ))
            .into());
        }
        if out_shape[0] != probe.batch {
            return Err(TraceError::signature(format!(
                "model output batch {} differs from input batch {}",
                out_shape[0], probe.batch
            ))
            .into());
        }
        if out_shape[2] != model.vocab_size() {
            return Err(TraceError::signature(format!(
                "model output has {} logits, vocab_size is {}",
                out_shape[2],
                model.vocab_size()
            ))
            .into());
        }

        let metadata = self.metadata(model, model_id);
        Ok(tracer.finish(output, &self.spec.output, &metadata)?)
    }

    /// Trace the model and write the graph into `staging`
    pub fn export(
        &self,
        model: &dyn AcousticModel,
        model_id: &str,
        probe: Probe,
        staging: &StagingArea,
    ) -> Result<StagedArtifact> {
        let proto = self.trace(model, model_id, probe)?;
        let info = ArtifactInfo::from_model(&proto)
            .map_err(|e| TraceError::signature(format!("traced graph is malformed: {}", e)))?;
        let bytes = proto.to_bytes();

        let path = staging.path().join(ARTIFACT_FILE_NAME);
        let mut file = File::create(&path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        info!(
            "Wrote {} ({} nodes, {} bytes)",
            path.display(),
            info.op_types.len(),
            bytes.len()
        );

        Ok(StagedArtifact {
            path,
            info,
            size_bytes: bytes.len(),
        })
    }

    fn metadata(&self, model: &dyn AcousticModel, model_id: &str) -> BTreeMap<String, String> {
        let axes = |axes: &BTreeMap<usize, String>| {
            axes.iter()
                .map(|(axis, label)| format!("{}:{}", axis, label))
                .collect::<Vec<_>>()
                .join(",")
        };

        [
            (metadata::MODEL_ID, model_id.to_string()),
            (metadata::ARCHITECTURE, model.architecture().to_string()),
            (metadata::SAMPLE_RATE, model.sample_rate().to_string()),
            (metadata::MIN_INPUT_LENGTH, model.min_input_samples().to_string()),
            (metadata::VOCAB_SIZE, model.vocab_size().to_string()),
            (metadata::INPUT_DYNAMIC_AXES, axes(&self.spec.input.dynamic_axes)),
            (metadata::OUTPUT_DYNAMIC_AXES, axes(&self.spec.output.dynamic_axes)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
    }
}
