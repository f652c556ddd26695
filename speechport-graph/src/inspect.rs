//! Read a serialized graph back
//!
//! Used to check what an export produced without running it: declared
//! inputs and outputs, their dynamic axes, the opset and the metadata the
//! exporter stored.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use prost::Message;

use crate::error::ArtifactError;
use crate::onnx::{tensor_shape_proto::dimension, type_proto, ModelProto, ValueInfoProto};

/// One declared dimension
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
    Fixed(i64),
    Dynamic(String),
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(n) => write!(f, "{}", n),
            Dim::Dynamic(label) => write!(f, "{}", label),
        }
    }
}

/// A graph input or output as declared in the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorDecl {
    pub name: String,
    pub elem_type: i32,
    pub dims: Vec<Dim>,
}

impl TensorDecl {
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Axis index -> symbolic name for every dynamic axis
    pub fn dynamic_axes(&self) -> BTreeMap<usize, String> {
        self.dims
            .iter()
            .enumerate()
            .filter_map(|(i, d)| match d {
                Dim::Dynamic(label) => Some((i, label.clone())),
                Dim::Fixed(_) => None,
            })
            .collect()
    }

    /// Check a concrete shape against the declaration
    pub fn accepts(&self, shape: &[usize]) -> Result<(), String> {
        if shape.len() != self.dims.len() {
            return Err(format!(
                "{} expects rank {}, got shape {:?}",
                self.name,
                self.dims.len(),
                shape
            ));
        }
        for (axis, (dim, &actual)) in self.dims.iter().zip(shape).enumerate() {
            if let Dim::Fixed(n) = dim {
                if *n != actual as i64 {
                    return Err(format!(
                        "{} axis {} is fixed at {}, got {}",
                        self.name, axis, n, actual
                    ));
                }
            }
        }
        Ok(())
    }

    fn from_value_info(info: &ValueInfoProto) -> Result<Self, ArtifactError> {
        let tensor = match info.r#type.as_ref().and_then(|t| t.value.as_ref()) {
            Some(type_proto::Value::TensorType(t)) => t,
            None => {
                return Err(ArtifactError::Malformed(format!(
                    "{} has no tensor type",
                    info.name
                )))
            }
        };

        let dims = tensor
            .shape
            .as_ref()
            .map(|s| {
                s.dim
                    .iter()
                    .map(|d| match &d.value {
                        Some(dimension::Value::DimValue(n)) => Dim::Fixed(*n),
                        Some(dimension::Value::DimParam(p)) => Dim::Dynamic(p.clone()),
                        None => Dim::Dynamic(String::new()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            name: info.name.clone(),
            elem_type: tensor.elem_type,
            dims,
        })
    }
}

impl fmt::Display for TensorDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.dims.iter().map(Dim::to_string).collect();
        write!(f, "{}[{}]", self.name, dims.join(", "))
    }
}

/// Summary of a serialized model
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub ir_version: i64,
    /// Default-domain opset
    pub opset: i64,
    pub producer: String,
    pub inputs: Vec<TensorDecl>,
    pub outputs: Vec<TensorDecl>,
    pub metadata: BTreeMap<String, String>,
    /// Operator types in node order
    pub op_types: Vec<String>,
    pub initializer_count: usize,
}

impl ArtifactInfo {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ArtifactError::NotFound(path.to_path_buf()));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let model = ModelProto::decode(bytes)?;
        Self::from_model(&model)
    }

    pub fn from_model(model: &ModelProto) -> Result<Self, ArtifactError> {
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| ArtifactError::Malformed("model has no graph".to_string()))?;

        let opset = model
            .opset_import
            .iter()
            .find(|o| o.domain.is_empty() || o.domain == "ai.onnx")
            .map(|o| o.version)
            .ok_or_else(|| ArtifactError::Malformed("model imports no ai.onnx opset".to_string()))?;

        // Older IR versions list initializers among the inputs
        let initializer_names: Vec<&str> = graph.initializer.iter().map(|i| i.name.as_str()).collect();
        let inputs = graph
            .input
            .iter()
            .filter(|i| !initializer_names.contains(&i.name.as_str()))
            .map(TensorDecl::from_value_info)
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = graph
            .output
            .iter()
            .map(TensorDecl::from_value_info)
            .collect::<Result<Vec<_>, _>>()?;

        if inputs.is_empty() || outputs.is_empty() {
            return Err(ArtifactError::Malformed(
                "graph must declare at least one input and one output".to_string(),
            ));
        }

        Ok(Self {
            ir_version: model.ir_version,
            opset,
            producer: model.producer_name.clone(),
            inputs,
            outputs,
            metadata: model
                .metadata_props
                .iter()
                .map(|p| (p.key.clone(), p.value.clone()))
                .collect(),
            op_types: graph.node.iter().map(|n| n.op_type.clone()).collect(),
            initializer_count: graph.initializer.len(),
        })
    }

    pub fn input(&self, name: &str) -> Option<&TensorDecl> {
        self.inputs.iter().find(|d| d.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&TensorDecl> {
        self.outputs.iter().find(|d| d.name == name)
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let err = ArtifactInfo::from_bytes(&[0xff, 0xff, 0xff, 0x01]).unwrap_err();
        assert!(matches!(err, ArtifactError::Decode(_)));
    }

    #[test]
    fn test_empty_model_is_malformed() {
        let err = ArtifactInfo::from_bytes(&[]).unwrap_err();
        assert!(matches!(err, ArtifactError::Malformed(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = ArtifactInfo::read("/no/such/model.onnx").unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(_)));
    }

    #[test]
    fn test_accepts_checks_fixed_axes_only() {
        let decl = TensorDecl {
            name: "output".to_string(),
            elem_type: 1,
            dims: vec![
                Dim::Dynamic("batch_size".to_string()),
                Dim::Dynamic("output_sequence".to_string()),
                Dim::Fixed(32),
            ],
        };
        assert!(decl.accepts(&[3, 99, 32]).is_ok());
        assert!(decl.accepts(&[1, 5, 31]).is_err());
        assert!(decl.accepts(&[1, 5]).is_err());
        assert_eq!(decl.to_string(), "output[batch_size, output_sequence, 32]");
        assert_eq!(decl.dynamic_axes().len(), 2);
    }
}
