//! `model.safetensors` loading

use std::collections::HashMap;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use safetensors::{Dtype, SafeTensors};
use tracing::debug;

use crate::error::{RepositoryError, Result};

/// Named float32 tensors read from a checkpoint
#[derive(Debug, Default)]
pub struct Weights {
    tensors: HashMap<String, ArrayD<f32>>,
}

impl Weights {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(RepositoryError::weights(format!(
                "Weights file not found: {}",
                path.display()
            )));
        }
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file = SafeTensors::deserialize(bytes)
            .map_err(|e| RepositoryError::weights(format!("Invalid safetensors data: {}", e)))?;

        let mut tensors = HashMap::new();
        for (name, view) in file.tensors() {
            if view.dtype() != Dtype::F32 {
                return Err(RepositoryError::weights(format!(
                    "Tensor {} has dtype {:?}, only F32 is supported",
                    name,
                    view.dtype()
                )));
            }

            let data: Vec<f32> = view
                .data()
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            let array = ArrayD::from_shape_vec(IxDyn(view.shape()), data).map_err(|e| {
                RepositoryError::weights(format!("Tensor {} has inconsistent size: {}", name, e))
            })?;
            tensors.insert(name, array);
        }

        debug!("Loaded {} tensors", tensors.len());
        Ok(Self { tensors })
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: ArrayD<f32>) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Remove a tensor, checking it has the expected shape
    pub fn take(&mut self, name: &str, shape: &[usize]) -> Result<ArrayD<f32>> {
        let tensor = self
            .tensors
            .remove(name)
            .ok_or_else(|| RepositoryError::weights(format!("Missing tensor: {}", name)))?;

        if tensor.shape() != shape {
            return Err(RepositoryError::weights(format!(
                "Tensor {} has shape {:?}, expected {:?}",
                name,
                tensor.shape(),
                shape
            )));
        }
        Ok(tensor)
    }
}

impl<S: Into<String>> FromIterator<(S, ArrayD<f32>)> for Weights {
    fn from_iter<I: IntoIterator<Item = (S, ArrayD<f32>)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
