//! Constant tensors (weights and folded values)

use ndarray::{ArrayD, IxDyn};

use crate::error::ArtifactError;
use crate::onnx::{TensorProto, DATA_TYPE_FLOAT, DATA_TYPE_INT64};

/// Element type of a traced value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElemType {
    Float,
    Int64,
}

impl ElemType {
    pub fn onnx_code(self) -> i32 {
        match self {
            ElemType::Float => DATA_TYPE_FLOAT,
            ElemType::Int64 => DATA_TYPE_INT64,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElemType::Float => "float32",
            ElemType::Int64 => "int64",
        }
    }
}

/// A constant tensor embedded in the graph as an initializer
#[derive(Debug, Clone, PartialEq)]
pub enum ConstTensor {
    F32(ArrayD<f32>),
    I64(ArrayD<i64>),
}

impl ConstTensor {
    pub fn shape(&self) -> &[usize] {
        match self {
            ConstTensor::F32(a) => a.shape(),
            ConstTensor::I64(a) => a.shape(),
        }
    }

    pub fn elem_type(&self) -> ElemType {
        match self {
            ConstTensor::F32(_) => ElemType::Float,
            ConstTensor::I64(_) => ElemType::Int64,
        }
    }

    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            ConstTensor::F32(a) => Some(a),
            ConstTensor::I64(_) => None,
        }
    }

    /// Serialize as a `TensorProto` with little-endian `raw_data`
    pub fn to_proto(&self, name: &str) -> TensorProto {
        let dims = self.shape().iter().map(|&d| d as i64).collect();
        let (data_type, raw_data) = match self {
            ConstTensor::F32(a) => (
                DATA_TYPE_FLOAT,
                a.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ),
            ConstTensor::I64(a) => (
                DATA_TYPE_INT64,
                a.iter().flat_map(|v| v.to_le_bytes()).collect(),
            ),
        };

        TensorProto {
            dims,
            data_type,
            name: name.to_string(),
            raw_data,
            ..Default::default()
        }
    }

    /// Decode a `TensorProto` written as raw data or typed fields
    pub fn from_proto(proto: &TensorProto) -> Result<Self, ArtifactError> {
        let shape: Vec<usize> = proto
            .dims
            .iter()
            .map(|&d| {
                usize::try_from(d).map_err(|_| {
                    ArtifactError::Malformed(format!("tensor {} has negative dim {}", proto.name, d))
                })
            })
            .collect::<Result<_, _>>()?;
        let count: usize = shape.iter().product();

        let bad_len = |n: usize| {
            ArtifactError::Malformed(format!(
                "tensor {} holds {} values, shape {:?} needs {}",
                proto.name, n, shape, count
            ))
        };

        match proto.data_type {
            DATA_TYPE_FLOAT => {
                let data: Vec<f32> = if proto.raw_data.is_empty() {
                    proto.float_data.clone()
                } else {
                    proto
                        .raw_data
                        .chunks_exact(4)
                        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                        .collect()
                };
                let n = data.len();
                ArrayD::from_shape_vec(IxDyn(&shape), data)
                    .map(ConstTensor::F32)
                    .map_err(|_| bad_len(n))
            }
            DATA_TYPE_INT64 => {
                let data: Vec<i64> = if proto.raw_data.is_empty() {
                    proto.int64_data.clone()
                } else {
                    proto
                        .raw_data
                        .chunks_exact(8)
                        .map(|b| {
                            let mut bytes = [0u8; 8];
                            bytes.copy_from_slice(b);
                            i64::from_le_bytes(bytes)
                        })
                        .collect()
                };
                let n = data.len();
                ArrayD::from_shape_vec(IxDyn(&shape), data)
                    .map(ConstTensor::I64)
                    .map_err(|_| bad_len(n))
            }
            other => Err(ArtifactError::Malformed(format!(
                "tensor {} has unsupported data type {}",
                proto.name, other
            ))),
        }
    }
}

impl From<ArrayD<f32>> for ConstTensor {
    fn from(a: ArrayD<f32>) -> Self {
        ConstTensor::F32(a)
    }
}

impl From<ArrayD<i64>> for ConstTensor {
    fn from(a: ArrayD<i64>) -> Self {
        ConstTensor::I64(a)
    }
}
