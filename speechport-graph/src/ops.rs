//! Operator table
//!
//! Each operator the tracer can emit, with the first `ai.onnx` opset where
//! the form we emit is valid. The tracer rejects an operator before recording
//! it when the target opset is older.

/// Oldest opset the tracer can target (Unsqueeze takes `axes` as an input)
pub const MIN_OPSET: i64 = 13;

/// Newest opset the tracer can target
pub const MAX_OPSET: i64 = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Op {
    Add,
    Conv,
    Gelu,
    Identity,
    LayerNormalization,
    MatMul,
    Mul,
    ReduceMean,
    Relu,
    Softmax,
    Sub,
    Transpose,
    Unsqueeze,
}

impl Op {
    /// ONNX `op_type` string
    pub fn op_type(self) -> &'static str {
        match self {
            Op::Add => "Add",
            Op::Conv => "Conv",
            Op::Gelu => "Gelu",
            Op::Identity => "Identity",
            Op::LayerNormalization => "LayerNormalization",
            Op::MatMul => "MatMul",
            Op::Mul => "Mul",
            Op::ReduceMean => "ReduceMean",
            Op::Relu => "Relu",
            Op::Softmax => "Softmax",
            Op::Sub => "Sub",
            Op::Transpose => "Transpose",
            Op::Unsqueeze => "Unsqueeze",
        }
    }

    /// First opset providing this operator
    pub fn since_version(self) -> i64 {
        match self {
            Op::Gelu => 20,
            Op::LayerNormalization => 17,
            Op::Unsqueeze => 13,
            _ => 1,
        }
    }

    pub fn is_available(self, opset: i64) -> bool {
        opset >= self.since_version()
    }
}

/// ReduceMean moved `axes` from an attribute to an input in opset 18
pub fn reduce_axes_as_input(opset: i64) -> bool {
    opset >= 18
}

/// ONNX IR version matching an opset, as paired by the upstream release table
pub fn ir_version_for(opset: i64) -> i64 {
    match opset {
        ..=14 => 7,
        15..=18 => 8,
        19..=20 => 9,
        _ => 10,
    }
}

pub fn is_supported_opset(opset: i64) -> bool {
    (MIN_OPSET..=MAX_OPSET).contains(&opset)
}
