//! Graph recording and ONNX serialization
//!
//! Acoustic models describe their forward pass against a [`Tracer`]; the
//! recording becomes an ONNX `ModelProto` that any ONNX runtime can load.
//! [`ArtifactInfo`] reads a written model back for inspection.
//!
//! ```
//! use std::collections::BTreeMap;
//! use speechport_graph::{TensorBinding, Tracer};
//!
//! let mut tracer = Tracer::new(15, true)?;
//! let input = tracer.input(
//!     &TensorBinding::new("input").with_dynamic_axis(1, "sequence_length"),
//!     &[1, 16000],
//! )?;
//! let output = tracer.relu(input)?;
//! let model = tracer.finish(output, &TensorBinding::new("output"), &BTreeMap::new())?;
//! assert_eq!(model.opset_import[0].version, 15);
//! # Ok::<(), speechport_graph::TraceError>(())
//! ```

pub mod error;
pub mod inspect;
pub mod onnx;
pub mod ops;
pub mod tensor;
pub mod tracer;

pub use error::{ArtifactError, Result, TraceError};
pub use inspect::{ArtifactInfo, Dim, TensorDecl};
pub use onnx::ModelProto;
pub use ops::{Op, MAX_OPSET, MIN_OPSET};
pub use tensor::{ConstTensor, ElemType};
pub use tracer::{broadcast_shapes, Conv1dParams, TensorBinding, Tracer, Value};
