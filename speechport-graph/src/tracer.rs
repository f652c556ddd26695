//! Graph tracer
//!
//! A model describes its forward pass by calling operator methods on a
//! [`Tracer`] with a concrete probe input. Each call checks the operator
//! against the target opset, infers the output shape from the probe shapes
//! and records an ONNX node. [`Tracer::finish`] turns the recording into a
//! `ModelProto` whose input and output carry the caller's names and dynamic
//! axes.
//!
//! With constant folding enabled, operations whose inputs are all constants
//! are evaluated immediately and stored as initializers instead of nodes.

use std::collections::{BTreeMap, HashMap, HashSet};

use ndarray::{Array1, ArrayD, Axis, IxDyn};
use tracing::debug;

use crate::error::{Result, TraceError};
use crate::onnx::{
    tensor_shape_proto::{dimension, Dimension},
    tensor_value_info, AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto,
    StringStringEntryProto,
};
use crate::ops::{self, Op};
use crate::tensor::{ConstTensor, ElemType};

/// Name of the graph inside the written model
pub const GRAPH_NAME: &str = "main_graph";

/// Producer recorded in every written model
pub const PRODUCER_NAME: &str = "speechport";

/// Public name and dynamic axes of a graph input or output
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TensorBinding {
    pub name: String,
    /// Axis index -> symbolic dimension name
    pub dynamic_axes: BTreeMap<usize, String>,
}

impl TensorBinding {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dynamic_axes: BTreeMap::new(),
        }
    }

    /// Mark `axis` as variable-length under `label`
    pub fn with_dynamic_axis(mut self, axis: usize, label: impl Into<String>) -> Self {
        self.dynamic_axes.insert(axis, label.into());
        self
    }

    fn check_rank(&self, rank: usize) -> Result<()> {
        if self.name.is_empty() {
            return Err(TraceError::signature("tensor name cannot be empty"));
        }
        if let Some((&axis, _)) = self.dynamic_axes.iter().find(|(a, _)| **a >= rank) {
            return Err(TraceError::signature(format!(
                "dynamic axis {} out of range for {} (rank {})",
                axis, self.name, rank
            )));
        }
        if let Some((_, label)) = self.dynamic_axes.iter().find(|(_, l)| l.is_empty()) {
            return Err(TraceError::signature(format!(
                "dynamic axis label {:?} on {} is empty",
                label, self.name
            )));
        }
        Ok(())
    }

    fn declared_dims(&self, shape: &[usize]) -> Vec<Dimension> {
        shape
            .iter()
            .enumerate()
            .map(|(axis, &size)| Dimension {
                value: Some(match self.dynamic_axes.get(&axis) {
                    Some(label) => dimension::Value::DimParam(label.clone()),
                    None => dimension::Value::DimValue(size as i64),
                }),
                denotation: String::new(),
            })
            .collect()
    }
}

/// Handle to a tensor recorded by a [`Tracer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Input,
    Initializer,
    Node(usize),
}

#[derive(Debug, Clone)]
struct TracedValue {
    name: String,
    shape: Vec<usize>,
    elem: ElemType,
    source: Source,
}

/// 1-D convolution settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv1dParams {
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub group: usize,
}

impl Default for Conv1dParams {
    fn default() -> Self {
        Self {
            stride: 1,
            padding: 0,
            dilation: 1,
            group: 1,
        }
    }
}

impl Conv1dParams {
    /// Number of input samples one output frame depends on
    pub fn receptive_field(&self, kernel: usize) -> usize {
        self.dilation * kernel.saturating_sub(1) + 1
    }
}

/// Records operations into an ONNX graph
pub struct Tracer {
    opset: i64,
    constant_folding: bool,
    values: Vec<TracedValue>,
    constants: HashMap<usize, ConstTensor>,
    nodes: Vec<NodeProto>,
    taken: HashSet<String>,
    inputs: Vec<(usize, TensorBinding)>,
}

impl Tracer {
    pub fn new(opset: i64, constant_folding: bool) -> Result<Self> {
        if !ops::is_supported_opset(opset) {
            return Err(TraceError::UnsupportedOpset {
                opset,
                min: ops::MIN_OPSET,
                max: ops::MAX_OPSET,
            });
        }

        Ok(Self {
            opset,
            constant_folding,
            values: Vec::new(),
            constants: HashMap::new(),
            nodes: Vec::new(),
            taken: HashSet::new(),
            inputs: Vec::new(),
        })
    }

    pub fn opset(&self) -> i64 {
        self.opset
    }

    pub fn constant_folding(&self) -> bool {
        self.constant_folding
    }

    /// Probe shape of a value
    pub fn shape(&self, value: Value) -> &[usize] {
        &self.values[value.0].shape
    }

    pub fn elem_type(&self, value: Value) -> ElemType {
        self.values[value.0].elem
    }

    /// Number of nodes recorded so far
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Declare a float graph input with the given probe shape
    pub fn input(&mut self, binding: &TensorBinding, probe_shape: &[usize]) -> Result<Value> {
        binding.check_rank(probe_shape.len())?;
        if self.taken.contains(&binding.name) {
            return Err(TraceError::signature(format!(
                "input name {} is already in use",
                binding.name
            )));
        }
        if probe_shape.iter().any(|&d| d == 0) {
            return Err(TraceError::signature(format!(
                "probe shape {:?} for {} has an empty axis",
                probe_shape, binding.name
            )));
        }

        self.taken.insert(binding.name.clone());
        let value = self.push_value(
            binding.name.clone(),
            probe_shape.to_vec(),
            ElemType::Float,
            Source::Input,
        );
        self.inputs.push((value.0, binding.clone()));
        Ok(value)
    }

    /// Embed a constant; the name is made unique if already taken
    pub fn constant(&mut self, name: &str, tensor: impl Into<ConstTensor>) -> Value {
        let tensor = tensor.into();
        let name = self.fresh_name(name);
        let value = self.push_value(
            name,
            tensor.shape().to_vec(),
            tensor.elem_type(),
            Source::Initializer,
        );
        self.constants.insert(value.0, tensor);
        value
    }

    /// Scalar float constant
    pub fn scalar(&mut self, name: &str, v: f32) -> Value {
        self.constant(name, ArrayD::from_elem(IxDyn(&[]), v))
    }

    pub fn conv1d(
        &mut self,
        x: Value,
        weight: Value,
        bias: Option<Value>,
        params: Conv1dParams,
    ) -> Result<Value> {
        const OP: &str = "Conv";
        self.require(Op::Conv)?;
        self.expect_float(OP, x)?;
        self.expect_float(OP, weight)?;

        let xs = self.shape(x).to_vec();
        let ws = self.shape(weight).to_vec();
        if xs.len() != 3 || ws.len() != 3 {
            return Err(TraceError::shape(
                OP,
                format!("expected rank-3 input and weight, got {:?} and {:?}", xs, ws),
            ));
        }
        if params.stride == 0 || params.dilation == 0 || params.group == 0 {
            return Err(TraceError::shape(OP, "stride, dilation and group must be positive"));
        }

        let (channels, length) = (xs[1], xs[2]);
        let (filters, per_group, kernel) = (ws[0], ws[1], ws[2]);
        if channels % params.group != 0
            || filters % params.group != 0
            || channels / params.group != per_group
        {
            return Err(TraceError::shape(
                OP,
                format!(
                    "weight {:?} does not match {} input channels in {} groups",
                    ws, channels, params.group
                ),
            ));
        }

        if let Some(b) = bias {
            self.expect_float(OP, b)?;
            if self.shape(b) != [filters] {
                return Err(TraceError::shape(
                    OP,
                    format!("bias shape {:?}, expected [{}]", self.shape(b), filters),
                ));
            }
        }

        let field = params.receptive_field(kernel);
        let padded = length + 2 * params.padding;
        if padded < field {
            return Err(TraceError::shape(
                OP,
                format!("input length {} is shorter than the receptive field {}", length, field),
            ));
        }
        let out_len = (padded - field) / params.stride + 1;

        let attrs = vec![
            AttributeProto::ints("dilations", &[params.dilation as i64]),
            AttributeProto::int("group", params.group as i64),
            AttributeProto::ints("kernel_shape", &[kernel as i64]),
            AttributeProto::ints("pads", &[params.padding as i64, params.padding as i64]),
            AttributeProto::ints("strides", &[params.stride as i64]),
        ];

        let mut inputs = vec![x, weight];
        inputs.extend(bias);
        Ok(self.emit(
            Op::Conv,
            &inputs,
            attrs,
            vec![xs[0], filters, out_len],
            ElemType::Float,
        ))
    }

    pub fn unsqueeze(&mut self, x: Value, axes: &[i64]) -> Result<Value> {
        const OP: &str = "Unsqueeze";
        self.require(Op::Unsqueeze)?;

        if axes.is_empty() {
            return Err(TraceError::shape(OP, "axes cannot be empty"));
        }
        let shape = self.shape(x).to_vec();
        let out_rank = shape.len() + axes.len();
        let mut positions = axes
            .iter()
            .map(|&a| normalize_axis(OP, a, out_rank))
            .collect::<Result<Vec<_>>>()?;
        positions.sort_unstable();
        if positions.windows(2).any(|w| w[0] == w[1]) {
            return Err(TraceError::shape(OP, format!("repeated axis in {:?}", axes)));
        }

        let mut out_shape = shape;
        for &p in &positions {
            out_shape.insert(p, 1);
        }

        if let Some(a) = self.folding_candidate(x) {
            let folded = positions
                .iter()
                .fold(a.clone(), |acc, &p| acc.insert_axis(Axis(p)));
            return Ok(self.fold(OP, x, folded));
        }

        let axes_value = self.constant("axes", Array1::from(axes.to_vec()).into_dyn());
        let elem = self.elem_type(x);
        Ok(self.emit(Op::Unsqueeze, &[x, axes_value], Vec::new(), out_shape, elem))
    }

    pub fn transpose(&mut self, x: Value, perm: &[usize]) -> Result<Value> {
        const OP: &str = "Transpose";
        self.require(Op::Transpose)?;

        let shape = self.shape(x).to_vec();
        let mut sorted = perm.to_vec();
        sorted.sort_unstable();
        if !sorted.iter().copied().eq(0..shape.len()) {
            return Err(TraceError::shape(
                OP,
                format!("{:?} is not a permutation of rank {}", perm, shape.len()),
            ));
        }
        let out_shape: Vec<usize> = perm.iter().map(|&p| shape[p]).collect();

        if let Some(a) = self.folding_candidate(x) {
            let folded = a
                .view()
                .permuted_axes(IxDyn(perm))
                .as_standard_layout()
                .into_owned();
            return Ok(self.fold(OP, x, folded));
        }

        let attrs = vec![AttributeProto::ints(
            "perm",
            &perm.iter().map(|&p| p as i64).collect::<Vec<_>>(),
        )];
        let elem = self.elem_type(x);
        Ok(self.emit(Op::Transpose, &[x], attrs, out_shape, elem))
    }

    /// Batched matrix product over the last two axes
    pub fn matmul(&mut self, a: Value, b: Value) -> Result<Value> {
        const OP: &str = "MatMul";
        self.require(Op::MatMul)?;
        self.expect_float(OP, a)?;
        self.expect_float(OP, b)?;

        let (sa, sb) = (self.shape(a).to_vec(), self.shape(b).to_vec());
        if sa.len() < 2 || sb.len() < 2 {
            return Err(TraceError::shape(
                OP,
                format!("operands must be at least rank 2, got {:?} and {:?}", sa, sb),
            ));
        }

        let (ra, rb) = (sa.len(), sb.len());
        if sa[ra - 1] != sb[rb - 2] {
            return Err(TraceError::shape(
                OP,
                format!("inner dimensions differ: {:?} x {:?}", sa, sb),
            ));
        }
        let mut out_shape = broadcast_shapes(&sa[..ra - 2], &sb[..rb - 2]).ok_or_else(|| {
            TraceError::shape(OP, format!("batch dimensions of {:?} and {:?} do not broadcast", sa, sb))
        })?;
        out_shape.extend([sa[ra - 2], sb[rb - 1]]);

        Ok(self.emit(Op::MatMul, &[a, b], Vec::new(), out_shape, ElemType::Float))
    }

    pub fn add(&mut self, a: Value, b: Value) -> Result<Value> {
        self.binary(Op::Add, a, b)
    }

    pub fn sub(&mut self, a: Value, b: Value) -> Result<Value> {
        self.binary(Op::Sub, a, b)
    }

    pub fn mul(&mut self, a: Value, b: Value) -> Result<Value> {
        self.binary(Op::Mul, a, b)
    }

    /// `x @ weight^T + bias` with a `[out, in]` weight, as in a linear layer
    pub fn linear(&mut self, x: Value, weight: Value, bias: Option<Value>) -> Result<Value> {
        let wt = self.transpose(weight, &[1, 0])?;
        let y = self.matmul(x, wt)?;
        match bias {
            Some(b) => self.add(y, b),
            None => Ok(y),
        }
    }

    pub fn relu(&mut self, x: Value) -> Result<Value> {
        self.unary(Op::Relu, x, Vec::new())
    }

    pub fn gelu(&mut self, x: Value) -> Result<Value> {
        self.unary(Op::Gelu, x, Vec::new())
    }

    pub fn identity(&mut self, x: Value) -> Result<Value> {
        self.require(Op::Identity)?;
        let (shape, elem) = (self.shape(x).to_vec(), self.elem_type(x));
        Ok(self.emit(Op::Identity, &[x], Vec::new(), shape, elem))
    }

    pub fn softmax(&mut self, x: Value, axis: i64) -> Result<Value> {
        let rank = self.shape(x).len();
        normalize_axis("Softmax", axis, rank)?;
        self.unary(Op::Softmax, x, vec![AttributeProto::int("axis", axis)])
    }

    pub fn reduce_mean(&mut self, x: Value, axes: &[i64], keepdims: bool) -> Result<Value> {
        const OP: &str = "ReduceMean";
        self.require(Op::ReduceMean)?;
        self.expect_float(OP, x)?;

        let shape = self.shape(x).to_vec();
        let reduced = axes
            .iter()
            .map(|&a| normalize_axis(OP, a, shape.len()))
            .collect::<Result<HashSet<_>>>()?;
        if reduced.len() != axes.len() {
            return Err(TraceError::shape(OP, format!("repeated axis in {:?}", axes)));
        }

        let out_shape: Vec<usize> = shape
            .iter()
            .enumerate()
            .filter_map(|(i, &d)| match (reduced.contains(&i), keepdims) {
                (false, _) => Some(d),
                (true, true) => Some(1),
                (true, false) => None,
            })
            .collect();

        let mut attrs = vec![AttributeProto::int("keepdims", keepdims as i64)];
        let mut inputs = vec![x];
        if ops::reduce_axes_as_input(self.opset) {
            let axes_value = self.constant("axes", Array1::from(axes.to_vec()).into_dyn());
            inputs.push(axes_value);
        } else {
            attrs.insert(0, AttributeProto::ints("axes", axes));
        }

        Ok(self.emit(Op::ReduceMean, &inputs, attrs, out_shape, ElemType::Float))
    }

    /// Layer normalization over the axes from `axis` to the end
    pub fn layer_norm(
        &mut self,
        x: Value,
        scale: Value,
        bias: Option<Value>,
        axis: i64,
        epsilon: f32,
    ) -> Result<Value> {
        const OP: &str = "LayerNormalization";
        self.require(Op::LayerNormalization)?;
        self.expect_float(OP, x)?;

        let shape = self.shape(x).to_vec();
        let start = normalize_axis(OP, axis, shape.len())?;
        let normalized = &shape[start..];
        for param in std::iter::once(scale).chain(bias) {
            self.expect_float(OP, param)?;
            if self.shape(param) != normalized {
                return Err(TraceError::shape(
                    OP,
                    format!(
                        "parameter shape {:?} does not match normalized shape {:?}",
                        self.shape(param),
                        normalized
                    ),
                ));
            }
        }

        let attrs = vec![
            AttributeProto::int("axis", axis),
            AttributeProto::float("epsilon", epsilon),
        ];
        let mut inputs = vec![x, scale];
        inputs.extend(bias);
        Ok(self.emit(Op::LayerNormalization, &inputs, attrs, shape, ElemType::Float))
    }

    /// Close the recording and produce the model.
    ///
    /// `output` is exposed under `binding.name`. Initializers no node reads
    /// are dropped. Dimensions listed in a binding's dynamic axes are written
    /// symbolically; every other dimension keeps its probe size.
    pub fn finish(
        mut self,
        output: Value,
        binding: &TensorBinding,
        metadata: &BTreeMap<String, String>,
    ) -> Result<ModelProto> {
        if self.inputs.is_empty() {
            return Err(TraceError::signature("graph has no inputs"));
        }
        let out_shape = self.shape(output).to_vec();
        binding.check_rank(out_shape.len())?;

        let current = self.values[output.0].clone();
        if current.name != binding.name {
            if self.taken.contains(&binding.name) {
                return Err(TraceError::signature(format!(
                    "output name {} is already used inside the graph",
                    binding.name
                )));
            }
            match current.source {
                Source::Node(index) => self.rename_node_output(index, &current.name, &binding.name),
                Source::Input | Source::Initializer => {
                    self.taken.insert(binding.name.clone());
                    let node_name = self.fresh_name(&format!("/Identity_{}", self.nodes.len()));
                    self.nodes.push(NodeProto {
                        input: vec![current.name.clone()],
                        output: vec![binding.name.clone()],
                        name: node_name,
                        op_type: Op::Identity.op_type().to_string(),
                        ..Default::default()
                    });
                }
            }
        }

        let referenced: HashSet<&str> = self
            .nodes
            .iter()
            .flat_map(|n| n.input.iter().map(String::as_str))
            .collect();
        let initializer: Vec<_> = self
            .values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.source == Source::Initializer && referenced.contains(v.name.as_str()))
            .filter_map(|(i, v)| self.constants.get(&i).map(|t| t.to_proto(&v.name)))
            .collect();

        let input = self
            .inputs
            .iter()
            .map(|(index, b)| {
                let v = &self.values[*index];
                tensor_value_info(&b.name, v.elem.onnx_code(), b.declared_dims(&v.shape))
            })
            .collect();
        let output_info = tensor_value_info(
            &binding.name,
            current.elem.onnx_code(),
            binding.declared_dims(&out_shape),
        );

        debug!(
            "Traced graph: {} nodes, {} initializers, opset {}",
            self.nodes.len(),
            initializer.len(),
            self.opset
        );

        Ok(ModelProto {
            ir_version: ops::ir_version_for(self.opset),
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: self.opset,
            }],
            producer_name: PRODUCER_NAME.to_string(),
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
            graph: Some(GraphProto {
                node: self.nodes,
                name: GRAPH_NAME.to_string(),
                initializer,
                input,
                output: vec![output_info],
                ..Default::default()
            }),
            metadata_props: metadata
                .iter()
                .map(|(k, v)| StringStringEntryProto {
                    key: k.clone(),
                    value: v.clone(),
                })
                .collect(),
            ..Default::default()
        })
    }

    fn require(&self, op: Op) -> Result<()> {
        if op.is_available(self.opset) {
            Ok(())
        } else {
            Err(TraceError::UnsupportedOperator {
                op: op.op_type(),
                since: op.since_version(),
                opset: self.opset,
            })
        }
    }

    fn expect_float(&self, op: &'static str, v: Value) -> Result<()> {
        match self.elem_type(v) {
            ElemType::Float => Ok(()),
            other => Err(TraceError::ElementType {
                op,
                expected: ElemType::Float.name(),
                actual: other.name(),
            }),
        }
    }

    fn unary(&mut self, op: Op, x: Value, attrs: Vec<AttributeProto>) -> Result<Value> {
        self.require(op)?;
        self.expect_float(op.op_type(), x)?;
        let shape = self.shape(x).to_vec();
        Ok(self.emit(op, &[x], attrs, shape, ElemType::Float))
    }

    fn binary(&mut self, op: Op, a: Value, b: Value) -> Result<Value> {
        let name = op.op_type();
        self.require(op)?;
        self.expect_float(name, a)?;
        self.expect_float(name, b)?;

        let out_shape = broadcast_shapes(self.shape(a), self.shape(b)).ok_or_else(|| {
            TraceError::shape(
                name,
                format!("shapes {:?} and {:?} do not broadcast", self.shape(a), self.shape(b)),
            )
        })?;

        if let (Some(x), Some(y)) = (self.folding_candidate(a), self.folding_candidate(b)) {
            let folded = match op {
                Op::Add => x + y,
                Op::Sub => x - y,
                _ => x * y,
            };
            return Ok(self.fold(name, a, folded));
        }

        Ok(self.emit(op, &[a, b], Vec::new(), out_shape, ElemType::Float))
    }

    /// Constant float data of `v` when folding is enabled
    fn folding_candidate(&self, v: Value) -> Option<&ArrayD<f32>> {
        if !self.constant_folding {
            return None;
        }
        self.constants.get(&v.0).and_then(ConstTensor::as_f32)
    }

    fn fold(&mut self, op: &str, source: Value, data: ArrayD<f32>) -> Value {
        let base = format!("{}/{}", self.values[source.0].name, op);
        let value = self.constant(&base, data);
        debug!("Folded {} into initializer {}", op, self.values[value.0].name);
        value
    }

    fn emit(
        &mut self,
        op: Op,
        inputs: &[Value],
        attribute: Vec<AttributeProto>,
        shape: Vec<usize>,
        elem: ElemType,
    ) -> Value {
        let index = self.nodes.len();
        let name = self.fresh_name(&format!("/{}_{}", op.op_type(), index));
        let output = self.fresh_name(&format!("{}_output_0", name));

        self.nodes.push(NodeProto {
            input: inputs.iter().map(|v| self.values[v.0].name.clone()).collect(),
            output: vec![output.clone()],
            name,
            op_type: op.op_type().to_string(),
            attribute,
            ..Default::default()
        });
        self.push_value(output, shape, elem, Source::Node(index))
    }

    fn push_value(&mut self, name: String, shape: Vec<usize>, elem: ElemType, source: Source) -> Value {
        self.values.push(TracedValue {
            name,
            shape,
            elem,
            source,
        });
        Value(self.values.len() - 1)
    }

    fn fresh_name(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut suffix = 1;
        while self.taken.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        self.taken.insert(candidate.clone());
        candidate
    }

    fn rename_node_output(&mut self, index: usize, old: &str, new: &str) {
        self.taken.remove(old);
        self.taken.insert(new.to_string());
        for name in self.nodes[index].output.iter_mut().filter(|n| n.as_str() == old) {
            *name = new.to_string();
        }
        for name in self
            .nodes
            .iter_mut()
            .flat_map(|n| n.input.iter_mut())
            .filter(|n| n.as_str() == old)
        {
            *name = new.to_string();
        }
        for v in self.values.iter_mut().filter(|v| v.name == old) {
            v.name = new.to_string();
        }
    }
}

fn normalize_axis(op: &'static str, axis: i64, rank: usize) -> Result<usize> {
    let r = rank as i64;
    let a = if axis < 0 { axis + r } else { axis };
    if (0..r).contains(&a) {
        Ok(a as usize)
    } else {
        Err(TraceError::shape(
            op,
            format!("axis {} out of range for rank {}", axis, rank),
        ))
    }
}

/// Numpy-style broadcast of two shapes
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Option<Vec<usize>> {
    let rank = a.len().max(b.len());
    let dim = |s: &[usize], i: usize| {
        let offset = rank - s.len();
        if i < offset {
            1
        } else {
            s[i - offset]
        }
    };

    (0..rank)
        .map(|i| match (dim(a, i), dim(b, i)) {
            (x, y) if x == y => Some(x),
            (1, y) => Some(y),
            (x, 1) => Some(x),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onnx::type_proto;
    use ndarray::Array;

    fn audio_binding() -> TensorBinding {
        TensorBinding::new("input")
            .with_dynamic_axis(0, "batch_size")
            .with_dynamic_axis(1, "sequence_length")
    }

    fn dims(model: &ModelProto, output: bool) -> Vec<dimension::Value> {
        let graph = model.graph.as_ref().unwrap();
        let info = if output { &graph.output[0] } else { &graph.input[0] };
        match info.r#type.as_ref().unwrap().value.as_ref().unwrap() {
            type_proto::Value::TensorType(t) => t
                .shape
                .as_ref()
                .unwrap()
                .dim
                .iter()
                .map(|d| d.value.clone().unwrap())
                .collect(),
        }
    }

    #[test]
    fn test_rejects_opset_out_of_range() {
        assert!(matches!(
            Tracer::new(12, true),
            Err(TraceError::UnsupportedOpset { opset: 12, .. })
        ));
        assert!(Tracer::new(15, true).is_ok());
    }

    #[test]
    fn test_conv_shape_inference() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 16000]).unwrap();
        let x = t.unsqueeze(x, &[1]).unwrap();
        assert_eq!(t.shape(x), &[1, 1, 16000]);

        let w = t.constant("conv.weight", Array::<f32, _>::zeros(IxDyn(&[8, 1, 400])));
        let b = t.constant("conv.bias", Array::<f32, _>::zeros(IxDyn(&[8])));
        let params = Conv1dParams {
            stride: 320,
            ..Default::default()
        };
        let y = t.conv1d(x, w, Some(b), params).unwrap();
        assert_eq!(t.shape(y), &[1, 8, 49]);
    }

    #[test]
    fn test_conv_input_shorter_than_kernel() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 10]).unwrap();
        let x = t.unsqueeze(x, &[1]).unwrap();
        let w = t.constant("w", Array::<f32, _>::zeros(IxDyn(&[2, 1, 16])));
        let err = t.conv1d(x, w, None, Conv1dParams::default()).unwrap_err();
        assert!(matches!(err, TraceError::Shape { op: "Conv", .. }));
    }

    #[test]
    fn test_gelu_rejected_below_opset_20() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 4]).unwrap();
        let err = t.gelu(x).unwrap_err();
        assert!(matches!(
            err,
            TraceError::UnsupportedOperator {
                op: "Gelu",
                since: 20,
                opset: 15
            }
        ));

        let mut t = Tracer::new(20, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 4]).unwrap();
        assert!(t.gelu(x).is_ok());
    }

    #[test]
    fn test_broadcast_shapes() {
        assert_eq!(broadcast_shapes(&[2, 1, 3], &[4, 1]), Some(vec![2, 4, 3]));
        assert_eq!(broadcast_shapes(&[], &[5]), Some(vec![5]));
        assert_eq!(broadcast_shapes(&[2, 3], &[4, 3]), None);
    }

    #[test]
    fn test_transpose_of_constant_is_folded() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 3]).unwrap();
        let w = t.constant(
            "lm_head.weight",
            Array::from_shape_vec(IxDyn(&[2, 3]), vec![1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        );
        let x = t.unsqueeze(x, &[0]).unwrap();
        let y = t.linear(x, w, None).unwrap();
        assert_eq!(t.shape(y), &[1, 1, 2]);

        let model = t.finish(y, &TensorBinding::new("output"), &BTreeMap::new()).unwrap();
        let graph = model.graph.unwrap();
        let ops: Vec<_> = graph.node.iter().map(|n| n.op_type.as_str()).collect();
        assert_eq!(ops, vec!["Unsqueeze", "MatMul"]);

        // Only the transposed weight and the unsqueeze axes survive
        assert_eq!(graph.initializer.len(), 2);
        let folded = graph
            .initializer
            .iter()
            .find(|i| i.name == "lm_head.weight/Transpose")
            .unwrap();
        assert_eq!(folded.dims, vec![3, 2]);
        let data = ConstTensor::from_proto(folded).unwrap();
        assert_eq!(
            data.as_f32().unwrap().iter().copied().collect::<Vec<_>>(),
            vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]
        );
    }

    #[test]
    fn test_no_folding_keeps_transpose_node() {
        let mut t = Tracer::new(15, false).unwrap();
        let x = t.input(&audio_binding(), &[1, 3]).unwrap();
        let w = t.constant("w", Array::<f32, _>::zeros(IxDyn(&[2, 3])));
        let y = t.linear(x, w, None).unwrap();

        let model = t.finish(y, &TensorBinding::new("output"), &BTreeMap::new()).unwrap();
        let ops: Vec<_> = model
            .graph
            .unwrap()
            .node
            .iter()
            .map(|n| n.op_type.clone())
            .collect();
        assert_eq!(ops, vec!["Transpose", "MatMul"]);
    }

    #[test]
    fn test_finish_names_and_dynamic_axes() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 160]).unwrap();
        let y = t.unsqueeze(x, &[2]).unwrap();
        let binding = TensorBinding::new("output")
            .with_dynamic_axis(0, "batch_size")
            .with_dynamic_axis(1, "output_sequence");

        let mut metadata = BTreeMap::new();
        metadata.insert("sample_rate".to_string(), "16000".to_string());
        let model = t.finish(y, &binding, &metadata).unwrap();

        assert_eq!(model.ir_version, 8);
        assert_eq!(model.opset_import[0].version, 15);
        assert_eq!(model.metadata_props[0].key, "sample_rate");

        let graph = model.graph.as_ref().unwrap();
        assert_eq!(graph.input[0].name, "input");
        assert_eq!(graph.output[0].name, "output");
        assert_eq!(graph.node.last().unwrap().output, vec!["output".to_string()]);

        assert_eq!(
            dims(&model, false),
            vec![
                dimension::Value::DimParam("batch_size".into()),
                dimension::Value::DimParam("sequence_length".into()),
            ]
        );
        assert_eq!(
            dims(&model, true),
            vec![
                dimension::Value::DimParam("batch_size".into()),
                dimension::Value::DimParam("output_sequence".into()),
                dimension::Value::DimValue(1),
            ]
        );
    }

    #[test]
    fn test_input_passthrough_gets_identity() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 8]).unwrap();
        let model = t.finish(x, &TensorBinding::new("output"), &BTreeMap::new()).unwrap();
        let graph = model.graph.unwrap();
        assert_eq!(graph.node.len(), 1);
        assert_eq!(graph.node[0].op_type, "Identity");
        assert_eq!(graph.node[0].input, vec!["input".to_string()]);
    }

    #[test]
    fn test_rejects_bad_bindings() {
        let mut t = Tracer::new(15, true).unwrap();
        let bad = TensorBinding::new("input").with_dynamic_axis(2, "extra");
        assert!(matches!(t.input(&bad, &[1, 8]), Err(TraceError::Signature(_))));

        let x = t.input(&audio_binding(), &[1, 8]).unwrap();
        let y = t.relu(x).unwrap();
        let clash = TensorBinding::new("input");
        assert!(matches!(
            t.finish(y, &clash, &BTreeMap::new()),
            Err(TraceError::Signature(_))
        ));
    }

    #[test]
    fn test_reduce_mean_axes_encoding_follows_opset() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[2, 8]).unwrap();
        let y = t.reduce_mean(x, &[1], true).unwrap();
        assert_eq!(t.shape(y), &[2, 1]);
        let model = t.finish(y, &TensorBinding::new("output"), &BTreeMap::new()).unwrap();
        let node = &model.graph.as_ref().unwrap().node[0];
        assert_eq!(node.input.len(), 1);
        assert!(node.attribute.iter().any(|a| a.name == "axes"));

        let mut t = Tracer::new(18, true).unwrap();
        let x = t.input(&audio_binding(), &[2, 8]).unwrap();
        let y = t.reduce_mean(x, &[-1], false).unwrap();
        assert_eq!(t.shape(y), &[2]);
        let model = t.finish(y, &TensorBinding::new("output"), &BTreeMap::new()).unwrap();
        let graph = model.graph.unwrap();
        assert_eq!(graph.node[0].input.len(), 2);
        assert_eq!(graph.initializer.len(), 1);
    }

    #[test]
    fn test_unused_initializers_are_pruned() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 4]).unwrap();
        t.constant("unused", Array::<f32, _>::zeros(IxDyn(&[3])));
        let y = t.relu(x).unwrap();
        let model = t.finish(y, &TensorBinding::new("output"), &BTreeMap::new()).unwrap();
        assert!(model.graph.unwrap().initializer.is_empty());
    }

    #[test]
    fn test_constant_names_made_unique() {
        let mut t = Tracer::new(15, true).unwrap();
        t.input(&audio_binding(), &[1, 4]).unwrap();
        let a = t.scalar("input", 1.0);
        let b = t.scalar("input", 2.0);
        assert_ne!(t.values[a.0].name, "input");
        assert_ne!(t.values[a.0].name, t.values[b.0].name);
    }

    #[test]
    fn test_softmax_keeps_shape_and_axis() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 5, 7]).unwrap();
        let y = t.softmax(x, -1).unwrap();
        assert_eq!(t.shape(y), &[1, 5, 7]);
        assert!(matches!(
            t.softmax(x, 3),
            Err(TraceError::Shape { op: "Softmax", .. })
        ));

        let model = t.finish(y, &TensorBinding::new("output"), &BTreeMap::new()).unwrap();
        let node = &model.graph.unwrap().node[0];
        assert_eq!(node.op_type, "Softmax");
        let axis = node.attribute.iter().find(|a| a.name == "axis").unwrap();
        assert_eq!(axis.i, Some(-1));
    }

    #[test]
    fn test_layer_norm_gated_until_opset_17() {
        let mut t = Tracer::new(16, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 5, 4]).unwrap();
        let scale = t.constant("ln.weight", Array::<f32, _>::ones(IxDyn(&[4])));
        assert!(matches!(
            t.layer_norm(x, scale, None, -1, 1e-5),
            Err(TraceError::UnsupportedOperator {
                op: "LayerNormalization",
                since: 17,
                opset: 16,
            })
        ));
        assert_eq!(t.node_count(), 0);

        let mut t = Tracer::new(17, true).unwrap();
        let x = t.input(&audio_binding(), &[1, 5, 4]).unwrap();
        let scale = t.constant("ln.weight", Array::<f32, _>::ones(IxDyn(&[4])));
        let bias = t.constant("ln.bias", Array::<f32, _>::zeros(IxDyn(&[4])));
        let y = t.layer_norm(x, scale, Some(bias), -1, 1e-5).unwrap();
        assert_eq!(t.shape(y), &[1, 5, 4]);
        assert_eq!(t.node_count(), 1);

        let wrong = t.constant("ln.wrong", Array::<f32, _>::ones(IxDyn(&[5])));
        assert!(matches!(
            t.layer_norm(x, wrong, None, -1, 1e-5),
            Err(TraceError::Shape { op: "LayerNormalization", .. })
        ));
    }

    #[test]
    fn test_sub_broadcasts_and_identity_passes_through() {
        let mut t = Tracer::new(15, true).unwrap();
        let x = t.input(&audio_binding(), &[2, 3]).unwrap();
        let mean = t.reduce_mean(x, &[-1], true).unwrap();
        let centered = t.sub(x, mean).unwrap();
        assert_eq!(t.shape(centered), &[2, 3]);

        let y = t.identity(centered).unwrap();
        assert_eq!(t.shape(y), &[2, 3]);
        assert_eq!(t.elem_type(y), ElemType::Float);
        assert_eq!(t.node_count(), 3);

        let model = t.finish(y, &TensorBinding::new("output"), &BTreeMap::new()).unwrap();
        let ops: Vec<_> = model.graph.unwrap().node.iter().map(|n| n.op_type.clone()).collect();
        assert_eq!(ops, ["ReduceMean", "Sub", "Identity"]);
    }
}
