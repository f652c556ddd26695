//! Write traced graphs to disk and read them back

use std::collections::BTreeMap;

use ndarray::{Array, IxDyn};
use speechport_graph::{
    ArtifactInfo, Conv1dParams, Dim, TensorBinding, Tracer, Value,
};

fn trace_small_conv(opset: i64, folding: bool) -> Vec<u8> {
    let mut tracer = Tracer::new(opset, folding).unwrap();
    let input = tracer
        .input(
            &TensorBinding::new("input")
                .with_dynamic_axis(0, "batch_size")
                .with_dynamic_axis(1, "sequence_length"),
            &[1, 320],
        )
        .unwrap();

    let weight = Array::from_shape_fn(IxDyn(&[4, 1, 8]), |ix| (ix[0] * 8 + ix[2]) as f32 * 0.01);
    let head = Array::from_shape_fn(IxDyn(&[3, 4]), |ix| (ix[0] + ix[1]) as f32);

    let x = tracer.unsqueeze(input, &[1]).unwrap();
    let w = tracer.constant("conv.weight", weight);
    let h = tracer
        .conv1d(x, w, None, Conv1dParams { stride: 4, ..Default::default() })
        .unwrap();
    let h = tracer.relu(h).unwrap();
    let h = tracer.transpose(h, &[0, 2, 1]).unwrap();
    let lm = tracer.constant("lm_head.weight", head);
    let logits: Value = tracer.linear(h, lm, None).unwrap();
    assert_eq!(tracer.shape(logits), &[1, 79, 3]);

    let mut metadata = BTreeMap::new();
    metadata.insert("vocab_size".to_string(), "3".to_string());
    metadata.insert("architecture".to_string(), "Test".to_string());

    tracer
        .finish(
            logits,
            &TensorBinding::new("output")
                .with_dynamic_axis(0, "batch_size")
                .with_dynamic_axis(1, "output_sequence"),
            &metadata,
        )
        .unwrap()
        .to_bytes()
}

#[test]
fn test_written_model_reads_back() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("model.onnx");
    std::fs::write(&path, trace_small_conv(15, true)).unwrap();

    let info = ArtifactInfo::read(&path).unwrap();
    assert_eq!(info.opset, 15);
    assert_eq!(info.ir_version, 8);
    assert_eq!(info.producer, "speechport");
    assert_eq!(
        info.op_types,
        vec!["Unsqueeze", "Conv", "Relu", "Transpose", "MatMul"]
    );

    let input = info.input("input").unwrap();
    assert_eq!(
        input.dims,
        vec![
            Dim::Dynamic("batch_size".to_string()),
            Dim::Dynamic("sequence_length".to_string())
        ]
    );

    let output = info.output("output").unwrap();
    assert_eq!(output.rank(), 3);
    assert_eq!(output.dims[2], Dim::Fixed(3));
    assert_eq!(info.metadata_value("vocab_size"), Some("3"));
}

#[test]
fn test_tracing_is_deterministic() {
    assert_eq!(trace_small_conv(15, true), trace_small_conv(15, true));
    assert_ne!(trace_small_conv(15, true), trace_small_conv(15, false));
}

#[test]
fn test_folding_disabled_keeps_weight_transpose() {
    let info = ArtifactInfo::from_bytes(&trace_small_conv(17, false)).unwrap();
    assert_eq!(info.op_types.iter().filter(|op| *op == "Transpose").count(), 2);
    assert_eq!(info.ir_version, 8);
}
