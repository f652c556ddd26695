//! Resolve model directories from disk

use std::borrow::Cow;
use std::path::Path;

use safetensors::{Dtype, View};
use speechport_graph::{TensorBinding, TraceError, Tracer};
use speechport_model::{LocalRepository, ModelRepository, RepositoryError};

struct F32Tensor {
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl F32Tensor {
    fn filled(shape: &[usize], f: impl Fn(usize) -> f32) -> Self {
        let count: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            bytes: (0..count).flat_map(|i| f(i).to_le_bytes()).collect(),
        }
    }
}

impl View for &F32Tensor {
    fn dtype(&self) -> Dtype {
        Dtype::F32
    }

    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn data(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(&self.bytes)
    }

    fn data_len(&self) -> usize {
        self.bytes.len()
    }
}

const VOCAB: &str = r#"{"<pad>": 0, "<s>": 1, "</s>": 2, "<unk>": 3, "|": 4, "a": 5}"#;

fn write_conv_ctc(dir: &Path, activation: &str) {
    std::fs::write(
        dir.join("config.json"),
        format!(
            r#"{{"architectures": ["ConvCtcForSpeech"], "vocab_size": 6, "hidden_size": 4,
                "conv_kernel": 16, "conv_stride": 8, "activation": "{}"}}"#,
            activation
        ),
    )
    .unwrap();
    std::fs::write(dir.join("vocab.json"), VOCAB).unwrap();

    let conv_w = F32Tensor::filled(&[4, 1, 16], |i| (i % 7) as f32 * 0.05);
    let conv_b = F32Tensor::filled(&[4], |_| 0.1);
    let head_w = F32Tensor::filled(&[6, 4], |i| (i as f32 - 12.0) * 0.1);
    let head_b = F32Tensor::filled(&[6], |_| 0.0);
    let tensors = vec![
        ("conv.weight", &conv_w),
        ("conv.bias", &conv_b),
        ("lm_head.weight", &head_w),
        ("lm_head.bias", &head_b),
    ];
    let bytes = safetensors::serialize(tensors, &None).unwrap();
    std::fs::write(dir.join("model.safetensors"), bytes).unwrap();
}

#[test]
fn test_resolve_conv_ctc_directory() {
    let tmp = tempfile::tempdir().unwrap();
    write_conv_ctc(tmp.path(), "relu");

    let repo = LocalRepository::new();
    let resolved = repo.resolve(tmp.path().to_str().unwrap()).unwrap();
    assert_eq!(resolved.model.architecture(), "ConvCtcForSpeech");
    assert_eq!(resolved.model.vocab_size(), 6);
    assert_eq!(resolved.model.min_input_samples(), 16);
    assert_eq!(resolved.model.sample_rate(), 16000);
    assert_eq!(resolved.decoding.tokenizer.decode(&[5, 5, 0, 5]), "aa");

    let mut tracer = Tracer::new(15, true).unwrap();
    let input = tracer.input(&TensorBinding::new("input"), &[1, 160]).unwrap();
    let output = resolved.model.forward(&mut tracer, input).unwrap();
    assert_eq!(tracer.shape(output), &[1, 19, 6]);
}

#[test]
fn test_gelu_model_needs_newer_opset() {
    let tmp = tempfile::tempdir().unwrap();
    write_conv_ctc(tmp.path(), "gelu");
    let resolved = LocalRepository::new()
        .resolve(tmp.path().to_str().unwrap())
        .unwrap();

    let mut tracer = Tracer::new(15, true).unwrap();
    let input = tracer.input(&TensorBinding::new("input"), &[1, 160]).unwrap();
    let err = resolved.model.forward(&mut tracer, input).unwrap_err();
    assert!(matches!(err, TraceError::UnsupportedOperator { op: "Gelu", .. }));
}

#[test]
fn test_relative_names_under_root() {
    let tmp = tempfile::tempdir().unwrap();
    let model_dir = tmp.path().join("tiny");
    std::fs::create_dir(&model_dir).unwrap();
    write_conv_ctc(&model_dir, "relu");

    let repo = LocalRepository::with_root(tmp.path());
    assert!(repo.resolve("tiny").is_ok());
    let decoding = repo.decoding_config("tiny").unwrap();
    assert_eq!(decoding.preprocessor.sampling_rate, 16000);
}

#[test]
fn test_unknown_model_not_found() {
    let repo = LocalRepository::new();
    let err = repo.resolve("no-such-org/no-such-model").unwrap_err();
    assert!(matches!(err, RepositoryError::ModelNotFound(_)));
}

#[test]
fn test_missing_vocab_is_config_error() {
    let tmp = tempfile::tempdir().unwrap();
    write_conv_ctc(tmp.path(), "relu");
    std::fs::remove_file(tmp.path().join("vocab.json")).unwrap();

    let err = LocalRepository::new()
        .resolve(tmp.path().to_str().unwrap())
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Config(_)));
}

#[test]
fn test_missing_weights() {
    let tmp = tempfile::tempdir().unwrap();
    write_conv_ctc(tmp.path(), "relu");
    std::fs::remove_file(tmp.path().join("model.safetensors")).unwrap();

    let err = LocalRepository::new()
        .resolve(tmp.path().to_str().unwrap())
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Weights(_)));
}

#[test]
fn test_preprocessor_config_sets_sample_rate() {
    let tmp = tempfile::tempdir().unwrap();
    write_conv_ctc(tmp.path(), "relu");
    std::fs::write(
        tmp.path().join("preprocessor_config.json"),
        r#"{"feature_size": 1, "sampling_rate": 8000, "do_normalize": false}"#,
    )
    .unwrap();

    let resolved = LocalRepository::new()
        .resolve(tmp.path().to_str().unwrap())
        .unwrap();
    assert_eq!(resolved.model.sample_rate(), 8000);
    assert!(!resolved.decoding.preprocessor.do_normalize);
}
