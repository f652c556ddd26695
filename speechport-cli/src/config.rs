//! Configuration management

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use speechport_export::{ExportSpec, DEFAULT_OPSET, DEFAULT_PROBE_SECONDS};
use speechport_graph::TensorBinding;

/// Model exported when none is named
pub const DEFAULT_MODEL_ID: &str = "kresnik/wav2vec2-large-xlsr-korean";

/// Graph format settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    pub opset_version: i64,
    pub constant_folding: bool,
    /// Length of the tracing probe in seconds
    pub probe_seconds: f32,
    pub input_name: String,
    pub output_name: String,
}

impl Default for ExportSection {
    fn default() -> Self {
        Self {
            opset_version: DEFAULT_OPSET,
            constant_folding: true,
            probe_seconds: DEFAULT_PROBE_SECONDS,
            input_name: "input".to_string(),
            output_name: "output".to_string(),
        }
    }
}

impl ExportSection {
    /// Export specification with the standard dynamic axes under the
    /// configured names
    pub fn to_spec(&self) -> ExportSpec {
        let defaults = ExportSpec::default();
        let rename = |binding: TensorBinding, name: &str| TensorBinding {
            name: name.to_string(),
            ..binding
        };
        ExportSpec::new()
            .input(rename(defaults.input, &self.input_name))
            .output(rename(defaults.output, &self.output_name))
            .opset_version(self.opset_version)
            .constant_folding(self.constant_folding)
    }
}

/// Staging and publish settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    /// Directory for staging areas (default: next to the artifact)
    pub staging_dir: Option<PathBuf>,
    /// Keep the staging area when publishing fails
    pub keep_failed_staging: bool,
}

/// Validation run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    /// Number of threads for ONNX Runtime
    pub num_threads: usize,
    /// Audio clip validated after every export
    pub test_audio: Option<PathBuf>,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self {
            num_threads: 4,
            test_audio: None,
        }
    }
}

/// `speechport` configuration (`config.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// File the configuration came from, if any
    #[serde(skip)]
    pub config_path: Option<PathBuf>,

    /// Directory receiving `onnx/model.onnx`
    pub output_dir: PathBuf,

    /// Model identifier (local directory or Hugging Face repo id)
    pub model_id: String,

    /// Hugging Face cache directory (default: hf-hub's own)
    pub cache_dir: Option<PathBuf>,

    pub export: ExportSection,
    pub publish: PublishSection,
    pub validation: ValidationSection,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            output_dir: PathBuf::from("."),
            model_id: DEFAULT_MODEL_ID.to_string(),
            cache_dir: None,
            export: ExportSection::default(),
            publish: PublishSection::default(),
            validation: ValidationSection::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one the platform default is
    /// used if present, otherwise built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = speechport_paths::default_config_path()?;
                if default_path.is_file() {
                    Self::from_file(&default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = CliConfig::from_toml_str("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.model_id, DEFAULT_MODEL_ID);
        assert_eq!(config.export.opset_version, 15);
    }

    #[test]
    fn test_partial_sections() {
        let config = CliConfig::from_toml_str(
            r#"
            output_dir = "build"

            [export]
            opset_version = 17
            output_name = "logits"

            [publish]
            keep_failed_staging = true
            "#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("build"));
        assert_eq!(config.export.opset_version, 17);
        assert!(config.export.constant_folding);
        assert_eq!(config.export.output_name, "logits");
        assert!(config.publish.keep_failed_staging);
        assert_eq!(config.validation.num_threads, 4);
    }

    #[test]
    fn test_spec_keeps_dynamic_axes_under_new_names() {
        let section = ExportSection {
            input_name: "audio".to_string(),
            output_name: "logits".to_string(),
            ..Default::default()
        };
        let spec = section.to_spec();
        assert_eq!(spec.input.name, "audio");
        assert_eq!(spec.output.name, "logits");
        assert_eq!(spec.input.dynamic_axes, ExportSpec::default().input.dynamic_axes);
        assert_eq!(spec.output.dynamic_axes, ExportSpec::default().output.dynamic_axes);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = CliConfig::default();
        config.publish.staging_dir = Some(PathBuf::from("/tmp/staging"));
        let text = config.to_toml_string().unwrap();
        assert_eq!(CliConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&tmp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_load_records_path() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "model_id = \"models/tiny\"\n").unwrap();
        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.model_id, "models/tiny");
        assert_eq!(config.config_path.as_deref(), Some(path.as_path()));
    }
}
