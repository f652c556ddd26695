//! Model repositories
//!
//! A repository turns a model identifier into a traceable model plus the
//! configuration needed to turn its logits back into text. Model
//! directories follow the Hugging Face layout:
//!
//! ```text
//! config.json                 architecture + hyper-parameters (required)
//! model.safetensors           weights (architectures that have them)
//! vocab.json                  CTC vocabulary (required for decoding)
//! tokenizer_config.json       special tokens (optional)
//! preprocessor_config.json    feature extractor settings (optional)
//! ```

use std::path::{Path, PathBuf};

use speechport_audio::FeatureExtractorConfig;
use tracing::{debug, info};

use crate::error::{RepositoryError, Result};
use crate::model::{self, AcousticModel};
use crate::tokenizer::CtcTokenizer;

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";
pub const VOCAB_FILE: &str = "vocab.json";
pub const TOKENIZER_CONFIG_FILE: &str = "tokenizer_config.json";
pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

/// Everything needed to go from logits to text
#[derive(Debug, Clone)]
pub struct DecodingConfig {
    pub tokenizer: CtcTokenizer,
    pub preprocessor: FeatureExtractorConfig,
}

impl DecodingConfig {
    /// Read the tokenizer and preprocessor files of a model directory
    pub fn from_directory(dir: &Path) -> Result<Self> {
        let vocab = dir.join(VOCAB_FILE);
        if !vocab.is_file() {
            return Err(RepositoryError::config(format!(
                "{} not found in {}",
                VOCAB_FILE,
                dir.display()
            )));
        }
        let tokenizer = CtcTokenizer::from_files(&vocab, Some(&dir.join(TOKENIZER_CONFIG_FILE)))?;

        let preprocessor_path = dir.join(PREPROCESSOR_CONFIG_FILE);
        let preprocessor = if preprocessor_path.is_file() {
            FeatureExtractorConfig::from_file(&preprocessor_path)?
        } else {
            debug!("No {}, using defaults", PREPROCESSOR_CONFIG_FILE);
            FeatureExtractorConfig::default()
        };

        Ok(Self {
            tokenizer,
            preprocessor,
        })
    }
}

/// A resolved model and its decoding configuration
pub struct ResolvedModel {
    pub id: String,
    pub directory: PathBuf,
    pub model: Box<dyn AcousticModel>,
    pub decoding: DecodingConfig,
}

impl std::fmt::Debug for ResolvedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedModel")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("architecture", &self.model.architecture())
            .finish()
    }
}

/// Source of pretrained models
pub trait ModelRepository {
    /// Resolve a model identifier into a model and its decoding configuration
    fn resolve(&self, id: &str) -> Result<ResolvedModel>;

    /// Resolve only the decoding configuration
    fn decoding_config(&self, id: &str) -> Result<DecodingConfig>;
}

/// Load a complete model directory
pub fn load_directory(id: &str, dir: &Path) -> Result<ResolvedModel> {
    if !dir.join(CONFIG_FILE).is_file() {
        return Err(RepositoryError::not_found(format!(
            "{} ({} has no {})",
            id,
            dir.display(),
            CONFIG_FILE
        )));
    }

    let decoding = DecodingConfig::from_directory(dir)?;
    let model = model::load_model(dir, decoding.preprocessor.sampling_rate)?;

    if decoding.tokenizer.vocab_size() > model.vocab_size() {
        return Err(RepositoryError::config(format!(
            "Tokenizer has {} ids but the model emits {} logits",
            decoding.tokenizer.vocab_size(),
            model.vocab_size()
        )));
    }

    info!(
        "Resolved {} ({}, vocab {})",
        id,
        model.architecture(),
        model.vocab_size()
    );

    Ok(ResolvedModel {
        id: id.to_string(),
        directory: dir.to_path_buf(),
        model,
        decoding,
    })
}

/// Models stored on the local filesystem.
///
/// An identifier is either a path to a model directory or a name relative
/// to the repository root.
#[derive(Debug, Clone, Default)]
pub struct LocalRepository {
    root: Option<PathBuf>,
}

impl LocalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Directory an identifier refers to, if it exists
    pub fn locate(&self, id: &str) -> Option<PathBuf> {
        let direct = PathBuf::from(id);
        if direct.is_dir() {
            return Some(direct);
        }
        self.root
            .as_ref()
            .map(|root| root.join(id))
            .filter(|p| p.is_dir())
    }

    fn require(&self, id: &str) -> Result<PathBuf> {
        self.locate(id)
            .ok_or_else(|| RepositoryError::not_found(format!("{} is not a local model directory", id)))
    }
}

impl ModelRepository for LocalRepository {
    fn resolve(&self, id: &str) -> Result<ResolvedModel> {
        let dir = self.require(id)?;
        load_directory(id, &dir)
    }

    fn decoding_config(&self, id: &str) -> Result<DecodingConfig> {
        let dir = self.require(id)?;
        DecodingConfig::from_directory(&dir)
    }
}

#[cfg(feature = "hub")]
pub use hub::HubRepository;

#[cfg(feature = "hub")]
mod hub {
    use std::path::{Path, PathBuf};

    use hf_hub::api::sync::{Api, ApiBuilder, ApiRepo};
    use tracing::{debug, info};

    use super::*;

    /// Models on the Hugging Face Hub, cached locally by `hf-hub`.
    ///
    /// Identifiers naming an existing local directory are served from disk
    /// without touching the network.
    pub struct HubRepository {
        api: Api,
        local: LocalRepository,
    }

    impl HubRepository {
        /// Use the default Hugging Face cache
        pub fn new() -> Result<Self> {
            let api = Api::new()
                .map_err(|e| RepositoryError::config(format!("HF API init: {}", e)))?;
            Ok(Self {
                api,
                local: LocalRepository::new(),
            })
        }

        pub fn with_cache_dir<P: Into<PathBuf>>(cache_dir: P) -> Result<Self> {
            let api = ApiBuilder::new()
                .with_cache_dir(cache_dir.into())
                .build()
                .map_err(|e| RepositoryError::config(format!("HF API init: {}", e)))?;
            Ok(Self {
                api,
                local: LocalRepository::new(),
            })
        }

        fn fetch(repo: &ApiRepo, id: &str, file: &str) -> Result<PathBuf> {
            info!("Fetching {}/{}", id, file);
            repo.get(file)
                .map_err(|e| RepositoryError::not_found(format!("{} ({}): {}", id, file, e)))
        }

        fn fetch_optional(repo: &ApiRepo, file: &str) {
            if let Err(e) = repo.get(file) {
                debug!("Optional {} unavailable: {}", file, e);
            }
        }

        /// Download the files a model needs and return the snapshot directory
        fn snapshot(&self, id: &str, with_model: bool) -> Result<PathBuf> {
            let repo = self.api.model(id.to_string());
            let config = Self::fetch(&repo, id, CONFIG_FILE)?;
            let dir = config
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| RepositoryError::config("Cached config.json has no parent"))?;

            if with_model {
                let contents = std::fs::read_to_string(&config)?;
                let value: serde_json::Value = serde_json::from_str(&contents)
                    .map_err(|e| RepositoryError::config(format!("Failed to parse config.json: {}", e)))?;
                let architecture = model::architecture_of(&value)?;

                // Refuse before downloading checkpoints we cannot trace
                if !model::SUPPORTED_ARCHITECTURES.contains(&architecture.as_str()) {
                    return Err(RepositoryError::UnsupportedArchitecture(architecture));
                }
                if model::needs_weights(&architecture) {
                    Self::fetch(&repo, id, WEIGHTS_FILE)?;
                }
            }

            Self::fetch(&repo, id, VOCAB_FILE)?;
            Self::fetch_optional(&repo, TOKENIZER_CONFIG_FILE);
            Self::fetch_optional(&repo, PREPROCESSOR_CONFIG_FILE);
            Ok(dir)
        }
    }

    impl ModelRepository for HubRepository {
        fn resolve(&self, id: &str) -> Result<ResolvedModel> {
            if self.local.locate(id).is_some() {
                return self.local.resolve(id);
            }
            let dir = self.snapshot(id, true)?;
            load_directory(id, &dir)
        }

        fn decoding_config(&self, id: &str) -> Result<DecodingConfig> {
            if self.local.locate(id).is_some() {
                return self.local.decoding_config(id);
            }
            let dir = self.snapshot(id, false)?;
            DecodingConfig::from_directory(&dir)
        }
    }
}
