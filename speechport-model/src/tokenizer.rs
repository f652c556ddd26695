//! CTC vocabulary and decoding (Hugging Face `Wav2Vec2CTCTokenizer` layout)
//!
//! `vocab.json` maps token strings to ids; `tokenizer_config.json` names the
//! pad (CTC blank), word delimiter and special tokens.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{RepositoryError, Result};

/// A token entry in `tokenizer_config.json`, either a bare string or an
/// added-token object
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum TokenSpec {
    Plain(String),
    Added { content: String },
}

impl TokenSpec {
    fn into_content(self) -> String {
        match self {
            TokenSpec::Plain(s) => s,
            TokenSpec::Added { content } => content,
        }
    }
}

fn token<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<TokenSpec>::deserialize(deserializer)?.map(TokenSpec::into_content))
}

/// Special-token settings (`tokenizer_config.json`)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    #[serde(deserialize_with = "token")]
    pub pad_token: Option<String>,
    #[serde(deserialize_with = "token")]
    pub unk_token: Option<String>,
    #[serde(deserialize_with = "token")]
    pub bos_token: Option<String>,
    #[serde(deserialize_with = "token")]
    pub eos_token: Option<String>,
    #[serde(deserialize_with = "token")]
    pub word_delimiter_token: Option<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            pad_token: Some("<pad>".to_string()),
            unk_token: Some("<unk>".to_string()),
            bos_token: Some("<s>".to_string()),
            eos_token: Some("</s>".to_string()),
            word_delimiter_token: Some("|".to_string()),
        }
    }
}

impl TokenizerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&contents).map_err(|e| {
            RepositoryError::config(format!(
                "Failed to parse {}: {}",
                path.as_ref().display(),
                e
            ))
        })
    }
}

/// Greedy CTC decoder
#[derive(Debug, Clone)]
pub struct CtcTokenizer {
    /// Token ID to string mapping
    tokens: HashMap<usize, String>,
    /// Blank token ID
    pad_id: Option<usize>,
    delimiter: Option<String>,
    /// Dropped from decoded text
    special_ids: HashSet<usize>,
}

impl CtcTokenizer {
    /// Load `vocab.json` plus an optional `tokenizer_config.json`
    pub fn from_files<P: AsRef<Path>>(vocab_path: P, config_path: Option<&Path>) -> Result<Self> {
        let vocab_path = vocab_path.as_ref();
        let contents = std::fs::read_to_string(vocab_path).map_err(|e| {
            RepositoryError::config(format!("Failed to read {}: {}", vocab_path.display(), e))
        })?;
        let vocab: HashMap<String, usize> = serde_json::from_str(&contents).map_err(|e| {
            RepositoryError::config(format!("Failed to parse {}: {}", vocab_path.display(), e))
        })?;

        let config = match config_path {
            Some(p) if p.is_file() => TokenizerConfig::from_file(p)?,
            _ => TokenizerConfig::default(),
        };

        Self::new(vocab, config)
    }

    pub fn new(vocab: HashMap<String, usize>, config: TokenizerConfig) -> Result<Self> {
        if vocab.is_empty() {
            return Err(RepositoryError::config("Vocabulary is empty"));
        }

        let id_of = |name: &Option<String>| name.as_ref().and_then(|n| vocab.get(n).copied());
        let pad_id = id_of(&config.pad_token);
        let special_ids: HashSet<usize> = [&config.unk_token, &config.bos_token, &config.eos_token]
            .into_iter()
            .filter_map(id_of)
            .collect();

        if pad_id.is_none() {
            debug!("Vocabulary has no pad token; repeats still collapse");
        }

        let tokens: HashMap<usize, String> = vocab.into_iter().map(|(t, id)| (id, t)).collect();
        info!("Loaded {} tokens (pad_id: {:?})", tokens.len(), pad_id);

        Ok(Self {
            tokens,
            pad_id,
            delimiter: config.word_delimiter_token,
            special_ids,
        })
    }

    /// Highest id + 1; the logit width the model must produce
    pub fn vocab_size(&self) -> usize {
        self.tokens.keys().max().map_or(0, |m| m + 1)
    }

    pub fn pad_id(&self) -> Option<usize> {
        self.pad_id
    }

    /// Decode one frame-level id sequence.
    ///
    /// Consecutive repeats collapse to one token, the pad token separates
    /// genuine repeats and is dropped, the word delimiter becomes a space and
    /// special or unknown ids are skipped.
    pub fn decode(&self, ids: &[usize]) -> String {
        let mut text = String::new();
        let mut prev: Option<usize> = None;

        for &id in ids {
            if prev == Some(id) {
                continue;
            }
            prev = Some(id);

            if Some(id) == self.pad_id || self.special_ids.contains(&id) {
                continue;
            }

            let Some(token) = self.tokens.get(&id) else {
                continue;
            };

            if self.delimiter.as_deref() == Some(token.as_str()) {
                text.push(' ');
            } else {
                text.push_str(token);
            }
        }

        text.trim().to_string()
    }

    pub fn batch_decode(&self, batch: &[Vec<usize>]) -> Vec<String> {
        batch.iter().map(|ids| self.decode(ids)).collect()
    }
}
