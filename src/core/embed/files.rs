//! Locating encoder config, weights and vocabulary files.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use hf_hub::api::sync::Api;

use crate::Result;

/// Candidate vocabulary file names, in lookup order.
const VOCAB_FILES: [&str; 3] = ["sentencepiece.bpe.model", "vocab.txt", "vocab.json"];
const MERGES_FILE: &str = "merges.txt";
const CONFIG_FILE: &str = "config.json";
const WEIGHTS_FILE: &str = "rust_model.ot";

/// Local paths of everything needed to build an encoder and its tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderFiles {
    pub config: PathBuf,
    pub weights: PathBuf,
    pub vocab: PathBuf,
    pub merges: Option<PathBuf>,
}

impl EncoderFiles {
    /// Downloads (or reuses the cached copy of) a model from the Hugging Face hub.
    pub fn from_hub(model_id: &str) -> Result<Self> {
        let api = Api::new()?;
        let repo = api.model(model_id.to_string());

        let config = repo
            .get(CONFIG_FILE)
            .with_context(|| format!("Failed to fetch {CONFIG_FILE} for {model_id}"))?;
        let weights = repo
            .get(WEIGHTS_FILE)
            .with_context(|| format!("Failed to fetch {WEIGHTS_FILE} for {model_id}"))?;
        let vocab = VOCAB_FILES
            .iter()
            .find_map(|name| repo.get(name).ok())
            .ok_or_else(|| anyhow!("No vocabulary file found for {}", model_id))?;
        let merges = repo.get(MERGES_FILE).ok();

        Ok(Self {
            config,
            weights,
            vocab,
            merges,
        })
    }

    /// Uses files already present in `dir`, with the same names as on the hub.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let require = |name: &str| -> Result<PathBuf> {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(anyhow!("Missing {} in {}", name, dir.display()))
            }
        };

        let vocab = VOCAB_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
            .ok_or_else(|| anyhow!("No vocabulary file in {}", dir.display()))?;
        let merges = Some(dir.join(MERGES_FILE)).filter(|p| p.is_file());

        Ok(Self {
            config: require(CONFIG_FILE)?,
            weights: require(WEIGHTS_FILE)?,
            vocab,
            merges,
        })
    }
}
