//! Embedding-based sentence similarity, shared by all semantic-scoring workers.

use std::collections::HashSet;

use rust_bert::pipelines::common::ModelType;
use tch::{Cuda, Device};
use tracing::info;

use crate::core::backend::SentenceScorer;
use crate::core::embed::files::EncoderFiles;
use crate::core::embed::model::{layer_index, Encoder};
use crate::core::embed::similarity::greedy_match;
use crate::core::embed::tokenizer::{scoring_mask, Tokenizer};
use crate::Result;

/// Configuration for [`EmbeddingScorer`].
#[derive(Debug, Clone)]
pub struct EmbeddingScorerConfig {
    /// Encoder architecture.
    pub model_type: ModelType,
    /// Hub model id, used when no local files are given.
    pub model_name: String,
    /// Local model files; fetched from the hub when `None`.
    pub files: Option<EncoderFiles>,
    /// Whether to lowercase input text.
    pub lower_case: bool,
    /// Device to run on.
    pub device: Device,
    /// Hidden layer to take embeddings from (negative counts from the top, `None` for last).
    pub layer: Option<i32>,
    /// Maximum sequence length.
    pub max_length: usize,
    /// F1 baseline; scores are rescaled as `(f1 - b) / (1 - b)`.
    pub baseline: Option<f32>,
}

impl Default for EmbeddingScorerConfig {
    fn default() -> Self {
        Self {
            model_type: ModelType::XLMRoberta,
            model_name: "xlm-roberta-base".into(),
            files: None,
            lower_case: false,
            device: Device::cuda_if_available(),
            layer: Some(9),
            max_length: 512,
            baseline: None,
        }
    }
}

/// Rescales `score` so the baseline maps to 0 and a perfect score stays at 1.
pub fn rescale(score: f32, baseline: f32) -> f32 {
    if baseline >= 1.0 {
        score
    } else {
        (score - baseline) / (1.0 - baseline)
    }
}

/// Tokenizer + encoder loaded once and used read-only.
pub struct EmbeddingScorer {
    tokenizer: Tokenizer,
    encoder: Encoder,
    config: EmbeddingScorerConfig,
    special_token_ids: HashSet<i64>,
}

impl EmbeddingScorer {
    pub fn new(config: EmbeddingScorerConfig) -> Result<Self> {
        let files = match &config.files {
            Some(files) => files.clone(),
            None => EncoderFiles::from_hub(&config.model_name)?,
        };
        info!(model = %config.model_name, device = ?config.device, "Loading encoder");

        let tokenizer = Tokenizer::new(
            config.model_type,
            &files.vocab,
            files.merges.as_deref(),
            config.lower_case,
            config.max_length,
        )?;
        let encoder = Encoder::new(config.model_type, &files.config, &files.weights, config.device)?;
        let special_token_ids = tokenizer.special_token_ids();

        Ok(Self {
            tokenizer,
            encoder,
            config,
            special_token_ids,
        })
    }

    pub fn config(&self) -> &EmbeddingScorerConfig {
        &self.config
    }
}

impl SentenceScorer for EmbeddingScorer {
    fn score_pairs(&self, candidates: &[&str], references: &[&str]) -> Result<Vec<f32>> {
        if candidates.len() != references.len() {
            return Err(anyhow::anyhow!(
                "Number of candidates ({}) must equal number of references ({})",
                candidates.len(),
                references.len()
            ));
        }
        let device = self.config.device;

        let cand_encoding = self.tokenizer.encode(candidates, device);
        let ref_encoding = self.tokenizer.encode(references, device);
        let cand_states = self.encoder.forward(
            &cand_encoding.input_ids,
            &cand_encoding.attention_mask,
            Some(&cand_encoding.token_type_ids),
        )?;
        let ref_states = self.encoder.forward(
            &ref_encoding.input_ids,
            &ref_encoding.attention_mask,
            Some(&ref_encoding.token_type_ids),
        )?;

        let layer = layer_index(self.config.layer, cand_states.len())?;
        let cand_layer = &cand_states[layer];
        let ref_layer = &ref_states[layer];

        let mut scores = Vec::with_capacity(candidates.len());
        for i in 0..candidates.len() {
            let cand_len = cand_encoding.length(i) as i64;
            let ref_len = ref_encoding.length(i) as i64;
            let cand_emb = cand_layer.get(i as i64).slice(0, 0, cand_len, 1);
            let ref_emb = ref_layer.get(i as i64).slice(0, 0, ref_len, 1);

            let cand_mask =
                scoring_mask(&cand_encoding.token_ids[i], &self.special_token_ids).to_device(device);
            let ref_mask =
                scoring_mask(&ref_encoding.token_ids[i], &self.special_token_ids).to_device(device);

            let cand_has_tokens = cand_mask.sum(tch::Kind::Float).double_value(&[]) > 0.0;
            let ref_has_tokens = ref_mask.sum(tch::Kind::Float).double_value(&[]) > 0.0;

            // Empty sentences score 0, before any rescaling.
            let f1 = if cand_has_tokens && ref_has_tokens {
                greedy_match(&cand_emb, &ref_emb, &cand_mask, &ref_mask).f1
            } else {
                0.0
            };
            scores.push(match self.config.baseline {
                Some(baseline) => rescale(f1, baseline),
                None => f1,
            });
        }

        Ok(scores)
    }

    /// Batch tensors are dropped when `score_pairs` returns; wait for the device to
    /// finish with them so the allocator can reuse the memory for the next batch.
    fn release(&self) {
        if let Device::Cuda(index) = self.config.device {
            Cuda::synchronize(index as i64);
        }
    }
}

/// Builder for [`EmbeddingScorer`].
pub struct EmbeddingScorerBuilder {
    pub config: EmbeddingScorerConfig,
}

impl EmbeddingScorerBuilder {
    pub fn new() -> Self {
        Self {
            config: EmbeddingScorerConfig::default(),
        }
    }

    /// Sets the model type and hub name.
    pub fn model(mut self, model_type: ModelType, model_name: &str) -> Self {
        self.config.model_type = model_type;
        self.config.model_name = model_name.to_string();
        self
    }

    /// Uses local model files instead of the hub.
    pub fn files(mut self, files: EncoderFiles) -> Self {
        self.config.files = Some(files);
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.config.device = device;
        self
    }

    /// Sets the layer to extract embeddings from.
    pub fn layer(mut self, layer: i32) -> Self {
        self.config.layer = Some(layer);
        self
    }

    pub fn lower_case(mut self, lower_case: bool) -> Self {
        self.config.lower_case = lower_case;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.config.max_length = max_length;
        self
    }

    /// Rescales F1 against a baseline.
    pub fn baseline(mut self, baseline: f32) -> Self {
        self.config.baseline = Some(baseline);
        self
    }

    pub fn build(self) -> Result<EmbeddingScorer> {
        EmbeddingScorer::new(self.config)
    }
}

impl Default for EmbeddingScorerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_config_default() {
        let config = EmbeddingScorerConfig::default();
        assert_eq!(config.model_type, ModelType::XLMRoberta);
        assert_eq!(config.model_name, "xlm-roberta-base");
        assert_eq!(config.layer, Some(9));
        assert_eq!(config.max_length, 512);
        assert!(config.files.is_none());
        assert!(config.baseline.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let files = EncoderFiles {
            config: PathBuf::from("/models/config.json"),
            weights: PathBuf::from("/models/rust_model.ot"),
            vocab: PathBuf::from("/models/vocab.txt"),
            merges: None,
        };
        let config = EmbeddingScorerBuilder::new()
            .model(ModelType::Bert, "bert-base-multilingual-cased")
            .files(files.clone())
            .device(Device::Cpu)
            .layer(-2)
            .lower_case(true)
            .max_length(128)
            .baseline(0.83)
            .config;

        assert_eq!(config.model_type, ModelType::Bert);
        assert_eq!(config.model_name, "bert-base-multilingual-cased");
        assert_eq!(config.files, Some(files));
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.layer, Some(-2));
        assert!(config.lower_case);
        assert_eq!(config.max_length, 128);
        assert_eq!(config.baseline, Some(0.83));
    }

    #[test]
    fn test_rescale() {
        assert!((rescale(0.9, 0.8) - 0.5).abs() < 1e-6);
        assert!((rescale(0.8, 0.8) - 0.0).abs() < 1e-6);
        assert!((rescale(1.0, 0.8) - 1.0).abs() < 1e-6);
        assert_eq!(rescale(0.9, 1.0), 0.9);
    }

    #[test]
    #[ignore] // Downloads xlm-roberta-base
    fn test_scores_identical_lines_highest() {
        let scorer = EmbeddingScorerBuilder::new().device(Device::Cpu).build().unwrap();
        let scores = scorer
            .score_pairs(
                &["El gato duerme en la casa", "El gato duerme en la casa"],
                &["El gato duerme en la casa", "Mañana lloverá en Madrid"],
            )
            .unwrap();
        assert_eq!(scores.len(), 2);
        assert!(scores[0] > scores[1]);
    }
}
