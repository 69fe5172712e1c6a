//! Embedding-similarity backend: mean sentence F1 over a song.

use std::sync::Arc;

use crate::core::align::line_pairs;
use crate::core::backend::{Dispatch, MetricBackend};
use crate::core::error::BackendError;
use crate::core::record::Metric;
use crate::core::segment::{BlankLinePolicy, Unit};

const NAME: &str = "bertscore";

/// Sentence-pair similarity model, loaded once and shared read-only between workers.
pub trait SentenceScorer: Send + Sync {
    /// F1 of each candidate against the reference at the same position.
    fn score_pairs(&self, candidates: &[&str], references: &[&str]) -> anyhow::Result<Vec<f32>>;

    /// Frees memory held for the last batch. Called after every batch, success or not.
    fn release(&self) {}
}

#[derive(Debug, Clone)]
pub struct SemanticConfig {
    /// Line pairs per call to the scorer.
    pub batch_size: usize,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self { batch_size: 8 }
    }
}

pub struct SemanticBackend {
    scorer: Arc<dyn SentenceScorer>,
    config: SemanticConfig,
}

impl SemanticBackend {
    pub fn new(scorer: Arc<dyn SentenceScorer>, config: SemanticConfig) -> Self {
        Self { scorer, config }
    }
}

impl MetricBackend for SemanticBackend {
    fn metric(&self) -> Metric {
        Metric::BertScore
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn blank_policy(&self) -> BlankLinePolicy {
        BlankLinePolicy::Discard
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Parallel
    }

    fn score(&self, reference: &Unit, hypothesis: &Unit) -> Result<f64, BackendError> {
        let pairs: Vec<(&str, &str)> = line_pairs(reference, hypothesis)
            .map(|(_, r, h)| (r, h))
            .collect();
        if pairs.is_empty() {
            return Err(BackendError::NoScorableLines);
        }

        let mut sum = 0.0f64;
        for batch in pairs.chunks(self.config.batch_size.max(1)) {
            let (references, candidates): (Vec<&str>, Vec<&str>) = batch.iter().copied().unzip();

            let result = self.scorer.score_pairs(&candidates, &references);
            self.scorer.release();

            let f1 = result.map_err(|e| BackendError::invocation(NAME, format!("{e:#}")))?;
            if f1.len() != batch.len() {
                return Err(BackendError::parse(
                    NAME,
                    format!("{} scores for {} pairs", f1.len(), batch.len()),
                ));
            }
            sum += f1.iter().map(|&s| s as f64).sum::<f64>();
        }

        Ok(sum / pairs.len() as f64)
    }
}
