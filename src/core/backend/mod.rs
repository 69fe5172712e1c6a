//! Metric backend adapters.
//!
//! Each adapter turns one aligned pair of songs into the calling convention of an
//! external scorer and reduces its output to a single number.

mod lemma;
mod meteor;
mod ngram;
mod semantic;

pub use lemma::{lemma_sentences, Lemmatizer, UdpipeLemmatizer};
pub use meteor::{parse_final_score, MeteorBackend, MeteorConfig};
pub use ngram::{sentence_bleu, tokenize_13a, Denominator, NgramBackend, NgramConfig};
pub use semantic::{SemanticBackend, SemanticConfig, SentenceScorer};

use crate::core::error::BackendError;
use crate::core::record::Metric;
use crate::core::segment::{BlankLinePolicy, Unit};

/// How the orchestrator schedules units for a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// One unit at a time, flushing the store after each.
    Sequential,
    /// Units fan out over the worker pool; one flush at the end.
    Parallel,
}

/// A scorer for one metric over aligned songs.
pub trait MetricBackend: Send + Sync {
    /// Store field this backend fills.
    fn metric(&self) -> Metric;

    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Blank-line handling this backend expects when corpora are segmented.
    fn blank_policy(&self) -> BlankLinePolicy;

    fn dispatch(&self) -> Dispatch {
        Dispatch::Sequential
    }

    /// Scores one hypothesis song against its reference.
    fn score(&self, reference: &Unit, hypothesis: &Unit) -> Result<f64, BackendError>;
}
