//! Evaluation of lyric translations against human references.
//!
//! Songs are read from two line-aligned corpora, scored with one metric backend at a
//! time, and the per-song scores are merged into a JSON result store that survives
//! interrupted runs.

pub mod cli;
pub mod core;

// Re-export main types
pub use crate::core::backend::{
    MeteorBackend, MeteorConfig, MetricBackend, NgramBackend, NgramConfig, SemanticBackend,
    SemanticConfig, SentenceScorer,
};
pub use crate::core::{
    BlankLinePolicy, EvalError, Metric, Orchestrator, OrchestratorBuilder, ResultRecord,
    ResultStore, RunConfig, RunSummary,
};

#[cfg(feature = "embeddings")]
pub use crate::core::embed::{EmbeddingScorer, EmbeddingScorerBuilder, EmbeddingScorerConfig};

/// Convenient alias for a result with a boxed error.
pub type Result<T> = anyhow::Result<T>;
