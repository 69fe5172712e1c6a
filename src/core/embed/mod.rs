//! Embedding-similarity scorer built on `rust-bert` encoders.

mod files;
mod model;
mod scorer;
mod similarity;
mod tokenizer;

pub use files::EncoderFiles;
pub use model::{layer_index, Encoder};
pub use scorer::{rescale, EmbeddingScorer, EmbeddingScorerBuilder, EmbeddingScorerConfig};
pub use similarity::{greedy_match, PairScore};
pub use tokenizer::{scoring_mask, EncodingResult, Tokenizer};
