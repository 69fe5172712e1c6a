//! Sentence tokenization into padded batches.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Error;
use rust_bert::pipelines::common::{ModelType, TokenizerOption};
use rust_tokenizers::tokenizer::TruncationStrategy;
use tch::{Device, Tensor};

use crate::Result;

/// Wrapper for a BERT-family tokenizer producing padded batches.
pub struct Tokenizer {
    tokenizer: TokenizerOption,
    max_len: usize,
}

/// Batched tokenization outputs.
pub struct EncodingResult {
    /// Shape (batch_size, seq_len).
    pub input_ids: Tensor,
    /// Shape (batch_size, seq_len).
    pub attention_mask: Tensor,
    /// Shape (batch_size, seq_len).
    pub token_type_ids: Tensor,
    /// Unpadded token IDs per sentence, special tokens included.
    pub token_ids: Vec<Vec<i64>>,
}

impl EncodingResult {
    /// Number of real tokens in sentence `i`.
    pub fn length(&self, i: usize) -> usize {
        self.token_ids[i].len()
    }
}

/// Pads `values` to `target_len` with `pad`.
#[inline(always)]
fn padded<T: Clone>(values: &[T], pad: T, target_len: usize) -> Vec<T> {
    let mut out = values.to_vec();
    if out.len() < target_len {
        out.resize(target_len, pad);
    }
    out
}

/// Stacks equal-length rows into one tensor on `device`.
#[inline(always)]
fn to_batched_tensor<T: Copy + tch::kind::Element>(rows: &[Vec<T>], device: Device) -> Tensor {
    Tensor::stack(
        &rows.iter().map(|r| Tensor::from_slice(r)).collect::<Vec<_>>(),
        0,
    )
    .to_device(device)
}

impl Tokenizer {
    /// Loads the tokenizer matching `model` from local vocabulary files.
    pub fn new(
        model: ModelType,
        vocab: &Path,
        merges: Option<&Path>,
        lower_case: bool,
        max_len: usize,
    ) -> Result<Self> {
        let add_prefix_space = match model {
            ModelType::Roberta | ModelType::GPT2 => Some(true),
            _ => None,
        };
        let tokenizer = TokenizerOption::from_file(
            model,
            vocab.to_str().ok_or(Error::msg("Invalid vocab path"))?,
            merges
                .map(|p| p.to_str().ok_or(Error::msg("Invalid merges path")))
                .transpose()?,
            lower_case,
            None,
            add_prefix_space,
        )?;
        Ok(Self { tokenizer, max_len })
    }

    /// IDs of tokens excluded from similarity matching (BOS/CLS, EOS, SEP, PAD).
    pub fn special_token_ids(&self) -> HashSet<i64> {
        [
            self.tokenizer.get_bos_id(),
            self.tokenizer.get_eos_id(),
            self.tokenizer.get_sep_id(),
            self.tokenizer.get_pad_id(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Tokenizes `texts` and pads them into tensors on `device`.
    pub fn encode(&self, texts: &[&str], device: Device) -> EncodingResult {
        let inputs = self.tokenizer.encode_list(
            texts,
            self.max_len,
            &TruncationStrategy::LongestFirst,
            0,
        );
        let pad_id = self.tokenizer.get_pad_id().unwrap_or(0);
        let width = inputs.iter().map(|i| i.token_ids.len()).max().unwrap_or(0);

        let mut token_ids = Vec::with_capacity(inputs.len());
        let mut id_rows = Vec::with_capacity(inputs.len());
        let mut mask_rows = Vec::with_capacity(inputs.len());
        let mut type_rows = Vec::with_capacity(inputs.len());

        for input in inputs {
            let segments: Vec<i64> = input.segment_ids.iter().map(|&s| s as i64).collect();
            id_rows.push(padded(&input.token_ids, pad_id, width));
            mask_rows.push(padded(&vec![1i64; input.token_ids.len()], 0, width));
            type_rows.push(padded(&segments, 0, width));
            token_ids.push(input.token_ids);
        }

        EncodingResult {
            input_ids: to_batched_tensor(&id_rows, device),
            attention_mask: to_batched_tensor(&mask_rows, device),
            token_type_ids: to_batched_tensor(&type_rows, device),
            token_ids,
        }
    }
}

/// 1.0 for tokens that take part in matching, 0.0 for special tokens.
pub fn scoring_mask(token_ids: &[i64], special_token_ids: &HashSet<i64>) -> Tensor {
    let mask: Vec<f32> = token_ids
        .iter()
        .map(|id| if special_token_ids.contains(id) { 0.0 } else { 1.0 })
        .collect();
    Tensor::from_slice(&mask)
}
