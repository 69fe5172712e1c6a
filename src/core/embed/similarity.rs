//! Greedy cosine matching between token embeddings.

use tch::{Kind, Tensor};

/// Precision, recall and F1 of one candidate/reference sentence pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
}

/// Matches every token to its most similar counterpart on the other side.
///
/// # Arguments
/// * `candidate` - Candidate token embeddings (len_c × hidden)
/// * `reference` - Reference token embeddings (len_r × hidden)
/// * `candidate_mask` - 1.0 for tokens that count, 0.0 for special tokens
/// * `reference_mask` - Same for the reference
///
/// Precision averages the best match of each candidate token, recall that of each
/// reference token, both uniformly over unmasked tokens.
pub fn greedy_match(
    candidate: &Tensor,
    reference: &Tensor,
    candidate_mask: &Tensor,
    reference_mask: &Tensor,
) -> PairScore {
    let candidate = normalize(candidate);
    let reference = normalize(reference);
    let similarity = candidate.matmul(&reference.transpose(0, 1));

    let pair_mask = (candidate_mask.unsqueeze(1) * reference_mask.unsqueeze(0)).gt(0.5);
    let similarity = similarity.where_self(
        &pair_mask,
        &Tensor::full_like(&similarity, f64::NEG_INFINITY),
    );

    let precision = masked_mean(&similarity.max_dim(1, false).0, candidate_mask);
    let recall = masked_mean(&similarity.max_dim(0, false).0, reference_mask);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    PairScore {
        precision,
        recall,
        f1,
    }
}

/// L2-normalizes each row.
fn normalize(embeddings: &Tensor) -> Tensor {
    let norms = embeddings.norm_scalaropt_dim(2.0, [1], true).clamp_min(1e-12);
    embeddings / norms
}

/// Mean of `values` over positions where `mask` is set. Masked positions may hold -inf.
fn masked_mean(values: &Tensor, mask: &Tensor) -> f32 {
    let count = mask.sum(Kind::Float).double_value(&[]);
    if count <= 0.0 {
        return 0.0;
    }
    let kept = values.where_self(&mask.gt(0.5), &Tensor::zeros_like(values));
    (kept.sum(Kind::Float).double_value(&[]) / count) as f32
}
