//! Line-level BLEU with effective-order smoothing, averaged per song.

use std::collections::HashMap;

use crate::core::align::line_pairs;
use crate::core::backend::{Dispatch, MetricBackend};
use crate::core::error::BackendError;
use crate::core::record::Metric;
use crate::core::segment::{BlankLinePolicy, Unit};

const NAME: &str = "sacrebleu";

/// Stand-in for log(0) when a precision is zero.
const LOG_ZERO: f64 = -9_999_999_999.0;

/// What the summed per-line scores of a song are divided by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Denominator {
    /// Number of line pairs actually scored.
    #[default]
    ScoredLines,
    /// Full reference song length, stanza breaks included.
    ReferenceLength,
}

#[derive(Debug, Clone)]
pub struct NgramConfig {
    /// Highest n-gram order.
    pub max_order: usize,
    pub lowercase: bool,
    pub denominator: Denominator,
}

impl Default for NgramConfig {
    fn default() -> Self {
        Self {
            max_order: 4,
            lowercase: false,
            denominator: Denominator::default(),
        }
    }
}

/// Splits a line the way the mteval-v13a tokenizer does.
pub fn tokenize_13a(line: &str) -> Vec<String> {
    let mut text = line
        .replace("<skipped>", "")
        .replace("-\n", "")
        .replace('\n', " ");
    if text.contains('&') {
        text = text
            .replace("&quot;", "\"")
            .replace("&amp;", "&")
            .replace("&lt;", "<")
            .replace("&gt;", ">");
    }

    let chars: Vec<char> = format!(" {text} ").chars().collect();
    let mut out = String::with_capacity(chars.len() * 2);
    for (i, &c) in chars.iter().enumerate() {
        let prev = if i > 0 { chars[i - 1] } else { ' ' };
        let next = chars.get(i + 1).copied().unwrap_or(' ');

        let split = if is_13a_symbol(c) {
            true
        } else if c == '.' || c == ',' {
            // Decimal and thousands separators stay inside numbers.
            !(prev.is_ascii_digit() && next.is_ascii_digit())
        } else {
            c == '-' && prev.is_ascii_digit()
        };

        if split {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out.split_whitespace().map(String::from).collect()
}

fn is_13a_symbol(c: char) -> bool {
    matches!(c, '{'..='~' | '['..='`' | '!'..='&' | '('..='+' | ':'..='@' | '/')
}

fn ngram_counts(tokens: &[String], max_order: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    for n in 1..=max_order {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

/// Sentence BLEU of `hypothesis` against a single `reference`, in 0..=100.
///
/// Uses exponential smoothing for zero n-gram matches and stops at the highest
/// order the hypothesis actually has n-grams for.
pub fn sentence_bleu(hypothesis: &str, reference: &str, config: &NgramConfig) -> f64 {
    let prepare = |s: &str| {
        if config.lowercase {
            tokenize_13a(&s.to_lowercase())
        } else {
            tokenize_13a(s)
        }
    };
    let hyp = prepare(hypothesis);
    let reference = prepare(reference);
    let max_order = config.max_order.max(1);

    let hyp_counts = ngram_counts(&hyp, max_order);
    let ref_counts = ngram_counts(&reference, max_order);

    let mut correct = vec![0usize; max_order];
    let mut total = vec![0usize; max_order];
    for (gram, &count) in &hyp_counts {
        let n = gram.len() - 1;
        total[n] += count;
        if let Some(&ref_count) = ref_counts.get(gram) {
            correct[n] += count.min(ref_count);
        }
    }

    let mut precisions = vec![0.0f64; max_order];
    let mut smooth = 1.0f64;
    let mut effective_order = max_order;
    for n in 0..max_order {
        if total[n] == 0 {
            break;
        }
        effective_order = n + 1;
        if correct[n] == 0 {
            smooth *= 2.0;
            precisions[n] = 100.0 / (smooth * total[n] as f64);
        } else {
            precisions[n] = 100.0 * correct[n] as f64 / total[n] as f64;
        }
    }

    let hyp_len = hyp.len() as f64;
    let ref_len = reference.len() as f64;
    let brevity_penalty = if hyp_len >= ref_len {
        1.0
    } else if hyp_len > 0.0 {
        (1.0 - ref_len / hyp_len).exp()
    } else {
        0.0
    };

    let log_sum: f64 = precisions[..effective_order]
        .iter()
        .map(|&p| if p > 0.0 { p.ln() } else { LOG_ZERO })
        .sum();
    brevity_penalty * (log_sum / effective_order as f64).exp()
}

/// N-gram overlap backend: mean sentence BLEU over aligned lines, scaled to 0..1.
#[derive(Debug, Clone, Default)]
pub struct NgramBackend {
    config: NgramConfig,
}

impl NgramBackend {
    pub fn new(config: NgramConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NgramConfig {
        &self.config
    }
}

impl MetricBackend for NgramBackend {
    fn metric(&self) -> Metric {
        Metric::SacreBleu
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn blank_policy(&self) -> BlankLinePolicy {
        BlankLinePolicy::StanzaBreak
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Sequential
    }

    fn score(&self, reference: &Unit, hypothesis: &Unit) -> Result<f64, BackendError> {
        let mut sum = 0.0;
        let mut scored = 0usize;
        for (_, ref_line, hyp_line) in line_pairs(reference, hypothesis) {
            sum += sentence_bleu(hyp_line, ref_line, &self.config);
            scored += 1;
        }
        if scored == 0 {
            return Err(BackendError::NoScorableLines);
        }

        let denominator = match self.config.denominator {
            Denominator::ScoredLines => scored,
            Denominator::ReferenceLength => reference.len(),
        };
        Ok(sum / denominator as f64 / 100.0)
    }
}
