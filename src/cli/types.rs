//! Command-line interface for lyric-eval.
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
#[cfg(feature = "embeddings")]
use rust_bert::pipelines::common::ModelType;

use crate::core::backend::Denominator;
use crate::core::{BlankLinePolicy, Metric, OrchestratorBuilder, DEFAULT_MARKER};

#[derive(Parser)]
#[command(name = "lyric-eval", version, about = "Score lyric translations against references")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliBlankPolicy {
    /// Drop blank lines
    Discard,
    /// Keep blank lines as stanza breaks
    StanzaBreak,
}

impl From<CliBlankPolicy> for BlankLinePolicy {
    fn from(policy: CliBlankPolicy) -> Self {
        match policy {
            CliBlankPolicy::Discard => BlankLinePolicy::Discard,
            CliBlankPolicy::StanzaBreak => BlankLinePolicy::StanzaBreak,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliDenominator {
    /// Divide by the number of line pairs scored
    ScoredLines,
    /// Divide by the reference song length, stanza breaks included
    ReferenceLength,
}

impl From<CliDenominator> for Denominator {
    fn from(denominator: CliDenominator) -> Self {
        match denominator {
            CliDenominator::ScoredLines => Denominator::ScoredLines,
            CliDenominator::ReferenceLength => Denominator::ReferenceLength,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliMetric {
    Bertscore,
    Sacrebleu,
    Meteor,
}

impl From<CliMetric> for Metric {
    fn from(metric: CliMetric) -> Self {
        match metric {
            CliMetric::Bertscore => Metric::BertScore,
            CliMetric::Sacrebleu => Metric::SacreBleu,
            CliMetric::Meteor => Metric::Meteor,
        }
    }
}

#[cfg(feature = "embeddings")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliEncoderModel {
    Bert,
    Distilbert,
    Roberta,
    XlmRoberta,
}

#[cfg(feature = "embeddings")]
impl From<CliEncoderModel> for ModelType {
    fn from(model: CliEncoderModel) -> Self {
        match model {
            CliEncoderModel::Bert => ModelType::Bert,
            CliEncoderModel::Distilbert => ModelType::DistilBert,
            CliEncoderModel::Roberta => ModelType::Roberta,
            CliEncoderModel::XlmRoberta => ModelType::XLMRoberta,
        }
    }
}

/// Inputs and run options shared by every scoring command.
#[derive(Debug, Args)]
pub struct CorpusArgs {
    /// File containing the reference translations
    #[arg(short, long)]
    pub references: PathBuf,

    /// File containing the machine translations, aligned with the references
    #[arg(long)]
    pub hypotheses: PathBuf,

    /// JSON result store, created if missing
    #[arg(short, long, default_value = "results.json")]
    pub store: PathBuf,

    /// Character that starts a song delimiter line
    #[arg(long, default_value_t = DEFAULT_MARKER)]
    pub marker: char,

    /// Override the metric's blank-line handling
    #[arg(long)]
    pub blank_lines: Option<CliBlankPolicy>,

    /// Worker threads for the embedding metric
    #[arg(short, long, default_value_t = 10)]
    pub workers: usize,

    /// Score every song, replacing stored values
    #[arg(long)]
    pub rescore: bool,

    /// Fail if the store holds fewer records than there are songs
    #[arg(long)]
    pub strict: bool,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

impl CorpusArgs {
    pub fn orchestrator(&self) -> OrchestratorBuilder {
        let mut builder = OrchestratorBuilder::new()
            .corpora(&self.references, &self.hypotheses)
            .store(&self.store)
            .marker(self.marker)
            .workers(self.workers)
            .rescore(self.rescore)
            .require_existing_records(self.strict)
            .progress(!self.quiet);
        if let Some(policy) = self.blank_lines {
            builder = builder.blank_policy(policy.into());
        }
        builder
    }
}

#[cfg(feature = "embeddings")]
#[derive(Debug, Args)]
pub struct BertscoreArgs {
    #[clap(flatten)]
    pub corpus: CorpusArgs,

    #[arg(long, default_value = "xlm-roberta")]
    pub model_type: CliEncoderModel,

    /// HF name of the pretrained encoder
    #[arg(long, default_value = "xlm-roberta-base")]
    pub model: String,

    /// Directory holding config.json, rust_model.ot and the vocabulary instead of the hub
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Hidden layer to use; negative values count from the top
    #[arg(long, default_value_t = 9, allow_hyphen_values = true)]
    pub layer: i32,

    /// Line pairs per encoder call
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Rescale F1 against this baseline
    #[arg(long)]
    pub baseline: Option<f32>,

    /// Lowercase input text
    #[arg(long)]
    pub lower_case: bool,

    /// Run on the CPU even if CUDA is available
    #[arg(long)]
    pub cpu: bool,
}

#[derive(Debug, Args)]
pub struct BleuArgs {
    #[clap(flatten)]
    pub corpus: CorpusArgs,

    /// Highest n-gram order
    #[arg(long, default_value_t = 4)]
    pub max_order: usize,

    /// Lowercase before matching
    #[arg(long)]
    pub lowercase: bool,

    #[arg(long, default_value = "scored-lines")]
    pub denominator: CliDenominator,
}

#[derive(Debug, Args)]
pub struct MeteorArgs {
    #[clap(flatten)]
    pub corpus: CorpusArgs,

    /// Path to the METEOR jar
    #[arg(long, default_value = "meteor-1.5.jar")]
    pub jar: PathBuf,

    /// Java executable
    #[arg(long, default_value = "java")]
    pub java: PathBuf,

    /// JVM maximum heap size
    #[arg(long, default_value = "2G")]
    pub max_heap: String,

    /// METEOR language code (`other` for languages without resources)
    #[arg(short, long, default_value = "es")]
    pub language: String,

    /// Do not pass -norm
    #[arg(long)]
    pub no_norm: bool,

    /// UDPipe model; lemmatize both sides before scoring
    #[arg(long)]
    pub udpipe_model: Option<PathBuf>,

    /// UDPipe executable
    #[arg(long, default_value = "udpipe")]
    pub udpipe: PathBuf,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// JSON result store
    #[arg(short, long, default_value = "results.json")]
    pub store: PathBuf,

    /// CSV destination; stdout if omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Metrics to include (all by default)
    #[arg(short, long, value_delimiter = ',')]
    pub metrics: Vec<CliMetric>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Score with embedding similarity (BERTScore F1)
    #[cfg(feature = "embeddings")]
    Bertscore(BertscoreArgs),

    /// Score with sentence-level BLEU
    Bleu(BleuArgs),

    /// Score with METEOR
    Meteor(MeteorArgs),

    /// Write the result store as CSV
    Export(ExportArgs),
}
