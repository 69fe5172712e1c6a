use std::sync::Arc;

use anyhow::Result;
use tracing::warn;

use crate::cli::types::{BleuArgs, CorpusArgs, MeteorArgs};
use crate::core::backend::{
    MeteorBackend, MeteorConfig, MetricBackend, NgramBackend, NgramConfig, UdpipeLemmatizer,
};
use crate::core::RunSummary;

/// Command to score every pending song with sentence-level BLEU.
pub fn cmd_bleu(args: BleuArgs) -> Result<()> {
    let backend = NgramBackend::new(NgramConfig {
        max_order: args.max_order,
        lowercase: args.lowercase,
        denominator: args.denominator.into(),
    });
    run(&args.corpus, &backend)
}

/// Command to score every pending song with METEOR, optionally on lemmatized text.
///
/// # Arguments
/// `args` - The CLI arguments structure containing:
///  - `jar`, `java`, `max_heap`: how to launch the scorer.
///  - `language`: the `-l` code passed to METEOR.
///  - `no_norm`: whether to drop `-norm`.
///  - `udpipe_model`: when set, both sides are lemmatized with UDPipe first.
pub fn cmd_meteor(args: MeteorArgs) -> Result<()> {
    let mut config = MeteorConfig::java(&args.jar, &args.max_heap)
        .language(&args.language)
        .normalize(!args.no_norm);
    config.program = args.java.clone();

    let mut backend = MeteorBackend::new(config);
    if let Some(model) = &args.udpipe_model {
        let lemmatizer = UdpipeLemmatizer::new(model).program(&args.udpipe);
        backend = backend.with_lemmatizer(Arc::new(lemmatizer));
    }
    run(&args.corpus, &backend)
}

/// Command to score every pending song with embedding similarity.
#[cfg(feature = "embeddings")]
pub fn cmd_bertscore(args: crate::cli::types::BertscoreArgs) -> Result<()> {
    use crate::core::backend::{SemanticBackend, SemanticConfig};
    use crate::core::embed::{EmbeddingScorerBuilder, EncoderFiles};

    let device = if args.cpu {
        tch::Device::Cpu
    } else {
        tch::Device::cuda_if_available()
    };

    let mut builder = EmbeddingScorerBuilder::new()
        .model(args.model_type.into(), &args.model)
        .device(device)
        .layer(args.layer)
        .lower_case(args.lower_case);
    if let Some(dir) = &args.model_dir {
        builder = builder.files(EncoderFiles::from_dir(dir)?);
    }
    if let Some(baseline) = args.baseline {
        builder = builder.baseline(baseline);
    }
    let scorer = builder.build()?;

    let backend = SemanticBackend::new(
        Arc::new(scorer),
        SemanticConfig {
            batch_size: args.batch_size.max(1),
        },
    );
    run(&args.corpus, &backend)
}

fn run(corpus: &CorpusArgs, backend: &dyn MetricBackend) -> Result<()> {
    let summary = corpus.orchestrator().build().run(backend)?;
    report(&summary);
    Ok(())
}

fn report(summary: &RunSummary) {
    for failure in &summary.failed {
        warn!(unit = failure.index, error = %failure.error, "Unscored");
    }
    println!(
        "{}: {} songs, {} already scored, {} scored, {} failed",
        summary.metric,
        summary.units,
        summary.already_scored,
        summary.scored.len(),
        summary.failed.len()
    );
    match summary.corpus_mean {
        Some(mean) => println!("{} mean: {:.4}", summary.metric, mean),
        None => println!("{} mean: n/a", summary.metric),
    }
}
