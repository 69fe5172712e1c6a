//! Command-line interface for lyric-eval.

use anyhow::Result;
use clap::Parser;
use lyric_eval::cli::{self, Cli, Command};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lyric_eval=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        #[cfg(feature = "embeddings")]
        Command::Bertscore(args) => cli::cmd_bertscore(args),
        Command::Bleu(args) => cli::cmd_bleu(args),
        Command::Meteor(args) => cli::cmd_meteor(args),
        Command::Export(args) => cli::cmd_export(args),
    }
}
