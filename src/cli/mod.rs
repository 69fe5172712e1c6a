pub mod types;
mod export;
mod score;

pub use types::{BleuArgs, Cli, Command, CorpusArgs, ExportArgs, MeteorArgs};
#[cfg(feature = "embeddings")]
pub use types::BertscoreArgs;
pub use export::{cmd_export, write_csv};
pub use score::{cmd_bleu, cmd_meteor};
#[cfg(feature = "embeddings")]
pub use score::cmd_bertscore;
