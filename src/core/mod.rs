mod align;
mod error;
mod orchestrator;
mod record;
mod segment;
mod store;
pub mod backend;
#[cfg(feature = "embeddings")]
pub mod embed;

pub use align::{line_pairs, validate};
pub use error::{AlignmentError, BackendError, EvalError, StoreError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunConfig, RunSummary, UnitFailure};
pub use record::{Metric, ResultRecord};
pub use segment::{is_stanza_break, load_corpus, segment, BlankLinePolicy, Segmenter, Unit, DEFAULT_MARKER};
pub use store::ResultStore;
