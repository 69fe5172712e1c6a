//! Error taxonomy for corpus alignment, metric backends and the result store.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Reference and hypothesis corpora split into a different number of units.
///
/// Fatal for the whole run: positional pairing is meaningless once the counts differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("song count mismatch: {reference} references vs {hypothesis} hypotheses")]
pub struct AlignmentError {
    pub reference: usize,
    pub hypothesis: usize,
}

/// Failure of a single backend call. Recovered per unit by the orchestrator.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{backend} failed to run: {message}")]
    Invocation {
        backend: &'static str,
        message: String,
    },

    #[error("{backend} produced unexpected output: {message}")]
    OutputParse {
        backend: &'static str,
        message: String,
    },

    #[error("no scorable line pairs in unit")]
    NoScorableLines,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BackendError {
    pub(crate) fn invocation(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Invocation {
            backend,
            message: message.into(),
        }
    }

    pub(crate) fn parse(backend: &'static str, message: impl Into<String>) -> Self {
        Self::OutputParse {
            backend,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write result store {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize result store")]
    Serialize(#[from] serde_json::Error),

    #[error("record index {index} out of range for store of {len} records")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Run-level errors. Any of these stops the run before (or instead of) scoring.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error("failed to read corpus {path}")]
    MissingInput {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("result store holds {found} records but {expected} songs expect existing records")]
    StoreInconsistent { expected: usize, found: usize },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to start worker pool")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
