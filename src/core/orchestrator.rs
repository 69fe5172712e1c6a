//! Drives one metric over an aligned pair of corpora into the result store.
//!
//! Stages: load corpora, segment, validate alignment, score every pending song, flush.
//! Alignment failure stops the run before the store is touched. A failing song is
//! logged and left unscored; the run moves on.

use std::path::PathBuf;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::core::align::validate;
use crate::core::backend::{Dispatch, MetricBackend};
use crate::core::error::{BackendError, EvalError};
use crate::core::record::Metric;
use crate::core::segment::{load_corpus, BlankLinePolicy, Segmenter, Unit, DEFAULT_MARKER};
use crate::core::store::ResultStore;

/// Configuration for a scoring run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Reference translations, one line per lyric line.
    pub references: PathBuf,
    /// Machine translations in the same layout.
    pub hypotheses: PathBuf,
    /// JSON result store, created if absent.
    pub store: PathBuf,
    /// Delimiter character between songs.
    pub marker: char,
    /// Overrides the backend's preferred blank-line handling.
    pub blank_policy: Option<BlankLinePolicy>,
    /// Worker threads for parallel backends.
    pub workers: usize,
    /// Score every song even when a value is already stored.
    pub rescore: bool,
    /// Fail when the store holds fewer records than there are songs.
    pub require_existing_records: bool,
    /// Show a progress bar.
    pub progress: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            references: PathBuf::from("references.txt"),
            hypotheses: PathBuf::from("hypotheses.txt"),
            store: PathBuf::from("results.json"),
            marker: DEFAULT_MARKER,
            blank_policy: None,
            workers: 10,
            rescore: false,
            require_existing_records: false,
            progress: true,
        }
    }
}

/// A song the backend could not score.
#[derive(Debug, Clone)]
pub struct UnitFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of one run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub metric: Metric,
    /// Number of aligned songs.
    pub units: usize,
    /// Songs skipped because the store already had a value.
    pub already_scored: usize,
    /// Songs scored in this run, in index order.
    pub scored: Vec<(usize, f64)>,
    pub failed: Vec<UnitFailure>,
    /// Mean of the metric over the scored songs after the run.
    pub corpus_mean: Option<f64>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct Orchestrator {
    config: RunConfig,
}

impl Orchestrator {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs `backend` over every pending song and flushes the store.
    pub fn run(&self, backend: &dyn MetricBackend) -> Result<RunSummary, EvalError> {
        let metric = backend.metric();
        let policy = self.config.blank_policy.unwrap_or_else(|| backend.blank_policy());
        info!(%metric, backend = backend.name(), ?policy, "Starting scoring run");

        let mut store = ResultStore::load(&self.config.store);
        let references = load_corpus(&self.config.references)?;
        let hypotheses = load_corpus(&self.config.hypotheses)?;
        debug!(stage = "load", references = references.len(), hypotheses = hypotheses.len(), "Stage complete");

        let segmenter = Segmenter::new(policy).with_marker(self.config.marker);
        let ref_units = segmenter.segment(&references);
        let hyp_units = segmenter.segment(&hypotheses);
        debug!(stage = "segment", songs = ref_units.len(), "Stage complete");

        validate(&ref_units, &hyp_units)?;
        debug!(stage = "validate", "Stage complete");

        let units = ref_units.len();
        if store.len() < units {
            if self.config.require_existing_records {
                return Err(EvalError::StoreInconsistent {
                    expected: units,
                    found: store.len(),
                });
            }
            store.ensure_len(units);
        } else if store.len() > units {
            warn!(records = store.len(), songs = units, "Result store has more records than songs");
        }

        let pending: Vec<usize> = (0..units)
            .filter(|&i| self.config.rescore || !store.is_scored(i, metric))
            .collect();
        let already_scored = units - pending.len();
        info!(songs = units, pending = pending.len(), already_scored, "Scoring songs");

        let progress = self.progress_bar(pending.len(), backend.name());
        let outcomes = match backend.dispatch() {
            Dispatch::Sequential => {
                self.score_sequential(backend, &pending, &ref_units, &hyp_units, &mut store, &progress)?
            }
            Dispatch::Parallel => {
                let outcomes = self.score_parallel(backend, &pending, &ref_units, &hyp_units, &progress)?;
                for (index, outcome) in &outcomes {
                    match outcome {
                        Ok(score) => store.merge(*index, metric, *score)?,
                        Err(_) => store.clear(*index, metric)?,
                    }
                }
                outcomes
            }
        };
        progress.finish_and_clear();

        store.flush()?;
        debug!(stage = "flush", path = %store.path().display(), "Stage complete");

        let mut scored = Vec::new();
        let mut failed = Vec::new();
        for (index, outcome) in outcomes {
            match outcome {
                Ok(score) => scored.push((index, score)),
                Err(error) => failed.push(UnitFailure {
                    index,
                    error: error.to_string(),
                }),
            }
        }

        let summary = RunSummary {
            metric,
            units,
            already_scored,
            scored,
            failed,
            corpus_mean: store.mean_up_to(units, metric),
        };
        info!(
            %metric,
            scored = summary.scored.len(),
            failed = summary.failed.len(),
            mean = ?summary.corpus_mean,
            "Scoring run complete"
        );
        Ok(summary)
    }

    /// Scores songs one by one in index order, flushing after each.
    fn score_sequential(
        &self,
        backend: &dyn MetricBackend,
        pending: &[usize],
        ref_units: &[Unit],
        hyp_units: &[Unit],
        store: &mut ResultStore,
        progress: &ProgressBar,
    ) -> Result<Vec<(usize, Result<f64, BackendError>)>, EvalError> {
        let metric = backend.metric();
        let mut outcomes = Vec::with_capacity(pending.len());

        for &index in pending {
            progress.set_message(format!("song {index}"));
            let outcome = score_unit(backend, index, &ref_units[index], &hyp_units[index]);
            match &outcome {
                Ok(score) => store.merge(index, metric, *score)?,
                // A failed rescore must not leave the previous value looking current.
                Err(_) => store.clear(index, metric)?,
            }
            store.flush()?;
            outcomes.push((index, outcome));
            progress.inc(1);
        }
        Ok(outcomes)
    }

    /// Fans songs out over a bounded pool. Workers only return scores; the caller merges.
    fn score_parallel(
        &self,
        backend: &dyn MetricBackend,
        pending: &[usize],
        ref_units: &[Unit],
        hyp_units: &[Unit],
        progress: &ProgressBar,
    ) -> Result<Vec<(usize, Result<f64, BackendError>)>, EvalError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers.max(1))
            .build()?;

        // collect() on an indexed parallel iterator keeps index order.
        let outcomes: Vec<_> = pool.install(|| {
            pending
                .par_iter()
                .map(|&index| {
                    let outcome = score_unit(backend, index, &ref_units[index], &hyp_units[index]);
                    progress.inc(1);
                    (index, outcome)
                })
                .collect()
        });
        Ok(outcomes)
    }

    fn progress_bar(&self, len: usize, backend: &str) -> ProgressBar {
        if !self.config.progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.set_message(backend.to_string());
        bar
    }
}

fn score_unit(
    backend: &dyn MetricBackend,
    index: usize,
    reference: &Unit,
    hypothesis: &Unit,
) -> Result<f64, BackendError> {
    let outcome = backend.score(reference, hypothesis);
    match &outcome {
        Ok(score) => debug!(unit = index, backend = backend.name(), score, "Scored song"),
        Err(e) => warn!(unit = index, backend = backend.name(), error = %e, "Song left unscored"),
    }
    outcome
}

/// Builder for [`Orchestrator`].
pub struct OrchestratorBuilder {
    pub config: RunConfig,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            config: RunConfig::default(),
        }
    }

    /// Sets the reference and hypothesis corpora.
    pub fn corpora(mut self, references: impl Into<PathBuf>, hypotheses: impl Into<PathBuf>) -> Self {
        self.config.references = references.into();
        self.config.hypotheses = hypotheses.into();
        self
    }

    /// Sets the result store path.
    pub fn store(mut self, store: impl Into<PathBuf>) -> Self {
        self.config.store = store.into();
        self
    }

    pub fn marker(mut self, marker: char) -> Self {
        self.config.marker = marker;
        self
    }

    /// Forces a blank-line policy regardless of backend.
    pub fn blank_policy(mut self, policy: BlankLinePolicy) -> Self {
        self.config.blank_policy = Some(policy);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    pub fn rescore(mut self, rescore: bool) -> Self {
        self.config.rescore = rescore;
        self
    }

    pub fn require_existing_records(mut self, strict: bool) -> Self {
        self.config.require_existing_records = strict;
        self
    }

    pub fn progress(mut self, progress: bool) -> Self {
        self.config.progress = progress;
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator::new(self.config)
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
