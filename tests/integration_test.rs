//! Integration tests for the scoring pipeline.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use lyric_eval::core::backend::{Denominator, Dispatch};
use lyric_eval::core::{BackendError, BlankLinePolicy, Unit};
use lyric_eval::{
    EvalError, Metric, MetricBackend, NgramBackend, NgramConfig, OrchestratorBuilder, ResultStore,
};
use serde_json::Value;
use tempfile::TempDir;

/// Scores a song as its line count / 100 and fails on any hypothesis line containing FAIL.
struct LineCounter {
    metric: Metric,
    dispatch: Dispatch,
    policy: BlankLinePolicy,
    calls: AtomicUsize,
    seen: Mutex<Vec<Unit>>,
}

impl LineCounter {
    fn new(metric: Metric, dispatch: Dispatch) -> Self {
        Self {
            metric,
            dispatch,
            policy: BlankLinePolicy::Discard,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn with_policy(mut self, policy: BlankLinePolicy) -> Self {
        self.policy = policy;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetricBackend for LineCounter {
    fn metric(&self) -> Metric {
        self.metric
    }

    fn name(&self) -> &'static str {
        "line-counter"
    }

    fn blank_policy(&self) -> BlankLinePolicy {
        self.policy
    }

    fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    fn score(&self, _reference: &Unit, hypothesis: &Unit) -> Result<f64, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(hypothesis.clone());
        if hypothesis.iter().any(|l| l.contains("FAIL")) {
            return Err(BackendError::Invocation {
                backend: "line-counter",
                message: "scorer crashed".into(),
            });
        }
        Ok(hypothesis.len() as f64 / 100.0)
    }
}

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(references: &str, hypotheses: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("refs.txt"), references).unwrap();
        fs::write(dir.path().join("hyps.txt"), hypotheses).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn store_path(&self) -> PathBuf {
        self.path("results.json")
    }

    fn builder(&self) -> OrchestratorBuilder {
        OrchestratorBuilder::new()
            .corpora(self.path("refs.txt"), self.path("hyps.txt"))
            .store(self.store_path())
            .progress(false)
    }

    fn store_json(&self) -> Value {
        read_json(&self.store_path())
    }
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

/// `n` songs; song `i` has `i + 1` lines.
fn corpus(n: usize, tag: &str) -> String {
    let mut out = String::new();
    for i in 0..n {
        for j in 0..=i {
            out.push_str(&format!("{tag} song {i} line {j}\n"));
        }
        out.push_str("*\n");
    }
    out
}

#[test]
fn test_full_run_fills_store() {
    let ws = Workspace::new(&corpus(3, "ref"), &corpus(3, "hyp"));
    let backend = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential);

    let summary = ws.builder().build().run(&backend).unwrap();

    assert_eq!(summary.units, 3);
    assert_eq!(summary.already_scored, 0);
    assert_eq!(summary.scored, vec![(0, 0.01), (1, 0.02), (2, 0.03)]);
    assert!(summary.is_complete());
    assert!((summary.corpus_mean.unwrap() - 0.02).abs() < 1e-12);

    let json = ws.store_json();
    let records = json.as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[2]["sacrebleu"], 0.03);
    assert!(records[0].get("meteor").is_none());
}

#[test]
fn test_alignment_failure_leaves_store_untouched() {
    let ws = Workspace::new(&corpus(3, "ref"), &corpus(2, "hyp"));
    let original = "[\n    {\n        \"meteor\": 0.5\n    }\n]";
    fs::write(ws.store_path(), original).unwrap();
    let backend = LineCounter::new(Metric::Meteor, Dispatch::Sequential);

    let err = ws.builder().build().run(&backend).unwrap_err();

    match err {
        EvalError::Alignment(e) => {
            assert_eq!(e.reference, 3);
            assert_eq!(e.hypothesis, 2);
        }
        other => panic!("expected alignment error, got {other:?}"),
    }
    assert_eq!(backend.calls(), 0);
    assert_eq!(fs::read_to_string(ws.store_path()).unwrap(), original);
}

#[test]
fn test_resume_only_scores_pending_songs() {
    let ws = Workspace::new(&corpus(4, "ref"), &corpus(4, "hyp"));
    fs::write(
        ws.store_path(),
        r#"[{"meteor": 0.9, "title": "Uno"}, {"meteor": 0.8}, {"meteor": 0.0}, {}]"#,
    )
    .unwrap();
    let backend = LineCounter::new(Metric::Meteor, Dispatch::Sequential);

    let summary = ws.builder().build().run(&backend).unwrap();

    assert_eq!(backend.calls(), 2);
    assert_eq!(summary.already_scored, 2);
    assert_eq!(summary.scored, vec![(2, 0.03), (3, 0.04)]);

    let json = ws.store_json();
    assert_eq!(json[0]["meteor"], 0.9);
    assert_eq!(json[0]["title"], "Uno");
    assert_eq!(json[1]["meteor"], 0.8);
    assert_eq!(json[2]["meteor"], 0.03);
    assert_eq!(json[3]["meteor"], 0.04);
}

#[test]
fn test_rescore_ignores_stored_values() {
    let ws = Workspace::new(&corpus(2, "ref"), &corpus(2, "hyp"));
    fs::write(ws.store_path(), r#"[{"sacrebleu": 0.9}, {"sacrebleu": 0.8}]"#).unwrap();
    let backend = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential);

    ws.builder().rescore(true).build().run(&backend).unwrap();

    assert_eq!(backend.calls(), 2);
    assert_eq!(ws.store_json()[0]["sacrebleu"], 0.01);
}

#[test]
fn test_failed_rescore_clears_stale_value() {
    let hyps = "ok\n*\nFAIL\n*\n";
    let ws = Workspace::new(&corpus(2, "ref"), hyps);
    fs::write(ws.store_path(), r#"[{"meteor": 0.9}, {"meteor": 0.8, "title": "Dos"}]"#).unwrap();

    for dispatch in [Dispatch::Sequential, Dispatch::Parallel] {
        let backend = LineCounter::new(Metric::Meteor, dispatch);
        let summary = ws.builder().rescore(true).build().run(&backend).unwrap();

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].index, 1);
        let json = ws.store_json();
        assert_eq!(json[0]["meteor"], 0.01);
        assert!(json[1].get("meteor").is_none());
        assert_eq!(json[1]["title"], "Dos");
        assert_eq!(summary.corpus_mean, Some(0.01));

        fs::write(ws.store_path(), r#"[{"meteor": 0.9}, {"meteor": 0.8, "title": "Dos"}]"#)
            .unwrap();
    }
}

/// Checks on every call that all earlier songs are already on disk.
struct CheckpointWitness {
    store: PathBuf,
    calls: AtomicUsize,
}

impl MetricBackend for CheckpointWitness {
    fn metric(&self) -> Metric {
        Metric::SacreBleu
    }

    fn name(&self) -> &'static str {
        "checkpoint-witness"
    }

    fn blank_policy(&self) -> BlankLinePolicy {
        BlankLinePolicy::Discard
    }

    fn score(&self, _reference: &Unit, _hypothesis: &Unit) -> Result<f64, BackendError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let on_disk = ResultStore::load(&self.store);
        for earlier in 0..index {
            assert!(
                on_disk.is_scored(earlier, Metric::SacreBleu),
                "song {earlier} not flushed before song {index}"
            );
        }
        assert!(!on_disk.is_scored(index, Metric::SacreBleu));
        Ok(0.5)
    }
}

#[test]
fn test_sequential_run_flushes_after_every_song() {
    let ws = Workspace::new(&corpus(4, "ref"), &corpus(4, "hyp"));
    let backend = CheckpointWitness {
        store: ws.store_path(),
        calls: AtomicUsize::new(0),
    };

    let summary = ws.builder().build().run(&backend).unwrap();

    assert_eq!(backend.calls.load(Ordering::SeqCst), 4);
    assert_eq!(summary.scored.len(), 4);
}

#[test]
fn test_malformed_stored_value_keeps_other_metrics() {
    let ws = Workspace::new(&corpus(2, "ref"), &corpus(2, "hyp"));
    fs::write(
        ws.store_path(),
        r#"[{"title":"Uno","bertscore":0.91,"meteor":""},{"title":"Dos","bertscore":0.88}]"#,
    )
    .unwrap();
    let backend = LineCounter::new(Metric::Meteor, Dispatch::Sequential);

    ws.builder().build().run(&backend).unwrap();

    assert_eq!(backend.calls(), 2);
    let json = ws.store_json();
    assert_eq!(json[0]["title"], "Uno");
    assert_eq!(json[0]["bertscore"], 0.91);
    assert_eq!(json[0]["meteor"], 0.01);
    assert_eq!(json[1]["title"], "Dos");
    assert_eq!(json[1]["bertscore"], 0.88);
    assert_eq!(json[1]["meteor"], 0.02);
}

#[test]
fn test_corpus_mean_ignores_unscored_and_surplus_records() {
    let ws = Workspace::new(&corpus(2, "ref"), "FAIL\n*\nok\nok\n*\n");
    fs::write(ws.store_path(), r#"[{}, {}, {"sacrebleu": 0.9}]"#).unwrap();
    let backend = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential);

    let summary = ws.builder().build().run(&backend).unwrap();

    assert_eq!(summary.corpus_mean, Some(0.02));
}

#[test]
fn test_other_metrics_do_not_count_as_scored() {
    let ws = Workspace::new(&corpus(2, "ref"), &corpus(2, "hyp"));
    fs::write(ws.store_path(), r#"[{"bertscore": 0.7}, {"bertscore": 0.6}]"#).unwrap();
    let backend = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential);

    ws.builder().build().run(&backend).unwrap();

    assert_eq!(backend.calls(), 2);
    let json = ws.store_json();
    assert_eq!(json[1]["bertscore"], 0.6);
    assert_eq!(json[1]["sacrebleu"], 0.02);
}

#[test]
fn test_failed_song_is_isolated_and_retried() {
    let hyps = "ok\n*\nFAIL here\n*\nstill ok\nsecond line\n*\n";
    let ws = Workspace::new(&corpus(3, "ref"), hyps);
    let backend = LineCounter::new(Metric::Meteor, Dispatch::Sequential);

    let summary = ws.builder().build().run(&backend).unwrap();

    assert!(!summary.is_complete());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].index, 1);
    assert!(summary.failed[0].error.contains("scorer crashed"));
    assert_eq!(summary.scored, vec![(0, 0.01), (2, 0.02)]);

    let json = ws.store_json();
    assert!(json[1].get("meteor").is_none());

    // A second run only retries the failed song.
    let retry = LineCounter::new(Metric::Meteor, Dispatch::Sequential);
    let summary = ws.builder().build().run(&retry).unwrap();
    assert_eq!(retry.calls(), 1);
    assert_eq!(summary.already_scored, 2);
}

#[test]
fn test_parallel_results_keep_song_order() {
    let ws = Workspace::new(&corpus(24, "ref"), &corpus(24, "hyp"));
    let backend = LineCounter::new(Metric::BertScore, Dispatch::Parallel);

    let summary = ws.builder().workers(4).build().run(&backend).unwrap();

    assert_eq!(backend.calls(), 24);
    let indices: Vec<usize> = summary.scored.iter().map(|(i, _)| *i).collect();
    assert_eq!(indices, (0..24).collect::<Vec<_>>());

    let store = ResultStore::load(ws.store_path());
    for i in 0..24 {
        let expected = (i + 1) as f64 / 100.0;
        assert_eq!(store.get(i, Metric::BertScore), Some(expected));
    }
}

#[test]
fn test_parallel_failure_is_isolated() {
    let hyps = "a\n*\nFAIL\n*\nb\n*\nc\n*\n";
    let ws = Workspace::new(&corpus(4, "ref"), hyps);
    let backend = LineCounter::new(Metric::BertScore, Dispatch::Parallel);

    let summary = ws.builder().workers(3).build().run(&backend).unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].index, 1);
    assert_eq!(summary.scored.len(), 3);
    let store = ResultStore::load(ws.store_path());
    assert!(!store.is_scored(1, Metric::BertScore));
    assert!(store.is_scored(3, Metric::BertScore));
}

#[test]
fn test_strict_store_requires_existing_records() {
    let ws = Workspace::new(&corpus(3, "ref"), &corpus(3, "hyp"));
    fs::write(ws.store_path(), "[{}]").unwrap();
    let backend = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential);

    let err = ws
        .builder()
        .require_existing_records(true)
        .build()
        .run(&backend)
        .unwrap_err();

    assert!(matches!(
        err,
        EvalError::StoreInconsistent {
            expected: 3,
            found: 1
        }
    ));
    assert_eq!(backend.calls(), 0);
    assert_eq!(fs::read_to_string(ws.store_path()).unwrap(), "[{}]");
}

#[test]
fn test_short_store_is_padded() {
    let ws = Workspace::new(&corpus(3, "ref"), &corpus(3, "hyp"));
    fs::write(ws.store_path(), r#"[{"title": "first"}]"#).unwrap();
    let backend = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential);

    ws.builder().build().run(&backend).unwrap();

    let json = ws.store_json();
    assert_eq!(json.as_array().unwrap().len(), 3);
    assert_eq!(json[0]["title"], "first");
    assert_eq!(json[0]["sacrebleu"], 0.01);
}

#[test]
fn test_missing_corpus() {
    let ws = Workspace::new(&corpus(1, "ref"), &corpus(1, "hyp"));
    let backend = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential);

    let err = OrchestratorBuilder::new()
        .corpora(ws.path("nope.txt"), ws.path("hyps.txt"))
        .store(ws.store_path())
        .progress(false)
        .build()
        .run(&backend)
        .unwrap_err();

    assert!(matches!(err, EvalError::MissingInput { .. }));
    assert!(!ws.store_path().exists());
}

#[test]
fn test_blank_policy_reaches_backend() {
    let text = "one\n\ntwo\n*\n";
    let ws = Workspace::new(text, text);

    let stanza = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential)
        .with_policy(BlankLinePolicy::StanzaBreak);
    ws.builder().build().run(&stanza).unwrap();
    assert_eq!(stanza.seen.lock().unwrap()[0], vec!["one", "", "two"]);

    // An explicit override wins over the backend's preference.
    let overridden = LineCounter::new(Metric::Meteor, Dispatch::Sequential)
        .with_policy(BlankLinePolicy::StanzaBreak);
    ws.builder()
        .blank_policy(BlankLinePolicy::Discard)
        .build()
        .run(&overridden)
        .unwrap();
    assert_eq!(overridden.seen.lock().unwrap()[0], vec!["one", "two"]);
}

#[test]
fn test_custom_marker() {
    let ws = Workspace::new("a\n#\nb\n", "x\n#\ny\n");
    let backend = LineCounter::new(Metric::SacreBleu, Dispatch::Sequential);

    let summary = ws.builder().marker('#').build().run(&backend).unwrap();
    assert_eq!(summary.units, 2);
}

#[test]
fn test_ngram_backend_end_to_end() {
    let refs = "El sol brilla sobre el mar\n\nY la luna canta\n*\nNo hay nada que perder\n*\n";
    let ws = Workspace::new(refs, refs);
    let backend = NgramBackend::new(NgramConfig::default());

    let summary = ws.builder().build().run(&backend).unwrap();

    assert_eq!(summary.scored.len(), 2);
    for (_, score) in &summary.scored {
        assert!((score - 1.0).abs() < 1e-9);
    }
}

#[test]
fn test_ngram_reference_length_denominator() {
    let refs = "El sol brilla sobre el mar\n\nY la luna canta\n*\n";
    let ws = Workspace::new(refs, refs);
    let backend = NgramBackend::new(NgramConfig {
        denominator: Denominator::ReferenceLength,
        ..NgramConfig::default()
    });

    let summary = ws.builder().build().run(&backend).unwrap();

    // Two perfect lines divided by three reference entries (one stanza break).
    assert!((summary.scored[0].1 - 2.0 / 3.0).abs() < 1e-9);
}
