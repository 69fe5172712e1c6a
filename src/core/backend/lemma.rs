//! Lemmatization through an external CoNLL-U annotator.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;

use tracing::debug;

use crate::core::error::BackendError;

const NAME: &str = "udpipe";

/// Column of the lemma in a CoNLL-U token line.
const LEMMA_COLUMN: usize = 2;

/// Groups the lemmas of a CoNLL-U stream by sentence.
///
/// Comment lines and multiword/empty-node lines (`1-2`, `3.1`) are skipped; a blank line
/// closes a sentence.
pub fn lemma_sentences(conllu: &str) -> Vec<Vec<String>> {
    let mut sentences = Vec::new();
    let mut current = Vec::new();

    for line in conllu.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                sentences.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() <= LEMMA_COLUMN || columns[0].contains(|c: char| c == '-' || c == '.') {
            continue;
        }
        current.push(columns[LEMMA_COLUMN].to_string());
    }

    if !current.is_empty() {
        sentences.push(current);
    }
    sentences
}

/// Tokenizer/lemmatizer boundary. Loaded once and shared across calls.
pub trait Lemmatizer: Send + Sync {
    /// CoNLL-U annotation of `text`, treating every input line as one sentence.
    fn annotate(&self, text: &str) -> Result<String, BackendError>;

    /// Replaces each line with its space-joined lemmas.
    fn lemmatize_lines(&self, lines: &[&str]) -> Result<Vec<String>, BackendError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }
        let conllu = self.annotate(&lines.join("\n"))?;
        let sentences = lemma_sentences(&conllu);
        if sentences.len() != lines.len() {
            return Err(BackendError::parse(
                NAME,
                format!(
                    "expected {} annotated sentences, got {}",
                    lines.len(),
                    sentences.len()
                ),
            ));
        }
        Ok(sentences.into_iter().map(|s| s.join(" ")).collect())
    }
}

/// Runs the `udpipe` binary with a trained model over presegmented input.
#[derive(Debug, Clone)]
pub struct UdpipeLemmatizer {
    program: PathBuf,
    model: PathBuf,
}

impl UdpipeLemmatizer {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("udpipe"),
            model: model.into(),
        }
    }

    /// Uses a different udpipe executable.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl Lemmatizer for UdpipeLemmatizer {
    fn annotate(&self, text: &str) -> Result<String, BackendError> {
        let mut child = Command::new(&self.program)
            .arg("--tokenize")
            .arg("--tokenizer=presegmented")
            .arg("--tag")
            .arg(&self.model)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BackendError::invocation(NAME, e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| BackendError::invocation(NAME, "stdin unavailable"))?;
        let input = text.to_owned();
        // Feed stdin from another thread so a full stdout pipe cannot deadlock us.
        let writer = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child.wait_with_output()?;
        writer
            .join()
            .map_err(|_| BackendError::invocation(NAME, "stdin writer panicked"))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::invocation(
                NAME,
                format!("exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        debug!(bytes = output.stdout.len(), "Annotated text");
        String::from_utf8(output.stdout).map_err(|e| BackendError::parse(NAME, e.to_string()))
    }
}
