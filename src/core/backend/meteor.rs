//! METEOR scoring through the external jar, one song per invocation.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::align::line_pairs;
use crate::core::backend::{Dispatch, Lemmatizer, MetricBackend};
use crate::core::error::BackendError;
use crate::core::record::Metric;
use crate::core::segment::{BlankLinePolicy, Unit};

const NAME: &str = "meteor";

const SCORE_MARKER: &str = "Final score:";

/// How to launch the scorer and which flags to pass it.
#[derive(Debug, Clone)]
pub struct MeteorConfig {
    /// Executable to run, usually `java`.
    pub program: PathBuf,
    /// Arguments placed before the hypothesis and reference paths.
    pub program_args: Vec<OsString>,
    /// Value for `-l`.
    pub language: String,
    /// Pass `-norm` to normalize punctuation and case.
    pub normalize: bool,
}

impl MeteorConfig {
    /// `java -Xmx<max_heap> -jar <jar>`.
    pub fn java(jar: impl Into<PathBuf>, max_heap: &str) -> Self {
        let jar: PathBuf = jar.into();
        Self {
            program: PathBuf::from("java"),
            program_args: vec![
                format!("-Xmx{max_heap}").into(),
                "-jar".into(),
                jar.into_os_string(),
            ],
            language: "es".into(),
            normalize: true,
        }
    }

    pub fn language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }
}

impl Default for MeteorConfig {
    fn default() -> Self {
        Self::java("meteor-1.5.jar", "2G")
    }
}

/// Extracts the number after the last `Final score:` marker in the scorer's output.
pub fn parse_final_score(stdout: &str) -> Option<f64> {
    stdout
        .lines()
        .filter(|line| line.contains(SCORE_MARKER))
        .last()?
        .split_whitespace()
        .last()?
        .parse()
        .ok()
}

/// Writes one line per sentence to a fresh temp file. Removed when dropped.
fn write_lines(prefix: &str, lines: &[String]) -> Result<NamedTempFile, BackendError> {
    let mut file = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".txt")
        .tempfile()?;
    for line in lines {
        writeln!(file, "{}", line.trim())?;
    }
    file.flush()?;
    Ok(file)
}

/// Alignment-based backend. Runs sequentially: the process and temp files are per call,
/// but the optional lemmatizer is a shared pipeline.
pub struct MeteorBackend {
    config: MeteorConfig,
    lemmatizer: Option<Arc<dyn Lemmatizer>>,
}

impl MeteorBackend {
    pub fn new(config: MeteorConfig) -> Self {
        Self {
            config,
            lemmatizer: None,
        }
    }

    /// Lemmatizes both sides before scoring.
    pub fn with_lemmatizer(mut self, lemmatizer: Arc<dyn Lemmatizer>) -> Self {
        self.lemmatizer = Some(lemmatizer);
        self
    }

    pub fn config(&self) -> &MeteorConfig {
        &self.config
    }

    fn prepare(&self, lines: &[&str]) -> Result<Vec<String>, BackendError> {
        match &self.lemmatizer {
            Some(lemmatizer) => lemmatizer.lemmatize_lines(lines),
            None => Ok(lines.iter().map(|l| l.to_string()).collect()),
        }
    }
}

impl MetricBackend for MeteorBackend {
    fn metric(&self) -> Metric {
        Metric::Meteor
    }

    fn name(&self) -> &'static str {
        NAME
    }

    fn blank_policy(&self) -> BlankLinePolicy {
        if self.lemmatizer.is_some() {
            BlankLinePolicy::StanzaBreak
        } else {
            BlankLinePolicy::Discard
        }
    }

    fn dispatch(&self) -> Dispatch {
        Dispatch::Sequential
    }

    fn score(&self, reference: &Unit, hypothesis: &Unit) -> Result<f64, BackendError> {
        let (references, hypotheses): (Vec<&str>, Vec<&str>) = line_pairs(reference, hypothesis)
            .map(|(_, r, h)| (r, h))
            .unzip();
        if references.is_empty() {
            return Err(BackendError::NoScorableLines);
        }

        let references = self.prepare(&references)?;
        let hypotheses = self.prepare(&hypotheses)?;

        // Both files live until the end of this scope, whatever happens below.
        let ref_file = write_lines("meteor-ref-", &references)?;
        let hyp_file = write_lines("meteor-hyp-", &hypotheses)?;

        let mut command = Command::new(&self.config.program);
        command
            .args(&self.config.program_args)
            .arg(hyp_file.path())
            .arg(ref_file.path())
            .arg("-l")
            .arg(&self.config.language);
        if self.config.normalize {
            command.arg("-norm");
        }

        let output = command
            .output()
            .map_err(|e| BackendError::invocation(NAME, e.to_string()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match parse_final_score(&stdout) {
            Some(score) => {
                debug!(lines = references.len(), score, "METEOR scored song");
                Ok(score)
            }
            None if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                Err(BackendError::invocation(
                    NAME,
                    format!("exited with {}: {}", output.status, stderr.trim()),
                ))
            }
            None => Err(BackendError::parse(
                NAME,
                format!("no '{SCORE_MARKER}' line in output"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_score() {
        let out = "Segment 1 score:\t0.2\n\nPrecision:  0.5\nFinal score:            0.4321987\n";
        assert_eq!(parse_final_score(out), Some(0.4321987));
        assert_eq!(parse_final_score("Final score: n/a"), None);
        assert_eq!(parse_final_score("nothing here"), None);
        assert_eq!(parse_final_score(""), None);
    }

    #[test]
    fn test_java_command_line() {
        let config = MeteorConfig::java("/opt/meteor-1.5.jar", "2G").language("other");
        let args: Vec<_> = config
            .program_args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(config.program, PathBuf::from("java"));
        assert_eq!(args, vec!["-Xmx2G", "-jar", "/opt/meteor-1.5.jar"]);
        assert_eq!(config.language, "other");
        assert!(config.normalize);
    }

    #[test]
    fn test_blank_policy_follows_lemmatizer() {
        struct Identity;
        impl Lemmatizer for Identity {
            fn annotate(&self, _text: &str) -> Result<String, BackendError> {
                Ok(String::new())
            }
        }

        let plain = MeteorBackend::new(MeteorConfig::default());
        assert_eq!(plain.blank_policy(), BlankLinePolicy::Discard);
        let lemmatized = plain.with_lemmatizer(Arc::new(Identity));
        assert_eq!(lemmatized.blank_policy(), BlankLinePolicy::StanzaBreak);
    }

    #[test]
    fn test_empty_song_is_not_sent_to_process() {
        let backend = MeteorBackend::new(MeteorConfig::default());
        let err = backend
            .score(&vec![String::new()], &vec!["x".to_string()])
            .unwrap_err();
        assert!(matches!(err, BackendError::NoScorableLines));
    }
}
