//! Splitting line-oriented corpora into songs.

use std::fs;
use std::path::Path;

use crate::core::error::EvalError;

/// Character that marks a song delimiter line.
pub const DEFAULT_MARKER: char = '*';

/// One song: trimmed content lines, possibly interleaved with empty stanza-break markers.
pub type Unit = Vec<String>;

/// What to do with blank lines inside a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlankLinePolicy {
    /// Drop blank lines entirely.
    #[default]
    Discard,
    /// Keep each blank line as an empty-string stanza break.
    StanzaBreak,
}

/// Returns true for the empty marker left by [`BlankLinePolicy::StanzaBreak`].
#[inline]
pub fn is_stanza_break(line: &str) -> bool {
    line.is_empty()
}

/// Splits corpora into songs on marker lines.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    marker: char,
    policy: BlankLinePolicy,
}

impl Segmenter {
    pub fn new(policy: BlankLinePolicy) -> Self {
        Self {
            marker: DEFAULT_MARKER,
            policy,
        }
    }

    /// Uses a different delimiter character.
    pub fn with_marker(mut self, marker: char) -> Self {
        self.marker = marker;
        self
    }

    pub fn policy(&self) -> BlankLinePolicy {
        self.policy
    }

    /// Splits `lines` into songs, in input order.
    ///
    /// A line whose trimmed content contains the marker closes the current song and
    /// is itself dropped. Consecutive or leading delimiters never yield an empty song.
    pub fn segment<S: AsRef<str>>(&self, lines: &[S]) -> Vec<Unit> {
        let mut units = Vec::new();
        let mut current = Unit::new();

        for line in lines {
            let line = line.as_ref().trim();
            if line.contains(self.marker) {
                if !current.is_empty() {
                    units.push(std::mem::take(&mut current));
                }
                continue;
            }

            if line.is_empty() {
                if self.policy == BlankLinePolicy::StanzaBreak {
                    current.push(String::new());
                }
            } else {
                current.push(line.to_string());
            }
        }

        if !current.is_empty() {
            units.push(current);
        }
        units
    }
}

impl Default for Segmenter {
    fn default() -> Self {
        Self::new(BlankLinePolicy::default())
    }
}

/// Convenience wrapper around [`Segmenter::segment`] with the default marker.
pub fn segment<S: AsRef<str>>(lines: &[S], policy: BlankLinePolicy) -> Vec<Unit> {
    Segmenter::new(policy).segment(lines)
}

/// Reads a UTF-8 corpus file into its lines.
pub fn load_corpus(path: &Path) -> Result<Vec<String>, EvalError> {
    let content = fs::read_to_string(path).map_err(|source| EvalError::MissingInput {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(content.lines().map(String::from).collect())
}
