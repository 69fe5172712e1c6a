//! Per-song result records and the metrics they hold.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metrics with a dedicated field in [`ResultRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Embedding similarity F1, averaged over the song.
    BertScore,
    /// Sentence BLEU averaged over lines, scaled to 0..1.
    SacreBleu,
    /// Alignment-based METEOR over the whole song.
    Meteor,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::BertScore, Metric::SacreBleu, Metric::Meteor];

    /// Key used for this metric in the stored JSON.
    pub fn key(self) -> &'static str {
        match self {
            Metric::BertScore => "bertscore",
            Metric::SacreBleu => "sacrebleu",
            Metric::Meteor => "meteor",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .into_iter()
            .find(|m| m.key() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown metric: {}", s))
    }
}

/// Scores for one song. Absent fields mean "not scored yet".
///
/// Keys this crate does not know about are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bertscore: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sacrebleu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meteor: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultRecord {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::BertScore => self.bertscore,
            Metric::SacreBleu => self.sacrebleu,
            Metric::Meteor => self.meteor,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        // A malformed value kept from the loaded file would be written twice otherwise.
        self.extra.remove(metric.key());
        *self.slot(metric) = Some(value);
    }

    pub fn clear(&mut self, metric: Metric) {
        *self.slot(metric) = None;
    }

    /// A metric counts as done only with a finite, non-zero value.
    pub fn is_scored(&self, metric: Metric) -> bool {
        matches!(self.get(metric), Some(v) if v.is_finite() && v != 0.0)
    }

    /// Builds a record from one stored JSON object.
    ///
    /// A metric key holding something other than a number is treated as unscored; the raw
    /// value stays in `extra` so the file round-trips. Returns the keys that were rejected.
    pub fn from_json(object: Map<String, Value>) -> (Self, Vec<Metric>) {
        let mut record = ResultRecord {
            extra: object,
            ..Default::default()
        };
        let mut rejected = Vec::new();
        for metric in Metric::ALL {
            match record.extra.get(metric.key()) {
                None => {}
                Some(Value::Null) => {
                    record.extra.remove(metric.key());
                }
                Some(value) => match value.as_f64() {
                    Some(v) => {
                        record.extra.remove(metric.key());
                        *record.slot(metric) = Some(v);
                    }
                    None => rejected.push(metric),
                },
            }
        }
        (record, rejected)
    }

    fn slot(&mut self, metric: Metric) -> &mut Option<f64> {
        match metric {
            Metric::BertScore => &mut self.bertscore,
            Metric::SacreBleu => &mut self.sacrebleu,
            Metric::Meteor => &mut self.meteor,
        }
    }
}
