//! Resumable on-disk store of per-song result records.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::core::error::StoreError;
use crate::core::record::{Metric, ResultRecord};

/// Ordered collection of [`ResultRecord`]s, one per song, backed by a pretty JSON array.
#[derive(Debug, Clone)]
pub struct ResultStore {
    path: PathBuf,
    records: Vec<ResultRecord>,
}

impl ResultStore {
    /// Empty store that will flush to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
        }
    }

    /// Loads the store at `path`.
    ///
    /// A missing, empty or unparseable file yields an empty store. A corrupt file is left
    /// on disk untouched until the next successful flush replaces it. Records are read one
    /// by one, so a malformed field only affects that field.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => match serde_json::from_str::<Vec<Value>>(&content) {
                Ok(values) => parse_records(values),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Result store is not valid, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No result store yet, starting empty");
                Vec::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read result store, starting empty");
                Vec::new()
            }
        };
        debug!(path = %path.display(), records = records.len(), "Loaded result store");
        Self { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Appends empty records until the store holds at least `len` of them.
    pub fn ensure_len(&mut self, len: usize) {
        if self.records.len() < len {
            self.records.resize_with(len, ResultRecord::default);
        }
    }

    pub fn get(&self, index: usize, metric: Metric) -> Option<f64> {
        self.records.get(index).and_then(|r| r.get(metric))
    }

    /// True when `metric` already holds a usable value for song `index`.
    pub fn is_scored(&self, index: usize, metric: Metric) -> bool {
        self.records
            .get(index)
            .map_or(false, |r| r.is_scored(metric))
    }

    /// Sets one metric of one record, overwriting any previous value.
    pub fn merge(&mut self, index: usize, metric: Metric, value: f64) -> Result<(), StoreError> {
        let len = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(StoreError::IndexOutOfRange { index, len })?;
        record.set(metric, value);
        Ok(())
    }

    /// Drops the stored value of one metric of one record.
    pub fn clear(&mut self, index: usize, metric: Metric) -> Result<(), StoreError> {
        let len = self.records.len();
        let record = self
            .records
            .get_mut(index)
            .ok_or(StoreError::IndexOutOfRange { index, len })?;
        record.clear(metric);
        Ok(())
    }

    /// Mean of `metric` over every scored record.
    pub fn mean(&self, metric: Metric) -> Option<f64> {
        self.mean_up_to(self.records.len(), metric)
    }

    /// Mean of `metric` over the scored records among the first `len`.
    pub fn mean_up_to(&self, len: usize, metric: Metric) -> Option<f64> {
        let values: Vec<f64> = self
            .records
            .iter()
            .take(len)
            .filter(|r| r.is_scored(metric))
            .filter_map(|r| r.get(metric))
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.iter().sum::<f64>() / values.len() as f64)
        }
    }

    /// Writes the whole store to its own path.
    pub fn flush(&self) -> Result<(), StoreError> {
        self.flush_to(&self.path)
    }

    /// Serializes every record and atomically replaces the file at `path`.
    ///
    /// The JSON goes to a temporary file in the same directory which is then renamed over
    /// `path`, so readers see either the old store or the new one.
    pub fn flush_to(&self, path: &Path) -> Result<(), StoreError> {
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        self.records.serialize(&mut serializer)?;
        buffer.push(b'\n');

        let io_err = |source: io::Error| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&buffer).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;

        debug!(path = %path.display(), records = self.records.len(), "Flushed result store");
        Ok(())
    }
}

fn parse_records(values: Vec<Value>) -> Vec<ResultRecord> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            let object = match value {
                Value::Object(object) => object,
                other => {
                    warn!(unit = index, value = %other, "Result record is not an object, replacing it");
                    Map::new()
                }
            };
            let (record, rejected) = ResultRecord::from_json(object);
            for metric in rejected {
                warn!(unit = index, %metric, "Stored value is not a number, treating as unscored");
            }
            record
        })
        .collect()
}
