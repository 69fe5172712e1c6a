use std::fs::File;
use std::io::{self, Write};

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::types::ExportArgs;
use crate::core::{Metric, ResultStore};

/// Command to write the result store as CSV: one row per song, one column per metric.
pub fn cmd_export(args: ExportArgs) -> Result<()> {
    let store = ResultStore::load(&args.store);
    let metrics: Vec<Metric> = if args.metrics.is_empty() {
        Metric::ALL.to_vec()
    } else {
        args.metrics.iter().map(|&m| m.into()).collect()
    };

    let sink: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout().lock()),
    };
    write_csv(&store, &metrics, sink)?;

    for metric in metrics {
        match store.mean(metric) {
            Some(mean) => info!(%metric, mean, "Corpus mean"),
            None => info!(%metric, "No scores stored"),
        }
    }
    Ok(())
}

/// Writes `store` to `sink`. Missing values are left empty.
pub fn write_csv<W: Write>(store: &ResultStore, metrics: &[Metric], sink: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(sink);

    let mut header = vec!["song".to_string()];
    header.extend(metrics.iter().map(|m| m.key().to_string()));
    writer.write_record(&header)?;

    for (index, record) in store.records().iter().enumerate() {
        let mut row = vec![index.to_string()];
        row.extend(
            metrics
                .iter()
                .map(|&m| record.get(m).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
