//! Persisted output: the merged dataset with derived columns, one CSV file.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use experiment_core::schema::{format_timestamp, OUTPUT_COLUMNS};
use experiment_core::{DerivedEvent, Error, MergedRecord, Result};
use telemetry::metrics;
use tracing::info;

/// One persisted row: a merged record and, when it has web activity, its
/// derived event.
#[derive(Debug, Clone, Copy)]
pub struct OutputRow<'a> {
    pub record: &'a MergedRecord,
    pub derived: Option<&'a DerivedEvent>,
}

impl<'a> OutputRow<'a> {
    /// Cells in [`OUTPUT_COLUMNS`] order; absent values are empty.
    pub fn fields(&self) -> Vec<String> {
        let profile = &self.record.profile;
        let demo = &profile.demographics;
        let activity = self.record.activity.as_ref();

        vec![
            demo.client_id.clone(),
            format_optional_float(demo.clnt_tenure_yr),
            format_optional_float(demo.clnt_tenure_mnth),
            format_optional_float(demo.clnt_age),
            demo.gendr.clone().unwrap_or_default(),
            format_optional_float(demo.num_accts),
            format_optional_float(demo.bal),
            format_optional_float(demo.calls_6_mnth),
            format_optional_float(demo.logons_6_mnth),
            format_optional_float(profile.total_tenure_months),
            profile
                .client_status
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            profile
                .age_group
                .map(|g| g.as_str().to_string())
                .unwrap_or_default(),
            activity
                .and_then(|a| a.visit_visitor_id.clone())
                .unwrap_or_default(),
            activity.map(|a| a.visit_id.clone()).unwrap_or_default(),
            activity
                .map(|a| a.process_step.as_str().to_string())
                .unwrap_or_default(),
            activity
                .map(|a| format_timestamp(&a.date_time))
                .unwrap_or_default(),
            self.record.variation.as_str().to_string(),
            self.derived
                .map(|d| d.step_index.to_string())
                .unwrap_or_default(),
            self.derived
                .and_then(|d| d.prev_step_index)
                .map(|i| i.to_string())
                .unwrap_or_default(),
            self.derived
                .map(|d| if d.is_back_track { "True" } else { "False" }.to_string())
                .unwrap_or_default(),
            self.derived
                .map(|d| format_float(d.time_spent))
                .unwrap_or_default(),
        ]
    }
}

/// Pairs each merged record with its derived event, in merge order.
pub fn output_rows<'a>(records: &'a [MergedRecord], derived: &'a [DerivedEvent]) -> Vec<OutputRow<'a>> {
    let mut by_source: Vec<Option<&DerivedEvent>> = vec![None; records.len()];
    for event in derived {
        if let Some(slot) = by_source.get_mut(event.event.source_index) {
            *slot = Some(event);
        }
    }
    records
        .iter()
        .zip(by_source)
        .map(|(record, derived)| OutputRow { record, derived })
        .collect()
}

/// Formats a float the way the dataset is read back: integral values keep
/// one decimal (`73.0`).
pub fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn format_optional_float(value: Option<f64>) -> String {
    value.map(format_float).unwrap_or_default()
}

/// Writes rows with a header to any writer.
pub fn write_rows<W: Write>(writer: W, rows: &[OutputRow<'_>]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(OUTPUT_COLUMNS)
        .map_err(|e| Error::output(format!("writing header: {}", e)))?;
    for row in rows {
        wtr.write_record(row.fields())
            .map_err(|e| Error::output(format!("writing row: {}", e)))?;
    }
    wtr.flush()
        .map_err(|e| Error::output(format!("flushing output: {}", e)))?;
    Ok(())
}

/// Persists the merged dataset to `path`, replacing any existing file.
pub fn write_dataset(path: &Path, rows: &[OutputRow<'_>]) -> Result<()> {
    let started = Instant::now();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::output(format!("{}: {}", parent.display(), e)))?;
    }
    let file = File::create(path).map_err(|e| Error::output(format!("{}: {}", path.display(), e)))?;
    write_rows(BufWriter::new(file), rows)?;

    metrics().write_latency_ms.observe_since(started);
    info!(path = %path.display(), rows = rows.len(), "Persisted merged dataset");
    Ok(())
}
