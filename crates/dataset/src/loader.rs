//! Source loading: delimited text with a header row → parsed rows.
//!
//! Structural problems (unreadable file, missing column) fail the load.
//! Row-level problems (unknown step, bad timestamp, failed validation,
//! unparseable cell) reject just that row and are booked in the
//! [`DataQualityReport`].

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use experiment_core::error::LoadErrorCode;
use experiment_core::schema::{
    parse_assignment, parse_web_event, require_columns, validate_demographics,
    ASSIGNMENT_COLUMNS, DEMOGRAPHIC_COLUMNS, WEB_EVENT_COLUMNS,
};
use experiment_core::{
    Assignment, Demographics, Error, RawAssignment, RawWebEvent, Result, WebEvent,
};
use serde::de::DeserializeOwned;
use telemetry::metrics;
use tracing::{debug, info, warn};

use crate::config::DatasetConfig;
use crate::quality::{DataQualityReport, SourceQuality};

/// The three parsed sources of one run.
#[derive(Debug, Clone, Default)]
pub struct RawSources {
    pub demographics: Vec<Demographics>,
    /// All web-log partitions, concatenated in configured order
    pub web_events: Vec<WebEvent>,
    pub assignments: Vec<Assignment>,
    /// What the loader rejected
    pub quality: DataQualityReport,
}

impl RawSources {
    /// Bundles already-parsed rows with an empty quality report.
    pub fn new(
        demographics: Vec<Demographics>,
        web_events: Vec<WebEvent>,
        assignments: Vec<Assignment>,
    ) -> Self {
        Self {
            demographics,
            web_events,
            assignments,
            quality: DataQualityReport::new(),
        }
    }
}

/// Loads all sources named by `config`.
pub fn load_sources(config: &DatasetConfig) -> Result<RawSources> {
    let started = Instant::now();
    let delimiter = config.delimiter_byte()?;
    let mut quality = DataQualityReport::new();

    let demographics = load_demographics(&config.demographics_path, delimiter, &mut quality)?;
    let web_events = load_web_events(&config.web_event_paths, delimiter, &mut quality)?;
    let assignments = load_assignments(&config.assignments_path, delimiter, &mut quality)?;

    let m = metrics();
    m.demographic_rows_loaded.inc_by(demographics.len() as u64);
    m.web_event_rows_loaded.inc_by(web_events.len() as u64);
    m.assignment_rows_loaded.inc_by(assignments.len() as u64);
    m.rows_rejected.inc_by(quality.rows_rejected());
    m.unknown_steps.inc_by(quality.unknown_steps);
    m.invalid_timestamps.inc_by(quality.invalid_timestamps);
    m.load_latency_ms.observe_since(started);

    info!(
        demographics = demographics.len(),
        web_events = web_events.len(),
        assignments = assignments.len(),
        rejected = quality.rows_rejected(),
        "Loaded sources"
    );

    Ok(RawSources {
        demographics,
        web_events,
        assignments,
        quality,
    })
}

/// Loads the client demographics file.
pub fn load_demographics(
    path: &Path,
    delimiter: u8,
    quality: &mut DataQualityReport,
) -> Result<Vec<Demographics>> {
    let reader = open(path)?;
    read_demographics(&source_name(path), reader, delimiter, quality)
}

/// Loads and concatenates the web-log partitions.
pub fn load_web_events(
    paths: &[PathBuf],
    delimiter: u8,
    quality: &mut DataQualityReport,
) -> Result<Vec<WebEvent>> {
    if paths.is_empty() {
        return Err(Error::config("no web event partitions configured"));
    }

    let mut events = Vec::new();
    for path in paths {
        let reader = open(path)?;
        let partition = read_web_events(&source_name(path), reader, delimiter, quality)?;
        debug!(path = %path.display(), rows = partition.len(), "Loaded web partition");
        events.extend(partition);
    }
    Ok(events)
}

/// Loads the experiment assignment file.
pub fn load_assignments(
    path: &Path,
    delimiter: u8,
    quality: &mut DataQualityReport,
) -> Result<Vec<Assignment>> {
    let reader = open(path)?;
    read_assignments(&source_name(path), reader, delimiter, quality)
}

/// Reads demographics from any reader.
pub fn read_demographics<R: Read>(
    source: &str,
    reader: R,
    delimiter: u8,
    quality: &mut DataQualityReport,
) -> Result<Vec<Demographics>> {
    read_rows(source, reader, delimiter, DEMOGRAPHIC_COLUMNS, quality, validate_demographics)
}

/// Reads one web-log partition from any reader.
pub fn read_web_events<R: Read>(
    source: &str,
    reader: R,
    delimiter: u8,
    quality: &mut DataQualityReport,
) -> Result<Vec<WebEvent>> {
    read_rows::<_, RawWebEvent, _, _>(
        source,
        reader,
        delimiter,
        WEB_EVENT_COLUMNS,
        quality,
        parse_web_event,
    )
}

/// Reads assignments from any reader.
pub fn read_assignments<R: Read>(
    source: &str,
    reader: R,
    delimiter: u8,
    quality: &mut DataQualityReport,
) -> Result<Vec<Assignment>> {
    read_rows::<_, RawAssignment, _, _>(
        source,
        reader,
        delimiter,
        ASSIGNMENT_COLUMNS,
        quality,
        parse_assignment,
    )
}

fn open(path: &Path) -> Result<BufReader<File>> {
    File::open(path).map(BufReader::new).map_err(|e| {
        Error::load(
            LoadErrorCode::Unreadable,
            format!("{}: {}", path.display(), e),
        )
    })
}

fn source_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Reads, null-counts, deserializes, and parses every row of one source.
fn read_rows<R, T, U, F>(
    source: &str,
    reader: R,
    delimiter: u8,
    required: &[&str],
    quality: &mut DataQualityReport,
    mut parse: F,
) -> Result<Vec<U>>
where
    R: Read,
    T: DeserializeOwned,
    F: FnMut(T) -> Result<U>,
{
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    require_columns(source, headers.iter(), required)?;

    let mut stats = SourceQuality::new(source);
    let mut rows = Vec::new();
    let mut record = csv::StringRecord::new();

    loop {
        match rdr.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) if e.is_io_error() => {
                return Err(Error::load(
                    LoadErrorCode::Unreadable,
                    format!("{}: {}", source, e),
                ));
            }
            Err(e) => {
                stats.rows_read += 1;
                reject(source, &mut stats, quality, &Error::Csv(e));
                continue;
            }
        }
        stats.rows_read += 1;

        for (column, value) in headers.iter().zip(record.iter()) {
            if value.is_empty() {
                *stats.null_counts.entry(column.to_string()).or_insert(0) += 1;
            }
        }

        let raw: T = match record.deserialize(Some(&headers)) {
            Ok(raw) => raw,
            Err(e) => {
                reject(source, &mut stats, quality, &Error::Csv(e));
                continue;
            }
        };

        match parse(raw) {
            Ok(row) => {
                rows.push(row);
                stats.rows_accepted += 1;
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => reject(source, &mut stats, quality, &e),
        }
    }

    if stats.rows_rejected > 0 {
        warn!(
            source,
            rejected = stats.rows_rejected,
            read = stats.rows_read,
            "Rejected rows while loading source"
        );
    }
    info!(source, rows = stats.rows_accepted, "Source loaded");

    quality.sources.push(stats);
    Ok(rows)
}

fn reject(source: &str, stats: &mut SourceQuality, quality: &mut DataQualityReport, err: &Error) {
    debug!(source, line = stats.rows_read + 1, error = %err, "Rejected row");
    stats.rows_rejected += 1;
    quality.record_rejection(err);
}
