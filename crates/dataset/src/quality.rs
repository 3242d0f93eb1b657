//! Data-quality accounting for a run.
//!
//! Every row the loader or the merge stage discards is counted here under
//! the reason it was discarded, so the report can show what was dropped.

use std::collections::BTreeMap;

use experiment_core::Error;
use serde::{Deserialize, Serialize};

/// Per-source read statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceQuality {
    /// Source label (file name)
    pub name: String,
    pub rows_read: u64,
    pub rows_accepted: u64,
    pub rows_rejected: u64,
    /// Empty cells per column
    pub null_counts: BTreeMap<String, u64>,
}

impl SourceQuality {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Counts of anomalies found while loading and merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub sources: Vec<SourceQuality>,

    // Row-level rejections at load time
    pub unknown_steps: u64,
    pub invalid_timestamps: u64,
    pub invalid_variations: u64,
    pub failed_validation: u64,
    pub malformed_rows: u64,

    // Merge & clean
    pub demographics_dropped_null_critical: u64,
    pub duplicate_assignments_collapsed: u64,
    pub conflicting_assignment_clients: u64,
    pub web_events_without_client: u64,
    pub records_without_assignment: u64,
    pub records_dropped_missing_variation: u64,
    pub records_dropped_conflicting_assignment: u64,
    pub conflicting_visits: u64,
    pub records_dropped_conflicting_visit: u64,

    // Session reconstruction
    pub records_without_activity: u64,
    pub negative_durations: u64,
}

impl DataQualityReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Books a row-level rejection under its reason.
    pub fn record_rejection(&mut self, err: &Error) {
        match err {
            Error::UnknownStep(_) => self.unknown_steps += 1,
            Error::InvalidTimestamp(_) => self.invalid_timestamps += 1,
            Error::InvalidVariation(_) => self.invalid_variations += 1,
            Error::Validation(_) => self.failed_validation += 1,
            _ => self.malformed_rows += 1,
        }
    }

    /// Looks up a source by name.
    pub fn source(&self, name: &str) -> Option<&SourceQuality> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// Total rows rejected across all sources at load time.
    pub fn rows_rejected(&self) -> u64 {
        self.sources.iter().map(|s| s.rows_rejected).sum()
    }

    /// Total merged records removed by the clean stage.
    pub fn records_dropped(&self) -> u64 {
        self.records_without_assignment
            + self.records_dropped_missing_variation
            + self.records_dropped_conflicting_assignment
            + self.records_dropped_conflicting_visit
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: DataQualityReport) {
        self.sources.extend(other.sources);
        self.unknown_steps += other.unknown_steps;
        self.invalid_timestamps += other.invalid_timestamps;
        self.invalid_variations += other.invalid_variations;
        self.failed_validation += other.failed_validation;
        self.malformed_rows += other.malformed_rows;
        self.demographics_dropped_null_critical += other.demographics_dropped_null_critical;
        self.duplicate_assignments_collapsed += other.duplicate_assignments_collapsed;
        self.conflicting_assignment_clients += other.conflicting_assignment_clients;
        self.web_events_without_client += other.web_events_without_client;
        self.records_without_assignment += other.records_without_assignment;
        self.records_dropped_missing_variation += other.records_dropped_missing_variation;
        self.records_dropped_conflicting_assignment += other.records_dropped_conflicting_assignment;
        self.conflicting_visits += other.conflicting_visits;
        self.records_dropped_conflicting_visit += other.records_dropped_conflicting_visit;
        self.records_without_activity += other.records_without_activity;
        self.negative_durations += other.negative_durations;
    }
}
