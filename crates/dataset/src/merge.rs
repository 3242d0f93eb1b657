//! Merge & clean: demographics ⟕ web events ⋈ assignments.
//!
//! Join order and row order follow the source files: one record per web
//! event of an assigned client, in demographics order and then web-log
//! order; a client without web events contributes a single record with no
//! activity.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Instant;

use experiment_core::error::MergeErrorCode;
use experiment_core::limits::NEW_CLIENT_MAX_TENURE_MONTHS;
use experiment_core::{
    Assignment, ClientProfile, Demographics, Error, MergedRecord, Result, Variation, WebEvent,
};
use serde::{Deserialize, Serialize};
use telemetry::metrics;
use tracing::{info, warn};

use crate::loader::RawSources;
use crate::quality::DataQualityReport;

/// Merge stage options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    /// Clients at or below this total tenure are `New`
    #[serde(default = "default_new_client_max_tenure_months")]
    pub new_client_max_tenure_months: f64,
}

fn default_new_client_max_tenure_months() -> f64 {
    NEW_CLIENT_MAX_TENURE_MONTHS
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            new_client_max_tenure_months: default_new_client_max_tenure_months(),
        }
    }
}

/// The cleaned experiment dataset.
#[derive(Debug, Clone, Default)]
pub struct MergedDataset {
    pub records: Vec<MergedRecord>,
    /// Loader and merge anomalies
    pub quality: DataQualityReport,
}

impl MergedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct clients per variation.
    pub fn client_counts(&self) -> HashMap<Variation, usize> {
        let mut seen: HashSet<(&str, Variation)> = HashSet::new();
        let mut counts = HashMap::new();
        for record in &self.records {
            if seen.insert((record.client_id(), record.variation)) {
                *counts.entry(record.variation).or_insert(0) += 1;
            }
        }
        counts
    }
}

/// Resolved assignment for one client id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AssignmentState {
    Assigned(Variation),
    Missing,
    Conflicting,
}

/// Median of the known values, `None` when there are none.
pub fn median(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Derives client profiles and drops rows missing `bal` or `clnt_age`.
///
/// The age median is taken before the drop, over every client with a known
/// age.
pub fn clean_demographics(
    demographics: Vec<Demographics>,
    options: &MergeOptions,
    quality: &mut DataQualityReport,
) -> Vec<ClientProfile> {
    let median_age = median(demographics.iter().filter_map(|d| d.clnt_age));

    let before = demographics.len();
    let profiles: Vec<ClientProfile> = demographics
        .into_iter()
        .filter(|d| d.bal.is_some() && d.clnt_age.is_some())
        .map(|d| ClientProfile::derive(d, median_age, options.new_client_max_tenure_months))
        .collect();

    let dropped = (before - profiles.len()) as u64;
    if dropped > 0 {
        warn!(dropped, "Dropped demographic rows with null bal or clnt_age");
    }
    quality.demographics_dropped_null_critical += dropped;
    metrics().demographics_dropped_nulls.inc_by(dropped);

    profiles
}

/// Fails when a client id appears more than once among the profiles.
fn ensure_unique_clients(profiles: &[ClientProfile]) -> Result<()> {
    let mut seen = HashSet::with_capacity(profiles.len());
    let duplicates: BTreeSet<&str> = profiles
        .iter()
        .map(ClientProfile::client_id)
        .filter(|id| !seen.insert(*id))
        .collect();

    if duplicates.is_empty() {
        return Ok(());
    }

    let sample: Vec<&str> = duplicates.iter().take(5).copied().collect();
    Err(Error::merge(
        MergeErrorCode::Cardinality,
        format!(
            "{} client ids appear more than once in demographics (e.g. {})",
            duplicates.len(),
            sample.join(", ")
        ),
    ))
}

/// Collapses assignments to one state per client.
fn resolve_assignments(
    assignments: Vec<Assignment>,
    quality: &mut DataQualityReport,
) -> HashMap<String, AssignmentState> {
    let mut resolved: HashMap<String, AssignmentState> = HashMap::with_capacity(assignments.len());

    for assignment in assignments {
        let incoming = match assignment.variation {
            Some(v) => AssignmentState::Assigned(v),
            None => AssignmentState::Missing,
        };
        match resolved.get_mut(&assignment.client_id) {
            None => {
                resolved.insert(assignment.client_id, incoming);
            }
            Some(current) => {
                quality.duplicate_assignments_collapsed += 1;
                *current = match (*current, incoming) {
                    (AssignmentState::Conflicting, _) => AssignmentState::Conflicting,
                    (AssignmentState::Missing, other) | (other, AssignmentState::Missing) => other,
                    (AssignmentState::Assigned(a), AssignmentState::Assigned(b)) if a == b => {
                        AssignmentState::Assigned(a)
                    }
                    _ => AssignmentState::Conflicting,
                };
            }
        }
    }

    let conflicting = resolved
        .values()
        .filter(|s| **s == AssignmentState::Conflicting)
        .count() as u64;
    if conflicting > 0 {
        warn!(clients = conflicting, "Clients assigned to both variations excluded");
    }
    quality.conflicting_assignment_clients += conflicting;

    resolved
}

/// Removes every record of a visit that carries more than one variation.
fn drop_conflicting_visits(records: Vec<MergedRecord>, quality: &mut DataQualityReport) -> Vec<MergedRecord> {
    let mut variations: HashMap<&str, Variation> = HashMap::new();
    let mut conflicting: HashSet<String> = HashSet::new();
    for record in &records {
        if let Some(visit_id) = record.visit_id() {
            match variations.get(visit_id) {
                Some(v) if *v != record.variation => {
                    conflicting.insert(visit_id.to_string());
                }
                Some(_) => {}
                None => {
                    variations.insert(visit_id, record.variation);
                }
            }
        }
    }

    if conflicting.is_empty() {
        return records;
    }

    let before = records.len();
    let kept: Vec<MergedRecord> = records
        .into_iter()
        .filter(|r| r.visit_id().map_or(true, |v| !conflicting.contains(v)))
        .collect();
    let dropped = (before - kept.len()) as u64;

    warn!(
        visits = conflicting.len(),
        records = dropped,
        "Visits with conflicting variations excluded"
    );
    quality.conflicting_visits += conflicting.len() as u64;
    quality.records_dropped_conflicting_visit += dropped;
    metrics().records_dropped_conflicting_visit.inc_by(dropped);

    kept
}

/// Joins the three sources into the cleaned experiment dataset.
pub fn merge_and_clean(sources: RawSources, options: &MergeOptions) -> Result<MergedDataset> {
    let started = Instant::now();
    let RawSources {
        demographics,
        web_events,
        assignments,
        mut quality,
    } = sources;

    let profiles = clean_demographics(demographics, options, &mut quality);
    ensure_unique_clients(&profiles)?;
    let assignments = resolve_assignments(assignments, &mut quality);

    let known_clients: HashSet<&str> = profiles.iter().map(ClientProfile::client_id).collect();
    let mut events_by_client: HashMap<String, Vec<WebEvent>> = HashMap::new();
    for event in web_events {
        if !known_clients.contains(event.client_id.as_str()) {
            quality.web_events_without_client += 1;
            continue;
        }
        events_by_client
            .entry(event.client_id.clone())
            .or_default()
            .push(event);
    }

    let mut records = Vec::new();
    for profile in profiles {
        let events = events_by_client.remove(profile.client_id()).unwrap_or_default();
        let produced = events.len().max(1) as u64;

        let variation = match assignments.get(profile.client_id()) {
            Some(AssignmentState::Assigned(v)) => *v,
            Some(AssignmentState::Missing) => {
                quality.records_dropped_missing_variation += produced;
                continue;
            }
            Some(AssignmentState::Conflicting) => {
                quality.records_dropped_conflicting_assignment += produced;
                continue;
            }
            None => {
                quality.records_without_assignment += produced;
                continue;
            }
        };

        if events.is_empty() {
            records.push(MergedRecord {
                profile,
                activity: None,
                variation,
            });
            continue;
        }

        records.extend(events.into_iter().map(|event| MergedRecord {
            profile: profile.clone(),
            activity: Some(event.activity),
            variation,
        }));
    }

    let unassigned = quality.records_without_assignment + quality.records_dropped_missing_variation;
    if unassigned > 0 {
        info!(records = unassigned, "Dropped records without a variation");
    }
    metrics().records_dropped_unassigned.inc_by(unassigned);

    let records = drop_conflicting_visits(records, &mut quality);

    metrics().records_merged.inc_by(records.len() as u64);
    metrics().merge_latency_ms.observe_since(started);
    info!(records = records.len(), "Merged experiment dataset");

    Ok(MergedDataset { records, quality })
}
