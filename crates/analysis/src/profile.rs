//! Demographic profiles: the whole client base, and the experiment groups.
//!
//! Profiles count clients, deduplicated by `client_id`, not events.

use std::collections::{BTreeMap, HashSet};

use experiment_core::{AgeGroup, ClientProfile, ClientStatus, Demographics, MergedRecord, Variation};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Label for clients without a gender code.
pub const UNKNOWN_GENDER: &str = "unknown";

/// One histogram bin; `upper` is inclusive only for the last bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Profile of one variation's clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub variation: Variation,
    pub clients: u64,
    pub mean_age: Option<f64>,
    pub gender_counts: BTreeMap<String, u64>,
    pub age_histogram: Vec<HistogramBin>,
}

/// Client count of one (status, age group) segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentCount {
    pub client_status: Option<ClientStatus>,
    pub age_group: Option<AgeGroup>,
    pub clients: u64,
}

/// Demographic profiles of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DemographicProfiles {
    /// Control first
    pub groups: Vec<GroupProfile>,
    /// Sorted by (status, age group)
    pub primary_segments: Vec<SegmentCount>,
}

impl DemographicProfiles {
    pub fn group(&self, variation: Variation) -> Option<&GroupProfile> {
        self.groups.iter().find(|g| g.variation == variation)
    }
}

/// Count, moments and quartiles of one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub count: u64,
    pub mean: f64,
    /// Sample standard deviation, `None` below two values
    pub std: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Clients holding one distinct value of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: f64,
    pub clients: u64,
}

/// Distributions over every loaded demographics row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub clients: u64,
    pub tenure_years_histogram: Vec<HistogramBin>,
    pub age_histogram: Vec<HistogramBin>,
    pub logons_histogram: Vec<HistogramBin>,
    pub gender_counts: BTreeMap<String, u64>,
    /// Ascending by account count
    pub account_counts: Vec<ValueCount>,
    pub balance: Option<SummaryStats>,
}

/// Linear-interpolated quantile of sorted values.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let position = q * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    sorted[below] + (sorted[above] - sorted[below]) * (position - below as f64)
}

/// Summary of the finite values; `None` when there are none.
pub fn describe(values: &[f64]) -> Option<SummaryStats> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    Some(SummaryStats {
        count: sorted.len() as u64,
        mean: sorted.iter().mean(),
        std: (sorted.len() > 1).then(|| sorted.iter().std_dev()),
        min: sorted[0],
        q1: quantile(&sorted, 0.25),
        median: quantile(&sorted, 0.5),
        q3: quantile(&sorted, 0.75),
        max: sorted[sorted.len() - 1],
    })
}

/// Histogram over the values' own range.
fn value_histogram(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() {
        return Vec::new();
    }
    let lower = values.iter().copied().fold(f64::INFINITY, f64::min);
    let upper = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    histogram(values, lower, upper, bins)
}

fn column(demographics: &[Demographics], field: impl Fn(&Demographics) -> Option<f64>) -> Vec<f64> {
    demographics.iter().filter_map(field).collect()
}

/// Profiles the loaded demographics table before any cleaning.
pub fn profile_dataset(demographics: &[Demographics], bins: usize) -> DatasetProfile {
    let mut gender_counts = BTreeMap::new();
    for row in demographics {
        let gender = row.gendr.clone().unwrap_or_else(|| UNKNOWN_GENDER.to_string());
        *gender_counts.entry(gender).or_insert(0) += 1;
    }

    let mut accounts = column(demographics, |d| d.num_accts);
    accounts.sort_by(f64::total_cmp);

    DatasetProfile {
        clients: demographics.len() as u64,
        tenure_years_histogram: value_histogram(&column(demographics, |d| d.clnt_tenure_yr), bins),
        age_histogram: value_histogram(&column(demographics, |d| d.clnt_age), bins),
        logons_histogram: value_histogram(&column(demographics, |d| d.logons_6_mnth), bins),
        gender_counts,
        account_counts: accounts
            .chunk_by(|a, b| a == b)
            .map(|run| ValueCount {
                value: run[0],
                clients: run.len() as u64,
            })
            .collect(),
        balance: describe(&column(demographics, |d| d.bal)),
    }
}

/// Equal-width bins over `[lower, upper]`.
///
/// A zero-width range is widened by half a unit on each side so the values
/// still land in a bin.
pub fn histogram(values: &[f64], lower: f64, upper: f64, bins: usize) -> Vec<HistogramBin> {
    if bins == 0 {
        return Vec::new();
    }
    let (lower, upper) = if upper > lower {
        (lower, upper)
    } else {
        (lower - 0.5, upper + 0.5)
    };
    let width = (upper - lower) / bins as f64;

    let mut counts = vec![0u64; bins];
    for &value in values {
        if value < lower || value > upper {
            continue;
        }
        let slot = (((value - lower) / width) as usize).min(bins - 1);
        counts[slot] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lower + width * i as f64,
            upper: if i + 1 == bins { upper } else { lower + width * (i + 1) as f64 },
            count,
        })
        .collect()
}

/// One profile per distinct (client, variation).
fn distinct_clients(records: &[MergedRecord]) -> Vec<(Variation, &ClientProfile)> {
    let mut seen: HashSet<(&str, Variation)> = HashSet::new();
    records
        .iter()
        .filter(|r| seen.insert((r.client_id(), r.variation)))
        .map(|r| (r.variation, &r.profile))
        .collect()
}

/// Builds the group profiles and primary segments.
pub fn profile_groups(records: &[MergedRecord], bins: usize) -> DemographicProfiles {
    let clients = distinct_clients(records);

    let ages: Vec<f64> = clients
        .iter()
        .filter_map(|(_, p)| p.demographics.clnt_age)
        .collect();
    let lower = ages.iter().copied().fold(f64::INFINITY, f64::min);
    let upper = ages.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let groups = Variation::ALL
        .iter()
        .map(|&variation| {
            let members: Vec<&ClientProfile> = clients
                .iter()
                .filter(|(v, _)| *v == variation)
                .map(|(_, p)| *p)
                .collect();
            let group_ages: Vec<f64> = members.iter().filter_map(|p| p.demographics.clnt_age).collect();

            let mut gender_counts = BTreeMap::new();
            for profile in &members {
                let gender = profile
                    .demographics
                    .gendr
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_GENDER.to_string());
                *gender_counts.entry(gender).or_insert(0) += 1;
            }

            GroupProfile {
                variation,
                clients: members.len() as u64,
                mean_age: (!group_ages.is_empty())
                    .then(|| group_ages.iter().sum::<f64>() / group_ages.len() as f64),
                gender_counts,
                age_histogram: if ages.is_empty() {
                    Vec::new()
                } else {
                    histogram(&group_ages, lower, upper, bins)
                },
            }
        })
        .collect();

    let mut segments: BTreeMap<(Option<ClientStatus>, Option<AgeGroup>), u64> = BTreeMap::new();
    let mut counted: HashSet<&str> = HashSet::new();
    for (_, profile) in &clients {
        if counted.insert(profile.client_id()) {
            *segments
                .entry((profile.client_status, profile.age_group))
                .or_insert(0) += 1;
        }
    }

    DemographicProfiles {
        groups,
        primary_segments: segments
            .into_iter()
            .map(|((client_status, age_group), clients)| SegmentCount {
                client_status,
                age_group,
                clients,
            })
            .collect(),
    }
}
