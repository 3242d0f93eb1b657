//! Metric pipeline: per-variation aggregates over derived events and sessions.
//!
//! Aggregates over an empty group report `None` instead of failing; only the
//! two-group completion comparison requires both groups.

use std::collections::BTreeMap;

use experiment_core::{DerivedEvent, Error, ProcessStep, Result, Session, Variation};
use serde::{Deserialize, Serialize};

/// Visit completion for one variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionSummary {
    pub variation: Variation,
    /// Distinct visits
    pub total_visits: u64,
    /// Distinct visits that reached `confirm`
    pub completed_visits: u64,
    /// Percentage, `None` without visits
    pub completion_rate: Option<f64>,
}

/// Completion of both groups, ready for a two-sample test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionComparison {
    pub control: CompletionSummary,
    pub test: CompletionSummary,
}

impl CompletionComparison {
    /// Test rate minus control rate, in percentage points.
    pub fn observed_increase(&self) -> Option<f64> {
        Some(self.test.completion_rate? - self.control.completion_rate?)
    }
}

/// Mean time spent on one process step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDuration {
    /// `None` for the pooled row across both variations
    pub variation: Option<Variation>,
    pub step: ProcessStep,
    pub count: u64,
    pub mean_secs: Option<f64>,
}

/// Total time spent in one visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDuration {
    pub visit_id: String,
    pub variation: Variation,
    pub duration_secs: f64,
}

/// Backtrack (error) rate for one variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRate {
    pub variation: Variation,
    pub events: u64,
    pub backtrack_events: u64,
    /// Share of events that are backtracks, `None` without events
    pub rate: Option<f64>,
    pub sessions: u64,
    /// Visits with at least one backtrack
    pub sessions_with_backtrack: u64,
}

/// Completion rate of one test-group client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCompletion {
    pub client_id: String,
    pub events: u64,
    pub confirm_events: u64,
    /// Percentage of the client's events that are `confirm`
    pub completion_rate: f64,
}

/// All metrics of one variation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub variation: Variation,
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub completion_rate: Option<f64>,
    /// Canonical step order
    pub mean_step_duration: Vec<(ProcessStep, Option<f64>)>,
    pub mean_session_duration: Option<f64>,
    pub error_rate: Option<f64>,
    pub event_count: u64,
    pub backtrack_event_count: u64,
}

/// The metric tables of one run, plus the raw samples the comparator needs.
#[derive(Debug, Clone, Default)]
pub struct MetricTables {
    pub completion: Vec<CompletionSummary>,
    /// Variation x step, control first, canonical step order
    pub step_durations: Vec<StepDuration>,
    /// Both variations pooled
    pub overall_step_durations: Vec<StepDuration>,
    pub session_durations: Vec<SessionDuration>,
    pub error_rates: Vec<ErrorRate>,
    /// Test group only, ordered by client id
    pub client_completion: Vec<ClientCompletion>,
    pub summaries: Vec<MetricSummary>,
    step_samples: BTreeMap<(Variation, ProcessStep), Vec<f64>>,
}

impl MetricTables {
    pub fn completion_for(&self, variation: Variation) -> Option<&CompletionSummary> {
        self.completion.iter().find(|c| c.variation == variation)
    }

    pub fn error_rate_for(&self, variation: Variation) -> Option<&ErrorRate> {
        self.error_rates.iter().find(|e| e.variation == variation)
    }

    pub fn summary_for(&self, variation: Variation) -> Option<&MetricSummary> {
        self.summaries.iter().find(|s| s.variation == variation)
    }

    pub fn step_duration_for(&self, variation: Variation, step: ProcessStep) -> Option<&StepDuration> {
        self.step_durations
            .iter()
            .find(|d| d.variation == Some(variation) && d.step == step)
    }

    /// `time_spent` values of one step in one variation.
    pub fn step_samples(&self, variation: Variation, step: ProcessStep) -> &[f64] {
        self.step_samples
            .get(&(variation, step))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Visit durations of one variation.
    pub fn session_duration_samples(&self, variation: Variation) -> Vec<f64> {
        self.session_durations
            .iter()
            .filter(|d| d.variation == variation)
            .map(|d| d.duration_secs)
            .collect()
    }

    /// Per-client completion rates of the test group.
    pub fn client_completion_samples(&self) -> Vec<f64> {
        self.client_completion.iter().map(|c| c.completion_rate).collect()
    }

    /// Both completion summaries; fails when either group has no visits.
    pub fn completion_comparison(&self) -> Result<CompletionComparison> {
        pair_groups(&self.completion)
    }

    /// Test minus control completion rate, when both are defined.
    pub fn observed_increase(&self) -> Option<f64> {
        self.completion_comparison().ok()?.observed_increase()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn percentage(part: u64, whole: u64) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64 * 100.0)
}

/// Completion per variation over distinct visits.
pub fn completion_rates(sessions: &[Session]) -> Vec<CompletionSummary> {
    Variation::ALL
        .iter()
        .map(|&variation| {
            let group = sessions.iter().filter(|s| s.variation == variation);
            let (total, completed) = group.fold((0u64, 0u64), |(t, c), s| {
                (t + 1, c + u64::from(s.reached_confirm))
            });
            CompletionSummary {
                variation,
                total_visits: total,
                completed_visits: completed,
                completion_rate: percentage(completed, total),
            }
        })
        .collect()
}

/// Completion of both groups; `MissingGroup` when either has no visits.
pub fn completion_comparison(sessions: &[Session]) -> Result<CompletionComparison> {
    pair_groups(&completion_rates(sessions))
}

fn pair_groups(rates: &[CompletionSummary]) -> Result<CompletionComparison> {
    let pick = |variation: Variation| {
        rates
            .iter()
            .find(|c| c.variation == variation && c.total_visits > 0)
            .cloned()
            .ok_or(Error::MissingGroup(variation))
    };
    Ok(CompletionComparison {
        control: pick(Variation::Control)?,
        test: pick(Variation::Test)?,
    })
}

fn step_samples(events: &[DerivedEvent]) -> BTreeMap<(Variation, ProcessStep), Vec<f64>> {
    let mut samples: BTreeMap<(Variation, ProcessStep), Vec<f64>> = BTreeMap::new();
    for event in events {
        samples
            .entry((event.variation(), event.process_step()))
            .or_default()
            .push(event.time_spent);
    }
    samples
}

fn step_duration(variation: Option<Variation>, step: ProcessStep, values: &[f64]) -> StepDuration {
    StepDuration {
        variation,
        step,
        count: values.len() as u64,
        mean_secs: mean(values),
    }
}

/// Mean `time_spent` per (variation, step), every cell present.
pub fn step_durations(events: &[DerivedEvent]) -> Vec<StepDuration> {
    let samples = step_samples(events);
    step_duration_table(&samples)
}

fn step_duration_table(samples: &BTreeMap<(Variation, ProcessStep), Vec<f64>>) -> Vec<StepDuration> {
    Variation::ALL
        .iter()
        .flat_map(|&variation| {
            ProcessStep::ORDERED.iter().map(move |&step| {
                let values = samples.get(&(variation, step)).map(Vec::as_slice).unwrap_or(&[]);
                step_duration(Some(variation), step, values)
            })
        })
        .collect()
}

/// Mean `time_spent` per step across both variations.
pub fn overall_step_durations(events: &[DerivedEvent]) -> Vec<StepDuration> {
    ProcessStep::ORDERED
        .iter()
        .map(|&step| {
            let values: Vec<f64> = events
                .iter()
                .filter(|e| e.process_step() == step)
                .map(|e| e.time_spent)
                .collect();
            step_duration(None, step, &values)
        })
        .collect()
}

/// Sum of `time_spent` per visit.
pub fn session_durations(sessions: &[Session]) -> Vec<SessionDuration> {
    sessions
        .iter()
        .map(|s| SessionDuration {
            visit_id: s.visit_id.clone(),
            variation: s.variation,
            duration_secs: s.duration_secs,
        })
        .collect()
}

/// Backtrack share per variation, over events.
pub fn error_rates(events: &[DerivedEvent], sessions: &[Session]) -> Vec<ErrorRate> {
    Variation::ALL
        .iter()
        .map(|&variation| {
            let (total, backtracks) = events
                .iter()
                .filter(|e| e.variation() == variation)
                .fold((0u64, 0u64), |(t, b), e| (t + 1, b + u64::from(e.is_back_track)));
            let (visits, visits_with_backtrack) = sessions
                .iter()
                .filter(|s| s.variation == variation)
                .fold((0u64, 0u64), |(v, b), s| (v + 1, b + u64::from(s.has_backtrack())));
            ErrorRate {
                variation,
                events: total,
                backtrack_events: backtracks,
                rate: (total > 0).then(|| backtracks as f64 / total as f64),
                sessions: visits,
                sessions_with_backtrack: visits_with_backtrack,
            }
        })
        .collect()
}

/// Share of `confirm` events per client of one variation, as a percentage.
pub fn client_completion(events: &[DerivedEvent], variation: Variation) -> Vec<ClientCompletion> {
    let mut per_client: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for event in events.iter().filter(|e| e.variation() == variation) {
        let entry = per_client.entry(event.client_id()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += u64::from(event.process_step().is_confirm());
    }

    per_client
        .into_iter()
        .map(|(client_id, (total, confirms))| ClientCompletion {
            client_id: client_id.to_string(),
            events: total,
            confirm_events: confirms,
            completion_rate: confirms as f64 / total as f64 * 100.0,
        })
        .collect()
}

/// Computes every metric table.
pub fn compute_metrics(events: &[DerivedEvent], sessions: &[Session]) -> MetricTables {
    let samples = step_samples(events);
    let completion = completion_rates(sessions);
    let step_durations = step_duration_table(&samples);
    let session_durations = session_durations(sessions);
    let error_rates = error_rates(events, sessions);

    let summaries = Variation::ALL
        .iter()
        .map(|&variation| {
            let completion = completion.iter().find(|c| c.variation == variation);
            let errors = error_rates.iter().find(|e| e.variation == variation);
            let durations: Vec<f64> = session_durations
                .iter()
                .filter(|d| d.variation == variation)
                .map(|d| d.duration_secs)
                .collect();
            MetricSummary {
                variation,
                total_sessions: completion.map_or(0, |c| c.total_visits),
                completed_sessions: completion.map_or(0, |c| c.completed_visits),
                completion_rate: completion.and_then(|c| c.completion_rate),
                mean_step_duration: step_durations
                    .iter()
                    .filter(|d| d.variation == Some(variation))
                    .map(|d| (d.step, d.mean_secs))
                    .collect(),
                mean_session_duration: mean(&durations),
                error_rate: errors.and_then(|e| e.rate),
                event_count: errors.map_or(0, |e| e.events),
                backtrack_event_count: errors.map_or(0, |e| e.backtrack_events),
            }
        })
        .collect();

    MetricTables {
        completion,
        step_durations,
        overall_step_durations: overall_step_durations(events),
        session_durations,
        error_rates,
        client_completion: client_completion(events, Variation::Test),
        summaries,
        step_samples: samples,
    }
}
