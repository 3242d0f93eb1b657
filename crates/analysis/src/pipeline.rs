//! The pipeline: client-base profile → merge & clean → sessions → metrics →
//! comparisons → group profiles.

use std::time::Instant;

use dataset::{merge_and_clean, output_rows, DataQualityReport, OutputRow, RawSources};
use experiment_core::{DerivedEvent, MergedRecord, Result, Session};
use telemetry::metrics;
use tracing::info;

use crate::comparator::{ComparisonReport, StatisticalComparator};
use crate::config::AnalysisConfig;
use crate::metrics::{compute_metrics, MetricTables};
use crate::profile::{profile_dataset, profile_groups, DatasetProfile, DemographicProfiles};
use crate::sessions::{reconstruct, sessions};

/// Everything one run produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Merged dataset, in merge order
    pub records: Vec<MergedRecord>,
    /// Sorted by (visit_id, date_time)
    pub events: Vec<DerivedEvent>,
    pub sessions: Vec<Session>,
    pub metrics: MetricTables,
    pub comparisons: ComparisonReport,
    /// Whole demographics table, as loaded
    pub dataset_profile: DatasetProfile,
    pub profiles: DemographicProfiles,
    pub quality: DataQualityReport,
}

impl PipelineOutput {
    /// Rows of the persisted dataset: each merged record with its derived
    /// columns, in merge order.
    pub fn output_rows(&self) -> Vec<OutputRow<'_>> {
        output_rows(&self.records, &self.events)
    }
}

/// Runs every analysis stage over already-loaded sources.
pub fn run_pipeline(sources: RawSources, config: &AnalysisConfig) -> Result<PipelineOutput> {
    config.validate()?;
    let started = Instant::now();

    let dataset_profile = profile_dataset(&sources.demographics, config.distribution_histogram_bins);
    let merged = merge_and_clean(sources, &config.merge_options())?;
    let mut quality = merged.quality;
    let records = merged.records;

    let reconstruction = reconstruct(&records);
    quality.records_without_activity += reconstruction.records_without_activity;
    quality.negative_durations += reconstruction.negative_durations;
    let events = reconstruction.events;
    let sessions = sessions(&events);

    let tables = compute_metrics(&events, &sessions);
    let comparisons = StatisticalComparator::new(config).compare_all(&tables)?;
    let profiles = profile_groups(&records, config.age_histogram_bins);

    let m = metrics();
    m.statistical_tests_run.inc_by(comparisons.outcomes().len() as u64);
    m.statistical_tests_undetermined.inc_by(comparisons.undetermined_count() as u64);
    m.analysis_latency_ms.observe_since(started);
    info!(
        records = records.len(),
        events = events.len(),
        sessions = sessions.len(),
        "Pipeline complete"
    );

    Ok(PipelineOutput {
        records,
        events,
        sessions,
        metrics: tables,
        comparisons,
        dataset_profile,
        profiles,
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use experiment_core::{
        Assignment, Demographics, ProcessStep, Variation, WebActivity, WebEvent,
    };

    fn demo(client_id: &str, age: f64) -> Demographics {
        Demographics {
            client_id: client_id.into(),
            clnt_tenure_yr: Some(3.0),
            clnt_tenure_mnth: Some(40.0),
            clnt_age: Some(age),
            gendr: Some("M".into()),
            num_accts: Some(2.0),
            bal: Some(5000.0),
            calls_6_mnth: Some(0.0),
            logons_6_mnth: Some(3.0),
        }
    }

    fn web(client_id: &str, visit_id: &str, step: ProcessStep, offset: i64) -> WebEvent {
        WebEvent {
            client_id: client_id.into(),
            activity: WebActivity {
                visit_visitor_id: None,
                visit_id: visit_id.into(),
                process_step: step,
                date_time: NaiveDate::from_ymd_opt(2017, 4, 3)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap()
                    + Duration::seconds(offset),
            },
        }
    }

    fn sources() -> RawSources {
        use ProcessStep::*;
        RawSources::new(
            vec![demo("1", 30.0), demo("2", 45.0), demo("3", 60.0), demo("4", 52.0)],
            vec![
                web("1", "v1", Step1, 5),
                web("1", "v1", Start, 0),
                web("1", "v1", Confirm, 30),
                web("2", "v2", Start, 0),
                web("2", "v2", Step1, 12),
                web("2", "v2", Start, 20),
                web("3", "v3", Start, 0),
                web("3", "v3", Confirm, 40),
            ],
            vec![
                Assignment { client_id: "1".into(), variation: Some(Variation::Test) },
                Assignment { client_id: "2".into(), variation: Some(Variation::Control) },
                Assignment { client_id: "3".into(), variation: Some(Variation::Control) },
                Assignment { client_id: "4".into(), variation: Some(Variation::Test) },
            ],
        )
    }

    #[test]
    fn test_run_pipeline() {
        let output = run_pipeline(sources(), &AnalysisConfig::default()).unwrap();

        // 8 events plus one record for client 4 without activity
        assert_eq!(output.records.len(), 9);
        assert_eq!(output.events.len(), 8);
        assert_eq!(output.sessions.len(), 3);
        assert_eq!(output.quality.records_without_activity, 1);

        let control = output.metrics.completion_for(Variation::Control).unwrap();
        assert_eq!(control.completion_rate, Some(50.0));
        assert_eq!(output.comparisons.completion.observed_increase, Some(50.0));
        assert_eq!(output.profiles.group(Variation::Test).unwrap().clients, 2);
        assert_eq!(output.dataset_profile.clients, 4);
        assert_eq!(output.dataset_profile.account_counts.len(), 1);
    }

    #[test]
    fn test_output_rows_follow_merge_order() {
        let output = run_pipeline(sources(), &AnalysisConfig::default()).unwrap();
        let rows = output.output_rows();

        assert_eq!(rows.len(), output.records.len());
        // First merged record is client 1's step_1 hit, 5s after start
        let first = rows[0].derived.unwrap();
        assert_eq!(first.process_step(), ProcessStep::Step1);
        assert_eq!(first.time_spent, 5.0);
        assert!(rows.last().unwrap().derived.is_none());
    }

    #[test]
    fn test_pipeline_counts_statistical_tests() {
        let before = metrics().statistical_tests_run.get();
        let output = run_pipeline(sources(), &AnalysisConfig::default()).unwrap();
        let after = metrics().statistical_tests_run.get();
        assert!(after >= before + output.comparisons.outcomes().len() as u64);
    }

    #[test]
    fn test_pipeline_is_deterministic() {
        let a = run_pipeline(sources(), &AnalysisConfig::default()).unwrap();
        let b = run_pipeline(sources(), &AnalysisConfig::default()).unwrap();
        assert_eq!(a.comparisons, b.comparisons);
        assert_eq!(a.events, b.events);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = AnalysisConfig {
            age_histogram_bins: 0,
            ..AnalysisConfig::default()
        };
        assert!(run_pipeline(sources(), &config).is_err());
    }
}
