//! Statistical comparator: one hypothesis test per metric.

use experiment_core::{ProcessStep, Result, Variation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::metrics::{CompletionComparison, MetricTables};
use crate::stats::{self, Alternative, Significance, TestResult};

/// Statistic, p-value and verdict of one test; both numbers are `None` when
/// the test was undefined for the samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    pub significance: Significance,
}

impl TestOutcome {
    pub fn from_result(result: Option<TestResult>, alpha: f64) -> Self {
        Self {
            statistic: result.map(|r| r.statistic),
            p_value: result.map(|r| r.p_value),
            significance: Significance::classify(result.map(|r| r.p_value), alpha),
        }
    }

    pub fn is_significant(&self) -> bool {
        self.significance == Significance::Significant
    }
}

/// Completion rate, two-proportion z-test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionTest {
    pub control_rate: Option<f64>,
    pub test_rate: Option<f64>,
    /// Test minus control, percentage points
    pub observed_increase: Option<f64>,
    pub outcome: TestOutcome,
}

/// One step's mean duration, Welch's t-test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepComparison {
    pub step: ProcessStep,
    pub control_mean: Option<f64>,
    pub test_mean: Option<f64>,
    pub outcome: TestOutcome,
}

/// Visit duration, pooled t-test of "test longer than control".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionDurationTest {
    pub control_mean: Option<f64>,
    pub test_mean: Option<f64>,
    pub outcome: TestOutcome,
}

/// Backtrack rate, chi-square test of independence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRateTest {
    pub control_rate: Option<f64>,
    pub test_rate: Option<f64>,
    pub dof: Option<usize>,
    pub yates_correction: bool,
    pub outcome: TestOutcome,
}

/// Per-client completion of the test group against a threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEffectiveness {
    pub clients: usize,
    pub mean_completion: Option<f64>,
    pub threshold: f64,
    /// Test minus control completion rate, percentage points
    pub observed_increase: Option<f64>,
    pub outcome: TestOutcome,
    /// Mean at or above threshold and significant
    pub cost_effective: bool,
}

/// Results of every comparison of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub alpha: f64,
    pub completion: CompletionTest,
    pub step_durations: Vec<StepComparison>,
    pub session_duration: SessionDurationTest,
    pub error_rate: ErrorRateTest,
    pub cost_effectiveness: CostEffectiveness,
}

impl ComparisonReport {
    /// Every test outcome, completion first.
    pub fn outcomes(&self) -> Vec<&TestOutcome> {
        let mut outcomes = vec![&self.completion.outcome];
        outcomes.extend(self.step_durations.iter().map(|s| &s.outcome));
        outcomes.push(&self.session_duration.outcome);
        outcomes.push(&self.error_rate.outcome);
        outcomes.push(&self.cost_effectiveness.outcome);
        outcomes
    }

    pub fn undetermined_count(&self) -> usize {
        self.outcomes()
            .iter()
            .filter(|o| o.significance == Significance::Undetermined)
            .count()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Runs the hypothesis tests with a fixed alpha.
#[derive(Debug, Clone)]
pub struct StatisticalComparator {
    alpha: f64,
    yates_correction: bool,
    cost_effectiveness_threshold: f64,
}

impl StatisticalComparator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            alpha: config.alpha,
            yates_correction: config.yates_correction,
            cost_effectiveness_threshold: config.cost_effectiveness_threshold,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Two-sided pooled z-test on [control, test] confirm counts.
    pub fn compare_completion(&self, completion: &CompletionComparison) -> CompletionTest {
        let result = stats::two_proportion_ztest(
            [completion.control.completed_visits, completion.test.completed_visits],
            [completion.control.total_visits, completion.test.total_visits],
        );
        CompletionTest {
            control_rate: completion.control.completion_rate,
            test_rate: completion.test.completion_rate,
            observed_increase: completion.observed_increase(),
            outcome: TestOutcome::from_result(result, self.alpha),
        }
    }

    /// Welch's t-test per canonical step, control vs test.
    pub fn compare_step_durations(&self, tables: &MetricTables) -> Vec<StepComparison> {
        ProcessStep::ORDERED
            .iter()
            .map(|&step| {
                let control = tables.step_samples(Variation::Control, step);
                let test = tables.step_samples(Variation::Test, step);
                let result = stats::welch_ttest(control, test, Alternative::TwoSided);
                if result.is_none() {
                    debug!(step = %step, control = control.len(), test = test.len(), "Step comparison undetermined");
                }
                StepComparison {
                    step,
                    control_mean: mean(control),
                    test_mean: mean(test),
                    outcome: TestOutcome::from_result(result, self.alpha),
                }
            })
            .collect()
    }

    /// One-sided pooled t-test, sample order (test, control).
    pub fn compare_session_duration(&self, tables: &MetricTables) -> SessionDurationTest {
        let control = tables.session_duration_samples(Variation::Control);
        let test = tables.session_duration_samples(Variation::Test);
        let result = stats::student_ttest(&test, &control, Alternative::Greater);
        SessionDurationTest {
            control_mean: mean(&control),
            test_mean: mean(&test),
            outcome: TestOutcome::from_result(result, self.alpha),
        }
    }

    /// Chi-square on the Variation x is_back_track event table.
    pub fn compare_error_rates(&self, tables: &MetricTables) -> ErrorRateTest {
        let row = |variation: Variation| {
            let rate = tables.error_rate_for(variation);
            let events = rate.map_or(0, |r| r.events);
            let backtracks = rate.map_or(0, |r| r.backtrack_events);
            vec![events - backtracks, backtracks]
        };
        let table = vec![row(Variation::Control), row(Variation::Test)];
        let result = stats::chi_square_independence(&table, self.yates_correction);

        ErrorRateTest {
            control_rate: tables.error_rate_for(Variation::Control).and_then(|r| r.rate),
            test_rate: tables.error_rate_for(Variation::Test).and_then(|r| r.rate),
            dof: result.as_ref().map(|r| r.dof),
            yates_correction: self.yates_correction,
            outcome: TestOutcome::from_result(result.map(|r| r.as_test_result()), self.alpha),
        }
    }

    /// One-sample t-test of test-group per-client completion against the
    /// threshold.
    pub fn compare_cost_effectiveness(&self, tables: &MetricTables) -> CostEffectiveness {
        let samples = tables.client_completion_samples();
        let threshold = self.cost_effectiveness_threshold;
        let result = stats::one_sample_ttest(&samples, threshold);
        let outcome = TestOutcome::from_result(result, self.alpha);
        let mean_completion = mean(&samples);

        CostEffectiveness {
            clients: samples.len(),
            mean_completion,
            threshold,
            observed_increase: tables.observed_increase(),
            cost_effective: outcome.is_significant() && mean_completion.is_some_and(|m| m >= threshold),
            outcome,
        }
    }

    /// Runs every comparison; fails when either group has no visits.
    pub fn compare_all(&self, tables: &MetricTables) -> Result<ComparisonReport> {
        let completion = self.compare_completion(&tables.completion_comparison()?);
        let report = ComparisonReport {
            alpha: self.alpha,
            completion,
            step_durations: self.compare_step_durations(tables),
            session_duration: self.compare_session_duration(tables),
            error_rate: self.compare_error_rates(tables),
            cost_effectiveness: self.compare_cost_effectiveness(tables),
        };

        info!(
            completion = %report.completion.outcome.significance,
            session_duration = %report.session_duration.outcome.significance,
            error_rate = %report.error_rate.outcome.significance,
            cost_effective = report.cost_effectiveness.cost_effective,
            "Comparisons complete"
        );
        Ok(report)
    }
}

impl Default for StatisticalComparator {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}
