//! Analysis parameters.

use dataset::MergeOptions;
use experiment_core::limits::{
    DEFAULT_AGE_HISTOGRAM_BINS, DEFAULT_ALPHA, DEFAULT_COST_EFFECTIVENESS_THRESHOLD,
    DEFAULT_DISTRIBUTION_HISTOGRAM_BINS, DEFAULT_YATES_CORRECTION, NEW_CLIENT_MAX_TENURE_MONTHS,
};
use experiment_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parameters of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Significance level for every test
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Per-client completion rate (%) the test group must reach
    #[serde(default = "default_cost_effectiveness_threshold")]
    pub cost_effectiveness_threshold: f64,
    #[serde(default = "default_new_client_max_tenure_months")]
    pub new_client_max_tenure_months: f64,
    #[serde(default = "default_age_histogram_bins")]
    pub age_histogram_bins: usize,
    /// Bins of the client-base tenure, age and logon histograms
    #[serde(default = "default_distribution_histogram_bins")]
    pub distribution_histogram_bins: usize,
    /// Continuity correction for the 2x2 backtrack table
    #[serde(default = "default_yates_correction")]
    pub yates_correction: bool,
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_cost_effectiveness_threshold() -> f64 {
    DEFAULT_COST_EFFECTIVENESS_THRESHOLD
}

fn default_new_client_max_tenure_months() -> f64 {
    NEW_CLIENT_MAX_TENURE_MONTHS
}

fn default_age_histogram_bins() -> usize {
    DEFAULT_AGE_HISTOGRAM_BINS
}

fn default_distribution_histogram_bins() -> usize {
    DEFAULT_DISTRIBUTION_HISTOGRAM_BINS
}

fn default_yates_correction() -> bool {
    DEFAULT_YATES_CORRECTION
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            cost_effectiveness_threshold: default_cost_effectiveness_threshold(),
            new_client_max_tenure_months: default_new_client_max_tenure_months(),
            age_histogram_bins: default_age_histogram_bins(),
            distribution_histogram_bins: default_distribution_histogram_bins(),
            yates_correction: default_yates_correction(),
        }
    }
}

impl AnalysisConfig {
    /// Rejects parameters no test can run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::config(format!("alpha must be in (0, 1), got {}", self.alpha)));
        }
        if self.age_histogram_bins == 0 {
            return Err(Error::config("age_histogram_bins must be at least 1"));
        }
        if self.distribution_histogram_bins == 0 {
            return Err(Error::config("distribution_histogram_bins must be at least 1"));
        }
        if !self.new_client_max_tenure_months.is_finite() {
            return Err(Error::config("new_client_max_tenure_months must be finite"));
        }
        Ok(())
    }

    /// Options for the merge & clean stage.
    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            new_client_max_tenure_months: self.new_client_max_tenure_months,
        }
    }
}
