//! Analysis defaults and data formats.
//!
//! Range bounds on source rows live on the `#[validate]` attributes of
//! [`crate::Demographics`], since the derive macro requires literals.

// === Statistical Defaults ===

/// Significance level used when none is configured.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Minimum per-client completion rate (%) for the redesign to pay off.
pub const DEFAULT_COST_EFFECTIVENESS_THRESHOLD: f64 = 5.0;

/// Apply Yates' continuity correction to 2x2 chi-square tables.
pub const DEFAULT_YATES_CORRECTION: bool = true;

// === Segmentation ===

/// Clients at or below this total tenure count as `New`.
pub const NEW_CLIENT_MAX_TENURE_MONTHS: f64 = 24.0;

/// Bins per age histogram.
pub const DEFAULT_AGE_HISTOGRAM_BINS: usize = 15;

/// Bins per histogram of the whole client base.
pub const DEFAULT_DISTRIBUTION_HISTOGRAM_BINS: usize = 30;

// === Formats ===

/// Timestamp layout of the web logs.
pub const WEB_LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
