//! Analysis stages of the experiment engine.
//!
//! Turns the merged dataset into results:
//! - Session reconstruction (per-visit ordering, step ranks, time spent)
//! - Metric pipeline (completion, durations, error rates, per-client completion)
//! - Statistical comparator (one hypothesis test per metric)
//! - Demographic profiles of the two groups
//! - The pipeline function tying the stages together

pub mod comparator;
pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod profile;
pub mod sessions;
pub mod stats;

pub use comparator::*;
pub use config::AnalysisConfig;
pub use metrics::*;
pub use pipeline::*;
pub use profile::*;
pub use sessions::*;
pub use stats::{Alternative, Significance, TestResult};
