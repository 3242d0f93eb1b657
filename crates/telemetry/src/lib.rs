//! Internal telemetry for the experiment analysis engine.
//!
//! Structured logging through `tracing`, plus in-process counters that
//! summarize each run's data quality and stage timings.

pub mod metrics;
pub mod tracing_setup;

pub use metrics::*;
pub use tracing_setup::*;
