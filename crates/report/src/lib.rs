//! Report output for the experiment analysis engine.
//!
//! Computation hands back plain tables; this crate turns a pipeline run into
//! tables and figure descriptions and passes them to a [`ReportSink`].
//! Two sinks ship here: aligned plain text and a JSON document.

pub mod json;
pub mod render;
pub mod sink;
pub mod text;

pub use json::JsonSink;
pub use render::render_report;
pub use sink::*;
pub use text::TextSink;
