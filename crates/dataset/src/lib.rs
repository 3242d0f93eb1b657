//! Dataset loading, merging, and persistence.
//!
//! Handles the data-side stages of a run:
//! - Loader (delimited source files → parsed rows)
//! - Merge & clean (demographics ⟕ web events ⋈ assignments)
//! - Data-quality accounting
//! - Writer (merged dataset → flat file)

pub mod config;
pub mod loader;
pub mod merge;
pub mod quality;
pub mod writer;

pub use config::DatasetConfig;
pub use loader::*;
pub use merge::*;
pub use quality::*;
pub use writer::*;
