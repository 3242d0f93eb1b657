//! Shared helpers for the cross-crate tests.

pub mod fixtures;
pub mod setup;
