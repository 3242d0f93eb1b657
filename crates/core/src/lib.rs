//! Core types, schemas, and validation for the experiment analysis engine.

pub mod error;
pub mod events;
pub mod limits;
pub mod records;
pub mod schema;
pub mod session;

pub use error::{Error, Result};
pub use events::*;
pub use records::*;
pub use session::*;
