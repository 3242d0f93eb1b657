//! Unified error types for the experiment analysis engine.
//!
//! Error codes:
//! - LOAD_001-002: Source loading errors
//! - MERGE_001: Join cardinality errors
//! - GROUP_001: Missing experiment group
//! - OUTPUT_001: Persistence errors

use thiserror::Error;

use crate::events::Variation;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Source loading error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorCode {
    /// LOAD_001: Source file could not be opened or read
    Unreadable,
    /// LOAD_002: Required column missing from the header row
    MissingColumn,
}

impl LoadErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unreadable => "LOAD_001",
            Self::MissingColumn => "LOAD_002",
        }
    }
}

/// Merge error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeErrorCode {
    /// MERGE_001: A key expected to be unique matched more than one row
    Cardinality,
}

impl MergeErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cardinality => "MERGE_001",
        }
    }
}

/// Unified error type for the experiment analysis engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Source loading error with code.
    #[error("[{code}] {message}")]
    Load { code: &'static str, message: String },

    /// Merge error with code.
    #[error("[{code}] {message}")]
    Merge { code: &'static str, message: String },

    /// A comparison needs both experiment groups and one of them is empty.
    #[error("[GROUP_001] variation group {0} has no sessions")]
    MissingGroup(Variation),

    /// Persisted output could not be written.
    #[error("[OUTPUT_001] {0}")]
    Output(String),

    #[error("unknown process step: {0}")]
    UnknownStep(String),

    #[error("invalid variation: {0}")]
    InvalidVariation(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a source loading error.
    pub fn load(code: LoadErrorCode, msg: impl Into<String>) -> Self {
        Self::Load {
            code: code.code(),
            message: msg.into(),
        }
    }

    /// Create a merge error.
    pub fn merge(code: MergeErrorCode, msg: impl Into<String>) -> Self {
        Self::Merge {
            code: code.code(),
            message: msg.into(),
        }
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self::Output(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the run must stop on this error.
    ///
    /// Row-level parse errors are recoverable: the offending row is counted
    /// and skipped by the caller.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UnknownStep(_)
                | Self::InvalidVariation(_)
                | Self::InvalidTimestamp(_)
                | Self::Validation(_)
        )
    }

    /// Get the error code if this is a coded error.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            Self::Load { code, .. } => Some(code),
            Self::Merge { code, .. } => Some(code),
            Self::MissingGroup(_) => Some("GROUP_001"),
            Self::Output(_) => Some("OUTPUT_001"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coded_errors_render_code() {
        let err = Error::load(LoadErrorCode::MissingColumn, "visit_id");
        assert_eq!(err.to_string(), "[LOAD_002] visit_id");
        assert_eq!(err.error_code(), Some("LOAD_002"));

        let err = Error::MissingGroup(Variation::Test);
        assert_eq!(err.to_string(), "[GROUP_001] variation group Test has no sessions");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_row_level_errors_are_recoverable() {
        assert!(!Error::UnknownStep("step_9".into()).is_fatal());
        assert!(!Error::InvalidTimestamp("yesterday".into()).is_fatal());
        assert!(Error::merge(MergeErrorCode::Cardinality, "dup").is_fatal());
    }
}
