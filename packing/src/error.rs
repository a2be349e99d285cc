//! Packing error types
//!
//! Only configuration problems and internal invariant violations surface as
//! errors. Per-file and per-group write problems are recorded in the report.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for packing operations
pub type PackResult<T> = Result<T, PackError>;

/// Invariants the grouping engine guarantees for every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invariant {
    /// Every input file lands in exactly one group.
    Conservation,
    /// Group count never exceeds `max_groups`.
    GroupCap,
    /// No group is emitted without member files.
    NonEmpty,
    /// Group names are unique within a run.
    UniqueNames,
}

impl std::fmt::Display for Invariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Conservation => write!(f, "conservation"),
            Self::GroupCap => write!(f, "group_cap"),
            Self::NonEmpty => write!(f, "non_empty"),
            Self::UniqueNames => write!(f, "unique_names"),
        }
    }
}

/// Errors that can occur during packing
#[derive(Error, Debug)]
pub enum PackError {
    /// Configuration rejected before any work started
    #[error("Invalid configuration for `{field}`: {message}")]
    InvalidConfig { field: &'static str, message: String },

    /// Configuration file could not be parsed
    #[error("Failed to parse config {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    /// Source directory for discovery does not exist
    #[error("Source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    /// Internal logic error; never expected at runtime
    #[error("Invariant `{invariant}` violated: {detail}")]
    InvariantViolation { invariant: Invariant, detail: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PackError {
    pub(crate) fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            message: message.into(),
        }
    }

    pub(crate) fn violation(invariant: Invariant, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            invariant,
            detail: detail.into(),
        }
    }

    /// Whether this error indicates a bug rather than bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PackError::invalid("max_groups", "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for `max_groups`: must be at least 1"
        );
        assert!(!err.is_internal());

        let err = PackError::violation(Invariant::GroupCap, "11 groups > 10");
        assert_eq!(err.to_string(), "Invariant `group_cap` violated: 11 groups > 10");
        assert!(err.is_internal());
    }
}
