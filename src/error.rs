//! Error types for pkgtrend
//!
//! Only conditions outside the aggregation core are errors. Per-package
//! problems (missing history, bad version labels, schema mismatches) are
//! recorded as [`Exclusion`] values and never abort a run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can abort a run
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Invalid package catalog: {0}")]
    CatalogError(String),

    #[error("Malformed table {path}: {reason}")]
    MalformedTable { path: PathBuf, reason: String },
}

impl AggregateError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AggregateError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        AggregateError::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AggregateError::MalformedTable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Why a package was left out of one or all metric matrices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Exclusion {
    /// History missing or unreadable; excluded from every matrix
    SourceUnavailable { package: String, reason: String },

    /// Version labels could not be ordered; excluded from every matrix
    AlignmentFailure { package: String, reason: String },

    /// Metric column absent or row count rejected by the row policy;
    /// excluded from this metric's matrix only
    SchemaMismatch {
        package: String,
        metric: String,
        reason: String,
    },
}

impl Exclusion {
    pub fn package(&self) -> &str {
        match self {
            Exclusion::SourceUnavailable { package, .. }
            | Exclusion::AlignmentFailure { package, .. }
            | Exclusion::SchemaMismatch { package, .. } => package,
        }
    }

    /// Metric scope, `None` when the package is excluded everywhere
    pub fn metric(&self) -> Option<&str> {
        match self {
            Exclusion::SchemaMismatch { metric, .. } => Some(metric),
            _ => None,
        }
    }
}
