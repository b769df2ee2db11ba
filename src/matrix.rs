//! Metric matrix construction
//!
//! Projects one metric column of every aligned package history into a fixed
//! row of [`MAX_VERSIONS`] slots, producing a package x version matrix.

use crate::error::Exclusion;
use crate::types::{MatrixRow, MetricMatrix, OrderedRows, RawValue, Slots};
use crate::MAX_VERSIONS;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// How histories that are not exactly [`MAX_VERSIONS`] long are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Require exactly `MAX_VERSIONS` rows, otherwise skip the package
    #[default]
    Strict,
    /// Keep the first `MAX_VERSIONS` rows and leave trailing slots missing
    Pad,
}

impl RowPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowPolicy::Strict => "strict",
            RowPolicy::Pad => "pad",
        }
    }
}

/// A package whose table does not fit a metric's matrix
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaMismatch {
    #[error("metric column '{0}' is absent")]
    MissingColumn(String),

    #[error("expected exactly {expected} versions, found {actual}")]
    RowCount { expected: usize, actual: usize },
}

/// Coerce a raw cell to a slot value.
///
/// Empty cells, NaN and the `nan` token become `fill_value`. Numeric text is
/// parsed, `true`/`false` map to 1/0, any other text is missing.
pub fn coerce(value: &RawValue, fill_value: f64) -> Option<f64> {
    match value {
        RawValue::Empty => Some(fill_value),
        RawValue::Number(n) if n.is_nan() => Some(fill_value),
        RawValue::Number(n) => Some(*n),
        RawValue::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
                return Some(fill_value);
            }
            if trimmed.eq_ignore_ascii_case("true") {
                return Some(1.0);
            }
            if trimmed.eq_ignore_ascii_case("false") {
                return Some(0.0);
            }
            match trimmed.parse::<f64>() {
                Ok(n) if n.is_nan() => Some(fill_value),
                Ok(n) => Some(n),
                Err(_) => None,
            }
        }
    }
}

/// Result of building one metric's matrix
#[derive(Debug, Clone)]
pub struct MatrixBuild {
    pub matrix: MetricMatrix,
    /// Packages left out of this metric only
    pub exclusions: Vec<Exclusion>,
}

/// Builds per-metric matrices from aligned package histories
#[derive(Debug, Clone, Copy)]
pub struct MatrixBuilder {
    policy: RowPolicy,
    fill_value: f64,
}

impl Default for MatrixBuilder {
    fn default() -> Self {
        Self::new(RowPolicy::default(), 0.0)
    }
}

impl MatrixBuilder {
    pub fn new(policy: RowPolicy, fill_value: f64) -> Self {
        Self { policy, fill_value }
    }

    pub fn policy(&self) -> RowPolicy {
        self.policy
    }

    /// Project one package's history onto the version slots for `metric`
    pub fn project(&self, metric: &str, rows: &OrderedRows) -> Result<Slots, SchemaMismatch> {
        let column = rows
            .column(metric)
            .ok_or_else(|| SchemaMismatch::MissingColumn(metric.to_string()))?;

        if self.policy == RowPolicy::Strict && rows.len() != MAX_VERSIONS {
            return Err(SchemaMismatch::RowCount {
                expected: MAX_VERSIONS,
                actual: rows.len(),
            });
        }

        let mut slots: Slots = [None; MAX_VERSIONS];
        for (slot, value) in slots.iter_mut().zip(column) {
            *slot = coerce(value, self.fill_value);
        }
        Ok(slots)
    }

    /// Build the matrix for `metric` in catalog order.
    ///
    /// Packages absent from `series_by_pkg` were already excluded upstream and
    /// are skipped silently. Repeated catalog entries contribute one row.
    pub fn build(
        &self,
        metric: &str,
        catalog: &[String],
        series_by_pkg: &HashMap<String, OrderedRows>,
    ) -> MatrixBuild {
        let mut matrix = MetricMatrix::new(metric);
        let mut exclusions = Vec::new();

        for package in catalog {
            if matrix.contains(package) {
                continue;
            }
            let Some(rows) = series_by_pkg.get(package) else {
                continue;
            };

            match self.project(metric, rows) {
                Ok(slots) => {
                    matrix.push(MatrixRow::new(package.clone(), slots));
                }
                Err(mismatch) => {
                    debug!(package = %package, metric, reason = %mismatch, "package skipped for metric");
                    exclusions.push(Exclusion::SchemaMismatch {
                        package: package.clone(),
                        metric: metric.to_string(),
                        reason: mismatch.to_string(),
                    });
                }
            }
        }

        MatrixBuild { matrix, exclusions }
    }
}
