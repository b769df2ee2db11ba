//! Outlier filtering
//!
//! Applies the boxplot rule independently to every version column and drops
//! any package row with a value outside `[Q1 - 1.5*IQR, Q3 + 1.5*IQR]` in at
//! least one column.
//!
//! Quartiles use linear interpolation between order statistics: for `n`
//! sorted values and probability `p`, `h = (n - 1) * p` and
//! `Q = x[floor(h)] + (h - floor(h)) * (x[floor(h) + 1] - x[floor(h)])`.

use crate::types::{MatrixRow, MetricMatrix};
use crate::MAX_VERSIONS;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::info;

/// IQR multiplier for the fences
pub const IQR_FENCE: f64 = 1.5;

/// Quantile of `values` with linear interpolation; `None` for an empty slice
pub fn quantile(values: &[f64], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

    let p = p.clamp(0.0, 1.0);
    let h = p * (sorted.len() - 1) as f64;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    if lo == hi {
        Some(sorted[lo])
    } else {
        let t = h - lo as f64;
        Some(sorted[lo] + t * (sorted[hi] - sorted[lo]))
    }
}

/// Accepted range for one version column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnBounds {
    pub q1: f64,
    pub q3: f64,
    pub low: f64,
    pub high: f64,
}

impl ColumnBounds {
    /// Fences from the present values of a column, `None` if it has none
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let q1 = quantile(values, 0.25)?;
        let q3 = quantile(values, 0.75)?;
        let iqr = q3 - q1;
        Some(Self {
            q1,
            q3,
            low: q1 - IQR_FENCE * iqr,
            high: q3 + IQR_FENCE * iqr,
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// Per-column bounds; a column without present values imposes no bound
pub type MatrixBounds = [Option<ColumnBounds>; MAX_VERSIONS];

/// A matrix after outlier removal, with the bounds that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredMetricMatrix {
    pub matrix: MetricMatrix,
    pub bounds: MatrixBounds,
    /// Rows in the input matrix
    pub total: usize,
    /// Out-of-bounds cells per version column
    pub outliers_per_version: [usize; MAX_VERSIONS],
}

impl FilteredMetricMatrix {
    pub fn kept(&self) -> usize {
        self.matrix.len()
    }

    pub fn removed(&self) -> usize {
        self.total - self.matrix.len()
    }
}

/// IQR-based outlier filter
pub struct OutlierFilter;

impl OutlierFilter {
    /// Compute bounds for every version column of `matrix`
    pub fn bounds(matrix: &MetricMatrix) -> MatrixBounds {
        let mut bounds: MatrixBounds = [None; MAX_VERSIONS];
        for (idx, column_bounds) in bounds.iter_mut().enumerate() {
            let values: Vec<f64> = matrix.column(idx).flatten().collect();
            *column_bounds = ColumnBounds::from_values(&values);
        }
        bounds
    }

    /// Filter `matrix` with bounds computed once from `matrix` itself
    pub fn filter(matrix: &MetricMatrix) -> FilteredMetricMatrix {
        let bounds = Self::bounds(matrix);
        let filtered = Self::filter_with_bounds(matrix, &bounds);

        info!(
            metric = matrix.metric(),
            removed = filtered.removed(),
            total = filtered.total,
            kept = filtered.kept(),
            "outlier filter applied"
        );
        info!(
            metric = matrix.metric(),
            outliers_per_version = ?filtered.outliers_per_version,
            "outliers per version"
        );

        filtered
    }

    /// Filter `matrix` with fixed bounds. Re-applying the same bounds to the
    /// output removes nothing further.
    pub fn filter_with_bounds(matrix: &MetricMatrix, bounds: &MatrixBounds) -> FilteredMetricMatrix {
        let mut outliers_per_version = [0usize; MAX_VERSIONS];

        for row in matrix.rows() {
            for (idx, count) in outliers_per_version.iter_mut().enumerate() {
                if !slot_in_bounds(row.slots[idx], bounds[idx]) {
                    *count += 1;
                }
            }
        }

        let kept = matrix.retain_rows(|row| row_in_bounds(row, bounds));

        FilteredMetricMatrix {
            matrix: kept,
            bounds: *bounds,
            total: matrix.len(),
            outliers_per_version,
        }
    }
}

fn slot_in_bounds(slot: Option<f64>, bounds: Option<ColumnBounds>) -> bool {
    match (slot, bounds) {
        (Some(value), Some(bounds)) => bounds.contains(value),
        _ => true,
    }
}

fn row_in_bounds(row: &MatrixRow, bounds: &MatrixBounds) -> bool {
    row.slots
        .iter()
        .zip(bounds.iter())
        .all(|(slot, column)| slot_in_bounds(*slot, *column))
}
