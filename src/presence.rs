//! Presence subset selection
//!
//! Narrows a matrix to packages that ever show a signal, so presence
//! statistics describe "of the packages exhibiting this metric".

use crate::types::MetricMatrix;

/// Keeps packages with at least one strictly positive value
pub struct PresenceSelector;

impl PresenceSelector {
    pub fn select(matrix: &MetricMatrix) -> MetricMatrix {
        matrix.retain_rows(|row| row.has_presence())
    }
}
