//! Aggregate statistics
//!
//! Reduces a metric matrix to one summary row per mode. Cells with no
//! contributing values are `None` rather than zero, except presence counts
//! which are always defined.

use crate::types::{metric_stem, MetricMatrix, Slots, SummaryMode, SummaryRow, SummaryTable};
use crate::MAX_VERSIONS;

/// Summary statistics calculator
pub struct Summarizer;

impl Summarizer {
    /// Summarize every version column of `matrix` under `mode`.
    ///
    /// The row is labelled with the metric's file stem.
    pub fn summarize(matrix: &MetricMatrix, mode: SummaryMode) -> SummaryRow {
        let mut cells: Slots = [None; MAX_VERSIONS];
        for (idx, cell) in cells.iter_mut().enumerate() {
            let column = matrix.column(idx).flatten();
            *cell = match mode {
                SummaryMode::PlainMean => mean(column),
                SummaryMode::PresenceCount => Some(column.filter(|v| *v > 0.0).count() as f64),
                SummaryMode::PresenceMean => mean(column.filter(|v| *v > 0.0)),
            };
        }

        SummaryRow {
            metric: metric_stem(matrix.metric()),
            cells,
        }
    }

    /// Append `matrix`'s summary to `table` under the table's mode
    pub fn append(table: &mut SummaryTable, matrix: &MetricMatrix) {
        table.push(Self::summarize(matrix, table.mode()));
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        return None;
    }
    Some(sum / count as f64)
}
