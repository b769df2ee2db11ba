//! Version alignment
//!
//! Puts a package's raw rows into release order. Any row with a missing or
//! unparseable version label rejects the whole package: a history that cannot
//! be ordered cannot be compared slot-by-slot with other packages.

use crate::types::{OrderedRows, RawValue, RawVersionSeries, VERSION_COLUMN};
use crate::version::VersionKey;
use thiserror::Error;

/// Reasons a package's history cannot be aligned
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignmentFailure {
    #[error("missing 'version' column")]
    MissingVersionColumn,

    #[error("row {row} has no version label")]
    EmptyVersion { row: usize },

    #[error("row {row}: {source}")]
    InvalidVersion {
        row: usize,
        #[source]
        source: crate::version::VersionParseError,
    },
}

/// Orders raw version rows by [`VersionKey`]
pub struct VersionAligner;

impl VersionAligner {
    /// Sort rows ascending by version. Equal versions keep their input order.
    pub fn align(raw: RawVersionSeries) -> Result<OrderedRows, AlignmentFailure> {
        let version_idx = raw
            .column_index(VERSION_COLUMN)
            .ok_or(AlignmentFailure::MissingVersionColumn)?;

        let (columns, rows) = raw.into_parts();

        let mut keyed = Vec::with_capacity(rows.len());
        for (row_num, row) in rows.into_iter().enumerate() {
            let key = version_key(&row[version_idx], row_num)?;
            keyed.push((key, row));
        }

        keyed.sort_by(|(a, _), (b, _)| a.cmp(b));

        let sorted = RawVersionSeries::from_rows(columns, keyed.into_iter().map(|(_, row)| row));
        Ok(OrderedRows::new(sorted))
    }
}

fn version_key(value: &RawValue, row: usize) -> Result<VersionKey, AlignmentFailure> {
    let label = value
        .as_label()
        .filter(|l| !l.trim().is_empty())
        .ok_or(AlignmentFailure::EmptyVersion { row })?;
    VersionKey::parse(&label).map_err(|source| AlignmentFailure::InvalidVersion { row, source })
}
