//! Core types for the pkgtrend aggregation engine
//!
//! This module defines the data structures that flow through each stage:
//! raw per-package series, aligned rows, per-metric matrices and summary rows.

use crate::MAX_VERSIONS;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Name of the column holding the version label in a raw series
pub const VERSION_COLUMN: &str = "version";

/// One version slot per column, `None` marks a missing value
pub type Slots = [Option<f64>; MAX_VERSIONS];

/// Header label of a version slot column (1-based)
pub fn version_column_name(index: usize) -> String {
    format!("version_{}", index + 1)
}

/// File stem and summary label for a metric (`generic.total_files` -> `generic_total_files`)
pub fn metric_stem(metric: &str) -> String {
    metric.replace('.', "_")
}

/// A scalar cell from a package's raw metrics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Empty,
}

impl RawValue {
    /// Classify a raw CSV field
    pub fn from_field(field: &str) -> Self {
        let trimmed = field.trim();
        if trimmed.is_empty() {
            return RawValue::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(n) => RawValue::Number(n),
            Err(_) => RawValue::Text(field.to_string()),
        }
    }

    /// Label form used for version parsing
    pub fn as_label(&self) -> Option<String> {
        match self {
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Empty => None,
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

/// One package's raw metric table: named columns, one row per published version
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawVersionSeries {
    columns: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawVersionSeries {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a series from a header and rows of cells
    pub fn from_rows<C, R>(columns: C, rows: R) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator<Item = Vec<RawValue>>,
    {
        let mut series = Self::new(columns.into_iter().map(Into::into).collect());
        for row in rows {
            series.push_row(row);
        }
        series
    }

    /// Append a row; short rows are padded with `Empty`, long rows truncated
    pub fn push_row(&mut self, mut values: Vec<RawValue>) {
        values.resize(self.columns.len(), RawValue::Empty);
        self.rows.push(values);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn into_parts(self) -> (Vec<String>, Vec<Vec<RawValue>>) {
        (self.columns, self.rows)
    }
}

/// A raw series whose rows are sorted ascending by version
///
/// Only produced by [`crate::aligner::VersionAligner`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedRows {
    series: RawVersionSeries,
}

impl OrderedRows {
    pub(crate) fn new(series: RawVersionSeries) -> Self {
        Self { series }
    }

    pub fn series(&self) -> &RawVersionSeries {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.series.has_column(name)
    }

    /// Values of one column in version order, `None` if the column is absent
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &RawValue> + '_> {
        let idx = self.series.column_index(name)?;
        Some(self.series.rows().iter().map(move |row| &row[idx]))
    }
}

/// One package's row in a metric matrix
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    pub package: String,
    pub slots: Slots,
}

impl MatrixRow {
    pub fn new(package: impl Into<String>, slots: Slots) -> Self {
        Self {
            package: package.into(),
            slots,
        }
    }

    /// True if any present slot is strictly positive
    pub fn has_presence(&self) -> bool {
        self.slots.iter().flatten().any(|v| *v > 0.0)
    }
}

/// Package x version matrix for one metric
///
/// Rows keep insertion order and each package appears at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricMatrix {
    metric: String,
    rows: Vec<MatrixRow>,
    packages: HashSet<String>,
}

impl MetricMatrix {
    pub fn new(metric: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            rows: Vec::new(),
            packages: HashSet::new(),
        }
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    /// Append a row. Returns false (and keeps the first row) if the package is already present.
    pub fn push(&mut self, row: MatrixRow) -> bool {
        if !self.packages.insert(row.package.clone()) {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn contains(&self, package: &str) -> bool {
        self.packages.contains(package)
    }

    pub fn get(&self, package: &str) -> Option<&MatrixRow> {
        self.rows.iter().find(|r| r.package == package)
    }

    pub fn rows(&self) -> &[MatrixRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.package.as_str())
    }

    /// Slot values of one version column across all rows
    pub fn column(&self, index: usize) -> impl Iterator<Item = Option<f64>> + '_ {
        self.rows.iter().map(move |r| r.slots[index])
    }

    /// New matrix holding only the rows matching `keep`, in the same order
    pub fn retain_rows<F>(&self, mut keep: F) -> MetricMatrix
    where
        F: FnMut(&MatrixRow) -> bool,
    {
        let mut out = MetricMatrix::new(self.metric.clone());
        for row in self.rows.iter().filter(|r| keep(r)) {
            out.push(row.clone());
        }
        out
    }
}

/// Statistic computed per version column by the summary stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryMode {
    /// Mean over present values
    PlainMean,
    /// Number of rows with a value > 0
    PresenceCount,
    /// Mean over values > 0
    PresenceMean,
}

impl SummaryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMode::PlainMean => "plain_mean",
            SummaryMode::PresenceCount => "presence_count",
            SummaryMode::PresenceMean => "presence_mean",
        }
    }
}

/// One metric's summary cells, one per version slot
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub metric: String,
    pub cells: Slots,
}

/// Summary rows for one mode, in the order metrics were processed
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryTable {
    mode: SummaryMode,
    rows: Vec<SummaryRow>,
}

impl SummaryTable {
    pub fn new(mode: SummaryMode) -> Self {
        Self {
            mode,
            rows: Vec::new(),
        }
    }

    pub fn mode(&self) -> SummaryMode {
        self.mode
    }

    pub fn push(&mut self, row: SummaryRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[SummaryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, metric: &str) -> Option<&SummaryRow> {
        self.rows.iter().find(|r| r.metric == metric)
    }
}
