//! Run report
//!
//! A serializable record of what one aggregation run did: which packages were
//! left out and why, and how many rows each metric's matrices ended up with.

use crate::error::{AggregateError, Exclusion};
use crate::matrix::RowPolicy;
use crate::table::write_atomic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

/// Row counts for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricCounts {
    pub metric: String,
    pub raw_rows: usize,
    /// Set for outlier-filtered metrics with a raw matrix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filtered_rows: Option<usize>,
    /// Set for presence metrics with a raw matrix
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_rows: Option<usize>,
}

impl MetricCounts {
    pub fn new(metric: impl Into<String>, raw_rows: usize) -> Self {
        Self {
            metric: metric.into(),
            raw_rows,
            filtered_rows: None,
            presence_rows: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub row_policy: RowPolicy,
    pub fill_value: f64,
    /// Catalog entries, repeats included
    pub catalog_entries: usize,
    /// Packages whose history loaded and aligned
    pub packages_aligned: usize,
    pub metrics: Vec<MetricCounts>,
    pub exclusions: Vec<Exclusion>,
}

impl RunReport {
    pub fn start(row_policy: RowPolicy, fill_value: f64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            row_policy,
            fill_value,
            catalog_entries: 0,
            packages_aligned: 0,
            metrics: Vec::new(),
            exclusions: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn metric(&self, metric: &str) -> Option<&MetricCounts> {
        self.metrics.iter().find(|m| m.metric == metric)
    }

    /// Packages excluded from every matrix
    pub fn packages_excluded(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.exclusions
            .iter()
            .filter(|e| e.metric().is_none())
            .map(Exclusion::package)
            .filter(|p| seen.insert(*p))
            .collect()
    }

    /// Exclusions scoped to one metric
    pub fn exclusions_for(&self, metric: &str) -> impl Iterator<Item = &Exclusion> + '_ {
        let metric = metric.to_string();
        self.exclusions
            .iter()
            .filter(move |e| e.metric() == Some(metric.as_str()))
    }

    pub fn to_json(&self) -> Result<String, AggregateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), AggregateError> {
        write_atomic(path, self.to_json()?.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn report() -> RunReport {
        let mut report = RunReport::start(RowPolicy::Strict, 0.0);
        report.exclusions = vec![
            Exclusion::AlignmentFailure {
                package: "bad".to_string(),
                reason: "row 0: invalid version".to_string(),
            },
            Exclusion::SchemaMismatch {
                package: "short".to_string(),
                metric: "payload.eval_count".to_string(),
                reason: "expected exactly 20 versions, found 18".to_string(),
            },
        ];
        report
    }

    #[test]
    fn test_exclusion_scopes() {
        let report = report();
        assert_eq!(report.packages_excluded(), vec!["bad"]);
        assert_eq!(report.exclusions_for("payload.eval_count").count(), 1);
        assert_eq!(report.exclusions_for("generic.total_files").count(), 0);
    }

    #[test]
    fn test_json_shape() {
        let mut report = report();
        report.metrics.push(MetricCounts::new("payload.eval_count", 3));
        report.finish();

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(value["row_policy"], "strict");
        assert_eq!(value["exclusions"][0]["kind"], "alignment_failure");
        assert_eq!(value["exclusions"][1]["metric"], "payload.eval_count");
        assert!(value["metrics"][0].get("filtered_rows").is_none());
        assert!(Uuid::parse_str(value["run_id"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run_report.json");
        let report = report();

        report.write(&path).unwrap();
        let read: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, report);
    }
}
