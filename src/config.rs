//! Run configuration
//!
//! Every field has a default, so an empty JSON object is a complete
//! configuration reproducing the stock metric profile.

use crate::error::AggregateError;
use crate::matrix::RowPolicy;
use crate::source::DEFAULT_SERIES_FILE;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Metrics extracted into a matrix each
pub const DEFAULT_METRICS: [&str; 19] = [
    "generic.total_files",
    "generic.total_size_bytes",
    "generic.total_size_chars",
    "generic.weighted_avg_blank_space_and_character_ratio",
    "generic.weighted_avg_shannon_entropy",
    "generic.longest_line_length",
    "evasion.obfuscation_patterns_count",
    "evasion.platform_detections_count",
    "payload.timing_delays_count",
    "payload.eval_count",
    "payload.shell_commands_count",
    "exfiltration.scan_functions_count",
    "exfiltration.sensitive_elements_count",
    "exfiltration.data_transmission_count",
    "crypto.crypto_addresses",
    "crypto.cryptocurrency_name",
    "crypto.wallet_detection",
    "crypto.replaced_crypto_addresses",
    "crypto.hook_provider",
];

/// Metrics that are outlier-filtered and averaged
pub const DEFAULT_NUMERIC_METRICS: [&str; 6] = [
    "generic.total_files",
    "generic.total_size_bytes",
    "generic.total_size_chars",
    "generic.weighted_avg_blank_space_and_character_ratio",
    "generic.weighted_avg_shannon_entropy",
    "generic.longest_line_length",
];

/// Metrics summarized over the packages where they occur
pub const DEFAULT_PRESENCE_METRICS: [&str; 9] = [
    "crypto.crypto_addresses",
    "evasion.obfuscation_patterns_count",
    "evasion.platform_detections_count",
    "payload.timing_delays_count",
    "payload.eval_count",
    "exfiltration.scan_functions_count",
    "exfiltration.sensitive_elements_count",
    "exfiltration.data_transmission_count",
    "crypto.cryptocurrency_name",
];

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Configuration for one aggregation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// JSON array of package names
    pub catalog_path: PathBuf,
    /// Root holding one directory per package
    pub analysis_dir: PathBuf,
    /// Metrics file name inside each package directory
    pub series_file: String,
    pub output_dir: PathBuf,
    pub metrics: Vec<String>,
    pub numeric_metrics: Vec<String>,
    pub presence_metrics: Vec<String>,
    pub row_policy: RowPolicy,
    /// Substitute for empty and NaN cells
    pub fill_value: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("list_pkg.json"),
            analysis_dir: PathBuf::from("analysys_results"),
            series_file: DEFAULT_SERIES_FILE.to_string(),
            output_dir: PathBuf::from("aggregate_outputs"),
            metrics: owned(&DEFAULT_METRICS),
            numeric_metrics: owned(&DEFAULT_NUMERIC_METRICS),
            presence_metrics: owned(&DEFAULT_PRESENCE_METRICS),
            row_policy: RowPolicy::Strict,
            fill_value: 0.0,
        }
    }
}

impl AggregationConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, AggregateError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, AggregateError> {
        let json = fs::read_to_string(path).map_err(|e| AggregateError::io(path, e))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, AggregateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that the metric lists are consistent and the fill value usable
    pub fn validate(&self) -> Result<(), AggregateError> {
        if self.metrics.is_empty() {
            return Err(AggregateError::ConfigError(
                "at least one metric is required".to_string(),
            ));
        }
        if self.series_file.trim().is_empty() {
            return Err(AggregateError::ConfigError(
                "series_file must not be empty".to_string(),
            ));
        }
        if !self.fill_value.is_finite() {
            return Err(AggregateError::ConfigError(format!(
                "fill_value must be finite, got {}",
                self.fill_value
            )));
        }

        let known: HashSet<&str> = self.metrics.iter().map(String::as_str).collect();
        for (list, names) in [
            ("numeric_metrics", &self.numeric_metrics),
            ("presence_metrics", &self.presence_metrics),
        ] {
            if let Some(unknown) = names.iter().find(|m| !known.contains(m.as_str())) {
                return Err(AggregateError::ConfigError(format!(
                    "{} entry '{}' is not listed in metrics",
                    list, unknown
                )));
            }
        }
        Ok(())
    }

    /// `metrics` without repeats, first occurrence wins
    pub fn unique_metrics(&self) -> Vec<&str> {
        dedup(&self.metrics)
    }

    pub fn unique_numeric_metrics(&self) -> Vec<&str> {
        dedup(&self.numeric_metrics)
    }

    pub fn unique_presence_metrics(&self) -> Vec<&str> {
        dedup(&self.presence_metrics)
    }
}

fn dedup(names: &[String]) -> Vec<&str> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(String::as_str)
        .filter(|name| seen.insert(*name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_profile() {
        let config = AggregationConfig::default();
        assert_eq!(config.metrics.len(), 19);
        assert_eq!(config.numeric_metrics.len(), 6);
        assert_eq!(config.unique_presence_metrics().len(), 9);
        assert_eq!(config.row_policy, RowPolicy::Strict);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = AggregationConfig::from_json("{}").unwrap();
        assert_eq!(config, AggregationConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = AggregationConfig::from_json(
            r#"{"row_policy": "pad", "fill_value": -1.0, "output_dir": "out"}"#,
        )
        .unwrap();
        assert_eq!(config.row_policy, RowPolicy::Pad);
        assert_eq!(config.fill_value, -1.0);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.metrics.len(), 19);
    }

    #[test]
    fn test_rejects_unknown_numeric_metric() {
        let err = AggregationConfig::from_json(r#"{"numeric_metrics": ["generic.nope"]}"#)
            .unwrap_err();
        assert!(matches!(err, AggregateError::ConfigError(ref m) if m.contains("generic.nope")));
    }

    #[test]
    fn test_rejects_empty_metrics() {
        let err = AggregationConfig::from_json(
            r#"{"metrics": [], "numeric_metrics": [], "presence_metrics": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AggregateError::ConfigError(_)));
    }

    #[test]
    fn test_rejects_unknown_row_policy() {
        let err = AggregationConfig::from_json(r#"{"row_policy": "loose"}"#).unwrap_err();
        assert!(matches!(err, AggregateError::JsonError(_)));
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let config = AggregationConfig {
            presence_metrics: owned(&["b", "a", "b"]),
            ..Default::default()
        };
        assert_eq!(config.unique_presence_metrics(), vec!["b", "a"]);
    }
}
