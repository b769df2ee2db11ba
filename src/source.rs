//! Input collaborators
//!
//! The package catalog and the per-package raw series loaders the pipeline
//! reads from.

use crate::error::AggregateError;
use crate::types::{RawValue, RawVersionSeries, VERSION_COLUMN};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default per-package metrics file name
pub const DEFAULT_SERIES_FILE: &str = "aggregate_metrics_by_single_version.csv";

/// Ordered list of package identifiers to aggregate
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PackageCatalog {
    packages: Vec<String>,
}

impl PackageCatalog {
    pub fn new(packages: Vec<String>) -> Self {
        Self { packages }
    }

    /// Parse a JSON array of package names
    pub fn from_json(json: &str) -> Result<Self, AggregateError> {
        let packages: Vec<String> = serde_json::from_str(json)
            .map_err(|e| AggregateError::CatalogError(format!("expected a JSON array of names: {}", e)))?;
        Ok(Self { packages })
    }

    pub fn load(path: &Path) -> Result<Self, AggregateError> {
        let json = fs::read_to_string(path).map_err(|e| AggregateError::io(path, e))?;
        Self::from_json(&json)
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Loads one package's raw metrics table
pub trait SeriesSource {
    /// `Ok(None)` when the package has no history. Callers treat `None` and
    /// `Err` the same way: the package is skipped.
    fn load(&self, package: &str) -> Result<Option<RawVersionSeries>, AggregateError>;
}

/// Reads `<analysis_dir>/<package>/<file_name>` CSV files
#[derive(Debug, Clone)]
pub struct CsvSeriesSource {
    analysis_dir: PathBuf,
    file_name: String,
}

impl CsvSeriesSource {
    pub fn new(analysis_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            analysis_dir: analysis_dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn path_for(&self, package: &str) -> PathBuf {
        self.analysis_dir.join(package).join(&self.file_name)
    }

    /// Parse a raw metrics table from any reader.
    ///
    /// Records shorter than the header are padded with empty cells; longer
    /// records are malformed.
    pub fn read_series<R: std::io::Read>(
        reader: R,
        origin: &Path,
    ) -> Result<RawVersionSeries, AggregateError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

        let headers = reader
            .headers()
            .map_err(|e| AggregateError::csv(origin, e))?
            .clone();
        let columns: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let version_idx = columns.iter().position(|c| c == VERSION_COLUMN);

        let mut series = RawVersionSeries::new(columns);
        for (line, result) in reader.records().enumerate() {
            let record = result.map_err(|e| AggregateError::csv(origin, e))?;
            if record.len() > series.columns().len() {
                return Err(AggregateError::malformed(
                    origin,
                    format!(
                        "row {} has {} fields, header has {}",
                        line + 1,
                        record.len(),
                        series.columns().len()
                    ),
                ));
            }
            let row = record
                .iter()
                .enumerate()
                .map(|(idx, field)| {
                    // version labels stay text so "1.10" is not read as 1.1
                    if Some(idx) == version_idx && !field.trim().is_empty() {
                        RawValue::Text(field.trim().to_string())
                    } else {
                        RawValue::from_field(field)
                    }
                })
                .collect();
            series.push_row(row);
        }

        Ok(series)
    }
}

impl SeriesSource for CsvSeriesSource {
    fn load(&self, package: &str) -> Result<Option<RawVersionSeries>, AggregateError> {
        let path = self.path_for(package);
        if !path.is_file() {
            return Ok(None);
        }
        let file = fs::File::open(&path).map_err(|e| AggregateError::io(&path, e))?;
        Self::read_series(file, &path).map(Some)
    }
}

/// Series held in memory, keyed by package
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    series: HashMap<String, RawVersionSeries>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, package: impl Into<String>, series: RawVersionSeries) {
        self.series.insert(package.into(), series);
    }
}

impl SeriesSource for InMemorySource {
    fn load(&self, package: &str) -> Result<Option<RawVersionSeries>, AggregateError> {
        Ok(self.series.get(package).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::coerce;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_catalog_from_json() {
        let catalog = PackageCatalog::from_json(r#"["left-pad", "@scope/pkg"]"#).unwrap();
        assert_eq!(catalog.packages(), &["left-pad".to_string(), "@scope/pkg".to_string()]);
    }

    #[test]
    fn test_catalog_rejects_non_array() {
        let err = PackageCatalog::from_json(r#"{"left-pad": 1}"#).unwrap_err();
        assert!(matches!(err, AggregateError::CatalogError(_)));
    }

    #[test]
    fn test_read_series_keeps_version_text() {
        let csv = "version,generic.total_files,crypto.cryptocurrency_name\n1.10,3,\n1.9,nan,bitcoin\n";
        let series = CsvSeriesSource::read_series(csv.as_bytes(), Path::new("mem.csv")).unwrap();

        assert_eq!(series.columns().len(), 3);
        assert_eq!(series.rows()[0][0], RawValue::Text("1.10".to_string()));
        assert_eq!(series.rows()[0][1], RawValue::Number(3.0));
        assert_eq!(series.rows()[0][2], RawValue::Empty);
        assert_eq!(series.rows()[1][2], RawValue::Text("bitcoin".to_string()));
    }

    #[test]
    fn test_long_record_is_an_error() {
        let csv = "version,a\n1.0,1,2\n";
        let err = CsvSeriesSource::read_series(csv.as_bytes(), Path::new("mem.csv")).unwrap_err();
        assert!(matches!(err, AggregateError::MalformedTable { .. }));
    }

    #[test]
    fn test_short_record_is_padded_and_filled() {
        let csv = "version,generic.total_files,crypto.cryptocurrency_name\n1.0,3,x\n1.1,4\n";
        let series = CsvSeriesSource::read_series(csv.as_bytes(), Path::new("mem.csv")).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series.rows()[1][2], RawValue::Empty);
        assert_eq!(coerce(&series.rows()[1][2], -1.0), Some(-1.0));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let source = CsvSeriesSource::new(dir.path(), DEFAULT_SERIES_FILE);
        assert!(source.load("nope").unwrap().is_none());
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("left-pad");
        fs::create_dir_all(&pkg_dir).unwrap();
        fs::write(pkg_dir.join(DEFAULT_SERIES_FILE), "version,m\n1.0,1\n1.1,2\n").unwrap();

        let source = CsvSeriesSource::new(dir.path(), DEFAULT_SERIES_FILE);
        let series = source.load("left-pad").unwrap().unwrap();
        assert_eq!(series.len(), 2);
    }
}
