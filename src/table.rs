//! Tabular outputs
//!
//! CSV encoding of metric matrices and summary tables, and the on-disk layout
//! of a run's outputs. Every file is rebuilt from scratch: content is written
//! to a temporary sibling and renamed over the target, so a rerun never
//! appends to a previous run's rows and readers never observe a partial file.

use crate::error::AggregateError;
use crate::types::{
    metric_stem, version_column_name, MatrixRow, MetricMatrix, Slots, SummaryMode, SummaryRow,
    SummaryTable,
};
use crate::MAX_VERSIONS;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

/// Directory names under the output root
pub const RAW_MATRIX_DIR: &str = "aggregate";
pub const FILTERED_MATRIX_DIR: &str = "aggregate_no_outliers";
pub const PRESENCE_MATRIX_DIR: &str = "aggregate_gt0";
pub const SUMMARY_DIR: &str = "summaries";

/// Summary file names
pub const AVG_SUMMARY_FILE: &str = "avgs_total_metrics_for_all_pkgs.csv";
pub const RAW_AVG_SUMMARY_FILE: &str = "avgs_raw_metrics_for_all_pkgs.csv";
pub const PRESENCE_COUNT_SUMMARY_FILE: &str = "presence_total_metrics_for_all_pkgs.csv";
pub const PRESENCE_AVG_SUMMARY_FILE: &str = "presence_avg_total_metrics_for_all_pkgs.csv";
pub const RUN_REPORT_FILE: &str = "run_report.json";

/// Where a run writes its tables
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(RAW_MATRIX_DIR)
    }

    pub fn filtered_dir(&self) -> PathBuf {
        self.root.join(FILTERED_MATRIX_DIR)
    }

    pub fn presence_dir(&self) -> PathBuf {
        self.root.join(PRESENCE_MATRIX_DIR)
    }

    pub fn raw_matrix(&self, metric: &str) -> PathBuf {
        matrix_path(&self.raw_dir(), metric)
    }

    pub fn filtered_matrix(&self, metric: &str) -> PathBuf {
        matrix_path(&self.filtered_dir(), metric)
    }

    pub fn presence_matrix(&self, metric: &str) -> PathBuf {
        matrix_path(&self.presence_dir(), metric)
    }

    pub fn summary(&self, file_name: &str) -> PathBuf {
        self.root.join(SUMMARY_DIR).join(file_name)
    }

    pub fn run_report(&self) -> PathBuf {
        self.root.join(RUN_REPORT_FILE)
    }

    /// Remove the whole output tree
    pub fn clean(&self) -> Result<(), AggregateError> {
        if self.root.is_dir() {
            fs::remove_dir_all(&self.root).map_err(|e| AggregateError::io(&self.root, e))?;
        }
        Ok(())
    }
}

/// `<dir>/<metric_stem>.csv`
pub fn matrix_path(dir: &Path, metric: &str) -> PathBuf {
    dir.join(format!("{}.csv", metric_stem(metric)))
}

fn header(first: &str) -> Vec<String> {
    std::iter::once(first.to_string())
        .chain((0..MAX_VERSIONS).map(version_column_name))
        .collect()
}

fn format_cell(cell: Option<f64>) -> String {
    cell.map(|v| v.to_string()).unwrap_or_default()
}

fn encode_rows<'a>(
    first: &str,
    rows: impl Iterator<Item = (&'a str, &'a Slots)>,
) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header(first))?;
    for (label, cells) in rows {
        let record =
            std::iter::once(label.to_string()).chain(cells.iter().map(|c| format_cell(*c)));
        writer.write_record(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Encode a matrix as `package,version_1..version_N`
pub fn encode_matrix(matrix: &MetricMatrix) -> Result<Vec<u8>, csv::Error> {
    encode_rows(
        "package",
        matrix.rows().iter().map(|r| (r.package.as_str(), &r.slots)),
    )
}

/// Encode a summary table as `metric,version_1..version_N`
pub fn encode_summary(table: &SummaryTable) -> Result<Vec<u8>, csv::Error> {
    encode_rows(
        "metric",
        table.rows().iter().map(|r| (r.metric.as_str(), &r.cells)),
    )
}

pub fn write_matrix(path: &Path, matrix: &MetricMatrix) -> Result<(), AggregateError> {
    let bytes = encode_matrix(matrix).map_err(|e| AggregateError::csv(path, e))?;
    write_atomic(path, &bytes)
}

pub fn write_summary(path: &Path, table: &SummaryTable) -> Result<(), AggregateError> {
    let bytes = encode_summary(table).map_err(|e| AggregateError::csv(path, e))?;
    write_atomic(path, &bytes)
}

/// Delete a previous run's file at `path`, if any
pub fn remove_stale(path: &Path) -> Result<(), AggregateError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AggregateError::io(path, e)),
    }
}

/// Delete the matrix files in `dir` that are not listed in `keep`.
///
/// Returns the number of files removed; a missing `dir` removes nothing.
pub fn prune_matrices(dir: &Path, keep: &HashSet<PathBuf>) -> Result<usize, AggregateError> {
    if !dir.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for path in list_matrix_files(dir)? {
        if !keep.contains(&path) {
            remove_stale(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// Replace `path` with `bytes` via a temporary file in the same directory
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), AggregateError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| AggregateError::io(&parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| AggregateError::malformed(path, "output path has no file name"))?;
    let temp_path = parent.join(format!(".{}.tmp-{}", file_name, process::id()));

    let result = fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));

    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(AggregateError::io(path, e));
    }
    Ok(())
}

fn read_rows(path: &Path, first: &str) -> Result<Vec<(String, Slots)>, AggregateError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| AggregateError::csv(path, e))?;

    let headers = reader
        .headers()
        .map_err(|e| AggregateError::csv(path, e))?
        .clone();
    let expected = header(first);
    if headers.iter().map(str::trim).ne(expected.iter().map(String::as_str)) {
        return Err(AggregateError::malformed(
            path,
            format!("expected header {}", expected.join(",")),
        ));
    }

    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result.map_err(|e| AggregateError::csv(path, e))?;
        let label = record.get(0).unwrap_or_default().to_string();

        let mut cells: Slots = [None; MAX_VERSIONS];
        for (idx, cell) in cells.iter_mut().enumerate() {
            let field = record.get(idx + 1).unwrap_or_default().trim();
            if field.is_empty() {
                continue;
            }
            let value = field.parse::<f64>().map_err(|_| {
                AggregateError::malformed(
                    path,
                    format!("row {}: '{}' is not a number", line + 1, field),
                )
            })?;
            *cell = Some(value);
        }
        rows.push((label, cells));
    }
    Ok(rows)
}

/// Read a matrix file; the metric is named after the file stem
pub fn read_matrix(path: &Path) -> Result<MetricMatrix, AggregateError> {
    let metric = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| AggregateError::malformed(path, "matrix path has no file name"))?;

    let mut matrix = MetricMatrix::new(metric);
    for (package, slots) in read_rows(path, "package")? {
        if !matrix.push(MatrixRow::new(package.clone(), slots)) {
            return Err(AggregateError::malformed(
                path,
                format!("duplicate package '{}'", package),
            ));
        }
    }
    Ok(matrix)
}

pub fn read_summary(path: &Path, mode: SummaryMode) -> Result<SummaryTable, AggregateError> {
    let mut table = SummaryTable::new(mode);
    for (metric, cells) in read_rows(path, "metric")? {
        table.push(SummaryRow { metric, cells });
    }
    Ok(table)
}

/// Matrix files (`*.csv`) in `dir`, sorted by name
pub fn list_matrix_files(dir: &Path) -> Result<Vec<PathBuf>, AggregateError> {
    let entries = fs::read_dir(dir).map_err(|e| AggregateError::io(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| AggregateError::io(dir, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_matrix() -> MetricMatrix {
        let mut matrix = MetricMatrix::new("generic.total_files");
        let mut slots = [Some(1.5); MAX_VERSIONS];
        slots[19] = None;
        matrix.push(MatrixRow::new("left-pad", slots));
        matrix.push(MatrixRow::new("@scope/pkg", [Some(0.0); MAX_VERSIONS]));
        matrix
    }

    #[test]
    fn test_encode_matrix_layout() {
        let text = String::from_utf8(encode_matrix(&sample_matrix()).unwrap()).unwrap();
        let mut lines = text.lines();

        let header = lines.next().unwrap();
        assert!(header.starts_with("package,version_1,version_2,"));
        assert!(header.ends_with(",version_20"));

        let first = lines.next().unwrap();
        assert!(first.starts_with("left-pad,1.5,"));
        assert!(first.ends_with("1.5,"));
    }

    #[test]
    fn test_matrix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let path = layout.raw_matrix("generic.total_files");

        write_matrix(&path, &sample_matrix()).unwrap();
        let read = read_matrix(&path).unwrap();

        assert_eq!(read.metric(), "generic_total_files");
        assert_eq!(read.rows(), sample_matrix().rows());
    }

    #[test]
    fn test_rewrite_truncates_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");

        write_matrix(&path, &sample_matrix()).unwrap();
        let mut smaller = MetricMatrix::new("m");
        smaller.push(MatrixRow::new("only", [Some(2.0); MAX_VERSIONS]));
        write_matrix(&path, &smaller).unwrap();

        let read = read_matrix(&path).unwrap();
        assert_eq!(read.packages().collect::<Vec<_>>(), vec!["only"]);
    }

    #[test]
    fn test_summary_round_trip_keeps_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AVG_SUMMARY_FILE);

        let mut cells = [Some(0.25); MAX_VERSIONS];
        cells[3] = None;
        let mut table = SummaryTable::new(SummaryMode::PlainMean);
        table.push(SummaryRow {
            metric: "generic_total_files".to_string(),
            cells,
        });

        write_summary(&path, &table).unwrap();
        let read = read_summary(&path, SummaryMode::PlainMean).unwrap();
        assert_eq!(read, table);
    }

    #[test]
    fn test_read_rejects_wrong_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "pkg,v1\na,1\n").unwrap();
        assert!(matches!(
            read_matrix(&path),
            Err(AggregateError::MalformedTable { .. })
        ));
    }

    #[test]
    fn test_remove_stale_ignores_missing() {
        let dir = tempfile::tempdir().unwrap();
        remove_stale(&dir.path().join("absent.csv")).unwrap();
    }

    #[test]
    fn test_prune_keeps_listed_files_only() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("kept.csv");
        let drop = dir.path().join("dropped.csv");
        let other = dir.path().join("notes.txt");
        write_matrix(&keep, &sample_matrix()).unwrap();
        write_matrix(&drop, &sample_matrix()).unwrap();
        fs::write(&other, "left alone").unwrap();

        let removed = prune_matrices(dir.path(), &HashSet::from([keep.clone()])).unwrap();

        assert_eq!(removed, 1);
        assert!(keep.is_file());
        assert!(!drop.exists());
        assert!(other.is_file());
        assert_eq!(prune_matrices(&dir.path().join("absent"), &HashSet::new()).unwrap(), 0);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_matrix(&dir.path().join("m.csv"), &sample_matrix()).unwrap();
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }
}
