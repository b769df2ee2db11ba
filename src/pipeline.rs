//! Pipeline orchestration
//!
//! Runs the full aggregation from a package catalog to the output tables.
//!
//! Stages:
//! 1. SeriesSource - load each package's raw history
//! 2. VersionAligner - order rows by version
//! 3. MatrixBuilder - one package x version matrix per metric
//! 4. OutlierFilter - numeric metrics only
//! 5. PresenceSelector - presence metrics only
//! 6. Summarizer - per-version summary rows

use crate::aligner::VersionAligner;
use crate::config::AggregationConfig;
use crate::error::{AggregateError, Exclusion};
use crate::matrix::MatrixBuilder;
use crate::outlier::{FilteredMetricMatrix, OutlierFilter};
use crate::presence::PresenceSelector;
use crate::report::{MetricCounts, RunReport};
use crate::source::{CsvSeriesSource, PackageCatalog, SeriesSource};
use crate::summary::Summarizer;
use crate::table::{
    self, OutputLayout, AVG_SUMMARY_FILE, PRESENCE_AVG_SUMMARY_FILE,
    PRESENCE_COUNT_SUMMARY_FILE, RAW_AVG_SUMMARY_FILE,
};
use crate::types::{MetricMatrix, OrderedRows, SummaryMode, SummaryTable};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Run the aggregation described by `config` against the CSV layout on disk.
///
/// # Example
/// ```ignore
/// let config = AggregationConfig::load(Path::new("pkgtrend.json"))?;
/// let report = run_with_config(&config)?;
/// println!("{} packages aligned", report.packages_aligned);
/// ```
pub fn run_with_config(config: &AggregationConfig) -> Result<RunReport, AggregateError> {
    config.validate()?;
    let catalog = PackageCatalog::load(&config.catalog_path)?;
    let source = CsvSeriesSource::new(&config.analysis_dir, &config.series_file);
    let layout = OutputLayout::new(&config.output_dir);
    Pipeline::new(config.clone()).run(&catalog, &source, &layout)
}

/// Recompute one summary table from the matrix files in `dir`.
///
/// Files are processed in name order; a file with no rows contributes no row.
pub fn summarize_dir(dir: &Path, mode: SummaryMode) -> Result<SummaryTable, AggregateError> {
    let mut summary = SummaryTable::new(mode);
    for path in table::list_matrix_files(dir)? {
        let matrix = table::read_matrix(&path)?;
        if matrix.is_empty() {
            continue;
        }
        Summarizer::append(&mut summary, &matrix);
    }
    Ok(summary)
}

/// Everything one run computes, before anything is written
#[derive(Debug, Clone)]
pub struct Aggregation {
    /// Raw matrices with at least one row, in metric order
    pub raw: Vec<MetricMatrix>,
    /// Metrics whose raw matrix came out empty
    pub empty_metrics: Vec<String>,
    pub filtered: Vec<FilteredMetricMatrix>,
    pub presence: Vec<MetricMatrix>,
    /// PlainMean of every raw matrix
    pub raw_means: SummaryTable,
    /// PlainMean of the outlier-filtered matrices
    pub filtered_means: SummaryTable,
    pub presence_counts: SummaryTable,
    pub presence_means: SummaryTable,
    pub report: RunReport,
}

/// Aggregation pipeline for one configuration
pub struct Pipeline {
    config: AggregationConfig,
    builder: MatrixBuilder,
}

impl Pipeline {
    pub fn new(config: AggregationConfig) -> Self {
        let builder = MatrixBuilder::new(config.row_policy, config.fill_value);
        Self { config, builder }
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Load and align every catalog package.
    ///
    /// Returns the aligned histories and one exclusion per package that could
    /// not be used. Repeated catalog entries are loaded once.
    pub fn align_all(
        &self,
        catalog: &PackageCatalog,
        source: &dyn SeriesSource,
    ) -> (HashMap<String, OrderedRows>, Vec<Exclusion>) {
        let mut aligned = HashMap::new();
        let mut exclusions = Vec::new();
        let mut seen = HashSet::new();

        for package in catalog.packages() {
            if !seen.insert(package.as_str()) {
                continue;
            }

            let raw = match source.load(package) {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    warn!(package = %package, "no metrics history, skipping package");
                    exclusions.push(Exclusion::SourceUnavailable {
                        package: package.clone(),
                        reason: "no metrics history".to_string(),
                    });
                    continue;
                }
                Err(e) => {
                    warn!(package = %package, error = %e, "failed to load history, skipping package");
                    exclusions.push(Exclusion::SourceUnavailable {
                        package: package.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            match VersionAligner::align(raw) {
                Ok(rows) => {
                    aligned.insert(package.clone(), rows);
                }
                Err(failure) => {
                    warn!(package = %package, reason = %failure, "cannot order versions, skipping package");
                    exclusions.push(Exclusion::AlignmentFailure {
                        package: package.clone(),
                        reason: failure.to_string(),
                    });
                }
            }
        }

        (aligned, exclusions)
    }

    /// Compute all matrices and summary tables in memory
    pub fn aggregate(&self, catalog: &PackageCatalog, source: &dyn SeriesSource) -> Aggregation {
        let mut report = RunReport::start(self.config.row_policy, self.config.fill_value);
        report.catalog_entries = catalog.len();

        info!(packages = catalog.len(), "aggregating package catalog");
        let (aligned, exclusions) = self.align_all(catalog, source);
        report.packages_aligned = aligned.len();
        report.exclusions = exclusions;

        let numeric: HashSet<&str> = self.config.unique_numeric_metrics().into_iter().collect();
        let presence: HashSet<&str> = self.config.unique_presence_metrics().into_iter().collect();

        let mut out = Aggregation {
            raw: Vec::new(),
            empty_metrics: Vec::new(),
            filtered: Vec::new(),
            presence: Vec::new(),
            raw_means: SummaryTable::new(SummaryMode::PlainMean),
            filtered_means: SummaryTable::new(SummaryMode::PlainMean),
            presence_counts: SummaryTable::new(SummaryMode::PresenceCount),
            presence_means: SummaryTable::new(SummaryMode::PresenceMean),
            report,
        };

        for metric in self.config.unique_metrics() {
            let build = self.builder.build(metric, catalog.packages(), &aligned);
            out.report.exclusions.extend(build.exclusions);

            let raw = build.matrix;
            let mut counts = MetricCounts::new(metric, raw.len());

            if raw.is_empty() {
                info!(metric, "no package matched, metric skipped");
                out.empty_metrics.push(metric.to_string());
                out.report.metrics.push(counts);
                continue;
            }

            Summarizer::append(&mut out.raw_means, &raw);

            if numeric.contains(metric) {
                let filtered = OutlierFilter::filter(&raw);
                Summarizer::append(&mut out.filtered_means, &filtered.matrix);
                counts.filtered_rows = Some(filtered.kept());
                out.filtered.push(filtered);
            }

            if presence.contains(metric) {
                let selected = PresenceSelector::select(&raw);
                Summarizer::append(&mut out.presence_counts, &selected);
                Summarizer::append(&mut out.presence_means, &selected);
                counts.presence_rows = Some(selected.len());
                out.presence.push(selected);
            }

            out.report.metrics.push(counts);
            out.raw.push(raw);
        }

        info!(
            aligned = out.report.packages_aligned,
            excluded = out.report.packages_excluded().len(),
            metrics = out.raw.len(),
            "aggregation completed"
        );
        out
    }

    /// Write every table of `aggregation` under `layout`, replacing the
    /// previous run's files.
    ///
    /// Matrix files this run did not produce are deleted, including those of
    /// metrics dropped from the profile since an earlier run.
    pub fn write(&self, aggregation: &Aggregation, layout: &OutputLayout) -> Result<(), AggregateError> {
        let raw = aggregation.raw.iter();
        let filtered = aggregation.filtered.iter().map(|f| &f.matrix);
        let presence = aggregation.presence.iter();

        let groups: [(PathBuf, Vec<&MetricMatrix>); 3] = [
            (layout.raw_dir(), raw.collect()),
            (layout.filtered_dir(), filtered.collect()),
            (layout.presence_dir(), presence.collect()),
        ];

        for (dir, matrices) in &groups {
            let mut written = HashSet::new();
            for matrix in matrices {
                let path = table::matrix_path(dir, matrix.metric());
                table::write_matrix(&path, matrix)?;
                written.insert(path);
            }
            let removed = table::prune_matrices(dir, &written)?;
            if removed > 0 {
                info!(dir = %dir.display(), removed, "stale matrix files removed");
            }
        }

        let summaries = [
            (RAW_AVG_SUMMARY_FILE, &aggregation.raw_means),
            (AVG_SUMMARY_FILE, &aggregation.filtered_means),
            (PRESENCE_COUNT_SUMMARY_FILE, &aggregation.presence_counts),
            (PRESENCE_AVG_SUMMARY_FILE, &aggregation.presence_means),
        ];
        for (file_name, summary) in summaries {
            table::write_summary(&layout.summary(file_name), summary)?;
        }

        info!(output = %layout.root().display(), "output tables written");
        Ok(())
    }

    /// Aggregate, write all tables and the run report
    pub fn run(
        &self,
        catalog: &PackageCatalog,
        source: &dyn SeriesSource,
        layout: &OutputLayout,
    ) -> Result<RunReport, AggregateError> {
        let mut aggregation = self.aggregate(catalog, source);
        self.write(&aggregation, layout)?;

        aggregation.report.finish();
        aggregation.report.write(&layout.run_report())?;
        Ok(aggregation.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{InMemorySource, DEFAULT_SERIES_FILE};
    use crate::types::{RawValue, RawVersionSeries};
    use crate::MAX_VERSIONS;
    use pretty_assertions::assert_eq;
    use std::fs;

    const NUMERIC: &str = "generic.total_files";
    const PRESENCE: &str = "payload.eval_count";

    fn config() -> AggregationConfig {
        AggregationConfig {
            metrics: vec![NUMERIC.to_string(), PRESENCE.to_string(), "crypto.hook_provider".to_string()],
            numeric_metrics: vec![NUMERIC.to_string()],
            presence_metrics: vec![PRESENCE.to_string()],
            ..Default::default()
        }
    }

    fn history(versions: usize, files: f64, evals: f64) -> RawVersionSeries {
        let rows = (0..versions).rev().map(|i| {
            vec![
                RawValue::Text(format!("0.{}.0", i)),
                RawValue::Number(files),
                RawValue::Number(evals),
            ]
        });
        RawVersionSeries::from_rows(["version", NUMERIC, PRESENCE], rows)
    }

    fn fixture() -> (PackageCatalog, InMemorySource) {
        let mut source = InMemorySource::new();
        source.insert("a", history(MAX_VERSIONS, 10.0, 0.0));
        source.insert("b", history(MAX_VERSIONS, 11.0, 2.0));
        source.insert("c", history(MAX_VERSIONS, 12.0, 0.0));
        source.insert("huge", history(MAX_VERSIONS, 9_000.0, 4.0));
        source.insert("short", history(18, 10.0, 1.0));

        let mut bad = history(MAX_VERSIONS, 10.0, 1.0);
        bad.push_row(vec![
            RawValue::from("not a version"),
            RawValue::Number(1.0),
            RawValue::Number(1.0),
        ]);
        source.insert("bad", bad);

        let catalog = PackageCatalog::new(
            ["a", "b", "c", "huge", "short", "bad", "missing", "a"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        );
        (catalog, source)
    }

    #[test]
    fn test_align_all_records_exclusions() {
        let (catalog, source) = fixture();
        let (aligned, exclusions) = Pipeline::new(config()).align_all(&catalog, &source);

        assert_eq!(aligned.len(), 5);
        assert!(!aligned.contains_key("bad"));
        assert_eq!(exclusions.len(), 2);
        assert!(matches!(exclusions[0], Exclusion::AlignmentFailure { ref package, .. } if package == "bad"));
        assert!(matches!(exclusions[1], Exclusion::SourceUnavailable { ref package, .. } if package == "missing"));
    }

    #[test]
    fn test_aggregate_stages() {
        let (catalog, source) = fixture();
        let aggregation = Pipeline::new(config()).aggregate(&catalog, &source);

        assert_eq!(aggregation.raw.len(), 2);
        assert_eq!(aggregation.empty_metrics, vec!["crypto.hook_provider".to_string()]);

        let raw = &aggregation.raw[0];
        assert_eq!(raw.packages().collect::<Vec<_>>(), vec!["a", "b", "c", "huge"]);

        let filtered = &aggregation.filtered[0];
        assert!(!filtered.matrix.contains("huge"));
        assert_eq!(filtered.kept(), 3);
        assert_eq!(aggregation.filtered_means.rows()[0].cells[0], Some(11.0));

        let presence = &aggregation.presence[0];
        assert_eq!(presence.packages().collect::<Vec<_>>(), vec!["b", "huge"]);
        assert_eq!(aggregation.presence_counts.rows()[0].cells[0], Some(2.0));
        assert_eq!(aggregation.presence_means.rows()[0].cells[0], Some(3.0));

        assert_eq!(aggregation.raw_means.len(), 2);
        assert_eq!(aggregation.report.packages_aligned, 5);
        assert_eq!(aggregation.report.packages_excluded(), vec!["bad", "missing"]);
        assert_eq!(aggregation.report.exclusions_for(NUMERIC).count(), 1);

        let counts = aggregation.report.metric(PRESENCE).unwrap();
        assert_eq!(counts.raw_rows, 4);
        assert_eq!(counts.filtered_rows, None);
        assert_eq!(counts.presence_rows, Some(2));
    }

    #[test]
    fn test_run_writes_layout_and_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let stale = layout.raw_matrix("crypto.hook_provider");
        table::write_atomic(&stale, b"package\nold\n").unwrap();

        let (catalog, source) = fixture();
        let report = Pipeline::new(config()).run(&catalog, &source, &layout).unwrap();

        assert!(report.finished_at.is_some());
        assert!(!stale.exists());
        assert!(layout.raw_matrix(NUMERIC).is_file());
        assert!(layout.filtered_matrix(NUMERIC).is_file());
        assert!(!layout.filtered_matrix(PRESENCE).exists());
        assert!(layout.presence_matrix(PRESENCE).is_file());
        assert!(layout.summary(AVG_SUMMARY_FILE).is_file());
        assert!(layout.run_report().is_file());
    }

    #[test]
    fn test_unreadable_history_is_excluded_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let write = |package: &str, body: String| {
            let pkg_dir = dir.path().join(package);
            fs::create_dir_all(&pkg_dir).unwrap();
            fs::write(pkg_dir.join(DEFAULT_SERIES_FILE), body).unwrap();
        };

        let header = format!("version,{},{}\n", NUMERIC, PRESENCE);
        let rows: String = (0..MAX_VERSIONS).map(|i| format!("1.{}.0,3,1\n", i)).collect();
        write("good", format!("{}{}", header, rows));
        write("ragged", format!("{}{}1.99.0,3,1,extra\n", header, rows));

        let catalog = PackageCatalog::new(vec!["good".to_string(), "ragged".to_string()]);
        let source = CsvSeriesSource::new(dir.path(), DEFAULT_SERIES_FILE);
        let aggregation = Pipeline::new(config()).aggregate(&catalog, &source);

        assert!(matches!(
            aggregation.report.exclusions[0],
            Exclusion::SourceUnavailable { ref package, ref reason } if package == "ragged" && reason.contains("fields")
        ));
        assert_eq!(aggregation.report.packages_excluded(), vec!["ragged"]);
        for matrix in aggregation.raw.iter().chain(aggregation.presence.iter()) {
            assert_eq!(matrix.packages().collect::<Vec<_>>(), vec!["good"]);
        }
    }

    #[test]
    fn test_rerun_with_narrower_profile_prunes_old_matrices() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let (catalog, source) = fixture();
        Pipeline::new(config()).run(&catalog, &source, &layout).unwrap();
        assert!(layout.filtered_matrix(NUMERIC).is_file());
        assert!(layout.presence_matrix(PRESENCE).is_file());

        let narrower = AggregationConfig {
            metrics: vec![NUMERIC.to_string()],
            numeric_metrics: Vec::new(),
            presence_metrics: Vec::new(),
            ..Default::default()
        };
        Pipeline::new(narrower).run(&catalog, &source, &layout).unwrap();

        assert!(layout.raw_matrix(NUMERIC).is_file());
        assert!(!layout.raw_matrix(PRESENCE).exists());
        assert!(!layout.filtered_matrix(NUMERIC).exists());
        assert!(!layout.presence_matrix(PRESENCE).exists());
        assert!(summarize_dir(&layout.presence_dir(), SummaryMode::PresenceCount)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_summarize_dir_matches_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let layout = OutputLayout::new(dir.path());
        let (catalog, source) = fixture();
        Pipeline::new(config()).run(&catalog, &source, &layout).unwrap();

        let recomputed = summarize_dir(
            &dir.path().join(table::PRESENCE_MATRIX_DIR),
            SummaryMode::PresenceMean,
        )
        .unwrap();
        let written = table::read_summary(
            &layout.summary(PRESENCE_AVG_SUMMARY_FILE),
            SummaryMode::PresenceMean,
        )
        .unwrap();
        assert_eq!(recomputed, written);
    }
}
