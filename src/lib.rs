//! pkgtrend - Cross-package aggregation of per-version security metrics
//!
//! pkgtrend takes, for every package in a catalog, a table of metrics with one
//! row per published version and turns it into corpus-wide views through a
//! deterministic pipeline: version alignment → per-metric matrices → outlier
//! filtering → presence selection → per-version summary tables.
//!
//! ## Modules
//!
//! - **Core**: `aligner`, `matrix`, `outlier`, `summary`, `presence`
//! - **I/O**: `source` (catalog and raw series), `table` (CSV outputs), `report`
//! - **Orchestration**: `config`, `pipeline`

pub mod aligner;
pub mod config;
pub mod error;
pub mod matrix;
pub mod outlier;
pub mod pipeline;
pub mod presence;
pub mod report;
pub mod source;
pub mod summary;
pub mod table;
pub mod types;
pub mod version;

pub use aligner::{AlignmentFailure, VersionAligner};
pub use config::AggregationConfig;
pub use error::{AggregateError, Exclusion};
pub use matrix::{MatrixBuilder, RowPolicy};
pub use outlier::{FilteredMetricMatrix, OutlierFilter};
pub use pipeline::{run_with_config, summarize_dir, Aggregation, Pipeline};
pub use presence::PresenceSelector;
pub use report::RunReport;
pub use source::{CsvSeriesSource, InMemorySource, PackageCatalog, SeriesSource};
pub use summary::Summarizer;
pub use types::{MetricMatrix, RawValue, RawVersionSeries, SummaryMode, SummaryRow, SummaryTable};
pub use version::VersionKey;

/// Number of version slots in every matrix row
pub const MAX_VERSIONS: usize = 20;

/// Crate version recorded by the CLI
pub const PKGTREND_VERSION: &str = env!("CARGO_PKG_VERSION");
