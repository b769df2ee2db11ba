//! pkgtrend CLI - Command-line interface for the aggregation engine
//!
//! Commands:
//! - run: Aggregate the package catalog into matrices and summary tables
//! - summarize: Recompute a summary table from existing matrix files
//! - config: Print the effective configuration
//! - doctor: Check configuration, catalog and analysis directory

use clap::{Parser, Subcommand, ValueEnum};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use pkgtrend::source::{CsvSeriesSource, PackageCatalog};
use pkgtrend::table::{self, OutputLayout};
use pkgtrend::{
    run_with_config, summarize_dir, AggregateError, AggregationConfig, RowPolicy, SummaryMode,
    PKGTREND_VERSION,
};

/// pkgtrend - Cross-package aggregation of per-version security metrics
#[derive(Parser)]
#[command(name = "pkgtrend")]
#[command(version = PKGTREND_VERSION)]
#[command(about = "Aggregate per-version package metrics into corpus-wide tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate the package catalog into matrices and summary tables
    Run {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Package catalog (JSON array of names)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Directory holding one folder per package
        #[arg(long)]
        analysis_dir: Option<PathBuf>,

        /// Output root
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// How histories that are not exactly 20 versions long are handled
        #[arg(long)]
        row_policy: Option<RowPolicyArg>,

        /// Remove the output root before running
        #[arg(long)]
        clean: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recompute a summary table from existing matrix files
    Summarize {
        /// Directory of matrix CSV files
        #[arg(long)]
        matrix_dir: PathBuf,

        /// Statistic to compute per version column
        #[arg(long, value_enum)]
        mode: ModeArg,

        /// Output file path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check configuration, catalog and analysis directory
    Doctor {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum RowPolicyArg {
    /// Require exactly 20 versions
    Strict,
    /// Keep the first 20 versions, leave missing ones empty
    Pad,
}

impl From<RowPolicyArg> for RowPolicy {
    fn from(arg: RowPolicyArg) -> Self {
        match arg {
            RowPolicyArg::Strict => RowPolicy::Strict,
            RowPolicyArg::Pad => RowPolicy::Pad,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Mean of present values
    Mean,
    /// Number of packages with a value > 0
    PresenceCount,
    /// Mean over values > 0
    PresenceMean,
}

impl From<ModeArg> for SummaryMode {
    fn from(arg: ModeArg) -> Self {
        match arg {
            ModeArg::Mean => SummaryMode::PlainMean,
            ModeArg::PresenceCount => SummaryMode::PresenceCount,
            ModeArg::PresenceMean => SummaryMode::PresenceMean,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e)).unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), PkgtrendCliError> {
    match cli.command {
        Commands::Run {
            config,
            catalog,
            analysis_dir,
            output,
            row_policy,
            clean,
            json,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(catalog) = catalog {
                config.catalog_path = catalog;
            }
            if let Some(analysis_dir) = analysis_dir {
                config.analysis_dir = analysis_dir;
            }
            if let Some(output) = output {
                config.output_dir = output;
            }
            if let Some(row_policy) = row_policy {
                config.row_policy = row_policy.into();
            }
            cmd_run(&config, clean, json)
        }
        Commands::Summarize {
            matrix_dir,
            mode,
            output,
        } => cmd_summarize(&matrix_dir, mode.into(), output.as_deref()),
        Commands::Config { config, json } => cmd_config(config.as_deref(), json),
        Commands::Doctor { config, json } => cmd_doctor(config.as_deref(), json),
    }
}

fn load_config(path: Option<&Path>) -> Result<AggregationConfig, PkgtrendCliError> {
    match path {
        Some(path) => Ok(AggregationConfig::load(path)?),
        None => Ok(AggregationConfig::default()),
    }
}

fn cmd_run(config: &AggregationConfig, clean: bool, json: bool) -> Result<(), PkgtrendCliError> {
    config.validate()?;
    if clean {
        OutputLayout::new(&config.output_dir).clean()?;
    }

    let report = run_with_config(config)?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("Run {}", report.run_id);
        println!("Catalog entries:  {}", report.catalog_entries);
        println!("Packages aligned: {}", report.packages_aligned);
        println!("Packages skipped: {}", report.packages_excluded().len());
        println!("\nMetrics:");
        for counts in &report.metrics {
            let mut line = format!("  {}: {} rows", counts.metric, counts.raw_rows);
            if let Some(filtered) = counts.filtered_rows {
                line.push_str(&format!(", {} after outlier filter", filtered));
            }
            if let Some(presence) = counts.presence_rows {
                line.push_str(&format!(", {} with presence", presence));
            }
            println!("{}", line);
        }
        println!("\nOutputs written to {}", config.output_dir.display());
    }
    Ok(())
}

fn cmd_summarize(matrix_dir: &Path, mode: SummaryMode, output: Option<&Path>) -> Result<(), PkgtrendCliError> {
    let summary = summarize_dir(matrix_dir, mode)?;
    if summary.is_empty() {
        return Err(PkgtrendCliError::NoMatrices(matrix_dir.to_path_buf()));
    }

    match output {
        Some(path) => table::write_summary(path, &summary)?,
        None => {
            let bytes = table::encode_summary(&summary)
                .map_err(|e| AggregateError::Csv { path: PathBuf::from("-"), source: e })?;
            let mut stdout = io::stdout().lock();
            stdout.write_all(&bytes)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn cmd_config(path: Option<&Path>, json: bool) -> Result<(), PkgtrendCliError> {
    let config = load_config(path)?;

    if json {
        println!("{}", config.to_json()?);
    } else {
        println!("Catalog:       {}", config.catalog_path.display());
        println!("Analysis dir:  {}", config.analysis_dir.display());
        println!("Series file:   {}", config.series_file);
        println!("Output root:   {}", config.output_dir.display());
        println!("Row policy:    {}", config.row_policy.as_str());
        println!("Fill value:    {}", config.fill_value);
        println!("\nMetrics ({}):", config.metrics.len());
        for metric in &config.metrics {
            let mut tags = Vec::new();
            if config.numeric_metrics.contains(metric) {
                tags.push("numeric");
            }
            if config.presence_metrics.contains(metric) {
                tags.push("presence");
            }
            if tags.is_empty() {
                println!("  {}", metric);
            } else {
                println!("  {} [{}]", metric, tags.join(", "));
            }
        }
    }
    Ok(())
}

fn cmd_doctor(path: Option<&Path>, json: bool) -> Result<(), PkgtrendCliError> {
    let mut checks: Vec<DoctorCheck> = Vec::new();

    checks.push(DoctorCheck {
        name: "pkgtrend_version".to_string(),
        status: CheckStatus::Ok,
        message: format!("pkgtrend version {}", PKGTREND_VERSION),
    });

    let config = match path.map(AggregationConfig::load).transpose() {
        Ok(config) => {
            let config = config.unwrap_or_default();
            let message = match path {
                Some(path) => format!("Configuration {} is valid", path.display()),
                None => "Using default configuration".to_string(),
            };
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Ok,
                message,
            });
            Some(config)
        }
        Err(e) => {
            checks.push(DoctorCheck {
                name: "config".to_string(),
                status: CheckStatus::Error,
                message: e.to_string(),
            });
            None
        }
    };

    if let Some(config) = &config {
        let catalog = match PackageCatalog::load(&config.catalog_path) {
            Ok(catalog) => {
                checks.push(DoctorCheck {
                    name: "catalog".to_string(),
                    status: if catalog.is_empty() { CheckStatus::Warning } else { CheckStatus::Ok },
                    message: format!("{} packages listed", catalog.len()),
                });
                Some(catalog)
            }
            Err(e) => {
                checks.push(DoctorCheck {
                    name: "catalog".to_string(),
                    status: CheckStatus::Error,
                    message: e.to_string(),
                });
                None
            }
        };

        if !config.analysis_dir.is_dir() {
            checks.push(DoctorCheck {
                name: "analysis_dir".to_string(),
                status: CheckStatus::Error,
                message: format!("{} is not a directory", config.analysis_dir.display()),
            });
        } else if let Some(catalog) = &catalog {
            let source = CsvSeriesSource::new(&config.analysis_dir, &config.series_file);
            let available = catalog
                .packages()
                .iter()
                .filter(|p| source.path_for(p).is_file())
                .count();
            checks.push(DoctorCheck {
                name: "analysis_dir".to_string(),
                status: if available == 0 { CheckStatus::Warning } else { CheckStatus::Ok },
                message: format!("{} of {} packages have a metrics file", available, catalog.len()),
            });
        }
    }

    let report = DoctorReport {
        version: PKGTREND_VERSION.to_string(),
        checks,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("pkgtrend Doctor Report");
        println!("======================");
        println!("Version: {}", report.version);
        println!("\nChecks:");

        for check in &report.checks {
            let status_icon = match check.status {
                CheckStatus::Ok => "[OK]",
                CheckStatus::Warning => "[WARN]",
                CheckStatus::Error => "[ERR]",
            };
            println!("  {} {}: {}", status_icon, check.name, check.message);
        }
    }

    let has_errors = report.checks.iter().any(|c| matches!(c.status, CheckStatus::Error));
    if has_errors {
        Err(PkgtrendCliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Error types

#[derive(Debug)]
enum PkgtrendCliError {
    Io(io::Error),
    Aggregate(AggregateError),
    Json(serde_json::Error),
    NoMatrices(PathBuf),
    DoctorFailed,
}

impl From<io::Error> for PkgtrendCliError {
    fn from(e: io::Error) -> Self {
        PkgtrendCliError::Io(e)
    }
}

impl From<AggregateError> for PkgtrendCliError {
    fn from(e: AggregateError) -> Self {
        PkgtrendCliError::Aggregate(e)
    }
}

impl From<serde_json::Error> for PkgtrendCliError {
    fn from(e: serde_json::Error) -> Self {
        PkgtrendCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PkgtrendCliError> for CliError {
    fn from(e: PkgtrendCliError) -> Self {
        match e {
            PkgtrendCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            PkgtrendCliError::Aggregate(e) => {
                let (code, hint) = match &e {
                    AggregateError::Io { .. } => ("IO_ERROR", "Check file paths and permissions"),
                    AggregateError::Csv { .. } | AggregateError::MalformedTable { .. } => {
                        ("TABLE_ERROR", "Check that the file is a comma-separated table with a header row")
                    }
                    AggregateError::JsonError(_) => ("JSON_ERROR", "Check JSON syntax"),
                    AggregateError::ConfigError(_) => {
                        ("CONFIG_ERROR", "Run 'pkgtrend config' to see the effective configuration")
                    }
                    AggregateError::CatalogError(_) => {
                        ("CATALOG_ERROR", "The catalog must be a JSON array of package names")
                    }
                };
                CliError {
                    code: code.to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            PkgtrendCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            PkgtrendCliError::NoMatrices(dir) => CliError {
                code: "NO_MATRICES".to_string(),
                message: format!("No non-empty matrix files found in {}", dir.display()),
                hint: Some("Point --matrix-dir at an aggregate output directory".to_string()),
            },
            PkgtrendCliError::DoctorFailed => CliError {
                code: "DOCTOR_FAILED".to_string(),
                message: "One or more health checks failed".to_string(),
                hint: Some("Review the doctor report for details".to_string()),
            },
        }
    }
}

// Report types

#[derive(serde::Serialize)]
struct DoctorReport {
    version: String,
    checks: Vec<DoctorCheck>,
}

#[derive(serde::Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    message: String,
}

#[derive(serde::Serialize)]
enum CheckStatus {
    Ok,
    Warning,
    Error,
}
