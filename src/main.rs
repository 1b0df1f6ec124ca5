// Entry point and high-level CLI flow.
//
// - `run` executes the configured reports against the export directory and
//   writes the sheets, then prints and optionally saves a run summary.
// - `list` shows the report catalog.
// - `query <KEY>` prints the query a report would send for the reference date.
use ads_report::config::{OutputKind, RunConfig};
use ads_report::date_range::compute;
use ads_report::output::{preview_table_rows, write_json};
use ads_report::reports;
use ads_report::util::format_int;
use ads_report::{
    CsvReportSource, CsvSheetWriter, ReportRunner, ReportSpec, SheetWriter, XlsxWorkbookWriter,
};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ads-report")]
#[command(version, about = "Localized advertising performance reports", long_about = None)]
struct Cli {
    /// Verbose output (`-v` for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Run configuration (TOML); defaults apply when the file is absent
    #[arg(short, long, global = true, default_value = "ads_report.toml")]
    config: PathBuf,

    /// Reference instant in RFC 3339; defaults to now
    #[arg(long, global = true, value_name = "RFC3339")]
    reference: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run reports and write their sheets
    Run {
        /// Only run these report keys (repeatable); overrides the config list
        #[arg(long, value_name = "KEY")]
        only: Vec<String>,

        /// Also export a single conversion action (repeatable)
        #[arg(long, value_name = "NAME")]
        conversion_action: Vec<String>,
    },

    /// List the report catalog
    List,

    /// Print the query a report would execute
    Query {
        #[arg(value_name = "KEY")]
        key: String,
    },
}

fn init_tracing(verbose: u8) {
    let default = if verbose > 0 { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: &Path) -> Result<RunConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "config not found, using defaults");
        return Ok(RunConfig::default());
    }
    RunConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

fn reference_instant(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --reference `{}`", s))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

fn open_writer(config: &RunConfig) -> Result<Box<dyn SheetWriter>> {
    let path = &config.output.path;
    Ok(match config.output.kind {
        OutputKind::Csv => Box::new(CsvSheetWriter::new(path)),
        OutputKind::Xlsx => Box::new(
            XlsxWorkbookWriter::open(path)
                .with_context(|| format!("opening workbook {}", path.display()))?,
        ),
    })
}

fn handle_run(
    config: &RunConfig,
    reference: DateTime<Utc>,
    only: &[String],
    conversion_actions: &[String],
) -> Result<()> {
    let catalog = reports::catalog().context("report catalog is invalid")?;
    let keys = if only.is_empty() { config.reports.as_slice() } else { only };
    let mut specs: Vec<ReportSpec> = reports::select(&catalog, keys)?;
    for name in conversion_actions {
        specs.push(reports::single_conversion_action(name)?);
    }

    let clock = config.clock.civil_clock()?;
    let source = CsvReportSource::new(&config.source_dir);
    let mut writer = open_writer(config)?;
    info!(
        reports = specs.len(),
        source = %config.source_dir.display(),
        output = %config.output.path.display(),
        "starting run"
    );

    let summary = {
        let mut runner = ReportRunner::new(&source, writer.as_mut())
            .with_clock(clock)
            .with_retry(config.retry.to_policy());
        runner.run_all(&specs, reference)
    };
    // The summary is reported even when the final save fails.
    let finished = writer.finish();

    println!("\nRun summary ({} reports)\n", format_int(specs.len() as u64));
    preview_table_rows(&summary.to_rows(), specs.len());

    if let Some(path) = &config.summary_path {
        write_json(path, &summary.stats())
            .with_context(|| format!("writing summary {}", path.display()))?;
        info!(path = %path.display(), "summary written");
    }

    finished.context("finishing output")?;

    if summary.failed() > 0 {
        bail!("{} of {} reports failed", summary.failed(), specs.len());
    }
    Ok(())
}

fn handle_query(config: &RunConfig, reference: DateTime<Utc>, key: &str) -> Result<()> {
    let catalog = reports::catalog()?;
    let spec = reports::select(&catalog, &[key.to_string()])?.remove(0);
    let range = compute(reference, &config.clock.civil_clock()?, spec.lookback());
    println!("{}", ads_report::query::build(&spec, range));
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli.config)?;
    let reference = reference_instant(cli.reference.as_deref())?;

    match cli.command {
        Commands::Run { only, conversion_action } => {
            handle_run(&config, reference, &only, &conversion_action)
        }
        Commands::List => {
            let catalog = reports::catalog()?;
            preview_table_rows(&reports::catalog_rows(&catalog), catalog.len());
            Ok(())
        }
        Commands::Query { key } => handle_query(&config, reference, &key),
    }
}
