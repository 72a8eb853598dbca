//! EconWatch CLI: keep rolling windows of labor and output series on disk.
//!
//! Commands:
//! - `ingest [source|all]`: fetch missing periods, prune aged-out ones (default)
//! - `process [source|all]`: offline prune and re-derive, no network
//! - `trend [--years N]`: directional trends and the composite signal
//! - `status`: what is stored for each source

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use econwatch_core::data::{Dataset, DatasetStore};
use econwatch_core::period::Periodicity;
use econwatch_core::trend::{change_summary, composite, TrendAnalyzer, TrendResult};
use econwatch_core::PipelineConfig;
use econwatch_runner::{
    build_jobs, process_all, run_all, select_sources, RunProgress, RunSummary, SilentProgress,
    StdoutProgress,
};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "econwatch",
    about = "EconWatch CLI — rolling-window ingestion of labor share, GDP and occupation series"
)]
struct Cli {
    /// Path to a TOML config file. Built-in defaults are used without one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory. Overrides `data_dir` from the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Reference date (YYYY-MM-DD). Defaults to today.
    #[arg(long, global = true)]
    today: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch missing periods for one source or all of them.
    Ingest {
        /// Source id, or `all`.
        #[arg(default_value = "all")]
        source: String,

        /// Print the run reports as JSON instead of progress lines.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Prune aged-out rows and recompute derived fields without fetching.
    Process {
        /// Source id, or `all`.
        #[arg(default_value = "all")]
        source: String,

        /// Print the run reports as JSON instead of progress lines.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Compute trends over the stored windows and the composite signal.
    Trend {
        /// Span in years. Defaults to `trend.span_years` from the config.
        #[arg(long)]
        years: Option<u32>,
    },
    /// Report stored range, row count and last write per source.
    Status,
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    let today = resolve_today(cli.today.as_deref())?;

    let command = cli.command.unwrap_or(Commands::Ingest {
        source: "all".to_string(),
        json: false,
    });

    match command {
        Commands::Ingest { source, json } => run_ingest(&config, &source, today, json),
        Commands::Process { source, json } => run_process(&config, &source, today, json),
        Commands::Trend { years } => run_trend(&config, years),
        Commands::Status => run_status(&config),
    }
}

/// Logs go to stderr so stdout stays clean for reports.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("econwatch=info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn resolve_today(raw: Option<&str>) -> Result<NaiveDate> {
    match raw {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .with_context(|| format!("invalid --today '{s}', expected YYYY-MM-DD")),
        None => Ok(chrono::Local::now().date_naive()),
    }
}

fn progress_for(json: bool) -> &'static dyn RunProgress {
    if json {
        &SilentProgress
    } else {
        &StdoutProgress
    }
}

fn run_ingest(config: &PipelineConfig, selector: &str, today: NaiveDate, json: bool) -> Result<()> {
    let sources = select_sources(config, selector)?;
    let jobs = build_jobs(config, &sources)?;
    let store = DatasetStore::new(&config.data_dir);

    let summary = run_all(&jobs, &store, today, &config.retry, progress_for(json));
    finish_run(&summary, json)
}

fn run_process(config: &PipelineConfig, selector: &str, today: NaiveDate, json: bool) -> Result<()> {
    let schemas: Vec<_> = select_sources(config, selector)?
        .iter()
        .map(|s| s.schema())
        .collect();
    let store = DatasetStore::new(&config.data_dir);

    let summary = process_all(&schemas, &store, today, progress_for(json));
    finish_run(&summary, json)
}

fn finish_run(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&summary.reports)?);
    }
    for report in &summary.reports {
        for unresolved in &report.failed {
            eprintln!(
                "{}: {} unresolved ({}): {}",
                report.source, unresolved.period, unresolved.cause, unresolved.reason
            );
        }
    }
    if !summary.succeeded() {
        for (source, err) in &summary.errors {
            eprintln!("Error for {source}: {err}");
        }
        std::process::exit(1);
    }
    Ok(())
}

fn load_dataset(config: &PipelineConfig, store: &DatasetStore, id: &str) -> Result<Dataset> {
    let Some(spec) = config.source(id) else {
        bail!("trend source '{id}' is not configured");
    };
    store
        .read(&spec.schema())
        .with_context(|| format!("reading stored '{id}' (run `econwatch ingest {id}` to repair)"))
}

fn run_trend(config: &PipelineConfig, years: Option<u32>) -> Result<()> {
    let years = years.unwrap_or(config.trend.span_years);
    if years == 0 {
        bail!("--years must be positive");
    }
    let store = DatasetStore::new(&config.data_dir);
    let analyzer = TrendAnalyzer::new(config.trend.flat_tolerance);

    let labor = load_dataset(config, &store, &config.trend.labor_share_source)?;
    let gdp = load_dataset(config, &store, &config.trend.gdp_source)?;
    let accountants = load_dataset(config, &store, &config.trend.accountants_source)?;

    // Monthly series are compared on quarter-end months when any input is quarterly.
    let any_quarterly = [&labor, &gdp, &accountants]
        .iter()
        .any(|d| d.schema().periodicity == Periodicity::Quarterly);
    let (labor, gdp, accountants) = if any_quarterly {
        (labor.to_quarterly(), gdp.to_quarterly(), accountants.to_quarterly())
    } else {
        (labor, gdp, accountants)
    };
    let units = labor.schema().periodicity.units_per_year();
    let span = (years * units) as usize;

    let labor_trend = analyzer
        .trend(&labor, span)
        .with_context(|| format!("trend for {}", labor.source()))?;
    let gdp_trend = analyzer
        .trend(&gdp, span)
        .with_context(|| format!("trend for {}", gdp.source()))?;
    let accountants_trend = analyzer
        .trend(&accountants, span)
        .with_context(|| format!("trend for {}", accountants.source()))?;

    println!("Trend over {years} year(s) ({span} periods)");
    println!();
    println!(
        "{:<24} {:<20} {:<6} {:>12} {:>10} {:>10}",
        "Source", "Metric", "Dir", "Magnitude", "1y %", "2y %"
    );
    println!("{}", "-".repeat(87));
    print_trend_row(labor.source(), &labor_trend, &labor);
    print_trend_row(gdp.source(), &gdp_trend, &gdp);
    print_trend_row(accountants.source(), &accountants_trend, &accountants);

    // Supplementary series are reported but never feed the composite.
    let composite_ids = [
        &config.trend.labor_share_source,
        &config.trend.gdp_source,
        &config.trend.accountants_source,
    ];
    for spec in config.resolved_sources() {
        if composite_ids.contains(&&spec.id) {
            continue;
        }
        let dataset = match store.read(&spec.schema()) {
            Ok(d) => d,
            Err(e) => {
                println!("{:<24} {e}", spec.id);
                continue;
            }
        };
        let own_span = (years * spec.periodicity.units_per_year()) as usize;
        match analyzer.trend(&dataset, own_span) {
            Ok(t) => print_trend_row(&spec.id, &t, &dataset),
            Err(e) => println!("{:<24} {e}", spec.id),
        }
    }

    println!();
    let signal = composite(&labor_trend, &gdp_trend, &accountants_trend);
    println!("Composite signal: {signal}");
    Ok(())
}

fn print_trend_row(source: &str, t: &TrendResult, dataset: &Dataset) {
    let units = dataset.schema().periodicity.units_per_year() as usize;
    let pct = |lookback: usize| match change_summary(dataset, &[lookback]) {
        Ok(s) => format!("{:+.2}", s.changes[0].percent),
        Err(_) => "n/a".to_string(),
    };
    println!(
        "{:<24} {:<20} {:<6} {:>12.5} {:>10} {:>10}",
        source,
        t.metric,
        t.direction.to_string(),
        t.magnitude,
        pct(units),
        pct(2 * units)
    );
    if let Ok(summary) = change_summary(dataset, &[units, 2 * units]) {
        println!("{:<24} {}", "", summary.direction);
    }
}

fn run_status(config: &PipelineConfig) -> Result<()> {
    let store = DatasetStore::new(&config.data_dir);
    println!("Data directory: {}", config.data_dir.display());
    println!();
    println!(
        "{:<24} {:<10} {:>6} {:<20} {:>6} {:<20}",
        "Source", "Cadence", "Window", "Range", "Rows", "Written"
    );
    println!("{}", "-".repeat(91));

    for spec in config.resolved_sources() {
        let quarantined = store
            .data_path(&spec.id)
            .with_extension("csv.quarantined")
            .exists();
        let (range, rows, written) = match store.meta(&spec.id) {
            Some(meta) => (
                format!(
                    "{} to {}",
                    meta.first_period.as_deref().unwrap_or("-"),
                    meta.last_period.as_deref().unwrap_or("-")
                ),
                meta.row_count.to_string(),
                meta.written_at.format("%Y-%m-%d %H:%M").to_string(),
            ),
            None => ("(not stored)".to_string(), "0".to_string(), "-".to_string()),
        };
        println!(
            "{:<24} {:<10} {:>6} {:<20} {:>6} {:<20}",
            spec.id,
            spec.periodicity.to_string(),
            spec.window,
            range,
            rows,
            written
        );
        if quarantined {
            println!("{:<24} quarantined file present", "");
        }
    }
    Ok(())
}
