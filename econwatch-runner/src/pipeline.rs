//! Per-source run cycle: load → plan → fetch → merge → write.
//!
//! Each source owns its dataset for the whole cycle. `run_all` fans sources
//! out over rayon; nothing is shared between them except the store root and
//! the progress reporter.

use crate::error::RunError;
use crate::progress::RunProgress;
use crate::report::{RunMode, RunSummary, SourceReport, UnresolvedCause, UnresolvedPeriod};
use chrono::NaiveDate;
use econwatch_core::config::PipelineConfig;
use econwatch_core::data::http::HttpClient;
use econwatch_core::data::{
    merge, DatasetStore, FetchGranularity, ObservationRow, RetryPolicy, SeriesSchema,
    SourceFetcher,
};
use econwatch_core::period::Period;
use econwatch_core::sources::SourceSpec;
use econwatch_core::window::{plan, FetchPlan};
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{info, warn};

const NOT_IN_RESPONSE: &str = "not present in source response";

/// One source to ingest: its schema and the fetcher that feeds it.
pub struct SourceJob {
    pub schema: SeriesSchema,
    pub fetcher: Box<dyn SourceFetcher>,
}

impl SourceJob {
    pub fn new(schema: SeriesSchema, fetcher: Box<dyn SourceFetcher>) -> Self {
        Self { schema, fetcher }
    }
}

/// Live jobs for `sources`, sharing one HTTP client.
pub fn build_jobs(config: &PipelineConfig, sources: &[SourceSpec]) -> Result<Vec<SourceJob>, RunError> {
    let client = HttpClient::new(&config.http).map_err(RunError::Fetcher)?;
    Ok(sources
        .iter()
        .map(|spec| SourceJob::new(spec.schema(), spec.build_fetcher(&client, &config.http)))
        .collect())
}

/// Resolve `selector` ("all" or a source id) against the configured catalog.
pub fn select_sources(config: &PipelineConfig, selector: &str) -> Result<Vec<SourceSpec>, RunError> {
    if selector == "all" {
        return Ok(config.resolved_sources());
    }
    config
        .source(selector)
        .map(|s| vec![s])
        .ok_or_else(|| RunError::UnknownSource(selector.to_string()))
}

/// Bring one source's stored window up to date as of `today`.
///
/// A no-op plan touches neither the network nor the disk. Fetch failures are
/// recovered per batch and reported; store and window errors abort the run.
pub fn run_source(
    schema: &SeriesSchema,
    store: &DatasetStore,
    fetcher: &dyn SourceFetcher,
    today: NaiveDate,
    retry: &RetryPolicy,
) -> Result<SourceReport, RunError> {
    let existing = store.load(schema)?;
    let required = schema.window_spec().required_periods(today)?;
    let fetch_plan = plan(&required, &existing.periods());

    let mut report = SourceReport::new(&schema.source, RunMode::Ingest);
    report.required = required.len();
    report.already_present = fetch_plan.already_present();
    report.missing = fetch_plan.missing.len();

    if fetch_plan.is_noop() {
        info!(source = %schema.source, "window up to date, nothing to fetch");
        report.rows_after = existing.len();
        return Ok(report);
    }

    let (fetched, failed) = fetch_missing(&schema.source, fetcher, &fetch_plan, retry);
    let outcome = merge(existing, fetched, &fetch_plan);
    let dataset = outcome.dataset;
    let stats = outcome.stats;

    report.fetched = fetch_plan
        .missing
        .iter()
        .filter(|p| dataset.contains(p))
        .count();
    report.failed = classify_unpublished(failed, dataset.last_period());
    report.pruned = stats.pruned;
    report.out_of_window = stats.out_of_window;
    report.conflicts = stats.conflicts.iter().map(|c| c.period).collect();
    report.undefined_derivations = stats.undefined_derivations;
    report.gaps = required.len() - dataset.len();
    report.rows_after = dataset.len();

    if stats.inserted + stats.replaced + stats.pruned > 0 {
        store.write(&dataset)?;
        report.written = true;
    }

    if report.entire_plan_failed() {
        warn!(source = %schema.source, missing = report.missing, "no missing period could be fetched");
    } else {
        info!(
            source = %schema.source,
            fetched = report.fetched,
            failed = report.failed.len(),
            pruned = report.pruned,
            "source updated"
        );
    }
    Ok(report)
}

/// Batch the plan's missing periods by the fetcher's granularity and run
/// each batch under the retry policy.
fn fetch_missing(
    source: &str,
    fetcher: &dyn SourceFetcher,
    fetch_plan: &FetchPlan,
    retry: &RetryPolicy,
) -> (Vec<ObservationRow>, Vec<UnresolvedPeriod>) {
    if fetch_plan.missing.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let batches: Vec<Vec<Period>> = match fetcher.granularity() {
        FetchGranularity::PerPeriod => fetch_plan.missing.iter().map(|p| vec![*p]).collect(),
        FetchGranularity::Blob => vec![fetch_plan.missing.clone()],
    };

    let mut rows = Vec::new();
    let mut failed = Vec::new();
    for batch in batches {
        let label = format!("{source} via {}", fetcher.name());
        match retry.run(&label, |_| fetcher.fetch(&batch)) {
            Ok(batch_rows) => {
                let returned: BTreeSet<Period> = batch_rows.iter().map(|r| r.period).collect();
                failed.extend(
                    batch
                        .iter()
                        .filter(|p| !returned.contains(*p))
                        .map(|p| UnresolvedPeriod {
                            period: *p,
                            cause: UnresolvedCause::NotInResponse,
                            reason: NOT_IN_RESPONSE.to_string(),
                        }),
                );
                rows.extend(batch_rows);
            }
            Err(e) => {
                warn!(source, fetcher = fetcher.name(), periods = batch.len(), error = %e, "batch failed");
                failed.extend(batch.iter().map(|p| UnresolvedPeriod {
                    period: *p,
                    cause: UnresolvedCause::FetchFailed,
                    reason: e.to_string(),
                }));
            }
        }
    }
    (rows, failed)
}

/// Periods the source left out that are newer than everything stored have
/// not been released yet. Older omissions stay as they are.
fn classify_unpublished(
    mut failed: Vec<UnresolvedPeriod>,
    newest_stored: Option<Period>,
) -> Vec<UnresolvedPeriod> {
    let Some(newest) = newest_stored else {
        return failed;
    };
    for unresolved in &mut failed {
        if unresolved.cause == UnresolvedCause::NotInResponse && unresolved.period > newest {
            unresolved.cause = UnresolvedCause::Unpublished;
        }
    }
    failed
}

/// Offline maintenance: prune aged-out rows and recompute derived fields.
pub fn process_source(
    schema: &SeriesSchema,
    store: &DatasetStore,
    today: NaiveDate,
) -> Result<SourceReport, RunError> {
    let existing = store.load(schema)?;
    let required = schema.window_spec().required_periods(today)?;
    let fetch_plan = plan(&required, &existing.periods());

    let mut report = SourceReport::new(&schema.source, RunMode::Process);
    report.required = required.len();
    report.already_present = fetch_plan.already_present();
    report.missing = fetch_plan.missing.len();

    let outcome = merge(existing, Vec::new(), &fetch_plan);
    let mut dataset = outcome.dataset;
    report.undefined_derivations = dataset.rederive();
    report.pruned = outcome.stats.pruned;
    report.gaps = required.len() - dataset.len();
    report.rows_after = dataset.len();

    if !dataset.is_empty() || report.pruned > 0 {
        store.write(&dataset)?;
        report.written = true;
    }

    info!(
        source = %schema.source,
        pruned = report.pruned,
        gaps = report.gaps,
        "source processed"
    );
    Ok(report)
}

/// Ingest every job concurrently. Reports come back in job order.
pub fn run_all(
    jobs: &[SourceJob],
    store: &DatasetStore,
    today: NaiveDate,
    retry: &RetryPolicy,
    progress: &dyn RunProgress,
) -> RunSummary {
    let total = jobs.len();
    let results: Vec<(String, Result<SourceReport, RunError>)> = jobs
        .par_iter()
        .enumerate()
        .map(|(i, job)| {
            let source = job.schema.source.clone();
            progress.on_start(&source, i, total);
            let result = run_source(&job.schema, store, job.fetcher.as_ref(), today, retry);
            progress.on_complete(&source, i, total, &result);
            (source, result)
        })
        .collect();

    finish(results, progress)
}

/// Process every schema concurrently. Reports come back in input order.
pub fn process_all(
    schemas: &[SeriesSchema],
    store: &DatasetStore,
    today: NaiveDate,
    progress: &dyn RunProgress,
) -> RunSummary {
    let total = schemas.len();
    let results: Vec<(String, Result<SourceReport, RunError>)> = schemas
        .par_iter()
        .enumerate()
        .map(|(i, schema)| {
            progress.on_start(&schema.source, i, total);
            let result = process_source(schema, store, today);
            progress.on_complete(&schema.source, i, total, &result);
            (schema.source.clone(), result)
        })
        .collect();

    finish(results, progress)
}

fn finish(results: Vec<(String, Result<SourceReport, RunError>)>, progress: &dyn RunProgress) -> RunSummary {
    let mut summary = RunSummary::default();
    for (source, result) in results {
        match result {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                warn!(source = %source, error = %e, "source run aborted");
                summary.errors.push((source, e));
            }
        }
    }
    progress.on_batch_complete(&summary);
    summary
}
