//! Progress callbacks for multi-source runs.

use crate::error::RunError;
use crate::report::{RunSummary, SourceReport};

/// Progress callback for multi-source operations.
///
/// Sources run on a rayon pool, so callbacks for different sources may
/// arrive interleaved and from different threads.
pub trait RunProgress: Send + Sync {
    /// Called when a source's run starts.
    fn on_start(&self, source: &str, index: usize, total: usize);

    /// Called when a source's run completes.
    fn on_complete(&self, source: &str, index: usize, total: usize, result: &Result<SourceReport, RunError>);

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, summary: &RunSummary);
}

/// Simple progress reporter that prints to stdout.
pub struct StdoutProgress;

impl RunProgress for StdoutProgress {
    fn on_start(&self, source: &str, index: usize, total: usize) {
        println!("[{}/{}] {source}...", index + 1, total);
    }

    fn on_complete(
        &self,
        source: &str,
        _index: usize,
        _total: usize,
        result: &Result<SourceReport, RunError>,
    ) {
        match result {
            Ok(report) if report.entire_plan_failed() => println!("  FAIL: {report}"),
            Ok(report) => println!("  OK: {report}"),
            Err(e) => println!("  FAIL: {source}: {e}"),
        }
    }

    fn on_batch_complete(&self, summary: &RunSummary) {
        let failed = summary.failed_sources().len();
        println!(
            "\nRun complete: {}/{} sources succeeded, {failed} failed",
            summary.total() - failed,
            summary.total()
        );
    }
}

/// Discards every callback.
pub struct SilentProgress;

impl RunProgress for SilentProgress {
    fn on_start(&self, _source: &str, _index: usize, _total: usize) {}

    fn on_complete(&self, _: &str, _: usize, _: usize, _: &Result<SourceReport, RunError>) {}

    fn on_batch_complete(&self, _summary: &RunSummary) {}
}
