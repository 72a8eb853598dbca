//! Per-source run reports and the batch summary.

use crate::error::RunError;
use econwatch_core::period::Period;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Plan, fetch missing periods, merge, write.
    Ingest,
    /// No network: prune aged-out rows and recompute derived fields.
    Process,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingest => f.write_str("ingest"),
            Self::Process => f.write_str("process"),
        }
    }
}

/// Why a missing period is still missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedCause {
    /// The request failed (retries exhausted or a permanent error).
    FetchFailed,
    /// The source answered but left the period out.
    NotInResponse,
    /// Left out of the response and newer than anything stored: the source
    /// has not released it yet.
    Unpublished,
}

impl fmt::Display for UnresolvedCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed => f.write_str("fetch failed"),
            Self::NotInResponse => f.write_str("not in response"),
            Self::Unpublished => f.write_str("not yet published"),
        }
    }
}

/// A missing period that the run could not fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedPeriod {
    pub period: Period,
    pub cause: UnresolvedCause,
    pub reason: String,
}

/// What one run did to one source.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub source: String,
    pub mode: RunMode,
    /// Window length W.
    pub required: usize,
    /// Required periods already stored before the run.
    pub already_present: usize,
    /// Required periods absent before the run.
    pub missing: usize,
    /// Missing periods filled by this run.
    pub fetched: usize,
    pub failed: Vec<UnresolvedPeriod>,
    /// Stored rows dropped because they aged out of the window.
    pub pruned: usize,
    /// Fetched rows outside the window, ignored.
    pub out_of_window: usize,
    /// Periods fetched twice with different values.
    pub conflicts: Vec<Period>,
    /// Periods where a derived field is undefined (e.g. ratio over zero).
    pub undefined_derivations: Vec<Period>,
    /// Required periods still absent after the run.
    pub gaps: usize,
    pub rows_after: usize,
    /// False when the plan was a no-op and nothing was written.
    pub written: bool,
}

impl SourceReport {
    pub(crate) fn new(source: &str, mode: RunMode) -> Self {
        Self {
            source: source.to_string(),
            mode,
            required: 0,
            already_present: 0,
            missing: 0,
            fetched: 0,
            failed: Vec::new(),
            pruned: 0,
            out_of_window: 0,
            conflicts: Vec::new(),
            undefined_derivations: Vec::new(),
            gaps: 0,
            rows_after: 0,
            written: false,
        }
    }

    /// The plan had missing periods, none of them could be fetched, and at
    /// least one is missing for a reason other than not being released yet.
    pub fn entire_plan_failed(&self) -> bool {
        self.mode == RunMode::Ingest
            && self.missing > 0
            && self.fetched == 0
            && self
                .failed
                .iter()
                .any(|u| u.cause != UnresolvedCause::Unpublished)
    }

    pub fn is_complete(&self) -> bool {
        self.gaps == 0
    }
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} present, {} fetched, {} failed, {} pruned, {}/{} rows",
            self.source,
            self.already_present,
            self.fetched,
            self.failed.len(),
            self.pruned,
            self.rows_after,
            self.required
        )?;
        if !self.conflicts.is_empty() {
            write!(f, ", {} conflicts", self.conflicts.len())?;
        }
        if !self.undefined_derivations.is_empty() {
            write!(f, ", {} undefined derivations", self.undefined_derivations.len())?;
        }
        Ok(())
    }
}

/// Outcome of running a batch of sources.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<SourceReport>,
    /// Sources whose run was aborted before a report could be produced.
    pub errors: Vec<(String, RunError)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.reports.len() + self.errors.len()
    }

    /// Sources that errored out or resolved none of their missing periods.
    pub fn failed_sources(&self) -> Vec<&str> {
        self.errors
            .iter()
            .map(|(source, _)| source.as_str())
            .chain(
                self.reports
                    .iter()
                    .filter(|r| r.entire_plan_failed())
                    .map(|r| r.source.as_str()),
            )
            .collect()
    }

    pub fn succeeded(&self) -> bool {
        self.failed_sources().is_empty()
    }

    pub fn report(&self, source: &str) -> Option<&SourceReport> {
        self.reports.iter().find(|r| r.source == source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unresolved(quarter: u32, cause: UnresolvedCause) -> UnresolvedPeriod {
        UnresolvedPeriod {
            period: Period::quarter(2025, quarter).unwrap(),
            cause,
            reason: "HTTP 503".into(),
        }
    }

    fn ingest(missing: usize, fetched: usize) -> SourceReport {
        let mut report = SourceReport::new("labor_share", RunMode::Ingest);
        report.required = 14;
        report.missing = missing;
        report.fetched = fetched;
        report.failed = (0..missing - fetched)
            .map(|_| unresolved(1, UnresolvedCause::FetchFailed))
            .collect();
        report
    }

    #[test]
    fn entire_plan_failed_only_when_nothing_resolved() {
        assert!(ingest(3, 0).entire_plan_failed());
        assert!(!ingest(3, 1).entire_plan_failed());
        assert!(!ingest(0, 0).entire_plan_failed());

        let mut process = ingest(3, 0);
        process.mode = RunMode::Process;
        assert!(!process.entire_plan_failed());
    }

    #[test]
    fn unreleased_newest_period_is_not_a_failed_plan() {
        let mut report = ingest(1, 0);
        report.failed = vec![unresolved(2, UnresolvedCause::Unpublished)];
        assert!(!report.entire_plan_failed());

        report.missing = 2;
        report.failed.insert(0, unresolved(1, UnresolvedCause::NotInResponse));
        assert!(report.entire_plan_failed());
    }

    #[test]
    fn summary_fails_on_error_or_failed_plan() {
        let mut summary = RunSummary {
            reports: vec![ingest(1, 1), ingest(0, 0)],
            errors: Vec::new(),
        };
        assert!(summary.succeeded());

        summary.reports[1] = ingest(2, 0);
        summary.reports[1].source = "real_gdp_per_capita".into();
        assert_eq!(summary.failed_sources(), vec!["real_gdp_per_capita"]);

        summary.reports[1] = ingest(0, 0);
        summary
            .errors
            .push(("accountants_employed".into(), RunError::UnknownSource("x".into())));
        assert!(!summary.succeeded());
        assert_eq!(summary.total(), 3);
    }

    #[test]
    fn display_is_one_line() {
        let mut report = ingest(1, 1);
        report.already_present = 13;
        report.rows_after = 14;
        assert_eq!(
            report.to_string(),
            "labor_share: 13 present, 1 fetched, 0 failed, 0 pruned, 14/14 rows"
        );
    }
}
