//! Source fetcher trait, observation rows and fetch error classification.
//!
//! The SourceFetcher trait abstracts over statistical agencies (FRED, Census
//! CPS) so the window engine can be driven by stubs in tests. Fetchers know
//! nothing about local storage or windows.

use crate::period::Period;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One period of normalized observations: metric name -> value.
///
/// An absent metric means "no value" (not published, or an undefined
/// derivation such as a ratio over zero).
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub period: Period,
    pub values: BTreeMap<String, f64>,
}

impl ObservationRow {
    pub fn new(period: Period) -> Self {
        Self {
            period,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, metric: impl Into<String>, value: f64) -> Self {
        self.values.insert(metric.into(), value);
        self
    }

    pub fn get(&self, metric: &str) -> Option<f64> {
        self.values.get(metric).copied()
    }

    pub fn set(&mut self, metric: impl Into<String>, value: f64) {
        self.values.insert(metric.into(), value);
    }

    pub fn remove(&mut self, metric: &str) -> Option<f64> {
        self.values.remove(metric)
    }
}

/// Fetch failures, split by whether retrying can help.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Timeouts, 5xx, 429, connection resets. Worth retrying.
    #[error("transient fetch failure: {0}")]
    Transient(String),

    /// Malformed payloads, removed fields, 4xx. Retrying will not help.
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// How the pipeline should batch a plan's missing periods for a fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchGranularity {
    /// One request per period (URL parameterized by year and month).
    PerPeriod,
    /// One request returns a multi-period blob; fetch all missing periods at once.
    Blob,
}

/// Trait for source fetchers (FRED graph CSV, CPS monthly extracts, stubs).
///
/// A fetcher may return rows for periods it was not asked about (a blob
/// covering more than the gap). Callers must intersect the response with the
/// window before merging.
pub trait SourceFetcher: Send + Sync {
    /// Human-readable name of this fetcher.
    fn name(&self) -> &str;

    fn granularity(&self) -> FetchGranularity;

    /// Fetch observations for `periods` (ascending).
    fn fetch(&self, periods: &[Period]) -> Result<Vec<ObservationRow>, FetchError>;
}

impl<T: SourceFetcher + ?Sized> SourceFetcher for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn granularity(&self) -> FetchGranularity {
        (**self).granularity()
    }

    fn fetch(&self, periods: &[Period]) -> Result<Vec<ObservationRow>, FetchError> {
        (**self).fetch(periods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_builder_and_accessors() {
        let period = Period::month(2025, 7).unwrap();
        let mut row = ObservationRow::new(period)
            .with_value("employed_count", 40.0)
            .with_value("total_count", 50.0);

        assert_eq!(row.get("employed_count"), Some(40.0));
        assert_eq!(row.get("missing"), None);

        row.set("employed_count", 41.0);
        assert_eq!(row.get("employed_count"), Some(41.0));
        assert_eq!(row.remove("total_count"), Some(50.0));
        assert_eq!(row.values.len(), 1);
    }

    #[test]
    fn error_classification() {
        assert!(FetchError::Transient("timeout".into()).is_transient());
        assert!(!FetchError::Permanent("bad header".into()).is_transient());
        assert_eq!(FetchError::Permanent("bad header".into()).message(), "bad header");
    }
}
