//! Window planning: which periods must be fetched and which have aged out.

use crate::period::{last_n_periods, Period, PeriodError, Periodicity};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A rolling window definition: the `length` most recent published periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    pub periodicity: Periodicity,
    pub length: usize,
}

impl WindowSpec {
    pub fn new(periodicity: Periodicity, length: usize) -> Self {
        Self {
            periodicity,
            length,
        }
    }

    /// Periods the window must hold as of `today`, oldest first.
    pub fn required_periods(&self, today: NaiveDate) -> Result<Vec<Period>, PeriodError> {
        Ok(last_n_periods(today, self.periodicity, self.length)?.collect())
    }
}

/// The work for one run of one source. Consumed once and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Every period the window must hold, ascending.
    pub required: Vec<Period>,
    /// Required periods absent locally, ascending (oldest first).
    pub missing: Vec<Period>,
    /// Locally present periods outside the window.
    pub stale: BTreeSet<Period>,
}

impl FetchPlan {
    /// Nothing to fetch and nothing to prune.
    pub fn is_noop(&self) -> bool {
        self.missing.is_empty() && self.stale.is_empty()
    }

    pub fn requires(&self, period: &Period) -> bool {
        self.required.contains(period)
    }

    /// Number of required periods already stored.
    pub fn already_present(&self) -> usize {
        self.required.len() - self.missing.len()
    }
}

/// Compare the required window against what is stored.
///
/// `missing` keeps `required`'s order so blob-style sources can be walked
/// chronologically. When `present` equals `required` the plan is empty and the
/// caller performs no network activity.
pub fn plan(required: &[Period], present: &BTreeSet<Period>) -> FetchPlan {
    let required_set: BTreeSet<Period> = required.iter().copied().collect();

    let mut seen = BTreeSet::new();
    let missing = required
        .iter()
        .filter(|p| !present.contains(*p) && seen.insert(**p))
        .copied()
        .collect();

    let stale = present
        .iter()
        .filter(|p| !required_set.contains(*p))
        .copied()
        .collect();

    FetchPlan {
        required: required.to_vec(),
        missing,
        stale,
    }
}
