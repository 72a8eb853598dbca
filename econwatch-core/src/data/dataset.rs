//! In-memory dataset for one source: schema plus ordered, unique rows.

use super::provider::ObservationRow;
use crate::period::{Period, Periodicity};
use crate::window::WindowSpec;
use std::collections::BTreeSet;
use thiserror::Error;

/// A metric computed from other metrics of the same row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedField {
    /// `name = numerator / denominator`. Undefined (absent) when either input
    /// is missing or the denominator is zero.
    Ratio {
        name: String,
        numerator: String,
        denominator: String,
    },
}

impl DerivedField {
    pub fn name(&self) -> &str {
        match self {
            Self::Ratio { name, .. } => name,
        }
    }

    /// Recompute this field on `row`. Returns `false` when the value is undefined.
    pub fn apply(&self, row: &mut ObservationRow) -> bool {
        match self {
            Self::Ratio {
                name,
                numerator,
                denominator,
            } => match (row.get(numerator), row.get(denominator)) {
                (Some(num), Some(den)) if den != 0.0 => {
                    row.set(name.clone(), num / den);
                    true
                }
                _ => {
                    row.remove(name);
                    false
                }
            },
        }
    }
}

/// Column layout and window of one source's dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSchema {
    /// Source identifier, also the storage directory name.
    pub source: String,
    pub periodicity: Periodicity,
    /// Target window length W.
    pub window: usize,
    /// Metric columns in stored order, derived columns included.
    pub columns: Vec<String>,
    /// Metric used for trend analysis.
    pub primary: String,
    pub derived: Vec<DerivedField>,
}

impl SeriesSchema {
    pub fn window_spec(&self) -> WindowSpec {
        WindowSpec::new(self.periodicity, self.window)
    }

    pub fn is_derived(&self, column: &str) -> bool {
        self.derived.iter().any(|d| d.name() == column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatasetError {
    #[error("{dataset}: period {period} is not {expected}")]
    PeriodicityMismatch {
        dataset: String,
        period: Period,
        expected: Periodicity,
    },

    #[error("{dataset}: duplicate rows for period {period}")]
    DuplicatePeriod { dataset: String, period: Period },
}

/// Ordered rows for one source. Mutated only through the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    schema: SeriesSchema,
    rows: Vec<ObservationRow>,
}

impl Dataset {
    pub fn empty(schema: SeriesSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    /// Build a dataset from rows in any order. Rejects foreign periodicities
    /// and duplicate periods.
    pub fn from_rows(schema: SeriesSchema, mut rows: Vec<ObservationRow>) -> Result<Self, DatasetError> {
        if let Some(bad) = rows
            .iter()
            .find(|r| r.period.periodicity() != schema.periodicity)
        {
            return Err(DatasetError::PeriodicityMismatch {
                dataset: schema.source.clone(),
                period: bad.period,
                expected: schema.periodicity,
            });
        }
        rows.sort_by_key(|r| r.period);
        if let Some(pair) = rows.windows(2).find(|w| w[0].period == w[1].period) {
            return Err(DatasetError::DuplicatePeriod {
                dataset: schema.source.clone(),
                period: pair[0].period,
            });
        }
        Ok(Self { schema, rows })
    }

    /// Rows already known to be ascending and unique.
    pub(crate) fn from_sorted_unique(schema: SeriesSchema, rows: Vec<ObservationRow>) -> Self {
        debug_assert!(rows.windows(2).all(|w| w[0].period < w[1].period));
        Self { schema, rows }
    }

    pub fn schema(&self) -> &SeriesSchema {
        &self.schema
    }

    pub fn source(&self) -> &str {
        &self.schema.source
    }

    pub fn rows(&self) -> &[ObservationRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<ObservationRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The set of stored periods, materialized once per run for planning.
    pub fn periods(&self) -> BTreeSet<Period> {
        self.rows.iter().map(|r| r.period).collect()
    }

    pub fn contains(&self, period: &Period) -> bool {
        self.rows.binary_search_by_key(period, |r| r.period).is_ok()
    }

    pub fn first_period(&self) -> Option<Period> {
        self.rows.first().map(|r| r.period)
    }

    pub fn last_period(&self) -> Option<Period> {
        self.rows.last().map(|r| r.period)
    }

    /// `(period, value)` pairs for `metric`, skipping rows without a value.
    pub fn series(&self, metric: &str) -> Vec<(Period, f64)> {
        self.rows
            .iter()
            .filter_map(|r| r.get(metric).map(|v| (r.period, v)))
            .collect()
    }

    /// Recompute every derived field on every row.
    ///
    /// Returns the periods where a derivation was undefined.
    pub fn rederive(&mut self) -> Vec<Period> {
        let derived = self.schema.derived.clone();
        let mut undefined = Vec::new();
        for row in &mut self.rows {
            for field in &derived {
                if !field.apply(row) {
                    undefined.push(row.period);
                }
            }
        }
        undefined
    }

    /// Quarter-end months of a monthly dataset, re-tagged as quarters.
    ///
    /// Lets a monthly series be compared with quarterly series over the same
    /// span. Quarterly datasets are returned unchanged.
    pub fn to_quarterly(&self) -> Dataset {
        if self.schema.periodicity == Periodicity::Quarterly {
            return self.clone();
        }
        let mut schema = self.schema.clone();
        schema.periodicity = Periodicity::Quarterly;
        schema.window = (self.schema.window / 3).max(1);

        let rows = self
            .rows
            .iter()
            .filter(|r| r.period.is_quarter_end())
            .map(|r| ObservationRow {
                period: r.period.to_quarter(),
                values: r.values.clone(),
            })
            .collect();
        Self::from_sorted_unique(schema, rows)
    }
}
