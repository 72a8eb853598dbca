//! Merge fetched rows into a stored dataset.
//!
//! Semantics:
//! - upsert by period; a re-fetched period replaces the stored row
//! - stale periods are dropped whether or not anything was fetched
//! - fetched rows outside the plan's window are ignored
//! - two fetched rows for one period: the later one wins, and a conflict is
//!   recorded when their values differ (never averaged)
//! - derived fields are recomputed on every upserted row

use super::dataset::Dataset;
use super::provider::ObservationRow;
use crate::period::Period;
use crate::window::FetchPlan;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Two fetched rows claimed the same period with different values.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeConflict {
    pub period: Period,
    pub discarded: BTreeMap<String, f64>,
    pub kept: BTreeMap<String, f64>,
}

/// Counters describing what a merge did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeStats {
    /// Periods that were not stored before.
    pub inserted: usize,
    /// Stored periods overwritten by a fetched row.
    pub replaced: usize,
    /// Stored periods removed because they left the window.
    pub pruned: usize,
    /// Fetched rows ignored because their period is not required.
    pub out_of_window: usize,
    pub conflicts: Vec<MergeConflict>,
    /// Upserted periods where a derived field could not be computed.
    pub undefined_derivations: Vec<Period>,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub dataset: Dataset,
    pub stats: MergeStats,
}

/// Fold `fetched` into `existing` according to `plan`.
///
/// Post-condition: at most W rows, every row in `plan.required`, ascending,
/// no duplicate periods.
pub fn merge(existing: Dataset, fetched: Vec<ObservationRow>, plan: &FetchPlan) -> MergeOutcome {
    let schema = existing.schema().clone();
    let required: BTreeSet<Period> = plan.required.iter().copied().collect();
    let mut stats = MergeStats::default();

    let mut by_period: BTreeMap<Period, ObservationRow> = BTreeMap::new();
    for row in existing.into_rows() {
        if plan.stale.contains(&row.period) || !required.contains(&row.period) {
            stats.pruned += 1;
            continue;
        }
        by_period.insert(row.period, row);
    }

    let mut incoming: BTreeMap<Period, ObservationRow> = BTreeMap::new();
    for mut row in fetched {
        if !required.contains(&row.period) {
            stats.out_of_window += 1;
            continue;
        }
        for field in &schema.derived {
            row.remove(field.name());
        }
        if let Some(previous) = incoming.get(&row.period) {
            if previous.values != row.values {
                warn!(
                    source = %schema.source,
                    period = %row.period,
                    "conflicting values fetched for one period, keeping the most recent"
                );
                stats.conflicts.push(MergeConflict {
                    period: row.period,
                    discarded: previous.values.clone(),
                    kept: row.values.clone(),
                });
            }
        }
        incoming.insert(row.period, row);
    }

    for (period, mut row) in incoming {
        for field in &schema.derived {
            if !field.apply(&mut row) {
                warn!(
                    source = %schema.source,
                    %period,
                    field = field.name(),
                    "derived value undefined"
                );
                stats.undefined_derivations.push(period);
            }
        }
        match by_period.insert(period, row) {
            Some(old) => {
                if by_period.get(&period).map(|r| &r.values) != Some(&old.values) {
                    debug!(source = %schema.source, %period, "stored value revised");
                }
                stats.replaced += 1;
            }
            None => stats.inserted += 1,
        }
    }

    let mut rows: Vec<ObservationRow> = by_period.into_values().collect();
    if rows.len() > schema.window {
        let excess = rows.len() - schema.window;
        rows.drain(..excess);
        stats.pruned += excess;
    }

    MergeOutcome {
        dataset: Dataset::from_sorted_unique(schema, rows),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{DerivedField, SeriesSchema};
    use crate::period::Periodicity;
    use crate::window::plan;

    fn schema(window: usize) -> SeriesSchema {
        SeriesSchema {
            source: "accountants".into(),
            periodicity: Periodicity::Monthly,
            window,
            columns: vec!["employed".into(), "total".into(), "rate".into()],
            primary: "employed".into(),
            derived: vec![DerivedField::Ratio {
                name: "rate".into(),
                numerator: "employed".into(),
                denominator: "total".into(),
            }],
        }
    }

    fn month(m: u32) -> Period {
        Period::month(2025, m).unwrap()
    }

    fn row(m: u32, employed: f64, total: f64) -> ObservationRow {
        ObservationRow::new(month(m))
            .with_value("employed", employed)
            .with_value("total", total)
    }

    fn months(range: std::ops::RangeInclusive<u32>) -> Vec<Period> {
        range.map(month).collect()
    }

    #[test]
    fn fills_gap_and_derives_rate() {
        let existing =
            Dataset::from_rows(schema(3), vec![row(1, 10.0, 20.0), row(2, 10.0, 20.0)]).unwrap();
        let plan = plan(&months(1..=3), &existing.periods());

        let out = merge(existing, vec![row(3, 40.0, 50.0)], &plan);

        assert_eq!(out.dataset.len(), 3);
        assert_eq!(out.stats.inserted, 1);
        assert_eq!(out.dataset.rows()[2].get("rate"), Some(0.8));
    }

    #[test]
    fn stale_rows_are_dropped_even_without_fetch() {
        let existing =
            Dataset::from_rows(schema(3), vec![row(1, 1.0, 1.0), row(2, 1.0, 1.0), row(3, 1.0, 1.0)])
                .unwrap();
        let plan = plan(&months(2..=4), &existing.periods());

        let out = merge(existing, Vec::new(), &plan);

        assert_eq!(out.stats.pruned, 1);
        assert_eq!(out.dataset.first_period(), Some(month(2)));
        assert_eq!(out.dataset.len(), 2);
    }

    #[test]
    fn upsert_twice_keeps_one_row_with_second_value() {
        let existing = Dataset::empty(schema(3));
        let plan = plan(&months(1..=3), &existing.periods());

        let out = merge(
            existing,
            vec![row(2, 10.0, 20.0), row(2, 15.0, 20.0)],
            &plan,
        );

        assert_eq!(out.dataset.len(), 1);
        assert_eq!(out.dataset.rows()[0].get("employed"), Some(15.0));
        assert_eq!(out.stats.conflicts.len(), 1);
        assert_eq!(out.stats.conflicts[0].kept.get("employed"), Some(&15.0));
    }

    #[test]
    fn identical_duplicates_are_not_conflicts() {
        let existing = Dataset::empty(schema(3));
        let plan = plan(&months(1..=3), &existing.periods());
        let out = merge(existing, vec![row(2, 1.0, 2.0), row(2, 1.0, 2.0)], &plan);
        assert!(out.stats.conflicts.is_empty());
        assert_eq!(out.dataset.len(), 1);
    }

    #[test]
    fn refetch_replaces_stored_row() {
        let existing = Dataset::from_rows(schema(3), vec![row(1, 10.0, 20.0)]).unwrap();
        let plan = plan(&months(1..=3), &existing.periods());

        let out = merge(existing, vec![row(1, 12.0, 20.0)], &plan);

        assert_eq!(out.stats.replaced, 1);
        assert_eq!(out.stats.inserted, 0);
        assert_eq!(out.dataset.rows()[0].get("employed"), Some(12.0));
        assert_eq!(out.dataset.rows()[0].get("rate"), Some(0.6));
    }

    #[test]
    fn rows_outside_window_are_ignored() {
        let existing = Dataset::empty(schema(3));
        let plan = plan(&months(4..=6), &existing.periods());

        let fetched = (1..=7).map(|m| row(m, 1.0, 2.0)).collect();
        let out = merge(existing, fetched, &plan);

        assert_eq!(out.stats.out_of_window, 4);
        assert_eq!(
            out.dataset.periods().into_iter().collect::<Vec<_>>(),
            months(4..=6)
        );
    }

    #[test]
    fn fetched_derived_values_are_never_trusted() {
        let existing = Dataset::empty(schema(3));
        let plan = plan(&months(1..=3), &existing.periods());

        let fetched = vec![row(1, 0.0, 0.0).with_value("rate", 0.99)];
        let out = merge(existing, fetched, &plan);

        assert_eq!(out.dataset.rows()[0].get("rate"), None);
        assert_eq!(out.stats.undefined_derivations, vec![month(1)]);
    }

    #[test]
    fn window_cap_keeps_newest_rows() {
        let existing = Dataset::empty(schema(2));
        let plan = plan(&months(1..=3), &existing.periods());

        let out = merge(
            existing,
            vec![row(1, 1.0, 1.0), row(2, 1.0, 1.0), row(3, 1.0, 1.0)],
            &plan,
        );

        assert_eq!(out.dataset.len(), 2);
        assert_eq!(out.dataset.first_period(), Some(month(2)));
    }
}
