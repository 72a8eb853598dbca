//! Calendar periods (quarters and months) and rolling window sequences.
//!
//! A [`Period`] is the atomic unit of every stored series. The period that
//! contains "today" is still accumulating data at the source, so it is never
//! part of a window. Quarterly series are also published weeks after the
//! quarter closes, so [`last_n_periods`] skips the [`Periodicity::publication_lag`]
//! most recent complete periods as well.
//!
//! Nothing in this module reads the wall clock. Callers pass `today`.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Granularity of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    Quarterly,
    Monthly,
}

impl Periodicity {
    /// Number of periods in one calendar year.
    pub const fn units_per_year(self) -> u32 {
        match self {
            Self::Quarterly => 4,
            Self::Monthly => 12,
        }
    }

    /// Complete periods that are still unpublished at the source.
    ///
    /// National accounts (labor share, GDP) trail the quarter by one to three
    /// months. Monthly labor series land within weeks of the month closing.
    pub const fn publication_lag(self) -> usize {
        match self {
            Self::Quarterly => 1,
            Self::Monthly => 0,
        }
    }

    /// Column name used for the unit in stored files (`quarter` / `month`).
    pub const fn unit_label(self) -> &'static str {
        match self {
            Self::Quarterly => "quarter",
            Self::Monthly => "month",
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quarterly => f.write_str("quarterly"),
            Self::Monthly => f.write_str("monthly"),
        }
    }
}

/// Validation errors for periods and window lengths.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("invalid {periodicity} unit {unit} (expected 1..={max})")]
    InvalidPeriodicity {
        periodicity: Periodicity,
        unit: u32,
        max: u32,
    },

    #[error("window length must be positive, got {0}")]
    NonPositiveWindow(usize),
}

/// One calendar quarter or month.
///
/// Field order matters: the derived ordering is `(year, unit)`, which is the
/// chronological order for periods of the same periodicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Period {
    year: i32,
    unit: u32,
    periodicity: Periodicity,
}

impl Period {
    /// Build a period, validating the unit against the periodicity.
    pub fn new(year: i32, unit: u32, periodicity: Periodicity) -> Result<Self, PeriodError> {
        let max = periodicity.units_per_year();
        if unit == 0 || unit > max {
            return Err(PeriodError::InvalidPeriodicity {
                periodicity,
                unit,
                max,
            });
        }
        Ok(Self {
            year,
            unit,
            periodicity,
        })
    }

    pub fn quarter(year: i32, quarter: u32) -> Result<Self, PeriodError> {
        Self::new(year, quarter, Periodicity::Quarterly)
    }

    pub fn month(year: i32, month: u32) -> Result<Self, PeriodError> {
        Self::new(year, month, Periodicity::Monthly)
    }

    /// The period of the given periodicity that contains `date`.
    pub fn containing(date: NaiveDate, periodicity: Periodicity) -> Self {
        let unit = match periodicity {
            Periodicity::Quarterly => (date.month() - 1) / 3 + 1,
            Periodicity::Monthly => date.month(),
        };
        Self {
            year: date.year(),
            unit,
            periodicity,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Quarter index (1-4) or month index (1-12).
    pub fn unit(&self) -> u32 {
        self.unit
    }

    pub fn periodicity(&self) -> Periodicity {
        self.periodicity
    }

    /// Move `delta` periods forward (or backward when negative), rolling the year.
    pub fn step(self, delta: i64) -> Self {
        let per_year = i64::from(self.periodicity.units_per_year());
        let index = self.ordinal() + delta;
        Self {
            year: index.div_euclid(per_year) as i32,
            unit: index.rem_euclid(per_year) as u32 + 1,
            periodicity: self.periodicity,
        }
    }

    pub fn next(self) -> Self {
        self.step(1)
    }

    pub fn prev(self) -> Self {
        self.step(-1)
    }

    /// Number of periods from `self` to `other` (positive when `other` is later).
    pub fn distance_to(&self, other: &Period) -> i64 {
        other.ordinal() - self.ordinal()
    }

    /// Calendar month (1-12) in which this period starts.
    pub fn first_month(&self) -> u32 {
        match self.periodicity {
            Periodicity::Quarterly => (self.unit - 1) * 3 + 1,
            Periodicity::Monthly => self.unit,
        }
    }

    /// First calendar day of the period, if representable.
    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.first_month(), 1)
    }

    /// Last calendar day of the period, if representable.
    pub fn last_day(&self) -> Option<NaiveDate> {
        self.next().first_day().and_then(|d| d.pred_opt())
    }

    /// True for March, June, September and December, and for every quarter.
    pub fn is_quarter_end(&self) -> bool {
        match self.periodicity {
            Periodicity::Quarterly => true,
            Periodicity::Monthly => self.unit % 3 == 0,
        }
    }

    /// The quarter this period falls in.
    pub fn to_quarter(self) -> Self {
        match self.periodicity {
            Periodicity::Quarterly => self,
            Periodicity::Monthly => Self {
                year: self.year,
                unit: (self.unit - 1) / 3 + 1,
                periodicity: Periodicity::Quarterly,
            },
        }
    }

    fn ordinal(&self) -> i64 {
        i64::from(self.year) * i64::from(self.periodicity.units_per_year())
            + i64::from(self.unit)
            - 1
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.periodicity {
            Periodicity::Quarterly => write!(f, "{}Q{}", self.year, self.unit),
            Periodicity::Monthly => write!(f, "{}-{:02}", self.year, self.unit),
        }
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The period containing `today`. Every window ends strictly before it.
pub fn current_period(today: NaiveDate, periodicity: Periodicity) -> Period {
    Period::containing(today, periodicity)
}

/// `period` moved by `delta` steps of its own periodicity.
pub fn step(period: Period, delta: i64) -> Period {
    period.step(delta)
}

/// The newest period a window may hold as of `today`.
pub fn window_end(today: NaiveDate, periodicity: Periodicity) -> Period {
    current_period(today, periodicity).step(-1 - periodicity.publication_lag() as i64)
}

/// The `n` periods ending at [`window_end`], oldest first.
pub fn last_n_periods(
    today: NaiveDate,
    periodicity: Periodicity,
    n: usize,
) -> Result<PeriodRange, PeriodError> {
    if n == 0 {
        return Err(PeriodError::NonPositiveWindow(n));
    }
    let start = window_end(today, periodicity).step(1 - n as i64);
    Ok(PeriodRange {
        next: start,
        remaining: n,
    })
}

/// Lazy ascending run of consecutive periods.
///
/// Cloning the range restarts iteration from the clone point, so a caller can
/// walk the same window as many times as it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodRange {
    next: Period,
    remaining: usize,
}

impl PeriodRange {
    /// Consecutive periods starting at `start`.
    pub fn starting_at(start: Period, len: usize) -> Self {
        Self {
            next: start,
            remaining: len,
        }
    }
}

impl Iterator for PeriodRange {
    type Item = Period;

    fn next(&mut self) -> Option<Period> {
        if self.remaining == 0 {
            return None;
        }
        let out = self.next;
        self.next = self.next.next();
        self.remaining -= 1;
        Some(out)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for PeriodRange {}
