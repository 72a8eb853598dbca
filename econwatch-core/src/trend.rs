//! Directional trends over a maintained dataset and the composite signal.
//!
//! Direction is the sign of the OLS slope over the last `span` observations.
//! Magnitude is the slope divided by the mean absolute level of those
//! observations, so series in different units compare on one scale.

use crate::data::dataset::Dataset;
use crate::period::Period;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_FLAT_TOLERANCE: f64 = 0.001;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrendError {
    #[error("{metric}: need {required} observations, have {available}")]
    InsufficientData {
        metric: String,
        required: usize,
        available: usize,
    },

    #[error("trend span must be at least 2, got {0}")]
    InvalidSpan(usize),

    #[error("lookback must be positive")]
    InvalidLookback,

    #[error("{dataset} has no metric '{metric}'")]
    UnknownMetric { dataset: String, metric: String },

    #[error("{metric}: baseline value at {period} is zero")]
    ZeroBaseline { metric: String, period: Period },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Up,
    Down,
    Flat,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => f.write_str("UP"),
            Self::Down => f.write_str("DOWN"),
            Self::Flat => f.write_str("FLAT"),
        }
    }
}

/// Trend of one metric over the last `span` observations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    pub metric: String,
    pub span: usize,
    pub direction: TrendDirection,
    /// Slope per period relative to the mean absolute level.
    pub magnitude: f64,
    /// Raw OLS slope per period, in the metric's units.
    pub slope: f64,
    pub first_period: Period,
    pub last_period: Period,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompositeSignal {
    Notable,
    NoSignal,
}

impl fmt::Display for CompositeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Notable => f.write_str("NOTABLE"),
            Self::NoSignal => f.write_str("NO_SIGNAL"),
        }
    }
}

/// Trend computation with a configurable flat band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendAnalyzer {
    pub flat_tolerance: f64,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self {
            flat_tolerance: DEFAULT_FLAT_TOLERANCE,
        }
    }
}

impl TrendAnalyzer {
    pub fn new(flat_tolerance: f64) -> Self {
        Self { flat_tolerance }
    }

    /// Trend of the dataset's primary metric.
    pub fn trend(&self, dataset: &Dataset, span: usize) -> Result<TrendResult, TrendError> {
        self.trend_metric(dataset, &dataset.schema().primary, span)
    }

    /// Trend of any metric column.
    pub fn trend_metric(
        &self,
        dataset: &Dataset,
        metric: &str,
        span: usize,
    ) -> Result<TrendResult, TrendError> {
        if span < 2 {
            return Err(TrendError::InvalidSpan(span));
        }
        if !dataset.schema().columns.iter().any(|c| c == metric) {
            return Err(TrendError::UnknownMetric {
                dataset: dataset.source().to_string(),
                metric: metric.to_string(),
            });
        }

        let series = dataset.series(metric);
        if series.len() < span {
            return Err(TrendError::InsufficientData {
                metric: metric.to_string(),
                required: span,
                available: series.len(),
            });
        }
        let window = &series[series.len() - span..];
        let values: Vec<f64> = window.iter().map(|(_, v)| *v).collect();

        let slope = ols_slope(&values);
        let mean_abs = values.iter().map(|v| v.abs()).sum::<f64>() / values.len() as f64;
        let magnitude = if mean_abs > 0.0 { slope / mean_abs } else { 0.0 };

        let direction = if magnitude.abs() < self.flat_tolerance {
            TrendDirection::Flat
        } else if magnitude > 0.0 {
            TrendDirection::Up
        } else {
            TrendDirection::Down
        };

        Ok(TrendResult {
            metric: metric.to_string(),
            span,
            direction,
            magnitude,
            slope,
            first_period: window[0].0,
            last_period: window[span - 1].0,
        })
    }
}

/// [`TrendAnalyzer::trend`] with the default flat tolerance.
pub fn trend(dataset: &Dataset, span: usize) -> Result<TrendResult, TrendError> {
    TrendAnalyzer::default().trend(dataset, span)
}

/// [`TrendAnalyzer::trend_metric`] with the default flat tolerance.
pub fn trend_metric(dataset: &Dataset, metric: &str, span: usize) -> Result<TrendResult, TrendError> {
    TrendAnalyzer::default().trend_metric(dataset, metric, span)
}

/// NOTABLE iff labor share is falling, accountant employment is falling and
/// real GDP per capita is rising, all measured over the same span.
pub fn composite(labor_share: &TrendResult, gdp: &TrendResult, accountants: &TrendResult) -> CompositeSignal {
    let same_span = labor_share.span == gdp.span && gdp.span == accountants.span;
    if same_span
        && labor_share.direction == TrendDirection::Down
        && accountants.direction == TrendDirection::Down
        && gdp.direction == TrendDirection::Up
    {
        CompositeSignal::Notable
    } else {
        CompositeSignal::NoSignal
    }
}

/// Ordinary least squares slope of `y` against 0, 1, 2, ...
fn ols_slope(y: &[f64]) -> f64 {
    let n = y.len() as f64;
    if y.len() < 2 {
        return 0.0;
    }
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, &yi) in y.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (yi - y_mean);
        den += dx * dx;
    }
    if den.abs() < 1e-12 {
        0.0
    } else {
        num / den
    }
}

// ── Period-over-period change ───────────────────────────────────────

/// Percent change of the primary metric between the latest row and the row
/// `lookback` periods earlier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodChange {
    pub metric: String,
    pub lookback: usize,
    pub from: Period,
    pub to: Period,
    pub start: f64,
    pub end: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    AllDown,
    AllUp,
    Mixed,
}

impl fmt::Display for ChangeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AllDown => f.write_str("declining across all horizons"),
            Self::AllUp => f.write_str("rising across all horizons"),
            Self::Mixed => f.write_str("mixed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeSummary {
    pub changes: Vec<PeriodChange>,
    pub direction: ChangeDirection,
}

pub fn period_change(dataset: &Dataset, lookback: usize) -> Result<PeriodChange, TrendError> {
    if lookback == 0 {
        return Err(TrendError::InvalidLookback);
    }
    let metric = dataset.schema().primary.clone();
    let series = dataset.series(&metric);
    let insufficient = || TrendError::InsufficientData {
        metric: metric.clone(),
        required: lookback + 1,
        available: series.len(),
    };

    let &(to, end) = series.last().ok_or_else(insufficient)?;
    let from = to.step(-(lookback as i64));
    let &(_, start) = series
        .iter()
        .find(|(p, _)| *p == from)
        .ok_or_else(insufficient)?;

    if start == 0.0 {
        return Err(TrendError::ZeroBaseline {
            metric,
            period: from,
        });
    }

    Ok(PeriodChange {
        metric: metric.clone(),
        lookback,
        from,
        to,
        start,
        end,
        percent: (end - start) / start.abs() * 100.0,
    })
}

/// Changes over several lookbacks and whether they agree in sign.
pub fn change_summary(dataset: &Dataset, lookbacks: &[usize]) -> Result<ChangeSummary, TrendError> {
    let changes = lookbacks
        .iter()
        .map(|&lb| period_change(dataset, lb))
        .collect::<Result<Vec<_>, _>>()?;

    let direction = if !changes.is_empty() && changes.iter().all(|c| c.percent < 0.0) {
        ChangeDirection::AllDown
    } else if !changes.is_empty() && changes.iter().all(|c| c.percent > 0.0) {
        ChangeDirection::AllUp
    } else {
        ChangeDirection::Mixed
    };

    Ok(ChangeSummary { changes, direction })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::SeriesSchema;
    use crate::data::provider::ObservationRow;
    use crate::period::Periodicity;

    fn quarterly(values: &[f64]) -> Dataset {
        let schema = SeriesSchema {
            source: "labor_share".into(),
            periodicity: Periodicity::Quarterly,
            window: 14,
            columns: vec!["index".into()],
            primary: "index".into(),
            derived: Vec::new(),
        };
        let start = Period::quarter(2022, 1).unwrap();
        let rows = values
            .iter()
            .enumerate()
            .map(|(i, v)| ObservationRow::new(start.step(i as i64)).with_value("index", *v))
            .collect();
        Dataset::from_rows(schema, rows).unwrap()
    }

    fn result(direction: TrendDirection, span: usize) -> TrendResult {
        TrendResult {
            metric: "m".into(),
            span,
            direction,
            magnitude: 0.0,
            slope: 0.0,
            first_period: Period::quarter(2024, 1).unwrap(),
            last_period: Period::quarter(2025, 4).unwrap(),
        }
    }

    #[test]
    fn rising_series_is_up() {
        let ds = quarterly(&[100.0, 101.0, 102.0, 103.0]);
        let t = trend(&ds, 4).unwrap();
        assert_eq!(t.direction, TrendDirection::Up);
        assert!((t.slope - 1.0).abs() < 1e-12);
        assert!((t.magnitude - 1.0 / 101.5).abs() < 1e-12);
        assert_eq!(t.last_period, Period::quarter(2022, 4).unwrap());
    }

    #[test]
    fn only_last_span_rows_count() {
        let ds = quarterly(&[1.0, 50.0, 40.0, 30.0]);
        let t = trend(&ds, 3).unwrap();
        assert_eq!(t.direction, TrendDirection::Down);
        assert_eq!(t.first_period, Period::quarter(2022, 2).unwrap());
    }

    #[test]
    fn tiny_relative_slope_is_flat() {
        let ds = quarterly(&[1000.0, 1000.1, 1000.2]);
        assert_eq!(trend(&ds, 3).unwrap().direction, TrendDirection::Flat);

        let strict = TrendAnalyzer::new(0.0);
        assert_eq!(strict.trend(&ds, 3).unwrap().direction, TrendDirection::Up);
    }

    #[test]
    fn all_zero_series_is_flat() {
        let ds = quarterly(&[0.0, 0.0, 0.0]);
        let t = trend(&ds, 3).unwrap();
        assert_eq!(t.direction, TrendDirection::Flat);
        assert_eq!(t.magnitude, 0.0);
    }

    #[test]
    fn insufficient_data() {
        let ds = quarterly(&[1.0, 2.0]);
        assert_eq!(
            trend(&ds, 3).unwrap_err(),
            TrendError::InsufficientData {
                metric: "index".into(),
                required: 3,
                available: 2
            }
        );
    }

    #[test]
    fn span_below_two_is_invalid() {
        let ds = quarterly(&[1.0, 2.0]);
        assert_eq!(trend(&ds, 1).unwrap_err(), TrendError::InvalidSpan(1));
    }

    #[test]
    fn unknown_metric() {
        let ds = quarterly(&[1.0, 2.0]);
        assert!(matches!(
            trend_metric(&ds, "nope", 2),
            Err(TrendError::UnknownMetric { .. })
        ));
    }

    #[test]
    fn composite_notable_only_for_exact_pattern() {
        use TrendDirection::*;
        let notable = composite(&result(Down, 8), &result(Up, 8), &result(Down, 8));
        assert_eq!(notable, CompositeSignal::Notable);

        assert_eq!(
            composite(&result(Up, 8), &result(Up, 8), &result(Down, 8)),
            CompositeSignal::NoSignal
        );
        assert_eq!(
            composite(&result(Down, 8), &result(Down, 8), &result(Down, 8)),
            CompositeSignal::NoSignal
        );
        assert_eq!(
            composite(&result(Down, 8), &result(Up, 8), &result(Up, 8)),
            CompositeSignal::NoSignal
        );
    }

    #[test]
    fn flat_never_counts() {
        use TrendDirection::*;
        assert_eq!(
            composite(&result(Flat, 8), &result(Up, 8), &result(Down, 8)),
            CompositeSignal::NoSignal
        );
        assert_eq!(
            composite(&result(Down, 8), &result(Flat, 8), &result(Down, 8)),
            CompositeSignal::NoSignal
        );
    }

    #[test]
    fn mismatched_spans_are_no_signal() {
        use TrendDirection::*;
        assert_eq!(
            composite(&result(Down, 8), &result(Up, 4), &result(Down, 8)),
            CompositeSignal::NoSignal
        );
    }

    #[test]
    fn period_change_against_earlier_row() {
        let ds = quarterly(&[100.0, 90.0, 95.0, 110.0, 80.0]);
        let change = period_change(&ds, 4).unwrap();
        assert_eq!(change.from, Period::quarter(2022, 1).unwrap());
        assert_eq!(change.to, Period::quarter(2023, 1).unwrap());
        assert!((change.percent - -20.0).abs() < 1e-12);
    }

    #[test]
    fn period_change_needs_baseline_row() {
        let ds = quarterly(&[100.0, 90.0]);
        assert!(matches!(
            period_change(&ds, 4),
            Err(TrendError::InsufficientData { .. })
        ));
        assert_eq!(period_change(&ds, 0).unwrap_err(), TrendError::InvalidLookback);
    }

    #[test]
    fn zero_baseline_is_reported() {
        let ds = quarterly(&[0.0, 5.0]);
        assert!(matches!(
            period_change(&ds, 1),
            Err(TrendError::ZeroBaseline { .. })
        ));
    }

    #[test]
    fn change_summary_classifies_horizons() {
        let falling = quarterly(&[120.0, 115.0, 110.0, 105.0, 100.0]);
        let summary = change_summary(&falling, &[2, 4]).unwrap();
        assert_eq!(summary.direction, ChangeDirection::AllDown);
        assert_eq!(summary.changes.len(), 2);

        let mixed = quarterly(&[90.0, 115.0, 110.0, 105.0, 100.0]);
        assert_eq!(
            change_summary(&mixed, &[2, 4]).unwrap().direction,
            ChangeDirection::Mixed
        );
    }
}
