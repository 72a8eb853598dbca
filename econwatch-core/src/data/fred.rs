//! FRED graph CSV fetcher.
//!
//! `fredgraph.csv` returns the whole requested date range as a two-column CSV
//! (`observation_date,<SERIES_ID>`). One request covers every missing period of
//! a plan; rows outside the plan are returned as-is and trimmed by the merge.

use super::http::HttpClient;
use super::provider::{FetchError, FetchGranularity, ObservationRow, SourceFetcher};
use crate::period::{Period, Periodicity};
use chrono::NaiveDate;

/// Fetcher for a single FRED series.
pub struct FredFetcher {
    client: HttpClient,
    base_url: String,
    series_id: String,
    column: String,
    periodicity: Periodicity,
    name: String,
}

impl FredFetcher {
    pub fn new(
        client: HttpClient,
        base_url: impl Into<String>,
        series_id: impl Into<String>,
        column: impl Into<String>,
        periodicity: Periodicity,
    ) -> Self {
        let series_id = series_id.into();
        Self {
            client,
            base_url: base_url.into(),
            name: format!("fred:{series_id}"),
            series_id,
            column: column.into(),
            periodicity,
        }
    }

    /// Query parameters for the date range covering `first..=last`.
    fn query(&self, first: &Period, last: &Period) -> Result<Vec<(&'static str, String)>, FetchError> {
        let start = first
            .first_day()
            .ok_or_else(|| FetchError::Permanent(format!("period {first} has no calendar date")))?;
        let end = last
            .last_day()
            .ok_or_else(|| FetchError::Permanent(format!("period {last} has no calendar date")))?;
        Ok(vec![
            ("id", self.series_id.clone()),
            ("cosd", start.format("%Y-%m-%d").to_string()),
            ("coed", end.format("%Y-%m-%d").to_string()),
            ("fq", frequency_param(self.periodicity).to_string()),
            ("fam", "avg".to_string()),
        ])
    }
}

impl SourceFetcher for FredFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn granularity(&self) -> FetchGranularity {
        FetchGranularity::Blob
    }

    fn fetch(&self, periods: &[Period]) -> Result<Vec<ObservationRow>, FetchError> {
        let (Some(first), Some(last)) = (periods.iter().min(), periods.iter().max()) else {
            return Ok(Vec::new());
        };
        let query = self.query(first, last)?;
        let body = self.client.get_bytes(&self.base_url, &query)?;
        parse_fredgraph_csv(&body, self.periodicity, &self.column)
    }
}

fn frequency_param(periodicity: Periodicity) -> &'static str {
    match periodicity {
        Periodicity::Quarterly => "Quarterly",
        Periodicity::Monthly => "Monthly",
    }
}

/// Parse a `fredgraph.csv` payload into rows keyed by the containing period.
///
/// FRED marks missing observations with `.`; those rows are skipped.
pub fn parse_fredgraph_csv(
    body: &[u8],
    periodicity: Periodicity,
    column: &str,
) -> Result<Vec<ObservationRow>, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| FetchError::Permanent(format!("unreadable FRED header: {e}")))?;
    if headers.len() < 2 {
        return Err(FetchError::Permanent(format!(
            "expected date and value columns, got {} column(s)",
            headers.len()
        )));
    }

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| FetchError::Permanent(format!("malformed FRED row {i}: {e}")))?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|e| {
            FetchError::Permanent(format!("invalid FRED date '{raw_date}': {e}"))
        })?;
        let Some(value) = parse_value(record.get(1).unwrap_or_default()) else {
            continue;
        };
        rows.push(
            ObservationRow::new(Period::containing(date, periodicity)).with_value(column, value),
        );
    }

    rows.sort_by_key(|r| r.period);
    Ok(rows)
}

fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed == "." || trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LABOR_SHARE: &str = "observation_date,PRS85006173\n\
        2024-10-01,99.1\n\
        2025-01-01,98.7\n\
        2025-04-01,.\n";

    #[test]
    fn parses_quarterly_blob() {
        let rows =
            parse_fredgraph_csv(LABOR_SHARE.as_bytes(), Periodicity::Quarterly, "labor_share_index")
                .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].period, Period::quarter(2024, 4).unwrap());
        assert_eq!(rows[0].get("labor_share_index"), Some(99.1));
        assert_eq!(rows[1].period, Period::quarter(2025, 1).unwrap());
    }

    #[test]
    fn monthly_dates_map_to_months() {
        let body = "DATE,UNRATE\n2025-06-01,4.1\n2025-07-01,4.2\n";
        let rows = parse_fredgraph_csv(body.as_bytes(), Periodicity::Monthly, "unemployment_rate")
            .unwrap();
        assert_eq!(rows[1].period, Period::month(2025, 7).unwrap());
        assert_eq!(rows[1].get("unemployment_rate"), Some(4.2));
    }

    #[test]
    fn single_column_payload_is_permanent_failure() {
        let err = parse_fredgraph_csv(b"observation_date\n2025-01-01\n", Periodicity::Quarterly, "x")
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn bad_date_is_permanent_failure() {
        let err = parse_fredgraph_csv(b"date,v\nQ1-2025,1.0\n", Periodicity::Quarterly, "x")
            .unwrap_err();
        assert!(matches!(err, FetchError::Permanent(_)));
    }

    #[test]
    fn missing_markers_are_skipped() {
        assert_eq!(parse_value("."), None);
        assert_eq!(parse_value(""), None);
        assert_eq!(parse_value(" 12.5 "), Some(12.5));
        assert_eq!(parse_value("NaN"), None);
    }
}
