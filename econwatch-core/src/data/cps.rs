//! Census CPS basic monthly extract fetcher.
//!
//! Each month is its own public-use file (`<year>/basic/<mon><yy>pub.csv`), so
//! this fetcher requests one file per period and reduces it to employment
//! counts for a single occupation code.

use super::http::HttpClient;
use super::provider::{FetchError, FetchGranularity, ObservationRow, SourceFetcher};
use crate::period::{Period, Periodicity};
use crate::sources::{EMPLOYED_COUNT, TOTAL_COUNT, UNEMPLOYED_COUNT};
use tracing::{debug, warn};

const OCCUPATION_FIELD: &str = "ptio1ocd";
const LABOR_STATUS_FIELD: &str = "pemlr";
const EMPLOYED_STATUS: f64 = 1.0;

const MONTH_ABBR: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Fetcher for CPS employment counts of one occupation.
pub struct CpsFetcher {
    client: HttpClient,
    base_url: String,
    occupation_code: u32,
    name: String,
}

impl CpsFetcher {
    pub fn new(client: HttpClient, base_url: impl Into<String>, occupation_code: u32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            occupation_code,
            name: format!("cps:occ{occupation_code}"),
        }
    }

    /// Extract URL for one month, e.g. `.../2025/basic/jul25pub.csv`.
    pub fn extract_url(&self, period: &Period) -> Result<String, FetchError> {
        if period.periodicity() != Periodicity::Monthly {
            return Err(FetchError::Permanent(format!(
                "CPS extracts are monthly, cannot fetch {period}"
            )));
        }
        let mon = MONTH_ABBR[(period.unit() - 1) as usize];
        let yy = period.year().rem_euclid(100);
        Ok(format!(
            "{}/{}/basic/{mon}{yy:02}pub.csv",
            self.base_url,
            period.year()
        ))
    }
}

impl SourceFetcher for CpsFetcher {
    fn name(&self) -> &str {
        &self.name
    }

    fn granularity(&self) -> FetchGranularity {
        FetchGranularity::PerPeriod
    }

    fn fetch(&self, periods: &[Period]) -> Result<Vec<ObservationRow>, FetchError> {
        let mut rows = Vec::with_capacity(periods.len());
        for period in periods {
            let url = self.extract_url(period)?;
            let body = self.client.get_bytes(&url, &[])?;
            let counts = summarize_extract(&body, self.occupation_code)?;
            debug!(%period, employed = counts.employed, total = counts.total(), "CPS extract summarized");
            rows.push(counts.into_row(*period));
        }
        Ok(rows)
    }
}

/// Person counts for one occupation in one monthly extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OccupationCounts {
    pub employed: u64,
    /// Unemployed or not in the labor force.
    pub unemployed: u64,
}

impl OccupationCounts {
    pub fn total(&self) -> u64 {
        self.employed + self.unemployed
    }

    /// Raw counts as a row. The employment rate is derived at merge time.
    pub fn into_row(self, period: Period) -> ObservationRow {
        ObservationRow::new(period)
            .with_value(EMPLOYED_COUNT, self.employed as f64)
            .with_value(UNEMPLOYED_COUNT, self.unemployed as f64)
            .with_value(TOTAL_COUNT, self.total() as f64)
    }
}

/// Count persons with `occupation_code` in a CPS public-use CSV.
///
/// Header names are matched case-insensitively. Without a labor-status column
/// every matched person counts as employed.
pub fn summarize_extract(body: &[u8], occupation_code: u32) -> Result<OccupationCounts, FetchError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(body);

    let headers = reader
        .headers()
        .map_err(|e| FetchError::Permanent(format!("unreadable CPS header: {e}")))?
        .clone();
    let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));

    let occupation_idx = find(OCCUPATION_FIELD).ok_or_else(|| {
        FetchError::Permanent(format!(
            "CPS extract has no {} column",
            OCCUPATION_FIELD.to_uppercase()
        ))
    })?;
    let status_idx = find(LABOR_STATUS_FIELD);
    if status_idx.is_none() {
        warn!("CPS extract has no PEMLR column, counting every matched person as employed");
    }

    let target = f64::from(occupation_code);
    let mut counts = OccupationCounts::default();
    for (i, record) in reader.records().enumerate() {
        let record =
            record.map_err(|e| FetchError::Permanent(format!("malformed CPS row {i}: {e}")))?;
        let Some(code) = record.get(occupation_idx).and_then(parse_code) else {
            continue;
        };
        if code != target {
            continue;
        }
        let employed = match status_idx {
            Some(idx) => record.get(idx).and_then(parse_code) == Some(EMPLOYED_STATUS),
            None => true,
        };
        if employed {
            counts.employed += 1;
        } else {
            counts.unemployed += 1;
        }
    }
    Ok(counts)
}

fn parse_code(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;

    const EXTRACT: &str = "HRHHID,PTIO1OCD,PEMLR,PRTAGE\n\
        1,800,1,34\n\
        2,800,1,51\n\
        3,800,3,29\n\
        4,0800.0,4,62\n\
        5,4700,1,40\n\
        6,-1,-1,12\n";

    #[test]
    fn counts_employed_and_not_employed() {
        let counts = summarize_extract(EXTRACT.as_bytes(), 800).unwrap();
        assert_eq!(counts.employed, 2);
        assert_eq!(counts.unemployed, 2);
        assert_eq!(counts.total(), 4);
    }

    #[test]
    fn lowercase_headers_are_accepted() {
        let body = "ptio1ocd,pemlr\n800,1\n800,2\n";
        let counts = summarize_extract(body.as_bytes(), 800).unwrap();
        assert_eq!(counts, OccupationCounts { employed: 1, unemployed: 1 });
    }

    #[test]
    fn missing_status_column_counts_all_as_employed() {
        let body = "PTIO1OCD\n800\n800\n100\n";
        let counts = summarize_extract(body.as_bytes(), 800).unwrap();
        assert_eq!(counts.employed, 2);
        assert_eq!(counts.unemployed, 0);
    }

    #[test]
    fn missing_occupation_column_is_permanent() {
        let err = summarize_extract(b"PEMLR\n1\n", 800).unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn counts_become_row_without_derived_rate() {
        let period = Period::month(2025, 7).unwrap();
        let row = OccupationCounts { employed: 40, unemployed: 10 }.into_row(period);
        assert_eq!(row.get(EMPLOYED_COUNT), Some(40.0));
        assert_eq!(row.get(TOTAL_COUNT), Some(50.0));
        assert_eq!(row.get(crate::sources::EMPLOYMENT_RATE), None);
    }

    #[test]
    fn extract_url_uses_month_abbreviation() {
        let client = HttpClient::new(&HttpConfig::default()).unwrap();
        let fetcher = CpsFetcher::new(client, "https://example.test/cps/datasets/", 800);

        let url = fetcher.extract_url(&Period::month(2025, 7).unwrap()).unwrap();
        assert_eq!(url, "https://example.test/cps/datasets/2025/basic/jul25pub.csv");

        let url = fetcher.extract_url(&Period::month(2009, 1).unwrap()).unwrap();
        assert!(url.ends_with("/2009/basic/jan09pub.csv"));

        assert!(fetcher.extract_url(&Period::quarter(2025, 1).unwrap()).is_err());
    }
}
