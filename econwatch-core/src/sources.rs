//! Built-in catalog of tracked series and the fetcher each one uses.
//!
//! Sources are declared as data (`SourceSpec`) so the TOML config can override
//! a built-in entry by id or add new FRED series without code changes.

use crate::config::HttpConfig;
use crate::data::cps::CpsFetcher;
use crate::data::dataset::{DerivedField, SeriesSchema};
use crate::data::fred::FredFetcher;
use crate::data::http::HttpClient;
use crate::data::provider::SourceFetcher;
use crate::period::Periodicity;
use serde::{Deserialize, Serialize};

pub const EMPLOYED_COUNT: &str = "employed_count";
pub const UNEMPLOYED_COUNT: &str = "unemployed_count";
pub const TOTAL_COUNT: &str = "total_count";
pub const EMPLOYMENT_RATE: &str = "employment_rate";

pub const LABOR_SHARE: &str = "labor_share";
pub const REAL_GDP_PER_CAPITA: &str = "real_gdp_per_capita";
pub const ACCOUNTANTS_EMPLOYED: &str = "accountants_employed";
pub const UNEMPLOYMENT_RATE: &str = "unemployment_rate";

/// CPS occupation code for accountants and auditors.
pub const ACCOUNTANTS_OCCUPATION: u32 = 800;

/// Where a source's observations come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// A single FRED series; `column` defaults to the source id.
    Fred {
        series_id: String,
        #[serde(default)]
        column: Option<String>,
    },
    /// Monthly CPS person counts for one occupation code.
    CpsOccupation { occupation_code: u32 },
}

/// A tracked series: identity, cadence, window and origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    pub periodicity: Periodicity,
    pub window: usize,
    #[serde(flatten)]
    pub kind: SourceKind,
}

impl SourceSpec {
    pub fn fred(id: &str, series_id: &str, periodicity: Periodicity, window: usize) -> Self {
        Self {
            id: id.to_string(),
            periodicity,
            window,
            kind: SourceKind::Fred {
                series_id: series_id.to_string(),
                column: None,
            },
        }
    }

    /// Store a FRED series under a column name other than the source id.
    pub fn with_column(mut self, name: &str) -> Self {
        if let SourceKind::Fred { column, .. } = &mut self.kind {
            *column = Some(name.to_string());
        }
        self
    }

    pub fn cps_occupation(id: &str, occupation_code: u32, window: usize) -> Self {
        Self {
            id: id.to_string(),
            periodicity: Periodicity::Monthly,
            window,
            kind: SourceKind::CpsOccupation { occupation_code },
        }
    }

    /// Column layout, primary metric and derived fields of this source.
    pub fn schema(&self) -> SeriesSchema {
        match &self.kind {
            SourceKind::Fred { column, .. } => {
                let column = column.clone().unwrap_or_else(|| self.id.clone());
                SeriesSchema {
                    source: self.id.clone(),
                    periodicity: self.periodicity,
                    window: self.window,
                    columns: vec![column.clone()],
                    primary: column,
                    derived: Vec::new(),
                }
            }
            SourceKind::CpsOccupation { .. } => SeriesSchema {
                source: self.id.clone(),
                periodicity: self.periodicity,
                window: self.window,
                columns: [EMPLOYED_COUNT, UNEMPLOYED_COUNT, TOTAL_COUNT, EMPLOYMENT_RATE]
                    .map(String::from)
                    .to_vec(),
                primary: EMPLOYED_COUNT.to_string(),
                derived: vec![DerivedField::Ratio {
                    name: EMPLOYMENT_RATE.to_string(),
                    numerator: EMPLOYED_COUNT.to_string(),
                    denominator: TOTAL_COUNT.to_string(),
                }],
            },
        }
    }

    /// The live fetcher for this source.
    pub fn build_fetcher(&self, client: &HttpClient, http: &HttpConfig) -> Box<dyn SourceFetcher> {
        match &self.kind {
            SourceKind::Fred { series_id, column } => Box::new(FredFetcher::new(
                client.clone(),
                http.fred_base_url.clone(),
                series_id.clone(),
                column.clone().unwrap_or_else(|| self.id.clone()),
                self.periodicity,
            )),
            SourceKind::CpsOccupation { occupation_code } => Box::new(CpsFetcher::new(
                client.clone(),
                http.cps_base_url.clone(),
                *occupation_code,
            )),
        }
    }
}

/// The series tracked out of the box.
pub fn builtin_sources() -> Vec<SourceSpec> {
    vec![
        SourceSpec::fred(LABOR_SHARE, "PRS85006173", Periodicity::Quarterly, 14)
            .with_column("labor_share_index"),
        SourceSpec::fred(
            REAL_GDP_PER_CAPITA,
            "A939RX0Q048SBEA",
            Periodicity::Quarterly,
            14,
        ),
        SourceSpec::cps_occupation(ACCOUNTANTS_EMPLOYED, ACCOUNTANTS_OCCUPATION, 36),
        SourceSpec::fred(UNEMPLOYMENT_RATE, "UNRATE", Periodicity::Monthly, 42),
    ]
}
