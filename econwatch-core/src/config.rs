//! Pipeline configuration loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file at all) runs the
//! built-in catalog against the public FRED and Census endpoints.
//!
//! ```toml
//! data_dir = "data"
//!
//! [retry]
//! max_attempts = 5
//!
//! [http]
//! accept_invalid_certs = true
//!
//! [trend]
//! span_years = 3
//!
//! [[sources]]
//! id = "payrolls"
//! periodicity = "monthly"
//! window = 36
//! kind = "fred"
//! series_id = "PAYEMS"
//! ```

use crate::data::retry::RetryPolicy;
use crate::period::Periodicity;
use crate::sources::{
    builtin_sources, SourceKind, SourceSpec, ACCOUNTANTS_EMPLOYED, LABOR_SHARE,
    REAL_GDP_PER_CAPITA,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// HTTP client settings shared by every fetcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub fred_base_url: String,
    pub cps_base_url: String,
    /// The Census host has served broken certificate chains before.
    pub accept_invalid_certs: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: "econwatch/0.1".to_string(),
            fred_base_url: "https://fred.stlouisfed.org/graph/fredgraph.csv".to_string(),
            cps_base_url: "https://www2.census.gov/programs-surveys/cps/datasets".to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// Trend analysis settings and which sources feed the composite signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// |magnitude| below this is FLAT.
    pub flat_tolerance: f64,
    /// Default span, in years, for `econwatch trend`.
    pub span_years: u32,
    pub labor_share_source: String,
    pub gdp_source: String,
    pub accountants_source: String,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            flat_tolerance: 0.001,
            span_years: 2,
            labor_share_source: LABOR_SHARE.to_string(),
            gdp_source: REAL_GDP_PER_CAPITA.to_string(),
            accountants_source: ACCOUNTANTS_EMPLOYED.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub retry: RetryPolicy,
    pub http: HttpConfig,
    pub trend: TrendConfig,
    /// Entries replace the built-in source with the same id, or are appended.
    pub sources: Vec<SourceSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            retry: RetryPolicy::default(),
            http: HttpConfig::default(),
            trend: TrendConfig::default(),
            sources: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in catalog with config overrides applied, in catalog order.
    pub fn resolved_sources(&self) -> Vec<SourceSpec> {
        let mut sources = builtin_sources();
        for custom in &self.sources {
            match sources.iter_mut().find(|s| s.id == custom.id) {
                Some(existing) => *existing = custom.clone(),
                None => sources.push(custom.clone()),
            }
        }
        sources
    }

    /// Look up one resolved source by id.
    pub fn source(&self, id: &str) -> Option<SourceSpec> {
        self.resolved_sources().into_iter().find(|s| s.id == id)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = BTreeSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(ConfigError::Invalid("source id must not be empty".into()));
            }
            if source.id.contains(['/', '\\']) || source.id.starts_with('.') {
                return Err(ConfigError::Invalid(format!(
                    "source id '{}' is not a valid directory name",
                    source.id
                )));
            }
            if source.window == 0 {
                return Err(ConfigError::Invalid(format!(
                    "source '{}': window must be positive",
                    source.id
                )));
            }
            if matches!(source.kind, SourceKind::CpsOccupation { .. })
                && source.periodicity != Periodicity::Monthly
            {
                return Err(ConfigError::Invalid(format!(
                    "source '{}': CPS extracts are monthly, got periodicity {}",
                    source.id, source.periodicity
                )));
            }
            if !ids.insert(source.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "source '{}' is defined twice",
                    source.id
                )));
            }
        }
        if !(self.trend.flat_tolerance >= 0.0 && self.trend.flat_tolerance.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "trend.flat_tolerance must be a non-negative number, got {}",
                self.trend.flat_tolerance
            )));
        }
        if self.trend.span_years == 0 {
            return Err(ConfigError::Invalid("trend.span_years must be positive".into()));
        }
        if self.http.timeout_secs == 0 {
            return Err(ConfigError::Invalid("http.timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_is_default() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.trend.flat_tolerance, 0.001);
        assert_eq!(config.resolved_sources().len(), 4);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            data_dir = "/var/lib/econwatch"

            [retry]
            max_attempts = 5

            [http]
            accept_invalid_certs = true
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/econwatch"));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 1_000);
        assert!(config.http.accept_invalid_certs);
        assert_eq!(config.http.timeout_secs, 60);
    }

    #[test]
    fn sources_override_builtins_by_id() {
        let config = PipelineConfig::from_toml(
            r#"
            [[sources]]
            id = "accountants_employed"
            periodicity = "monthly"
            window = 48
            kind = "cps_occupation"
            occupation_code = 800

            [[sources]]
            id = "payrolls"
            periodicity = "monthly"
            window = 24
            kind = "fred"
            series_id = "PAYEMS"
            "#,
        )
        .unwrap();

        let sources = config.resolved_sources();
        assert_eq!(sources.len(), 5);
        let accountants = config.source(ACCOUNTANTS_EMPLOYED).unwrap();
        assert_eq!(accountants.window, 48);
        let payrolls = sources.last().unwrap();
        assert_eq!(payrolls.id, "payrolls");
        assert_eq!(payrolls.periodicity, Periodicity::Monthly);
        assert!(matches!(payrolls.kind, SourceKind::Fred { .. }));
    }

    #[test]
    fn zero_window_is_rejected() {
        let err = PipelineConfig::from_toml(
            r#"
            [[sources]]
            id = "x"
            periodicity = "quarterly"
            window = 0
            kind = "fred"
            series_id = "X"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn quarterly_cps_source_is_rejected() {
        let err = PipelineConfig::from_toml(
            r#"
            [[sources]]
            id = "nurses"
            periodicity = "quarterly"
            window = 12
            kind = "cps_occupation"
            occupation_code = 3255
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("monthly")));
    }

    #[test]
    fn path_like_source_id_is_rejected() {
        let err = PipelineConfig::from_toml(
            r#"
            [[sources]]
            id = "../etc"
            periodicity = "quarterly"
            window = 4
            kind = "fred"
            series_id = "X"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn unknown_periodicity_is_parse_error() {
        let err = PipelineConfig::from_toml(
            r#"
            [[sources]]
            id = "x"
            periodicity = "weekly"
            window = 4
            kind = "fred"
            series_id = "X"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = PipelineConfig::from_file(Path::new("/nonexistent/econwatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
