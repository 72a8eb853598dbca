//! EconWatch core: calendar periods, rolling-window planning, source fetchers,
//! merge, dataset storage and trend signals.
//!
//! - Periods and window sequences (`period`)
//! - Fetch planning against what is stored (`window`)
//! - FRED and Census CPS fetchers with retry (`data`)
//! - Upsert merge with derived fields (`data::merge`)
//! - Atomic CSV store with metadata sidecar (`data::store`)
//! - OLS trends and the composite signal (`trend`)

pub mod config;
pub mod data;
pub mod period;
pub mod sources;
pub mod trend;
pub mod window;

pub use config::{ConfigError, HttpConfig, PipelineConfig, TrendConfig};
pub use period::{current_period, last_n_periods, window_end, Period, PeriodError, Periodicity};
pub use sources::{SourceKind, SourceSpec};
pub use window::{plan, FetchPlan, WindowSpec};
