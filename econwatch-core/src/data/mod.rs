//! Data acquisition, merging and storage.

pub mod cps;
pub mod dataset;
pub mod fred;
pub mod http;
pub mod merge;
pub mod provider;
pub mod retry;
pub mod store;

pub use dataset::{Dataset, DatasetError, DerivedField, SeriesSchema};
pub use merge::{merge, MergeConflict, MergeOutcome, MergeStats};
pub use provider::{FetchError, FetchGranularity, ObservationRow, SourceFetcher};
pub use retry::RetryPolicy;
pub use store::{DatasetStore, StoreError, StoreMeta};
