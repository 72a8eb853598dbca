//! Errors that abort one source's run.
//!
//! Fetch failures are not here: they are recovered per batch and show up in
//! the source's report as unresolved periods.

use econwatch_core::data::{FetchError, StoreError};
use econwatch_core::period::PeriodError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("window error: {0}")]
    Period(#[from] PeriodError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("unknown source '{0}'")]
    UnknownSource(String),

    #[error("cannot build fetcher: {0}")]
    Fetcher(FetchError),
}
