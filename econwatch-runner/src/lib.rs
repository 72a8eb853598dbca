//! EconWatch Runner: per-source run orchestration on top of `econwatch-core`.
//!
//! - Plan → fetch → merge → write cycle for one source (`run_source`)
//! - Offline prune and re-derive (`process_source`)
//! - Concurrent multi-source runs with progress reporting (`run_all`)
//! - Per-source reports and the exit-code decision (`RunSummary`)

pub mod error;
pub mod pipeline;
pub mod progress;
pub mod report;

pub use error::RunError;
pub use pipeline::{
    build_jobs, process_all, process_source, run_all, run_source, select_sources, SourceJob,
};
pub use progress::{RunProgress, SilentProgress, StdoutProgress};
pub use report::{RunMode, RunSummary, SourceReport, UnresolvedCause, UnresolvedPeriod};
