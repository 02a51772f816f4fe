//! Bounded-concurrency download scheduler.
//!
//! Turns a `(symbols × intervals × date range)` product into resumable
//! tasks executed by a bounded worker pool under the global rate limiter,
//! with pause/cancel control, per-task incremental skip/merge decisions
//! against the writer, and failure persistence to `failures.csv`.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod control;
mod downloader;
mod error;
mod failures;
mod task;

pub use control::DownloadControl;
pub use downloader::{DownloadConfig, Downloader, ProgressCallback};
pub use error::DownloadError;
pub use failures::{load_failures, write_failures};
pub use task::{DownloadStats, DownloadTask, FailureRecord, RECENT_FAILURES_CAP};
