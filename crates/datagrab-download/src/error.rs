//! Error types for the scheduler.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole run (per-task failures are captured as
/// [`crate::FailureRecord`]s instead).
#[derive(Error, Debug)]
pub enum DownloadError {
    /// The failures CSV could not be read.
    #[error("failed to read failures file '{path}': {message}")]
    FailuresRead {
        /// The failures file.
        path: PathBuf,
        /// Reader error text.
        message: String,
    },

    /// A failures CSV row is invalid and strict mode is on.
    #[error("failures row {row} invalid: {message}")]
    FailuresRow {
        /// 1-based data row number (header excluded).
        row: usize,
        /// What was wrong.
        message: String,
    },

    /// The failures CSV could not be written.
    #[error(transparent)]
    FailuresWrite(#[from] datagrab_store::StoreError),

    /// A failure record could not be encoded as CSV.
    #[error("failed to encode failures file '{path}': {message}")]
    FailuresEncode {
        /// The failures file.
        path: PathBuf,
        /// Encoder error text.
        message: String,
    },
}
