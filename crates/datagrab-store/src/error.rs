//! Error types for the store.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading or writing the on-disk store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to create a directory.
    #[error("failed to create directory '{path}': {source}")]
    CreateDir {
        /// The path that could not be created.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("failed to read file '{path}': {source}")]
    ReadFile {
        /// The path that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write file '{path}': {source}")]
    WriteFile {
        /// The path that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to rename a temporary file over its final path.
    #[error("failed to rename '{from}' to '{to}': {source}")]
    Rename {
        /// The temporary path.
        from: PathBuf,
        /// The final path.
        to: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to remove a superseded file.
    #[error("failed to remove file '{path}': {source}")]
    RemoveFile {
        /// The path that could not be removed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The symbol token contains characters that are unsafe in a path.
    #[error("unsafe symbol token '{0}'")]
    UnsafeSymbol(String),

    /// The resolved output path escapes the configured data root.
    #[error("path '{path}' escapes data root '{root}'")]
    PathEscapesRoot {
        /// The offending path.
        path: PathBuf,
        /// The configured data root.
        root: PathBuf,
    },

    /// A required canonical column is absent after merging.
    #[error("required column '{column}' missing in data for '{path}'")]
    MissingRequiredColumn {
        /// The missing column name.
        column: &'static str,
        /// The output path the data was destined for.
        path: PathBuf,
    },

    /// Parquet encoding or decoding failed.
    #[error("parquet error for '{path}': {message}")]
    Parquet {
        /// The file involved.
        path: PathBuf,
        /// Decoder/encoder error text.
        message: String,
    },
}
