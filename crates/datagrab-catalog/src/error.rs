//! Error types for the catalog.

use datagrab_types::AssetType;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building a catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A remote endpoint could not be reached during preflight.
    #[error("preflight for {url} failed: {detail}")]
    Preflight {
        /// The probed URL.
        url: String,
        /// Human-readable diagnostic (TLS/timeout vs connection).
        detail: String,
    },

    /// The remote payload could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Writing the symbol cache failed; the cache is the source of truth
    /// and must not silently diverge.
    #[error("cache write failed: {0}")]
    CacheWrite(#[from] datagrab_store::StoreError),

    /// Reading the symbol cache failed.
    #[error("cache read failed for '{path}': {message}")]
    CacheRead {
        /// The cache file.
        path: PathBuf,
        /// Reader error text.
        message: String,
    },

    /// No remote data and no usable cache or preset.
    #[error("no catalog available for {asset_type}: {last_error}")]
    Unavailable {
        /// The asset class requested.
        asset_type: AssetType,
        /// The last remote error observed.
        last_error: String,
    },
}
