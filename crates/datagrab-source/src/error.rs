//! Error types for data sources.

use datagrab_types::{Adjust, AssetType};
use thiserror::Error;

/// Errors that can occur while listing symbols or fetching OHLCV data.
#[derive(Error, Debug)]
pub enum SourceError {
    /// The adjustment mode is not supported by this provider.
    #[error("adjust '{adjust}' unsupported by {provider}: only auto|none are accepted for non-ashare assets")]
    AdjustUnsupported {
        /// The provider rejecting the mode.
        provider: &'static str,
        /// The rejected mode.
        adjust: Adjust,
    },

    /// The interval token has no mapping for this provider.
    #[error("interval '{interval}' unsupported by {provider}")]
    IntervalUnsupported {
        /// The provider rejecting the token.
        provider: &'static str,
        /// The rejected token.
        interval: String,
    },

    /// Transient failures exhausted the retry budget.
    #[error("fetch failed for {symbol} after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// The symbol being fetched.
        symbol: String,
        /// Attempts consumed.
        attempts: u32,
        /// The last transient error.
        message: String,
    },

    /// The provider reported a non-retryable error.
    #[error("fetch failed for {symbol}: {message}")]
    Fatal {
        /// The symbol being fetched.
        symbol: String,
        /// Provider error text.
        message: String,
    },

    /// Rate limiter configuration is invalid.
    #[error("invalid rate limit config: {0}")]
    InvalidRateLimit(String),

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),

    /// The router has no source for an asset type.
    #[error("no source registered for asset type {0}")]
    NoSource(AssetType),

    /// Catalog lookup failed.
    #[error(transparent)]
    Catalog(#[from] datagrab_catalog::CatalogError),
}
