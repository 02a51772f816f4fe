//! Data source abstraction, concrete providers and the global rate
//! limiter.
//!
//! A [`DataSource`] lists instruments (via the catalog) and fetches
//! canonical OHLCV frames. Concrete providers normalize their payloads
//! into typed rows before returning, run their own retry loop on top of
//! the shared [`RateLimiter`], and classify each attempt into a
//! [`FetchOutcome`] so retry logic is exhaustive instead of
//! string-matching exception text.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod ashare;
mod error;
mod outcome;
mod rate_limiter;
mod router;
mod source;
mod yahoo;

pub use ashare::{AshareConfig, AshareSource};
pub use error::SourceError;
pub use outcome::FetchOutcome;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use router::SourceRouter;
pub use source::{DataSource, OhlcvResult};
pub use yahoo::{YahooConfig, YahooSource};
