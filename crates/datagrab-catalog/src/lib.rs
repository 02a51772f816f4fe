//! Instrument universe fetch, cache and filtering.
//!
//! The catalog service materializes the universe of downloadable
//! instruments for one asset class, with remote-fetch / local-cache
//! failover:
//!
//! - [`CatalogService::get_catalog`] - cache-first load, retried remote
//!   fetch, cache fallback, built-in preset fallback
//! - [`FilterConfig`] - include/exclude predicates with alias
//!   normalization for exchanges, market segments and fund categories
//! - CSV symbol cache under `<data_root>/catalog/`, rewritten atomically

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod alias;
mod ashare;
mod cache;
mod error;
mod filters;
mod presets;
mod remote;
mod service;

pub use alias::{
    classify_ashare_code, classify_ashare_security, exchange_alias, fund_category_alias,
    market_alias, normalize_exchange_value, normalize_fund_category, normalize_market_value,
};
pub use error::CatalogError;
pub use filters::{merge_filters, CompiledFilters, FilterConfig};
pub use presets::static_catalog;
pub use service::{
    CatalogConfig, CatalogResult, CatalogService, CatalogSource, FilterOptions, ProgressFn,
    StepStatus,
};
