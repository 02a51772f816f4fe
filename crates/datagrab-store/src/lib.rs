//! Canonical OHLCV frames, parquet storage and the incremental writer.
//!
//! This crate owns everything that touches the on-disk store:
//!
//! - [`OhlcvFrame`] - the typed columnar carrier providers hand to the writer
//! - [`ColumnMap`] - header normalization for raw provider tables
//! - parquet read/write with the `datagrab.adjustment` metadata key
//! - [`OhlcvWriter`] - existing-range discovery, merge and atomic publish
//! - path discipline: symbol validation and `data_root` containment

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod frame;
pub mod fs;
mod parquet_io;
mod schema;
mod writer;

pub use error::StoreError;
pub use frame::{ColumnPresence, OhlcvFrame, OhlcvRow};
pub use parquet_io::{
    read_column_data, read_frame, read_max_datetime, write_frame, ColumnData,
    ADJUSTMENT_METADATA_KEY,
};
pub use schema::{dedupe_headers, normalize_header, ColumnMap, ADJUSTED_COLUMN, BASE_COLUMNS};
pub use writer::{ExistingRange, OhlcvWriter};
