//! The canonical in-memory OHLCV frame.
//!
//! Providers normalize their payloads into typed rows before anything else
//! sees them; the writer and validator never inspect unknown columns.

use chrono::NaiveDateTime;
use std::collections::HashMap;

/// One candle, datetimes timezone-naive in the operational timezone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OhlcvRow {
    /// Candle timestamp.
    pub datetime: NaiveDateTime,
    /// Opening price.
    pub open: Option<f64>,
    /// High price.
    pub high: Option<f64>,
    /// Low price.
    pub low: Option<f64>,
    /// Closing price.
    pub close: Option<f64>,
    /// Traded volume.
    pub volume: Option<f64>,
    /// Adjusted closing price, when the provider supplies one.
    pub adjusted_close: Option<f64>,
}

impl OhlcvRow {
    /// Creates a row with only datetime and close set.
    #[must_use]
    pub const fn at_close(datetime: NaiveDateTime, close: f64) -> Self {
        Self {
            datetime,
            open: None,
            high: None,
            low: None,
            close: Some(close),
            volume: None,
            adjusted_close: None,
        }
    }
}

/// Which canonical columns a provider actually supplied.
///
/// A column can be present-with-nulls; absence means the provider's table
/// had no such column at all. The writer materializes absent optional
/// columns as typed null columns and hard-fails on an absent `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColumnPresence {
    /// `open` column present.
    pub open: bool,
    /// `high` column present.
    pub high: bool,
    /// `low` column present.
    pub low: bool,
    /// `close` column present.
    pub close: bool,
    /// `volume` column present.
    pub volume: bool,
    /// `adjusted_close` column present.
    pub adjusted_close: bool,
}

impl ColumnPresence {
    /// Presence for a full OHLCV table without adjusted close.
    #[must_use]
    pub const fn ohlcv() -> Self {
        Self {
            open: true,
            high: true,
            low: true,
            close: true,
            volume: true,
            adjusted_close: false,
        }
    }

    /// Schema-relaxed union with another presence set.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self {
            open: self.open || other.open,
            high: self.high || other.high,
            low: self.low || other.low,
            close: self.close || other.close,
            volume: self.volume || other.volume,
            adjusted_close: self.adjusted_close || other.adjusted_close,
        }
    }

    /// Names of the optional columns that are absent.
    #[must_use]
    pub fn missing_optional(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.open {
            out.push("open");
        }
        if !self.high {
            out.push("high");
        }
        if !self.low {
            out.push("low");
        }
        if !self.volume {
            out.push("volume");
        }
        out
    }
}

/// An ordered collection of candles plus the columns they came with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OhlcvFrame {
    rows: Vec<OhlcvRow>,
    presence: ColumnPresence,
}

impl OhlcvFrame {
    /// Creates an empty frame with no columns.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a frame from rows and the provider's column presence.
    #[must_use]
    pub fn new(rows: Vec<OhlcvRow>, presence: ColumnPresence) -> Self {
        Self { rows, presence }
    }

    /// Returns the rows in order.
    #[must_use]
    pub fn rows(&self) -> &[OhlcvRow] {
        &self.rows
    }

    /// Returns which canonical columns are present.
    #[must_use]
    pub const fn presence(&self) -> ColumnPresence {
        self.presence
    }

    /// Returns true if the frame holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns the smallest datetime, if any rows exist.
    #[must_use]
    pub fn min_datetime(&self) -> Option<NaiveDateTime> {
        self.rows.iter().map(|r| r.datetime).min()
    }

    /// Returns the largest datetime, if any rows exist.
    #[must_use]
    pub fn max_datetime(&self) -> Option<NaiveDateTime> {
        self.rows.iter().map(|r| r.datetime).max()
    }

    /// Appends another frame, schema-relaxed: the column set becomes the
    /// union of both.
    pub fn concat(&mut self, other: Self) {
        self.presence = self.presence.union(other.presence);
        self.rows.extend(other.rows);
    }

    /// Drops duplicate datetimes keeping the last occurrence, then sorts
    /// ascending. After this the datetime column is strictly increasing.
    pub fn dedup_sort(&mut self) {
        let mut index: HashMap<NaiveDateTime, usize> = HashMap::with_capacity(self.rows.len());
        let mut out: Vec<OhlcvRow> = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            match index.get(&row.datetime) {
                Some(&at) => out[at] = row,
                None => {
                    index.insert(row.datetime, out.len());
                    out.push(row);
                }
            }
        }
        out.sort_by_key(|r| r.datetime);
        self.rows = out;
    }
}
