//! Parquet encoding and decoding of OHLCV frames.

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::{ArrowWriter, ProjectionMask};
use parquet::basic::Compression;
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use crate::{ColumnPresence, OhlcvFrame, OhlcvRow, StoreError, ADJUSTED_COLUMN};

/// Parquet key carrying the applied adjustment mode.
pub const ADJUSTMENT_METADATA_KEY: &str = "datagrab.adjustment";

/// Row group size used when encoding.
const ROW_GROUP_SIZE: usize = 100_000;

fn parquet_err(path: &Path, e: impl std::fmt::Display) -> StoreError {
    StoreError::Parquet {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Builds the Arrow schema for a frame. Optional columns absent from the
/// frame are still emitted as nullable `Float64` so every stored file
/// carries the full base schema; `adjusted_close` is appended only when
/// present.
fn frame_schema(presence: ColumnPresence) -> Schema {
    let mut fields = vec![
        Field::new(
            "datetime",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("open", DataType::Float64, true),
        Field::new("high", DataType::Float64, true),
        Field::new("low", DataType::Float64, true),
        Field::new("close", DataType::Float64, true),
        Field::new("volume", DataType::Float64, true),
    ];
    if presence.adjusted_close {
        fields.push(Field::new(ADJUSTED_COLUMN, DataType::Float64, true));
    }
    Schema::new(fields)
}

fn rows_to_batch(schema: &Arc<Schema>, rows: &[OhlcvRow], presence: ColumnPresence) -> Result<RecordBatch, arrow::error::ArrowError> {
    let timestamps: Vec<i64> = rows
        .iter()
        .map(|r| r.datetime.and_utc().timestamp_micros())
        .collect();
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(TimestampMicrosecondArray::from(timestamps)),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.open).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.high).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.low).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.close).collect::<Vec<_>>(),
        )),
        Arc::new(Float64Array::from(
            rows.iter().map(|r| r.volume).collect::<Vec<_>>(),
        )),
    ];
    if presence.adjusted_close {
        columns.push(Arc::new(Float64Array::from(
            rows.iter().map(|r| r.adjusted_close).collect::<Vec<_>>(),
        )));
    }
    RecordBatch::try_new(Arc::clone(schema), columns)
}

/// Encodes a frame to `path`, attaching the adjustment metadata key when
/// given. Callers are expected to hand in a temporary path and rename.
///
/// # Errors
///
/// Returns an error if the file cannot be created or encoding fails.
pub fn write_frame(
    path: &Path,
    frame: &OhlcvFrame,
    adjustment: Option<&str>,
) -> Result<(), StoreError> {
    let schema = Arc::new(frame_schema(frame.presence()));
    let mut props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(ROW_GROUP_SIZE);
    if let Some(adjustment) = adjustment {
        props = props.set_key_value_metadata(Some(vec![KeyValue::new(
            ADJUSTMENT_METADATA_KEY.to_string(),
            adjustment.to_string(),
        )]));
    }

    let file = File::create(path).map_err(|e| StoreError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props.build()))
        .map_err(|e| parquet_err(path, e))?;
    for chunk in frame.rows().chunks(ROW_GROUP_SIZE.max(1)) {
        let batch =
            rows_to_batch(&schema, chunk, frame.presence()).map_err(|e| parquet_err(path, e))?;
        writer.write(&batch).map_err(|e| parquet_err(path, e))?;
    }
    writer.close().map_err(|e| parquet_err(path, e))?;
    Ok(())
}

/// Raw column vectors read from a stored file, for the validator.
///
/// A `None` column means the file has no such column (or an unusable type);
/// inner `None`s are row-level nulls.
#[derive(Debug, Clone, Default)]
pub struct ColumnData {
    /// Total number of rows.
    pub row_count: usize,
    /// The `datetime` column.
    pub datetime: Option<Vec<Option<NaiveDateTime>>>,
    /// The `open` column.
    pub open: Option<Vec<Option<f64>>>,
    /// The `high` column.
    pub high: Option<Vec<Option<f64>>>,
    /// The `low` column.
    pub low: Option<Vec<Option<f64>>>,
    /// The `close` column.
    pub close: Option<Vec<Option<f64>>>,
    /// The `volume` column.
    pub volume: Option<Vec<Option<f64>>>,
}

fn timestamp_values(array: &ArrayRef) -> Option<Vec<Option<NaiveDateTime>>> {
    let DataType::Timestamp(unit, _) = array.data_type() else {
        return None;
    };
    let to_naive = |v: i64| -> Option<NaiveDateTime> {
        let dt = match unit {
            TimeUnit::Second => DateTime::from_timestamp(v, 0),
            TimeUnit::Millisecond => DateTime::from_timestamp_millis(v),
            TimeUnit::Microsecond => DateTime::from_timestamp_micros(v),
            TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(v)),
        };
        dt.map(|d| d.naive_utc())
    };
    let values = match unit {
        TimeUnit::Second => collect_i64::<arrow::array::TimestampSecondArray>(array),
        TimeUnit::Millisecond => collect_i64::<arrow::array::TimestampMillisecondArray>(array),
        TimeUnit::Microsecond => collect_i64::<TimestampMicrosecondArray>(array),
        TimeUnit::Nanosecond => collect_i64::<arrow::array::TimestampNanosecondArray>(array),
    }?;
    Some(
        values
            .into_iter()
            .map(|v| v.and_then(to_naive))
            .collect(),
    )
}

fn collect_i64<A>(array: &ArrayRef) -> Option<Vec<Option<i64>>>
where
    A: Array + 'static,
    for<'a> &'a A: IntoIterator<Item = Option<i64>>,
{
    let typed = array.as_any().downcast_ref::<A>()?;
    Some(typed.into_iter().collect())
}

fn float_values(array: &ArrayRef) -> Option<Vec<Option<f64>>> {
    if let Some(floats) = array.as_any().downcast_ref::<Float64Array>() {
        return Some(floats.iter().collect());
    }
    // Tolerate integer-typed volume columns from foreign writers.
    array
        .as_any()
        .downcast_ref::<Int64Array>()
        .map(|ints| ints.iter().map(|v| v.map(|i| i as f64)).collect())
}

fn append<T: Clone>(target: &mut Option<Vec<Option<T>>>, chunk: Option<Vec<Option<T>>>) {
    if let (Some(target), Some(chunk)) = (target.as_mut(), chunk) {
        target.extend(chunk);
    }
}

/// Reads the canonical columns of a stored file into plain vectors.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or decoded.
pub fn read_column_data(path: &Path) -> Result<ColumnData, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| parquet_err(path, e))?;
    let schema = Arc::clone(builder.schema());
    let has = |name: &str| schema.field_with_name(name).is_ok();

    let mut data = ColumnData {
        row_count: 0,
        datetime: has("datetime").then(Vec::new),
        open: has("open").then(Vec::new),
        high: has("high").then(Vec::new),
        low: has("low").then(Vec::new),
        close: has("close").then(Vec::new),
        volume: has("volume").then(Vec::new),
    };

    let reader = builder.build().map_err(|e| parquet_err(path, e))?;
    for batch in reader {
        let batch = batch.map_err(|e| parquet_err(path, e))?;
        data.row_count += batch.num_rows();
        if let Some(col) = batch.column_by_name("datetime") {
            append(&mut data.datetime, timestamp_values(col));
        }
        for (name, slot) in [
            ("open", &mut data.open),
            ("high", &mut data.high),
            ("low", &mut data.low),
            ("close", &mut data.close),
            ("volume", &mut data.volume),
        ] {
            if let Some(col) = batch.column_by_name(name) {
                append(slot, float_values(col));
            }
        }
    }
    Ok(data)
}

/// Reads a stored file back into a frame plus its adjustment annotation.
///
/// Rows with a null datetime are dropped with a warning. A file without a
/// usable `datetime` column is reported as a parquet error; the writer
/// treats that as a corrupt predecessor.
///
/// # Errors
///
/// Returns an error on I/O or decode failure, or when `datetime` is absent.
pub fn read_frame(path: &Path) -> Result<(OhlcvFrame, Option<String>), StoreError> {
    let file = File::open(path).map_err(|e| StoreError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| parquet_err(path, e))?;

    let adjustment = builder
        .metadata()
        .file_metadata()
        .key_value_metadata()
        .and_then(|kvs| {
            kvs.iter()
                .find(|kv| kv.key == ADJUSTMENT_METADATA_KEY)
                .and_then(|kv| kv.value.clone())
        });

    let schema = Arc::clone(builder.schema());
    if schema.field_with_name("datetime").is_err() {
        return Err(parquet_err(path, "no datetime column"));
    }
    let has = |name: &str| schema.field_with_name(name).is_ok();
    let presence = ColumnPresence {
        open: has("open"),
        high: has("high"),
        low: has("low"),
        close: has("close"),
        volume: has("volume"),
        adjusted_close: has(ADJUSTED_COLUMN),
    };

    let reader = builder.build().map_err(|e| parquet_err(path, e))?;
    let mut rows = Vec::new();
    let mut dropped = 0usize;
    for batch in reader {
        let batch = batch.map_err(|e| parquet_err(path, e))?;
        let n = batch.num_rows();
        let datetimes = batch
            .column_by_name("datetime")
            .and_then(timestamp_values)
            .ok_or_else(|| parquet_err(path, "unsupported datetime column type"))?;
        let get = |name: &str| -> Vec<Option<f64>> {
            batch
                .column_by_name(name)
                .and_then(float_values)
                .unwrap_or_else(|| vec![None; n])
        };
        let open = get("open");
        let high = get("high");
        let low = get("low");
        let close = get("close");
        let volume = get("volume");
        let adjusted = get(ADJUSTED_COLUMN);
        for i in 0..n {
            let Some(datetime) = datetimes[i] else {
                dropped += 1;
                continue;
            };
            rows.push(OhlcvRow {
                datetime,
                open: open[i],
                high: high[i],
                low: low[i],
                close: close[i],
                volume: volume[i],
                adjusted_close: adjusted[i],
            });
        }
    }
    if dropped > 0 {
        warn!(path = %path.display(), dropped, "dropped rows with null datetime");
    }
    Ok((OhlcvFrame::new(rows, presence), adjustment))
}

/// Reads the maximum `datetime` of a stored file, touching only that
/// column.
///
/// # Errors
///
/// Returns an error on I/O or decode failure, or when `datetime` is absent.
pub fn read_max_datetime(path: &Path) -> Result<Option<NaiveDateTime>, StoreError> {
    let file = File::open(path).map_err(|e| StoreError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| parquet_err(path, e))?;
    let parquet_schema = builder.parquet_schema();
    let Some(col_idx) = (0..parquet_schema.num_columns())
        .find(|&i| parquet_schema.column(i).name() == "datetime")
    else {
        return Err(parquet_err(path, "no datetime column"));
    };
    let mask = ProjectionMask::leaves(parquet_schema, [col_idx]);
    let reader = builder
        .with_projection(mask)
        .build()
        .map_err(|e| parquet_err(path, e))?;

    let mut max: Option<NaiveDateTime> = None;
    for batch in reader {
        let batch = batch.map_err(|e| parquet_err(path, e))?;
        let Some(values) = batch.column_by_name("datetime").and_then(timestamp_values) else {
            return Err(parquet_err(path, "unsupported datetime column type"));
        };
        for value in values.into_iter().flatten() {
            max = Some(max.map_or(value, |m| m.max(value)));
        }
    }
    Ok(max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn dt(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn sample_frame() -> OhlcvFrame {
        OhlcvFrame::new(
            vec![
                OhlcvRow {
                    datetime: dt(2),
                    open: Some(99.0),
                    high: Some(101.0),
                    low: Some(98.5),
                    close: Some(100.0),
                    volume: Some(1_000.0),
                    adjusted_close: None,
                },
                OhlcvRow {
                    datetime: dt(3),
                    open: Some(100.0),
                    high: Some(102.0),
                    low: Some(99.0),
                    close: Some(101.0),
                    volume: Some(1_200.0),
                    adjusted_close: None,
                },
            ],
            ColumnPresence::ohlcv(),
        )
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1d_20240101_20240131.parquet");
        let frame = sample_frame();
        write_frame(&path, &frame, Some("auto")).unwrap();

        let (read, adjustment) = read_frame(&path).unwrap();
        assert_eq!(adjustment.as_deref(), Some("auto"));
        assert_eq!(read.len(), 2);
        assert_eq!(read.rows()[0].datetime, dt(2));
        assert_eq!(read.rows()[1].close, Some(101.0));
        assert!(read.presence().volume);
        assert!(!read.presence().adjusted_close);
    }

    #[test]
    fn test_write_without_adjustment_has_no_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1d_20240101_20240131.parquet");
        write_frame(&path, &sample_frame(), None).unwrap();
        let (_, adjustment) = read_frame(&path).unwrap();
        assert_eq!(adjustment, None);
    }

    #[test]
    fn test_absent_optional_columns_written_as_nulls() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1d_20240101_20240102.parquet");
        let frame = OhlcvFrame::new(
            vec![OhlcvRow::at_close(dt(2), 10.0)],
            ColumnPresence {
                close: true,
                ..ColumnPresence::default()
            },
        );
        write_frame(&path, &frame, None).unwrap();

        let data = read_column_data(&path).unwrap();
        assert_eq!(data.row_count, 1);
        // The file carries the full base schema even though the frame only
        // had close.
        assert_eq!(data.open, Some(vec![None]));
        assert_eq!(data.close, Some(vec![Some(10.0)]));
    }

    #[test]
    fn test_read_max_datetime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1d_20240101_20240131.parquet");
        write_frame(&path, &sample_frame(), None).unwrap();
        assert_eq!(read_max_datetime(&path).unwrap(), Some(dt(3)));
    }

    #[test]
    fn test_read_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.parquet");
        assert!(read_frame(&path).is_err());
        assert!(read_max_datetime(&path).is_err());
    }
}
