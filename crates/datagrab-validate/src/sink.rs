//! Streaming issue writers (JSONL and CSV).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

use crate::QualityIssue;

/// Fixed CSV column order, kept stable for spreadsheet import.
const CSV_COLUMNS: [&str; 9] = [
    "created_at",
    "severity",
    "rule_id",
    "asset_type",
    "symbol",
    "interval",
    "path",
    "message",
    "details",
];

/// Issue export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueFormat {
    /// One JSON object per line.
    Jsonl,
    /// CSV with the fixed column order.
    Csv,
}

impl IssueFormat {
    /// File extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Csv => "csv",
        }
    }
}

/// Errors from the streaming writers.
#[derive(Error, Debug)]
pub enum SinkError {
    /// I/O failure.
    #[error("issue sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV encoding failure.
    #[error("issue sink CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// JSON encoding failure.
    #[error("issue sink JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

enum SinkKind {
    Jsonl(BufWriter<File>),
    Csv(Box<csv::Writer<File>>),
}

/// A thread-safe streaming issue writer, so large scans keep memory
/// bounded by writing each issue as it is found.
pub struct IssueSink {
    inner: Mutex<SinkKind>,
}

impl IssueSink {
    /// Creates a sink writing `format` to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created or the CSV header
    /// cannot be written.
    pub fn create(path: &Path, format: IssueFormat) -> Result<Self, SinkError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let kind = match format {
            IssueFormat::Jsonl => SinkKind::Jsonl(BufWriter::new(File::create(path)?)),
            IssueFormat::Csv => {
                let mut writer = csv::Writer::from_path(path)?;
                writer.write_record(CSV_COLUMNS)?;
                SinkKind::Csv(Box::new(writer))
            }
        };
        Ok(Self {
            inner: Mutex::new(kind),
        })
    }

    /// Appends one issue.
    ///
    /// # Errors
    ///
    /// Returns an error on encode or I/O failure.
    pub fn write(&self, issue: &QualityIssue) -> Result<(), SinkError> {
        let mut kind = self.inner.lock().expect("issue sink lock poisoned");
        match &mut *kind {
            SinkKind::Jsonl(writer) => {
                serde_json::to_writer(&mut *writer, issue)?;
                writer.write_all(b"\n")?;
            }
            SinkKind::Csv(writer) => {
                let opt = |v: &Option<String>| v.clone().unwrap_or_default();
                writer.write_record([
                    issue.created_at.clone(),
                    issue.severity.as_str().to_string(),
                    issue.rule_id.clone(),
                    opt(&issue.asset_type),
                    opt(&issue.symbol),
                    opt(&issue.interval),
                    opt(&issue.path),
                    issue.message.clone(),
                    opt(&issue.details),
                ])?;
            }
        }
        Ok(())
    }

    /// Flushes buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn finish(&self) -> Result<(), SinkError> {
        let mut kind = self.inner.lock().expect("issue sink lock poisoned");
        match &mut *kind {
            SinkKind::Jsonl(writer) => writer.flush()?,
            SinkKind::Csv(writer) => writer.flush()?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;
    use tempfile::TempDir;

    fn issue(rule_id: &str) -> QualityIssue {
        QualityIssue {
            rule_id: rule_id.to_string(),
            severity: Severity::Warn,
            message: "datetime has 1 duplicated rows".to_string(),
            path: Some("/data/stock/AAPL/1d_x.parquet".to_string()),
            asset_type: Some("stock".to_string()),
            symbol: Some("AAPL".to_string()),
            interval: Some("1d".to_string()),
            details: None,
            created_at: "2024-06-01T12:00:00".to_string(),
        }
    }

    #[test]
    fn test_jsonl_sink() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.jsonl");
        let sink = IssueSink::create(&path, IssueFormat::Jsonl).unwrap();
        sink.write(&issue("datetime.duplicated")).unwrap();
        sink.write(&issue("close.has_nulls")).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: QualityIssue = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.rule_id, "datetime.duplicated");
        assert_eq!(parsed.severity, Severity::Warn);
    }

    #[test]
    fn test_csv_sink_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("issues.csv");
        let sink = IssueSink::create(&path, IssueFormat::Csv).unwrap();
        sink.write(&issue("values.negative")).unwrap();
        sink.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "created_at,severity,rule_id,asset_type,symbol,interval,path,message,details"
        );
        assert!(lines.next().unwrap().starts_with("2024-06-01T12:00:00,WARN,values.negative"));
    }
}
