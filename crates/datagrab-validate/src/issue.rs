//! Quality issues.

use serde::{Deserialize, Serialize};

/// How bad a finding is. `Error` findings make the validate exit code
/// non-zero; `Warn` findings do not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Suspicious but usable.
    #[serde(rename = "WARN")]
    Warn,
    /// The file is structurally unusable.
    #[serde(rename = "ERROR")]
    Error,
}

impl Severity {
    /// Returns the severity as the uppercase token used in exports.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One validator finding about a stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Stable rule identifier, e.g. `datetime.duplicated`.
    pub rule_id: String,
    /// Finding severity.
    pub severity: Severity,
    /// Human-readable description.
    pub message: String,
    /// File the finding is about, when applicable.
    pub path: Option<String>,
    /// Asset type inferred from the path.
    pub asset_type: Option<String>,
    /// Symbol inferred from the path.
    pub symbol: Option<String>,
    /// Interval inferred from the filename.
    pub interval: Option<String>,
    /// Extra context (thresholds, column lists, error text).
    pub details: Option<String>,
    /// Creation timestamp, ISO-8601 seconds precision.
    pub created_at: String,
}

/// Shared path context for issues about one file.
#[derive(Debug, Clone, Default)]
pub(crate) struct IssueContext {
    pub path: Option<String>,
    pub asset_type: Option<String>,
    pub symbol: Option<String>,
    pub interval: Option<String>,
    pub created_at: String,
}

impl IssueContext {
    pub(crate) fn issue(
        &self,
        rule_id: &str,
        severity: Severity,
        message: impl Into<String>,
        details: Option<String>,
    ) -> QualityIssue {
        QualityIssue {
            rule_id: rule_id.to_string(),
            severity,
            message: message.into(),
            path: self.path.clone(),
            asset_type: self.asset_type.clone(),
            symbol: self.symbol.clone(),
            interval: self.interval.clone(),
            details,
            created_at: self.created_at.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Warn).unwrap();
        assert_eq!(json, "\"WARN\"");
        let back: Severity = serde_json::from_str("\"ERROR\"").unwrap();
        assert_eq!(back, Severity::Error);
    }
}
