//! Classification of one fetch attempt.

use datagrab_store::OhlcvFrame;

/// What a single provider request produced. The per-source retry loop
/// consumes `Throttled` and `Transient` internally; callers only ever see
/// rows, an empty result, or an error.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Rows were returned.
    Rows(OhlcvFrame),
    /// The provider had no data for the request; not an error.
    Empty,
    /// The provider is throttling (HTTP 429 or equivalent). Retry after
    /// backoff without consuming an attempt.
    Throttled,
    /// A transient failure (timeout, connection, 5xx). Retry with backoff,
    /// consuming an attempt.
    Transient(String),
    /// A non-retryable provider error.
    Fatal(String),
}

impl FetchOutcome {
    /// Classifies a `reqwest` transport error.
    #[must_use]
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            Self::Transient(error.to_string())
        } else {
            Self::Fatal(error.to_string())
        }
    }

    /// Classifies an HTTP status with its body text.
    #[must_use]
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || body.contains("Too Many Requests")
        {
            return Self::Throttled;
        }
        if is_no_data_message(body) {
            return Self::Empty;
        }
        if status.is_server_error() {
            return Self::Transient(format!("server error {status}"));
        }
        Self::Fatal(format!("HTTP {status}: {}", truncate(body, 200)))
    }
}

/// Provider messages that mean "no data", not "request failed".
#[must_use]
pub fn is_no_data_message(message: &str) -> bool {
    message.contains("No data found")
        || message.contains("symbol may be delisted")
        || message.contains("Data doesn't exist")
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            FetchOutcome::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            FetchOutcome::Throttled
        ));
        assert!(matches!(
            FetchOutcome::from_status(StatusCode::NOT_FOUND, "No data found, symbol may be delisted"),
            FetchOutcome::Empty
        ));
        assert!(matches!(
            FetchOutcome::from_status(StatusCode::BAD_GATEWAY, "upstream"),
            FetchOutcome::Transient(_)
        ));
        assert!(matches!(
            FetchOutcome::from_status(StatusCode::UNAUTHORIZED, "nope"),
            FetchOutcome::Fatal(_)
        ));
    }

    #[test]
    fn test_no_data_messages() {
        assert!(is_no_data_message("No data found for this range"));
        assert!(is_no_data_message("BAD: symbol may be delisted"));
        assert!(!is_no_data_message("internal error"));
    }
}
