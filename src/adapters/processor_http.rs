//! Shared plumbing for processor HTTP adapters.

use std::time::Duration;

use crate::domain::billing::{Money, ProcessorError, ProcessorErrorCode};

/// Builds a client whose every request is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, ProcessorError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| ProcessorError::network(format!("failed to build HTTP client: {}", e)))
}

/// Converts a transport failure, distinguishing timeouts.
pub fn transport_error(err: reqwest::Error) -> ProcessorError {
    if err.is_timeout() {
        ProcessorError::timeout(err.to_string())
    } else if err.is_decode() {
        ProcessorError::invalid_response(err.to_string())
    } else {
        ProcessorError::network(err.to_string())
    }
}

/// Turns a non-success response into a `ProcessorError`.
///
/// The body is truncated so processor internals do not flood the logs.
pub async fn error_from_response(provider: &str, response: reqwest::Response) -> ProcessorError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(512).collect();
    tracing::warn!(provider, status, "processor returned non-success status");
    ProcessorError::from_status(status, body)
}

/// Rejects references that cannot be safely placed in a URL path.
pub fn ensure_reference(reference: &str) -> Result<&str, ProcessorError> {
    let reference = reference.trim();
    let valid = !reference.is_empty()
        && reference.len() <= 255
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(reference)
    } else {
        Err(ProcessorError::new(
            ProcessorErrorCode::InvalidRequest,
            "processor reference contains unsupported characters",
        ))
    }
}

/// Parses a decimal amount such as `"999"`, `"9.9"` or `"9.99"` into minor units.
pub fn parse_major_amount(raw: &str, currency: &str) -> Option<Money> {
    Money::new(parse_major_units(raw)?, currency).ok()
}

/// Minor units of a non-negative decimal with at most two fraction digits.
pub fn parse_major_units(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (whole, fraction) = raw.split_once('.').unwrap_or((raw, ""));
    if whole.is_empty() || fraction.len() > 2 || !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let whole: i64 = whole.parse().ok()?;
    let fraction: i64 = match fraction.len() {
        0 => 0,
        1 => fraction.parse::<i64>().ok()? * 10,
        _ => fraction.parse().ok()?,
    };
    whole.checked_mul(100)?.checked_add(fraction)
}
