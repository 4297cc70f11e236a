//! Billing error taxonomy.
//!
//! | Error | Raised by | HTTP |
//! |-------|-----------|------|
//! | `BillingError::Auth` | checkout | 401 |
//! | `BillingError::Validation` | checkout | 400 |
//! | `BillingError::Processor` | checkout, reconciliation | 400 / 502 |
//! | `BillingError::Persistence` | entitlement writer | 500 |
//! | `WebhookError` | webhook handler | 401 / 400 / 500 |
//! | `CorrelationError::Unresolved` | webhook handler | logged, 200 |

use axum::http::StatusCode;
use std::fmt;
use thiserror::Error;

use crate::domain::foundation::{AuthError, DomainError, PaymentId, ValidationError};

use super::payment::PaymentMethod;

/// Category of a payment processor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorErrorCode {
    /// Connection failed or request could not be sent.
    Network,
    /// No response within the configured timeout.
    Timeout,
    /// API key rejected.
    Authentication,
    /// Processor rejected the request parameters.
    InvalidRequest,
    /// Session or invoice unknown to the processor.
    NotFound,
    /// Processor answered with an unexpected non-2xx status.
    ProviderError,
    /// Response body could not be understood.
    InvalidResponse,
}

impl ProcessorErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProcessorErrorCode::Network | ProcessorErrorCode::Timeout | ProcessorErrorCode::ProviderError
        )
    }
}

impl fmt::Display for ProcessorErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessorErrorCode::Network => "network",
            ProcessorErrorCode::Timeout => "timeout",
            ProcessorErrorCode::Authentication => "authentication",
            ProcessorErrorCode::InvalidRequest => "invalid_request",
            ProcessorErrorCode::NotFound => "not_found",
            ProcessorErrorCode::ProviderError => "provider_error",
            ProcessorErrorCode::InvalidResponse => "invalid_response",
        };
        write!(f, "{}", s)
    }
}

/// Failure talking to a payment processor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ProcessorError {
    pub code: ProcessorErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl ProcessorError {
    pub fn new(code: ProcessorErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: code.is_retryable(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorCode::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorCode::Timeout, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProcessorErrorCode::InvalidResponse, message)
    }

    /// Classifies a non-2xx HTTP status from a processor.
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let code = match status {
            401 | 403 => ProcessorErrorCode::Authentication,
            404 => ProcessorErrorCode::NotFound,
            400 | 402 | 422 => ProcessorErrorCode::InvalidRequest,
            _ => ProcessorErrorCode::ProviderError,
        };
        Self::new(code, format!("HTTP {}: {}", status, body.into()))
    }
}

/// Errors raised by checkout, the entitlement writer and reconciliation.
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("payment processor failed: {0}")]
    Processor(#[from] ProcessorError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] DomainError),

    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),

    #[error("payment method '{0}' cannot be used here")]
    UnsupportedMethod(PaymentMethod),
}

/// Errors surfaced to webhook senders.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature missing or wrong. Nothing was written.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Body is not a well-formed event.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Writing the outcome failed; the payment stays pending.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl WebhookError {
    /// Returns true if the processor should retry delivering this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WebhookError::Persistence(_))
    }

    /// Maps the error to the status code processors act on.
    ///
    /// - 4xx: do not retry
    /// - 5xx: retry later
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            WebhookError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A processor event that could not be matched to a payment.
#[derive(Debug, Error)]
pub enum CorrelationError {
    #[error("no payment matches processor reference '{reference}'")]
    Unresolved { reference: String },

    #[error("lookup failed: {0}")]
    Lookup(#[from] DomainError),
}
