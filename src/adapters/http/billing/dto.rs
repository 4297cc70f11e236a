//! Data Transfer Objects for billing endpoints.
//!
//! Request and response bodies use camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::adapters::processor_http::parse_major_units;
use crate::application::handlers::billing::{
    ApplyOutcomeResult, CheckoutCreated, ReconciliationReport, WebhookOutcome,
};
use crate::domain::billing::PaymentMethod;
use crate::domain::foundation::ValidationError;

// ════════════════════════════════════════════════════════════════════════════════
// Requests
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /api/billing/checkout`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCheckoutRequest {
    pub plan_id: String,
    /// Major units of `currency`, as a JSON number or decimal string
    /// (`999`, `"999.00"`).
    pub amount: serde_json::Value,
    pub currency: String,
    pub customer_email: String,
    pub customer_name: String,
    #[serde(default)]
    pub analysis_id: Option<String>,
    pub return_url: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: PaymentMethod,
}

fn default_payment_method() -> PaymentMethod {
    PaymentMethod::Stripe
}

impl CreateCheckoutRequest {
    /// `amount` converted to minor units.
    pub fn amount_minor(&self) -> Result<i64, ValidationError> {
        let raw = match &self.amount {
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::String(s) => s.clone(),
            _ => return Err(ValidationError::invalid_format("amount", "must be a decimal amount")),
        };
        parse_major_units(&raw).ok_or_else(|| {
            ValidationError::invalid_format("amount", "at most two decimal places, not negative")
        })
    }
}

/// Query string of `POST /api/billing/reconcile`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReconcileQuery {
    pub max_age_hours: Option<u64>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Responses
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub payment_id: String,
}

impl From<CheckoutCreated> for CheckoutResponse {
    fn from(created: CheckoutCreated) -> Self {
        Self {
            checkout_url: created.checkout_url,
            payment_id: created.payment_id.to_string(),
        }
    }
}

/// Acknowledgement sent to processors for every accepted delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
}

impl From<&WebhookOutcome> for WebhookAck {
    fn from(outcome: &WebhookOutcome) -> Self {
        let label = match outcome {
            WebhookOutcome::Applied { result, .. } => match result {
                ApplyOutcomeResult::Verified { .. } => "verified",
                ApplyOutcomeResult::Failed => "failed",
                ApplyOutcomeResult::AlreadyFinal(_) => "already_final",
            },
            WebhookOutcome::Unresolved { .. } => "unresolved",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored { .. } => "ignored",
            WebhookOutcome::Acknowledged => "acknowledged",
        };
        Self {
            received: true,
            outcome: label,
        }
    }
}

/// Sweep tally, field for field.
pub type ReconcileResponse = ReconciliationReport;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Error body: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
