//! Terminal outcomes reported by processors.

use serde::Serialize;

use super::payment::{Money, PaymentStatus};

/// What a processor says happened to a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Verified,
    Failed { reason: String },
}

impl PaymentOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        PaymentOutcome::Failed {
            reason: reason.into(),
        }
    }

    /// Status the payment moves to when this outcome is applied.
    pub fn target_status(&self) -> PaymentStatus {
        match self {
            PaymentOutcome::Verified => PaymentStatus::Verified,
            PaymentOutcome::Failed { .. } => PaymentStatus::Failed,
        }
    }
}

/// Which path delivered an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeSource {
    Webhook { provider: String, event_id: String },
    Reconciliation,
}

/// Context accompanying an outcome, used for audit and amount checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeMetadata {
    pub source: OutcomeSource,
    /// Amount the processor says was captured, when it reports one.
    pub verified_amount: Option<Money>,
}

impl OutcomeMetadata {
    pub fn webhook(provider: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            source: OutcomeSource::Webhook {
                provider: provider.into(),
                event_id: event_id.into(),
            },
            verified_amount: None,
        }
    }

    pub fn reconciliation() -> Self {
        Self {
            source: OutcomeSource::Reconciliation,
            verified_amount: None,
        }
    }

    pub fn with_verified_amount(mut self, amount: Option<Money>) -> Self {
        self.verified_amount = amount;
        self
    }
}

/// Processor status collapsed onto this service's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusVerdict {
    Verified,
    Failed,
    Unchanged,
}

/// Maps a raw processor status string (case-insensitive).
///
/// Anything outside the known vocabulary leaves the payment pending.
pub fn classify_processor_status(raw: &str) -> StatusVerdict {
    match raw.trim().to_ascii_lowercase().as_str() {
        "completed" | "paid" | "succeeded" => StatusVerdict::Verified,
        "failed" | "cancelled" | "canceled" | "expired" => StatusVerdict::Failed,
        _ => StatusVerdict::Unchanged,
    }
}
