//! Payment processor port.
//!
//! One implementation per rail. The checkout initiator and the
//! reconciliation sweeper talk to processors only through this trait; the
//! webhook handler uses [`WebhookDecoder`] for the inbound direction.
//!
//! Implementations must bound every outbound call with a timeout and must not
//! retry internally: a failed poll is retried by the next sweep.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::domain::billing::{Money, PaymentMethod, PlanType, ProcessorError, WebhookError};
use crate::domain::foundation::{AnalysisId, PaymentId, UserId};

/// Everything a processor needs to open a hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Pre-generated id of the payment record this checkout will create.
    pub payment_id: PaymentId,
    pub user_id: UserId,
    pub plan_type: PlanType,
    pub amount: Money,
    pub customer_email: String,
    pub customer_name: String,
    pub analysis_id: Option<AnalysisId>,
    /// Where the processor sends the customer afterwards.
    pub return_url: String,
}

impl CheckoutRequest {
    /// Metadata embedded in the processor session so later events can be
    /// traced back without another lookup.
    pub fn metadata(&self) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("payment_id".to_string(), self.payment_id.to_string());
        metadata.insert("user_id".to_string(), self.user_id.to_string());
        metadata.insert("plan_type".to_string(), self.plan_type.to_string());
        if let Some(analysis_id) = &self.analysis_id {
            metadata.insert("analysis_id".to_string(), analysis_id.to_string());
        }
        metadata
    }
}

/// A hosted checkout opened at the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub checkout_url: String,
    /// Processor session/invoice id, when returned synchronously.
    pub session_id: Option<String>,
}

/// Live status of a session/invoice as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorPaymentStatus {
    /// Status in the processor's own vocabulary.
    pub raw_status: String,
    /// Captured amount, when the processor reports it.
    pub amount: Option<Money>,
}

/// Outbound port to a payment processor.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Rail this processor serves.
    fn method(&self) -> PaymentMethod;

    /// Open a checkout session.
    ///
    /// # Errors
    ///
    /// Any `ProcessorError`; callers abort before writing anything.
    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProcessorError>;

    /// Poll the status of a session or invoice.
    async fn get_status(&self, reference: &str) -> Result<ProcessorPaymentStatus, ProcessorError>;
}

/// What an inbound processor event asks this service to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEventKind {
    PaymentSucceeded,
    PaymentFailed { reason: String },
    /// Recognized, but needs no state change (e.g. a completed session still awaiting funds).
    NoAction(String),
    /// Event type this service does not act on.
    Unrecognized(String),
}

/// A decoded webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorEvent {
    pub event_id: String,
    pub event_type: String,
    pub kind: ProcessorEventKind,
    /// Session/invoice id the event refers to.
    pub reference: Option<String>,
    pub amount: Option<Money>,
    pub metadata: HashMap<String, String>,
}

/// Result of checking a webhook signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Verified,
    Rejected,
    /// No secret configured for this provider; verification skipped.
    NotConfigured,
}

/// Inbound port: authenticates and decodes a provider's webhook bodies.
pub trait WebhookDecoder: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Name of the header carrying the signature.
    fn signature_header(&self) -> &'static str;

    /// Checks `signature` against the raw body.
    fn check_signature(&self, raw_body: &[u8], signature: Option<&str>) -> SignatureCheck;

    /// Parses the raw body.
    ///
    /// # Errors
    ///
    /// `WebhookError::MalformedPayload` when the body is not a well-formed event.
    /// Unknown event types are not errors.
    fn decode(&self, raw_body: &[u8]) -> Result<ProcessorEvent, WebhookError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_processor_is_object_safe() {
        fn _accepts_dyn(_processor: &dyn PaymentProcessor) {}
    }

    #[test]
    fn webhook_decoder_is_object_safe() {
        fn _accepts_dyn(_decoder: &dyn WebhookDecoder) {}
    }

    #[test]
    fn checkout_metadata_carries_entitlement_fields() {
        let request = CheckoutRequest {
            payment_id: PaymentId::new(),
            user_id: UserId::new("user-1").unwrap(),
            plan_type: PlanType::Unlimited,
            amount: Money::new(999, "BDT").unwrap(),
            customer_email: "a@example.com".to_string(),
            customer_name: "A".to_string(),
            analysis_id: None,
            return_url: "https://app.example.com/done".to_string(),
        };

        let metadata = request.metadata();

        assert_eq!(metadata.get("user_id").map(String::as_str), Some("user-1"));
        assert_eq!(metadata.get("plan_type").map(String::as_str), Some("unlimited"));
        assert_eq!(
            metadata.get("payment_id"),
            Some(&request.payment_id.to_string())
        );
        assert!(!metadata.contains_key("analysis_id"));
    }
}
