//! Stripe API objects as they arrive in responses and webhook payloads.
//!
//! Only the fields the billing core reads are modelled; everything else is
//! ignored by serde.

use serde::Deserialize;
use std::collections::HashMap;

/// Envelope of every Stripe webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeWebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub livemode: bool,
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

/// A Checkout Session, from the API or a `checkout.session.*` event.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    /// `open`, `complete` or `expired`.
    #[serde(default)]
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`.
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl StripeCheckoutSession {
    /// True once funds are captured (or nothing was owed).
    pub fn is_paid(&self) -> bool {
        matches!(
            self.payment_status.as_deref(),
            Some("paid") | Some("no_payment_required")
        )
    }

    /// Collapses `status` and `payment_status` into one status word.
    pub fn effective_status(&self) -> String {
        if self.is_paid() {
            return "paid".to_string();
        }
        self.status.clone().unwrap_or_else(|| "open".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_checkout_completed_event() {
        let json = r#"{
            "id": "evt_1",
            "type": "checkout.session.completed",
            "livemode": false,
            "data": {"object": {
                "id": "cs_test_1",
                "object": "checkout.session",
                "status": "complete",
                "payment_status": "paid",
                "amount_total": 999,
                "currency": "bdt",
                "metadata": {"user_id": "user-1", "plan_type": "unlimited"}
            }}
        }"#;

        let event: StripeWebhookEvent = serde_json::from_str(json).unwrap();
        let session: StripeCheckoutSession = serde_json::from_value(event.data.object).unwrap();

        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(session.id, "cs_test_1");
        assert!(session.is_paid());
        assert_eq!(session.metadata.get("plan_type").map(String::as_str), Some("unlimited"));
    }

    #[test]
    fn effective_status_prefers_payment_status() {
        let session: StripeCheckoutSession = serde_json::from_str(
            r#"{"id":"cs_1","status":"complete","payment_status":"unpaid"}"#,
        )
        .unwrap();
        assert_eq!(session.effective_status(), "complete");

        let expired: StripeCheckoutSession =
            serde_json::from_str(r#"{"id":"cs_2","status":"expired","payment_status":"unpaid"}"#)
                .unwrap();
        assert_eq!(expired.effective_status(), "expired");
    }
}
