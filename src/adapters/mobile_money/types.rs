//! Wire types for the mobile-money gateway.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::adapters::processor_http::parse_major_amount;
use crate::domain::billing::Money;

/// Body of `POST /api/checkout-v2`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateInvoiceRequest {
    /// Major units with two decimals, e.g. `"999.00"`.
    pub amount: String,
    pub currency: String,
    /// Our payment id, echoed back in events.
    pub reference: String,
    pub customer_name: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateInvoiceResponse {
    pub payment_url: String,
    /// Some gateway deployments only assign the invoice id once the payer
    /// lands on the hosted page.
    #[serde(default)]
    pub invoice_id: Option<String>,
}

/// Body of `POST /api/verify-payment`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyPaymentRequest<'a> {
    pub invoice_id: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentResponse {
    #[serde(default)]
    pub invoice_id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub currency: Option<String>,
}

/// Webhook envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct MobileMoneyWebhook {
    pub event_id: String,
    pub event: String,
    pub data: MobileMoneyPayment,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MobileMoneyPayment {
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub sender_number: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// The gateway sends amounts either as JSON numbers or decimal strings.
pub fn amount_from_json(value: Option<&serde_json::Value>, currency: Option<&str>) -> Option<Money> {
    let raw = match value? {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    parse_major_amount(&raw, currency?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amount_accepts_strings_and_numbers() {
        assert_eq!(
            amount_from_json(Some(&json!("999.00")), Some("BDT")),
            Some(Money::new(99_900, "BDT").unwrap())
        );
        assert_eq!(
            amount_from_json(Some(&json!(9.5)), Some("BDT")),
            Some(Money::new(950, "BDT").unwrap())
        );
    }

    #[test]
    fn amount_requires_currency_and_scalar() {
        assert!(amount_from_json(Some(&json!("10")), None).is_none());
        assert!(amount_from_json(Some(&json!({"value": 10})), Some("BDT")).is_none());
        assert!(amount_from_json(None, Some("BDT")).is_none());
    }

    #[test]
    fn webhook_parses_with_sparse_data() {
        let hook: MobileMoneyWebhook = serde_json::from_str(
            r#"{"event_id":"ev_1","event":"payment.succeeded","data":{"invoice_id":"inv_1"}}"#,
        )
        .unwrap();
        assert_eq!(hook.data.invoice_id.as_deref(), Some("inv_1"));
        assert!(hook.data.metadata.is_empty());
    }
}
