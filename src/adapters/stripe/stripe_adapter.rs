//! Stripe payment processor adapter.
//!
//! Opens Checkout Sessions, polls their status for reconciliation, and
//! authenticates/decodes `checkout.session.*` webhooks.
//!
//! # Security
//!
//! - Timestamped HMAC-SHA256 signatures (`Stripe-Signature`), constant-time compare
//! - 5-minute replay window
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key).with_webhook_secret(secret);
//! let adapter = StripePaymentAdapter::new(config)?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::adapters::processor_http::{
    build_client, ensure_reference, error_from_response, transport_error,
};
use crate::domain::billing::signature::{self, DEFAULT_TOLERANCE_SECS};
use crate::domain::billing::{Money, PaymentMethod, ProcessorError, WebhookError};
use crate::domain::foundation::Timestamp;
use crate::ports::{
    CheckoutRequest, CheckoutSession, PaymentProcessor, ProcessorEvent, ProcessorEventKind,
    ProcessorPaymentStatus, SignatureCheck, WebhookDecoder,
};

use super::webhook_types::{StripeCheckoutSession, StripeWebhookEvent};

const PROVIDER: &str = "stripe";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_live_...` or `sk_test_...`).
    api_key: SecretString,

    /// Webhook signing secret (`whsec_...`). Verification is skipped when absent.
    webhook_secret: Option<SecretString>,

    /// Base URL for the Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Upper bound for every outbound call.
    timeout: Duration,

    /// Reject test-mode events (production).
    require_livemode: bool,
}

impl StripeConfig {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            webhook_secret: None,
            api_base_url: "https://api.stripe.com".to_string(),
            timeout: Duration::from_secs(10),
            require_livemode: false,
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<SecretString>) -> Self {
        self.webhook_secret = secret;
        self
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }
}

/// Stripe Checkout adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Result<Self, ProcessorError> {
        let http_client = build_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
        let separator = if request.return_url.contains('?') { '&' } else { '?' };
        let mut params = vec![
            ("mode".to_string(), "payment".to_string()),
            ("customer_email".to_string(), request.customer_email.clone()),
            ("client_reference_id".to_string(), request.payment_id.to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.amount.currency().to_ascii_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount.amount_minor().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                format!("{} plan", request.plan_type),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "success_url".to_string(),
                format!("{}{}session_id={{CHECKOUT_SESSION_ID}}", request.return_url, separator),
            ),
            ("cancel_url".to_string(), request.return_url.clone()),
        ];

        let mut metadata: Vec<(String, String)> = request.metadata().into_iter().collect();
        metadata.sort();
        for (key, value) in metadata {
            params.push((format!("metadata[{}]", key), value));
        }
        params
    }

    fn decode_session(object: serde_json::Value) -> Result<StripeCheckoutSession, WebhookError> {
        serde_json::from_value(object)
            .map_err(|e| WebhookError::MalformedPayload(format!("checkout session: {}", e)))
    }
}

fn session_amount(session: &StripeCheckoutSession) -> Option<Money> {
    match (session.amount_total, session.currency.as_deref()) {
        (Some(amount), Some(currency)) => Money::new(amount, currency).ok(),
        _ => None,
    }
}

#[async_trait]
impl PaymentProcessor for StripePaymentAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProcessorError> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .header("Idempotency-Key", request.payment_id.to_string())
            .form(&Self::checkout_form(request))
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let session: StripeCheckoutSession = response.json().await.map_err(transport_error)?;
        let checkout_url = session.url.clone().ok_or_else(|| {
            ProcessorError::invalid_response("Stripe session response carried no url")
        })?;

        tracing::debug!(session_id = %session.id, "Stripe checkout session created");

        Ok(CheckoutSession {
            checkout_url,
            session_id: Some(session.id),
        })
    }

    async fn get_status(&self, reference: &str) -> Result<ProcessorPaymentStatus, ProcessorError> {
        let reference = ensure_reference(reference)?;
        let url = format!("{}/v1/checkout/sessions/{}", self.config.api_base_url, reference);

        let response = self
            .http_client
            .get(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }

        let session: StripeCheckoutSession = response.json().await.map_err(transport_error)?;

        Ok(ProcessorPaymentStatus {
            raw_status: session.effective_status(),
            amount: session_amount(&session),
        })
    }
}

impl WebhookDecoder for StripePaymentAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "Stripe-Signature"
    }

    fn check_signature(&self, raw_body: &[u8], signature: Option<&str>) -> SignatureCheck {
        let Some(secret) = &self.config.webhook_secret else {
            return SignatureCheck::NotConfigured;
        };
        let Some(header) = signature else {
            return SignatureCheck::Rejected;
        };
        match signature::check_timestamped(
            secret.expose_secret(),
            raw_body,
            header,
            Timestamp::now(),
            DEFAULT_TOLERANCE_SECS,
        ) {
            Ok(()) => SignatureCheck::Verified,
            Err(reason) => {
                tracing::warn!(provider = PROVIDER, %reason, "Stripe webhook signature rejected");
                SignatureCheck::Rejected
            }
        }
    }

    fn decode(&self, raw_body: &[u8]) -> Result<ProcessorEvent, WebhookError> {
        let event: StripeWebhookEvent = serde_json::from_slice(raw_body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        if self.config.require_livemode && !event.livemode {
            tracing::warn!(event_id = %event.id, "test-mode Stripe event received in live mode");
            return Ok(ProcessorEvent {
                event_id: event.id,
                event_type: event.event_type,
                kind: ProcessorEventKind::NoAction("test-mode event".to_string()),
                reference: None,
                amount: None,
                metadata: HashMap::new(),
            });
        }

        let kind = match event.event_type.as_str() {
            "checkout.session.completed" => None,
            "checkout.session.async_payment_succeeded" => Some(ProcessorEventKind::PaymentSucceeded),
            "checkout.session.expired" => Some(ProcessorEventKind::PaymentFailed {
                reason: "checkout session expired".to_string(),
            }),
            "checkout.session.async_payment_failed" => Some(ProcessorEventKind::PaymentFailed {
                reason: "asynchronous payment failed".to_string(),
            }),
            other => {
                return Ok(ProcessorEvent {
                    event_id: event.id.clone(),
                    event_type: event.event_type.clone(),
                    kind: ProcessorEventKind::Unrecognized(other.to_string()),
                    reference: None,
                    amount: None,
                    metadata: HashMap::new(),
                })
            }
        };

        let session = Self::decode_session(event.data.object)?;

        // A completed session may still be waiting on a delayed payment method.
        let kind = kind.unwrap_or_else(|| {
            if session.is_paid() {
                ProcessorEventKind::PaymentSucceeded
            } else {
                ProcessorEventKind::NoAction("session completed, payment not yet captured".to_string())
            }
        });

        Ok(ProcessorEvent {
            event_id: event.id,
            event_type: event.event_type,
            kind,
            amount: session_amount(&session),
            reference: Some(session.id),
            metadata: session.metadata,
        })
    }
}
