//! Mobile-money gateway adapter (hosted invoices settled in BDT).
//!
//! Outbound requests are JSON bodies signed with HMAC-SHA256 of the exact
//! bytes sent (`X-Signature`), alongside the public key in `X-Api-Key`.
//! Inbound webhooks carry a plain hex HMAC of the raw body in `X-Signature`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::adapters::processor_http::{
    build_client, ensure_reference, error_from_response, transport_error,
};
use crate::domain::billing::signature;
use crate::domain::billing::{PaymentMethod, ProcessorError, WebhookError};
use crate::ports::{
    CheckoutRequest, CheckoutSession, PaymentProcessor, ProcessorEvent, ProcessorEventKind,
    ProcessorPaymentStatus, SignatureCheck, WebhookDecoder,
};

use super::types::{
    amount_from_json, CreateInvoiceRequest, CreateInvoiceResponse, MobileMoneyWebhook,
    VerifyPaymentRequest, VerifyPaymentResponse,
};

const PROVIDER: &str = "mobile_money";

/// Credentials and endpoint for the gateway.
#[derive(Clone)]
pub struct MobileMoneyConfig {
    api_key: SecretString,
    api_secret: SecretString,
    webhook_secret: Option<SecretString>,
    base_url: String,
    timeout: Duration,
}

impl MobileMoneyConfig {
    pub fn new(api_key: SecretString, api_secret: SecretString, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            api_secret,
            webhook_secret: None,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_webhook_secret(mut self, secret: Option<SecretString>) -> Self {
        self.webhook_secret = secret;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct MobileMoneyAdapter {
    config: MobileMoneyConfig,
    http_client: reqwest::Client,
}

impl MobileMoneyAdapter {
    pub fn new(config: MobileMoneyConfig) -> Result<Self, ProcessorError> {
        let http_client = build_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Serializes `body` once so the signature covers the bytes actually sent.
    async fn post_signed<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, ProcessorError> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ProcessorError::invalid_response(format!("request encoding: {}", e)))?;
        let request_signature = signature::sign(self.config.api_secret.expose_secret(), &payload);

        let response = self
            .http_client
            .post(format!("{}{}", self.config.base_url, path))
            .header("Content-Type", "application/json")
            .header("X-Api-Key", self.config.api_key.expose_secret())
            .header("X-Signature", request_signature)
            .body(payload)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(error_from_response(PROVIDER, response).await);
        }
        Ok(response)
    }

    fn invoice_request(request: &CheckoutRequest) -> CreateInvoiceRequest {
        CreateInvoiceRequest {
            amount: request.amount.to_major_string(),
            currency: request.amount.currency().to_string(),
            reference: request.payment_id.to_string(),
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            success_url: request.return_url.clone(),
            cancel_url: request.return_url.clone(),
            metadata: request.metadata(),
        }
    }
}

#[async_trait]
impl PaymentProcessor for MobileMoneyAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::MobileMoney
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProcessorError> {
        let response = self
            .post_signed("/api/checkout-v2", &Self::invoice_request(request))
            .await?;
        let invoice: CreateInvoiceResponse = response.json().await.map_err(transport_error)?;

        if invoice.payment_url.trim().is_empty() {
            return Err(ProcessorError::invalid_response(
                "mobile-money gateway returned an empty payment url",
            ));
        }

        Ok(CheckoutSession {
            checkout_url: invoice.payment_url,
            session_id: invoice.invoice_id.filter(|id| !id.trim().is_empty()),
        })
    }

    async fn get_status(&self, reference: &str) -> Result<ProcessorPaymentStatus, ProcessorError> {
        let invoice_id = ensure_reference(reference)?;
        let response = self
            .post_signed("/api/verify-payment", &VerifyPaymentRequest { invoice_id })
            .await?;
        let verified: VerifyPaymentResponse = response.json().await.map_err(transport_error)?;

        if let Some(echoed) = verified.invoice_id.as_deref() {
            if echoed != invoice_id {
                return Err(ProcessorError::invalid_response(
                    "verify-payment answered for a different invoice",
                ));
            }
        }

        Ok(ProcessorPaymentStatus {
            amount: amount_from_json(verified.amount.as_ref(), verified.currency.as_deref()),
            raw_status: verified.status,
        })
    }
}

impl WebhookDecoder for MobileMoneyAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::MobileMoney
    }

    fn signature_header(&self) -> &'static str {
        "X-Signature"
    }

    fn check_signature(&self, raw_body: &[u8], received: Option<&str>) -> SignatureCheck {
        let Some(secret) = &self.config.webhook_secret else {
            return SignatureCheck::NotConfigured;
        };
        match received {
            Some(sig) if signature::verify(secret.expose_secret(), raw_body, sig) => {
                SignatureCheck::Verified
            }
            _ => SignatureCheck::Rejected,
        }
    }

    fn decode(&self, raw_body: &[u8]) -> Result<ProcessorEvent, WebhookError> {
        let hook: MobileMoneyWebhook = serde_json::from_slice(raw_body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        let kind = match hook.event.as_str() {
            "payment.succeeded" | "payment.completed" => ProcessorEventKind::PaymentSucceeded,
            "payment.failed" | "payment.cancelled" | "payment.expired" => {
                let reason = hook
                    .data
                    .status
                    .clone()
                    .unwrap_or_else(|| hook.event.trim_start_matches("payment.").to_string());
                ProcessorEventKind::PaymentFailed { reason }
            }
            other => ProcessorEventKind::Unrecognized(other.to_string()),
        };

        let reference = hook.data.invoice_id.clone().filter(|id| !id.trim().is_empty());
        if reference.is_none() && !matches!(kind, ProcessorEventKind::Unrecognized(_)) {
            return Err(WebhookError::MalformedPayload(
                "payment event without invoice_id".to_string(),
            ));
        }

        let mut metadata: HashMap<String, String> = hook.data.metadata;
        if let Some(sender) = hook.data.sender_number {
            metadata.insert("sender_number".to_string(), sender);
        }

        Ok(ProcessorEvent {
            event_id: hook.event_id,
            event_type: hook.event,
            kind,
            reference,
            amount: amount_from_json(hook.data.amount.as_ref(), hook.data.currency.as_deref()),
            metadata,
        })
    }
}
