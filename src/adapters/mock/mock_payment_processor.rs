//! Mock payment processor for testing.
//!
//! Supports:
//! - Pre-configured checkout sessions and per-reference statuses
//! - Error injection per method
//! - Artificial latency (for sweep deadline tests)
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::billing::{Money, PaymentMethod, ProcessorError};
use crate::ports::{CheckoutRequest, CheckoutSession, PaymentProcessor, ProcessorPaymentStatus};

/// Mock payment processor.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProcessor::new(PaymentMethod::MobileMoney);
/// mock.set_status("inv_1", "COMPLETED");
/// let status = mock.get_status("inv_1").await?;
/// ```
#[derive(Clone)]
pub struct MockPaymentProcessor {
    method: PaymentMethod,
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Session returned by `create_checkout`; generated when unset.
    next_checkout: Option<CheckoutSession>,

    /// Statuses by processor reference.
    statuses: HashMap<String, ProcessorPaymentStatus>,

    /// Errors by method name.
    method_errors: HashMap<String, ProcessorError>,

    /// Errors by processor reference, for `get_status`.
    reference_errors: HashMap<String, ProcessorError>,

    /// Delay applied to every call.
    latency: Option<Duration>,

    call_log: Vec<MethodCall>,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockPaymentProcessor {
    pub fn new(method: PaymentMethod) -> Self {
        Self {
            method,
            inner: Arc::new(Mutex::new(MockState::default())),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Set the checkout session to return.
    pub fn set_checkout_session(&self, session: CheckoutSession) {
        self.inner.lock().unwrap().next_checkout = Some(session);
    }

    /// Set the raw status returned for `reference`.
    pub fn set_status(&self, reference: &str, raw_status: &str) {
        self.inner.lock().unwrap().statuses.insert(
            reference.to_string(),
            ProcessorPaymentStatus {
                raw_status: raw_status.to_string(),
                amount: None,
            },
        );
    }

    /// Set the raw status and captured amount returned for `reference`.
    pub fn set_status_with_amount(&self, reference: &str, raw_status: &str, amount: Money) {
        self.inner.lock().unwrap().statuses.insert(
            reference.to_string(),
            ProcessorPaymentStatus {
                raw_status: raw_status.to_string(),
                amount: Some(amount),
            },
        );
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: ProcessorError) {
        self.inner
            .lock()
            .unwrap()
            .method_errors
            .insert(method.to_string(), error);
    }

    /// Set an error returned by `get_status` for one reference only.
    pub fn set_reference_error(&self, reference: &str, error: ProcessorError) {
        self.inner
            .lock()
            .unwrap()
            .reference_errors
            .insert(reference.to_string(), error);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.lock().unwrap().latency = Some(latency);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.inner.lock().unwrap().call_log.clone()
    }

    /// Number of calls to `method`.
    pub fn call_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    fn record_call(&self, method: &str, args: Vec<String>) -> Option<Duration> {
        let mut state = self.inner.lock().unwrap();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
        state.latency
    }

    fn check_error(&self, method: &str) -> Result<(), ProcessorError> {
        match self.inner.lock().unwrap().method_errors.get(method) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, ProcessorError> {
        let latency = self.record_call(
            "create_checkout",
            vec![request.payment_id.to_string(), request.plan_type.to_string()],
        );
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check_error("create_checkout")?;

        let configured = self.inner.lock().unwrap().next_checkout.clone();
        Ok(configured.unwrap_or_else(|| CheckoutSession {
            checkout_url: format!("https://checkout.test/pay/{}", request.payment_id),
            session_id: Some(format!("cs_test_{}", request.payment_id.as_uuid().simple())),
        }))
    }

    async fn get_status(&self, reference: &str) -> Result<ProcessorPaymentStatus, ProcessorError> {
        let latency = self.record_call("get_status", vec![reference.to_string()]);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.check_error("get_status")?;

        let state = self.inner.lock().unwrap();
        if let Some(err) = state.reference_errors.get(reference) {
            return Err(err.clone());
        }
        Ok(state
            .statuses
            .get(reference)
            .cloned()
            .unwrap_or_else(|| ProcessorPaymentStatus {
                raw_status: "pending".to_string(),
                amount: None,
            }))
    }
}
