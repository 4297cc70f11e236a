//! CreateCheckoutHandler - opens a processor checkout and records the pending payment.

use std::str::FromStr;
use std::sync::Arc;

use crate::domain::billing::correlation::keys;
use crate::domain::billing::{
    placeholder_transaction_id, BillingError, Money, PaymentMethod, PaymentNotes, PaymentRecord,
    PlanType, SubscriptionRecord,
};
use crate::domain::foundation::{
    AnalysisId, AuthenticatedUser, PaymentId, Timestamp, ValidationError,
};
use crate::ports::{CheckoutRequest, PaymentRepository};

use super::processors::ProcessorRegistry;

/// Command to start a checkout for the authenticated user.
#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub user: AuthenticatedUser,
    pub plan_id: String,
    /// Minor units (e.g. poisha, cents).
    pub amount_minor: i64,
    pub currency: String,
    pub customer_email: String,
    pub customer_name: String,
    pub analysis_id: Option<AnalysisId>,
    pub return_url: String,
    pub payment_method: PaymentMethod,
}

/// Where to send the customer, and the payment that tracks them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutCreated {
    pub checkout_url: String,
    pub payment_id: PaymentId,
}

/// Handler for opening checkouts.
///
/// The processor is called before anything is written, so a processor
/// failure leaves no trace. Once the processor has accepted the checkout the
/// customer is always sent to it: failing to persist the pending payment is
/// logged for reconciliation by an operator rather than surfaced.
pub struct CreateCheckoutHandler {
    repository: Arc<dyn PaymentRepository>,
    processors: ProcessorRegistry,
}

impl CreateCheckoutHandler {
    pub fn new(repository: Arc<dyn PaymentRepository>, processors: ProcessorRegistry) -> Self {
        Self {
            repository,
            processors,
        }
    }

    pub async fn handle(&self, cmd: CreateCheckoutCommand) -> Result<CheckoutCreated, BillingError> {
        // 1. Validate
        let plan_type = PlanType::from_str(&cmd.plan_id)?;
        let amount = Money::new(cmd.amount_minor, &cmd.currency)?;
        validate_return_url(&cmd.return_url)?;
        if cmd.customer_email.trim().is_empty() {
            return Err(ValidationError::empty_field("customer_email").into());
        }
        if !cmd.payment_method.is_processor_backed() {
            return Err(BillingError::UnsupportedMethod(cmd.payment_method));
        }
        let processor = self.processors.require(cmd.payment_method)?;

        // 2. Open the checkout at the processor
        let payment_id = PaymentId::new();
        let request = CheckoutRequest {
            payment_id,
            user_id: cmd.user.id.clone(),
            plan_type,
            amount: amount.clone(),
            customer_email: cmd.customer_email.trim().to_string(),
            customer_name: cmd.customer_name.trim().to_string(),
            analysis_id: cmd.analysis_id,
            return_url: cmd.return_url.clone(),
        };
        let session = processor.create_checkout(&request).await?;

        // 3. Record the pending payment and its inactive subscription
        let mut notes = PaymentNotes::default()
            .with(keys::PLAN, plan_type.as_str())
            .with(keys::CHECKOUT_URL, &session.checkout_url);
        let transaction_id = match &session.session_id {
            Some(session_id) => {
                let key = match cmd.payment_method {
                    PaymentMethod::MobileMoney => keys::INVOICE_ID,
                    _ => keys::SESSION_ID,
                };
                notes.append(key, session_id);
                session_id.clone()
            }
            None => placeholder_transaction_id(&cmd.user.id, Timestamp::now()),
        };

        let payment = PaymentRecord::pending(
            payment_id,
            cmd.user.id.clone(),
            cmd.analysis_id,
            transaction_id,
            amount,
            cmd.payment_method,
            plan_type,
            Some(request.customer_email.clone()),
            notes,
        );
        self.persist(&payment).await;

        tracing::info!(
            payment_id = %payment_id,
            user_id = %cmd.user.id,
            method = %cmd.payment_method,
            plan = %plan_type,
            "checkout created"
        );

        Ok(CheckoutCreated {
            checkout_url: session.checkout_url,
            payment_id,
        })
    }

    async fn persist(&self, payment: &PaymentRecord) {
        if let Err(err) = self.repository.insert_pending_payment(payment).await {
            tracing::error!(
                payment_id = %payment.id,
                transaction_id = %payment.transaction_id,
                error = %err,
                "failed to record pending payment after checkout was opened"
            );
            return;
        }

        let subscription = SubscriptionRecord::inactive_for(payment);
        if let Err(err) = self.repository.insert_inactive_subscription(&subscription).await {
            tracing::error!(
                payment_id = %payment.id,
                error = %err,
                "failed to pre-create inactive subscription"
            );
        }
    }
}

fn validate_return_url(url: &str) -> Result<(), ValidationError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| ValidationError::invalid_format("return_url", "must be an absolute http(s) URL"))?;
    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || url.chars().any(char::is_whitespace) {
        return Err(ValidationError::invalid_format("return_url", "missing host"));
    }
    Ok(())
}
