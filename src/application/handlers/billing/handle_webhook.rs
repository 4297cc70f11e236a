//! HandleWebhookHandler - authenticates processor webhooks and applies their outcome.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::billing::{
    CorrelationError, OutcomeMetadata, PaymentMethod, PaymentOutcome, WebhookError,
};
use crate::domain::foundation::PaymentId;
use crate::ports::{ProcessedEventStore, ProcessorEventKind, SignatureCheck, WebhookDecoder};

use super::apply_outcome::{ApplyOutcomeCommand, ApplyOutcomeHandler, ApplyOutcomeResult};
use super::resolve_payment::PaymentResolver;

/// A webhook delivery, exactly as received.
#[derive(Debug, Clone)]
pub struct HandleWebhookCommand {
    pub method: PaymentMethod,
    /// Raw request body; signatures are computed over these bytes.
    pub raw_body: Vec<u8>,
    /// Value of the provider's signature header, if present.
    pub signature: Option<String>,
}

/// What happened to a delivery. Every variant is acknowledged with 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The outcome reached the entitlement writer.
    Applied {
        payment_id: PaymentId,
        result: ApplyOutcomeResult,
    },
    /// No payment matches the event's reference.
    Unresolved { reference: String },
    /// Event id already processed.
    Duplicate,
    /// Event type this service does not act on.
    Ignored { event_type: String },
    /// Recognized event that needs no state change.
    Acknowledged,
}

/// Handler for processor webhooks.
///
/// Invalid signatures are rejected before the body is even parsed, so they
/// can never cause a write. Idempotence comes from the entitlement writer;
/// the optional event store only saves repeat work.
pub struct HandleWebhookHandler {
    decoders: HashMap<PaymentMethod, Arc<dyn WebhookDecoder>>,
    resolver: Arc<PaymentResolver>,
    writer: Arc<ApplyOutcomeHandler>,
    event_store: Option<Arc<dyn ProcessedEventStore>>,
}

impl HandleWebhookHandler {
    pub fn new(resolver: Arc<PaymentResolver>, writer: Arc<ApplyOutcomeHandler>) -> Self {
        Self {
            decoders: HashMap::new(),
            resolver,
            writer,
            event_store: None,
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn WebhookDecoder>) -> Self {
        self.decoders.insert(decoder.method(), decoder);
        self
    }

    pub fn with_event_store(mut self, store: Arc<dyn ProcessedEventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    /// Header the given provider signs its deliveries in.
    pub fn signature_header(&self, method: PaymentMethod) -> Option<&'static str> {
        self.decoders.get(&method).map(|d| d.signature_header())
    }

    pub async fn handle(&self, cmd: HandleWebhookCommand) -> Result<WebhookOutcome, WebhookError> {
        let provider = cmd.method.as_str();
        let decoder = self.decoders.get(&cmd.method).ok_or_else(|| {
            WebhookError::MalformedPayload(format!("no webhook decoder for {}", provider))
        })?;

        // 1. Authenticate
        match decoder.check_signature(&cmd.raw_body, cmd.signature.as_deref()) {
            SignatureCheck::Verified => {}
            SignatureCheck::NotConfigured => {
                tracing::debug!(provider, "webhook secret not configured, signature not checked");
            }
            SignatureCheck::Rejected => {
                tracing::warn!(
                    provider,
                    has_signature = cmd.signature.is_some(),
                    "webhook rejected: invalid signature"
                );
                return Err(WebhookError::InvalidSignature);
            }
        }

        // 2. Decode
        let event = decoder.decode(&cmd.raw_body)?;
        let outcome = match event.kind {
            ProcessorEventKind::PaymentSucceeded => PaymentOutcome::Verified,
            ProcessorEventKind::PaymentFailed { reason } => PaymentOutcome::failed(reason),
            ProcessorEventKind::NoAction(reason) => {
                tracing::debug!(provider, event_id = %event.event_id, %reason, "webhook acknowledged");
                return Ok(WebhookOutcome::Acknowledged);
            }
            ProcessorEventKind::Unrecognized(event_type) => {
                tracing::debug!(provider, event_id = %event.event_id, %event_type, "webhook ignored");
                return Ok(WebhookOutcome::Ignored { event_type });
            }
        };

        if self.already_processed(provider, &event.event_id).await {
            tracing::info!(provider, event_id = %event.event_id, "duplicate webhook skipped");
            return Ok(WebhookOutcome::Duplicate);
        }

        // 3. Correlate
        let reference = event.reference.ok_or_else(|| {
            WebhookError::MalformedPayload("event carries no payment reference".to_string())
        })?;
        let payment = match self.resolver.resolve(cmd.method, &reference).await {
            Ok(resolution) => resolution.into_payment(),
            Err(CorrelationError::Unresolved { reference }) => {
                return Ok(WebhookOutcome::Unresolved { reference });
            }
            Err(CorrelationError::Lookup(err)) => {
                tracing::error!(provider, %reference, error = %err, "payment lookup failed");
                return Err(WebhookError::Persistence(err.to_string()));
            }
        };

        // 4. Apply
        let metadata = OutcomeMetadata::webhook(provider, event.event_id.clone())
            .with_verified_amount(event.amount);
        let result = self
            .writer
            .handle(ApplyOutcomeCommand {
                payment_id: payment.id,
                outcome,
                metadata,
            })
            .await
            .map_err(|err| {
                tracing::error!(
                    provider,
                    payment_id = %payment.id,
                    error = %err,
                    "failed to apply webhook outcome"
                );
                WebhookError::Persistence(err.to_string())
            })?;

        self.mark_processed(provider, &event.event_id).await;

        Ok(WebhookOutcome::Applied {
            payment_id: payment.id,
            result,
        })
    }

    async fn already_processed(&self, provider: &str, event_id: &str) -> bool {
        let Some(store) = &self.event_store else {
            return false;
        };
        match store.contains(provider, event_id).await {
            Ok(seen) => seen,
            Err(err) => {
                tracing::warn!(provider, event_id, error = %err, "event store lookup failed");
                false
            }
        }
    }

    async fn mark_processed(&self, provider: &str, event_id: &str) {
        if let Some(store) = &self.event_store {
            if let Err(err) = store.mark_processed(provider, event_id).await {
                tracing::warn!(provider, event_id, error = %err, "failed to record processed event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryPaymentRepository, InMemoryProcessedEventStore};
    use crate::adapters::mobile_money::{MobileMoneyAdapter, MobileMoneyConfig};
    use crate::domain::billing::signature;
    use crate::domain::billing::{
        Money, PaymentNotes, PaymentRecord, PaymentStatus, PlanType, SubscriptionRecord,
    };
    use crate::domain::foundation::UserId;
    use crate::ports::PaymentRepository;
    use secrecy::SecretString;

    const SECRET: &str = "mm_webhook_secret";

    struct Fixture {
        repo: InMemoryPaymentRepository,
        events: InMemoryProcessedEventStore,
        handler: HandleWebhookHandler,
        payment: PaymentRecord,
    }

    async fn fixture() -> Fixture {
        let repo = InMemoryPaymentRepository::new();
        let payment = PaymentRecord::pending(
            PaymentId::new(),
            UserId::new("user-1").unwrap(),
            None,
            "inv_abc123",
            Money::new(99_900, "BDT").unwrap(),
            PaymentMethod::MobileMoney,
            PlanType::Unlimited,
            None,
            PaymentNotes::default(),
        );
        repo.insert_pending_payment(&payment).await.unwrap();
        repo.insert_inactive_subscription(&SubscriptionRecord::inactive_for(&payment))
            .await
            .unwrap();

        let decoder = MobileMoneyAdapter::new(
            MobileMoneyConfig::new(
                SecretString::new("pk".to_string()),
                SecretString::new("sk".to_string()),
                "https://gateway.test",
            )
            .with_webhook_secret(Some(SecretString::new(SECRET.to_string()))),
        )
        .unwrap();

        let shared: Arc<dyn PaymentRepository> = Arc::new(repo.clone());
        let events = InMemoryProcessedEventStore::new();
        let handler = HandleWebhookHandler::new(
            Arc::new(PaymentResolver::new(shared.clone())),
            Arc::new(ApplyOutcomeHandler::new(shared)),
        )
        .with_decoder(Arc::new(decoder))
        .with_event_store(Arc::new(events.clone()));

        Fixture {
            repo,
            events,
            handler,
            payment,
        }
    }

    fn signed(event_id: &str, event: &str, invoice_id: &str) -> HandleWebhookCommand {
        let raw_body = format!(
            r#"{{"event_id":"{}","event":"{}","data":{{"invoice_id":"{}","amount":"999.00","currency":"BDT"}}}}"#,
            event_id, event, invoice_id
        )
        .into_bytes();
        let signature = Some(signature::sign(SECRET, &raw_body));
        HandleWebhookCommand {
            method: PaymentMethod::MobileMoney,
            raw_body,
            signature,
        }
    }

    #[tokio::test]
    async fn succeeded_event_verifies_and_activates() {
        let f = fixture().await;

        let outcome = f
            .handler
            .handle(signed("ev_1", "payment.succeeded", "inv_abc123"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Applied {
                result: ApplyOutcomeResult::Verified { .. },
                ..
            }
        ));
        let stored = f.repo.find_by_id(&f.payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Verified);
        let sub = f.repo.find_subscription_by_payment(&f.payment.id).await.unwrap().unwrap();
        assert!(sub.is_active);
        assert_eq!(f.events.len().await, 1);
    }

    #[tokio::test]
    async fn redelivery_is_short_circuited() {
        let f = fixture().await;
        f.handler
            .handle(signed("ev_1", "payment.succeeded", "inv_abc123"))
            .await
            .unwrap();
        let first = f.repo.find_subscription_by_payment(&f.payment.id).await.unwrap();

        let again = f
            .handler
            .handle(signed("ev_1", "payment.succeeded", "inv_abc123"))
            .await
            .unwrap();

        assert_eq!(again, WebhookOutcome::Duplicate);
        assert_eq!(f.repo.find_subscription_by_payment(&f.payment.id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn distinct_event_for_same_payment_is_already_final() {
        let f = fixture().await;
        f.handler
            .handle(signed("ev_1", "payment.succeeded", "inv_abc123"))
            .await
            .unwrap();

        let outcome = f
            .handler
            .handle(signed("ev_2", "payment.completed", "inv_abc123"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Applied {
                payment_id: f.payment.id,
                result: ApplyOutcomeResult::AlreadyFinal(PaymentStatus::Verified),
            }
        );
    }

    #[tokio::test]
    async fn invalid_signature_writes_nothing() {
        let f = fixture().await;
        let mut cmd = signed("ev_1", "payment.succeeded", "inv_abc123");
        cmd.signature = Some(signature::sign("wrong", &cmd.raw_body));

        let result = f.handler.handle(cmd).await;

        assert!(matches!(result, Err(WebhookError::InvalidSignature)));
        let stored = f.repo.find_by_id(&f.payment.id).await.unwrap().unwrap();
        assert!(stored.is_pending());
        assert_eq!(f.events.len().await, 0);
    }

    #[tokio::test]
    async fn missing_signature_is_rejected_when_secret_configured() {
        let f = fixture().await;
        let mut cmd = signed("ev_1", "payment.succeeded", "inv_abc123");
        cmd.signature = None;

        assert!(matches!(
            f.handler.handle(cmd).await,
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn failed_event_marks_payment_failed() {
        let f = fixture().await;

        let outcome = f
            .handler
            .handle(signed("ev_1", "payment.expired", "inv_abc123"))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            WebhookOutcome::Applied {
                result: ApplyOutcomeResult::Failed,
                ..
            }
        ));
        let sub = f.repo.find_subscription_by_payment(&f.payment.id).await.unwrap().unwrap();
        assert!(!sub.is_active);
    }

    #[tokio::test]
    async fn unknown_event_type_is_ignored() {
        let f = fixture().await;

        let outcome = f
            .handler
            .handle(signed("ev_1", "refund.issued", "inv_abc123"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Ignored {
                event_type: "refund.issued".to_string()
            }
        );
        let stored = f.repo.find_by_id(&f.payment.id).await.unwrap().unwrap();
        assert!(stored.is_pending());
    }

    #[tokio::test]
    async fn unmatched_reference_is_acknowledged() {
        let f = fixture().await;

        let outcome = f
            .handler
            .handle(signed("ev_1", "payment.succeeded", "inv_unknown"))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Unresolved {
                reference: "inv_unknown".to_string()
            }
        );
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let f = fixture().await;
        let raw_body = b"{not json".to_vec();
        let cmd = HandleWebhookCommand {
            method: PaymentMethod::MobileMoney,
            signature: Some(signature::sign(SECRET, &raw_body)),
            raw_body,
        };

        assert!(matches!(
            f.handler.handle(cmd).await,
            Err(WebhookError::MalformedPayload(_))
        ));
    }

    #[tokio::test]
    async fn persistence_failure_is_retryable_and_not_marked() {
        let f = fixture().await;
        f.repo.set_fail_writes(true);

        let result = f
            .handler
            .handle(signed("ev_1", "payment.succeeded", "inv_abc123"))
            .await;

        let err = result.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(f.events.len().await, 0);
    }

    #[test]
    fn exposes_signature_header_per_provider() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let f = runtime.block_on(fixture());
        assert_eq!(
            f.handler.signature_header(PaymentMethod::MobileMoney),
            Some("X-Signature")
        );
        assert_eq!(f.handler.signature_header(PaymentMethod::Stripe), None);
    }
}
