//! ApplyOutcomeHandler - the single writer of payment outcomes.
//!
//! Webhooks and reconciliation both end here. The handler reads the payment,
//! builds the transition and hands it to the repository's compare-and-set,
//! which activates the linked subscription in the same unit of work. Losing
//! the race to another caller is a normal result, not an error.

use std::sync::Arc;

use crate::domain::billing::correlation::keys;
use crate::domain::billing::{
    BillingError, OutcomeMetadata, OutcomeSource, PaymentOutcome, PaymentStatus,
};
use crate::domain::foundation::{PaymentId, Timestamp};
use crate::ports::{
    CasResult, PaymentRepository, StatusTransition, SubscriptionActivation, SubscriptionChange,
};

/// Command to apply a processor-reported outcome to one payment.
#[derive(Debug, Clone)]
pub struct ApplyOutcomeCommand {
    pub payment_id: PaymentId,
    pub outcome: PaymentOutcome,
    pub metadata: OutcomeMetadata,
}

/// What the writer did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcomeResult {
    /// This call verified the payment.
    Verified {
        expires_at: Timestamp,
        subscription: Option<SubscriptionChange>,
    },
    /// This call failed the payment.
    Failed,
    /// The payment was already terminal; nothing was written.
    AlreadyFinal(PaymentStatus),
}

pub struct ApplyOutcomeHandler {
    repository: Arc<dyn PaymentRepository>,
}

impl ApplyOutcomeHandler {
    pub fn new(repository: Arc<dyn PaymentRepository>) -> Self {
        Self { repository }
    }

    pub async fn handle(&self, cmd: ApplyOutcomeCommand) -> Result<ApplyOutcomeResult, BillingError> {
        let Some(payment) = self.repository.find_pending_by_id(&cmd.payment_id).await? else {
            let status = self
                .repository
                .find_by_id(&cmd.payment_id)
                .await?
                .ok_or(BillingError::PaymentNotFound(cmd.payment_id))?
                .status;
            tracing::debug!(
                payment_id = %cmd.payment_id,
                %status,
                "outcome ignored, payment already final"
            );
            return Ok(ApplyOutcomeResult::AlreadyFinal(status));
        };

        let now = Timestamp::now();
        let (transition, expires_at) = match &cmd.outcome {
            PaymentOutcome::Verified => {
                let expires_at = payment.plan_type.expires_at(now);
                let activation = SubscriptionActivation {
                    user_id: payment.user_id.clone(),
                    plan_type: payment.plan_type,
                    activated_at: now,
                    expires_at,
                };
                let mut transition = StatusTransition::verified(payment.id, now, activation);

                if let Some(verified) = &cmd.metadata.verified_amount {
                    if verified != &payment.amount {
                        tracing::warn!(
                            payment_id = %payment.id,
                            recorded = %payment.amount,
                            reported = %verified,
                            "processor reported a different amount than recorded"
                        );
                        transition = transition.with_note(keys::AMOUNT_MISMATCH, verified.to_string());
                    }
                }
                (transition, Some(expires_at))
            }
            PaymentOutcome::Failed { reason } => {
                (StatusTransition::failed(payment.id, now, reason.clone()), None)
            }
        };

        let result = self.repository.compare_and_set_status(&transition).await?;

        let source = source_label(&cmd.metadata.source);
        match (result, expires_at) {
            (CasResult::NotPending(status), _) => {
                tracing::info!(
                    payment_id = %payment.id,
                    %status,
                    source,
                    "payment finalized concurrently, outcome dropped"
                );
                Ok(ApplyOutcomeResult::AlreadyFinal(status))
            }
            (CasResult::Applied { subscription }, Some(expires_at)) => {
                tracing::info!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    plan = %payment.plan_type,
                    subscription = ?subscription,
                    source,
                    "payment verified"
                );
                Ok(ApplyOutcomeResult::Verified {
                    expires_at,
                    subscription,
                })
            }
            (CasResult::Applied { .. }, None) => {
                tracing::info!(payment_id = %payment.id, source, "payment failed");
                Ok(ApplyOutcomeResult::Failed)
            }
        }
    }
}

fn source_label(source: &OutcomeSource) -> &str {
    match source {
        OutcomeSource::Webhook { provider, .. } => provider.as_str(),
        OutcomeSource::Reconciliation => "reconciliation",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryPaymentRepository;
    use crate::domain::billing::{
        Money, PaymentMethod, PaymentNotes, PaymentRecord, PlanType, SubscriptionRecord,
    };
    use crate::domain::foundation::UserId;

    async fn seeded(plan: PlanType) -> (InMemoryPaymentRepository, PaymentRecord) {
        let repo = InMemoryPaymentRepository::new();
        let payment = PaymentRecord::pending(
            PaymentId::new(),
            UserId::new("user-1").unwrap(),
            None,
            "inv_1",
            Money::new(999, "BDT").unwrap(),
            PaymentMethod::MobileMoney,
            plan,
            None,
            PaymentNotes::default(),
        );
        repo.insert_pending_payment(&payment).await.unwrap();
        repo.insert_inactive_subscription(&SubscriptionRecord::inactive_for(&payment))
            .await
            .unwrap();
        (repo, payment)
    }

    fn command(payment_id: PaymentId, outcome: PaymentOutcome) -> ApplyOutcomeCommand {
        ApplyOutcomeCommand {
            payment_id,
            outcome,
            metadata: OutcomeMetadata::webhook("mobile_money", "ev_1"),
        }
    }

    #[tokio::test]
    async fn verified_outcome_activates_with_plan_expiry() {
        let (repo, payment) = seeded(PlanType::Weekly).await;
        let handler = ApplyOutcomeHandler::new(Arc::new(repo.clone()));

        let before = Timestamp::now();
        let result = handler
            .handle(command(payment.id, PaymentOutcome::Verified))
            .await
            .unwrap();

        let ApplyOutcomeResult::Verified {
            expires_at,
            subscription,
        } = result
        else {
            panic!("expected Verified");
        };
        assert!(matches!(subscription, Some(SubscriptionChange::Activated(_))));
        assert!(!expires_at.is_before(&before.add_days(7)));

        let stored = repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Verified);
        assert!(stored.verified_at.is_some());

        let sub = repo.find_subscription_by_payment(&payment.id).await.unwrap().unwrap();
        assert!(sub.is_active);
        assert_eq!(sub.expires_at, Some(expires_at));
    }

    #[tokio::test]
    async fn second_application_is_already_final() {
        let (repo, payment) = seeded(PlanType::Unlimited).await;
        let handler = ApplyOutcomeHandler::new(Arc::new(repo.clone()));

        handler
            .handle(command(payment.id, PaymentOutcome::Verified))
            .await
            .unwrap();
        let first_sub = repo.find_subscription_by_payment(&payment.id).await.unwrap();

        let again = handler
            .handle(command(payment.id, PaymentOutcome::Verified))
            .await
            .unwrap();

        assert_eq!(again, ApplyOutcomeResult::AlreadyFinal(PaymentStatus::Verified));
        assert_eq!(
            repo.find_subscription_by_payment(&payment.id).await.unwrap(),
            first_sub
        );
    }

    #[tokio::test]
    async fn failed_outcome_records_reason_and_leaves_subscription() {
        let (repo, payment) = seeded(PlanType::Unlimited).await;
        let handler = ApplyOutcomeHandler::new(Arc::new(repo.clone()));

        let result = handler
            .handle(command(payment.id, PaymentOutcome::failed("expired")))
            .await
            .unwrap();

        assert_eq!(result, ApplyOutcomeResult::Failed);
        let stored = repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Failed);
        assert_eq!(stored.notes.get(keys::FAILURE_REASON), Some("expired"));
        assert!(stored.verified_at.is_none());

        let sub = repo.find_subscription_by_payment(&payment.id).await.unwrap().unwrap();
        assert!(!sub.is_active);
        assert!(sub.expires_at.is_none());
    }

    #[tokio::test]
    async fn failure_after_verification_does_not_downgrade() {
        let (repo, payment) = seeded(PlanType::Unlimited).await;
        let handler = ApplyOutcomeHandler::new(Arc::new(repo.clone()));

        handler
            .handle(command(payment.id, PaymentOutcome::Verified))
            .await
            .unwrap();
        let result = handler
            .handle(command(payment.id, PaymentOutcome::failed("cancelled")))
            .await
            .unwrap();

        assert_eq!(result, ApplyOutcomeResult::AlreadyFinal(PaymentStatus::Verified));
    }

    #[tokio::test]
    async fn success_after_failure_reports_stored_status() {
        let (repo, payment) = seeded(PlanType::Unlimited).await;
        let handler = ApplyOutcomeHandler::new(Arc::new(repo.clone()));

        handler
            .handle(command(payment.id, PaymentOutcome::failed("expired")))
            .await
            .unwrap();
        let result = handler
            .handle(command(payment.id, PaymentOutcome::Verified))
            .await
            .unwrap();

        assert_eq!(result, ApplyOutcomeResult::AlreadyFinal(PaymentStatus::Failed));
        let sub = repo.find_subscription_by_payment(&payment.id).await.unwrap().unwrap();
        assert!(!sub.is_active);
    }

    #[tokio::test]
    async fn amount_mismatch_is_noted_not_rejected() {
        let (repo, payment) = seeded(PlanType::Unlimited).await;
        let handler = ApplyOutcomeHandler::new(Arc::new(repo.clone()));

        let mut cmd = command(payment.id, PaymentOutcome::Verified);
        cmd.metadata = cmd
            .metadata
            .with_verified_amount(Some(Money::new(500, "BDT").unwrap()));

        let result = handler.handle(cmd).await.unwrap();

        assert!(matches!(result, ApplyOutcomeResult::Verified { .. }));
        let stored = repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(stored.notes.get(keys::AMOUNT_MISMATCH), Some("5.00 BDT"));
    }

    #[tokio::test]
    async fn unknown_payment_is_not_found() {
        let handler = ApplyOutcomeHandler::new(Arc::new(InMemoryPaymentRepository::new()));
        let missing = PaymentId::new();

        let result = handler.handle(command(missing, PaymentOutcome::Verified)).await;

        assert!(matches!(result, Err(BillingError::PaymentNotFound(id)) if id == missing));
    }

    #[tokio::test]
    async fn write_failure_leaves_payment_pending() {
        let (repo, payment) = seeded(PlanType::Unlimited).await;
        repo.set_fail_writes(true);
        let handler = ApplyOutcomeHandler::new(Arc::new(repo.clone()));

        let result = handler.handle(command(payment.id, PaymentOutcome::Verified)).await;

        assert!(matches!(result, Err(BillingError::Persistence(_))));
        let stored = repo.find_by_id(&payment.id).await.unwrap().unwrap();
        assert!(stored.is_pending());
    }

    #[tokio::test]
    async fn concurrent_applications_activate_once() {
        let (repo, payment) = seeded(PlanType::Unlimited).await;
        let handler = Arc::new(ApplyOutcomeHandler::new(Arc::new(repo.clone())));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handler = handler.clone();
                let id = payment.id;
                tokio::spawn(async move {
                    handler.handle(command(id, PaymentOutcome::Verified)).await
                })
            })
            .collect();

        let mut verified = 0;
        for task in tasks {
            if let ApplyOutcomeResult::Verified { .. } = task.await.unwrap().unwrap() {
                verified += 1;
            }
        }

        assert_eq!(verified, 1);
        let active = repo.subscriptions().await.into_iter().filter(|s| s.is_active).count();
        assert_eq!(active, 1);
    }
}
