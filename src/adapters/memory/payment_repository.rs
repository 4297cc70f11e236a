//! In-memory payment repository.
//!
//! Holds payments and subscriptions behind one async mutex so that a
//! compare-and-set and its subscription activation are observed atomically,
//! matching what the Postgres adapter achieves with a transaction. Used by
//! tests and by local runs without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::billing::{PaymentMethod, PaymentRecord, SubscriptionRecord};
use crate::domain::foundation::{DomainError, ErrorCode, PaymentId, SubscriptionId, Timestamp};
use crate::ports::{
    CasResult, PaymentRepository, StatusTransition, SubscriptionActivation, SubscriptionChange,
};

#[derive(Default)]
struct State {
    payments: HashMap<PaymentId, PaymentRecord>,
    subscriptions: Vec<SubscriptionRecord>,
}

/// Shared-state in-memory repository. Clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    state: Arc<Mutex<State>>,
    fail_writes: Arc<AtomicBool>,
    cas_delay_ms: Arc<AtomicU64>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every write fail with `DatabaseError` until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Delays every compare-and-set, before it takes effect, by `delay`.
    pub fn set_cas_delay(&self, delay: Duration) {
        self.cas_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Snapshot of all payments.
    pub async fn payments(&self) -> Vec<PaymentRecord> {
        self.state.lock().await.payments.values().cloned().collect()
    }

    /// Snapshot of all subscriptions.
    pub async fn subscriptions(&self) -> Vec<SubscriptionRecord> {
        self.state.lock().await.subscriptions.clone()
    }

    fn check_writable(&self) -> Result<(), DomainError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::database("simulated write failure"));
        }
        Ok(())
    }
}

fn activate_or_create(
    subscriptions: &mut Vec<SubscriptionRecord>,
    payment_id: PaymentId,
    activation: &SubscriptionActivation,
) -> SubscriptionChange {
    if let Some(existing) = subscriptions
        .iter_mut()
        .find(|s| s.payment_id == Some(payment_id))
    {
        if existing.is_active {
            return SubscriptionChange::AlreadyActive(existing.id);
        }
        existing.is_active = true;
        existing.expires_at = Some(activation.expires_at);
        existing.activated_at = Some(activation.activated_at);
        return SubscriptionChange::Activated(existing.id);
    }

    let id = SubscriptionId::new();
    subscriptions.push(SubscriptionRecord {
        id,
        user_id: activation.user_id.clone(),
        plan_type: activation.plan_type,
        expires_at: Some(activation.expires_at),
        is_active: true,
        payment_id: Some(payment_id),
        created_at: activation.activated_at,
        activated_at: Some(activation.activated_at),
    });
    SubscriptionChange::Created(id)
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert_pending_payment(&self, payment: &PaymentRecord) -> Result<(), DomainError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        if state.payments.contains_key(&payment.id) {
            return Err(DomainError::new(
                ErrorCode::DuplicateRecord,
                format!("payment {} already exists", payment.id),
            ));
        }
        state.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn insert_inactive_subscription(
        &self,
        subscription: &SubscriptionRecord,
    ) -> Result<(), DomainError> {
        self.check_writable()?;
        let mut state = self.state.lock().await;
        let duplicate = subscription.payment_id.is_some()
            && state
                .subscriptions
                .iter()
                .any(|s| s.payment_id == subscription.payment_id);
        if duplicate {
            return Err(DomainError::new(
                ErrorCode::DuplicateRecord,
                "subscription already linked to this payment",
            ));
        }
        state.subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, DomainError> {
        Ok(self.state.lock().await.payments.get(id).cloned())
    }

    async fn find_pending_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .get(id)
            .filter(|p| p.is_pending())
            .cloned())
    }

    async fn find_by_transaction_id(
        &self,
        method: PaymentMethod,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .values()
            .filter(|p| p.payment_method == method && p.transaction_id == transaction_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn find_by_notes_fragment(
        &self,
        method: PaymentMethod,
        fragment: &str,
    ) -> Result<Option<PaymentRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .payments
            .values()
            .filter(|p| p.payment_method == method && p.notes.contains(fragment))
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn list_pending(
        &self,
        created_after: Timestamp,
        limit: u32,
    ) -> Result<Vec<PaymentRecord>, DomainError> {
        let state = self.state.lock().await;
        let mut pending: Vec<PaymentRecord> = state
            .payments
            .values()
            .filter(|p| {
                p.is_pending()
                    && p.payment_method.is_processor_backed()
                    && !p.created_at.is_before(&created_after)
            })
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.created_at);
        pending.truncate(limit as usize);
        Ok(pending)
    }

    async fn find_subscription_by_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<SubscriptionRecord>, DomainError> {
        Ok(self
            .state
            .lock()
            .await
            .subscriptions
            .iter()
            .find(|s| s.payment_id.as_ref() == Some(payment_id))
            .cloned())
    }

    async fn compare_and_set_status(
        &self,
        transition: &StatusTransition,
    ) -> Result<CasResult, DomainError> {
        self.check_writable()?;
        let delay = self.cas_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let payment = state.payments.get_mut(&transition.payment_id).ok_or_else(|| {
            DomainError::new(
                ErrorCode::PaymentNotFound,
                format!("payment {} not found", transition.payment_id),
            )
        })?;

        if !payment.is_pending() {
            return Ok(CasResult::NotPending(payment.status));
        }

        let note = transition
            .note
            .as_ref()
            .map(|(k, v)| (k.as_str(), v.as_str()));
        payment
            .transition(transition.target, transition.at, note)
            .map_err(|e| DomainError::new(ErrorCode::InvalidStateTransition, e.to_string()))?;

        let subscription = transition.activation.as_ref().map(|activation| {
            activate_or_create(&mut state.subscriptions, transition.payment_id, activation)
        });

        Ok(CasResult::Applied { subscription })
    }
}
