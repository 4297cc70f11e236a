//! Payment repository port.
//!
//! Exposes only the operations the billing core needs. There is no
//! general-purpose query or update method: every status change goes through
//! [`PaymentRepository::compare_and_set_status`], which is the single
//! conditional write that makes concurrent webhooks and reconciliation sweeps
//! safe.
//!
//! # Example
//!
//! ```ignore
//! let transition = StatusTransition::verified(payment.id, now, activation);
//! match repo.compare_and_set_status(&transition).await? {
//!     CasResult::Applied { subscription } => { /* this caller won */ }
//!     CasResult::NotPending(current) => { /* someone else already finished it */ }
//! }
//! ```

use async_trait::async_trait;

use crate::domain::billing::{PaymentMethod, PaymentRecord, PaymentStatus, PlanType, SubscriptionRecord};
use crate::domain::foundation::{DomainError, PaymentId, SubscriptionId, Timestamp, UserId};

/// Subscription activation to perform in the same unit of work as a
/// pending → verified transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionActivation {
    pub user_id: UserId,
    pub plan_type: PlanType,
    pub activated_at: Timestamp,
    pub expires_at: Timestamp,
}

/// A conditional status change for one payment.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusTransition {
    pub payment_id: PaymentId,
    pub target: PaymentStatus,
    pub at: Timestamp,
    /// `key=value` appended to the payment notes when the transition lands.
    pub note: Option<(String, String)>,
    /// Present only for transitions to `Verified`.
    pub activation: Option<SubscriptionActivation>,
}

impl StatusTransition {
    pub fn verified(payment_id: PaymentId, at: Timestamp, activation: SubscriptionActivation) -> Self {
        Self {
            payment_id,
            target: PaymentStatus::Verified,
            at,
            note: None,
            activation: Some(activation),
        }
    }

    pub fn failed(payment_id: PaymentId, at: Timestamp, reason: impl Into<String>) -> Self {
        Self {
            payment_id,
            target: PaymentStatus::Failed,
            at,
            note: Some(("failure_reason".to_string(), reason.into())),
            activation: None,
        }
    }

    pub fn with_note(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.note = Some((key.into(), value.into()));
        self
    }
}

/// What happened to the subscription linked to a verified payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionChange {
    /// The inactive row pre-created at checkout was activated.
    Activated(SubscriptionId),
    /// No row existed; a new active one was inserted.
    Created(SubscriptionId),
    /// The linked row was already active and was left untouched.
    AlreadyActive(SubscriptionId),
}

impl SubscriptionChange {
    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            SubscriptionChange::Activated(id)
            | SubscriptionChange::Created(id)
            | SubscriptionChange::AlreadyActive(id) => *id,
        }
    }
}

/// Result of a compare-and-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasResult {
    /// This caller moved the payment out of pending.
    Applied { subscription: Option<SubscriptionChange> },
    /// The payment was no longer pending; nothing was written.
    NotPending(PaymentStatus),
}

/// Repository port for payments and the subscriptions they grant.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Persist a new pending payment.
    ///
    /// # Errors
    ///
    /// - `DuplicateRecord` if the id already exists
    /// - `DatabaseError` on persistence failure
    async fn insert_pending_payment(&self, payment: &PaymentRecord) -> Result<(), DomainError>;

    /// Persist the inactive subscription that a pending payment will activate.
    async fn insert_inactive_subscription(
        &self,
        subscription: &SubscriptionRecord,
    ) -> Result<(), DomainError>;

    /// Find a payment regardless of status.
    async fn find_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, DomainError>;

    /// Find a payment only if it is still pending.
    async fn find_pending_by_id(&self, id: &PaymentId) -> Result<Option<PaymentRecord>, DomainError>;

    /// Exact match on the processor transaction id for one payment method.
    async fn find_by_transaction_id(
        &self,
        method: PaymentMethod,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, DomainError>;

    /// Newest payment of `method` whose notes contain `fragment`.
    async fn find_by_notes_fragment(
        &self,
        method: PaymentMethod,
        fragment: &str,
    ) -> Result<Option<PaymentRecord>, DomainError>;

    /// Pending, processor-backed payments created at or after `created_after`,
    /// oldest first, at most `limit`.
    async fn list_pending(
        &self,
        created_after: Timestamp,
        limit: u32,
    ) -> Result<Vec<PaymentRecord>, DomainError>;

    /// Subscription linked to a payment through its back-reference.
    async fn find_subscription_by_payment(
        &self,
        payment_id: &PaymentId,
    ) -> Result<Option<SubscriptionRecord>, DomainError>;

    /// Move a payment from pending to `transition.target`.
    ///
    /// Atomic: the status update only applies while the stored status is
    /// still pending, and when `transition.activation` is present the linked
    /// subscription is activated (or created) in the same unit of work. An
    /// already-active subscription is never modified. Either everything lands
    /// or nothing does.
    ///
    /// # Errors
    ///
    /// - `PaymentNotFound` if no payment has this id
    /// - `DatabaseError` on persistence failure (the payment stays pending)
    async fn compare_and_set_status(
        &self,
        transition: &StatusTransition,
    ) -> Result<CasResult, DomainError>;
}
