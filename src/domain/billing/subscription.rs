//! Subscription record granted in exchange for a verified payment.

use crate::domain::foundation::{PaymentId, SubscriptionId, Timestamp, UserId};

use super::payment::PaymentRecord;
use super::plan::PlanType;

/// A user's entitlement to a plan.
///
/// Created inactive at checkout (linked through `payment_id`) and flipped to
/// active once, when that payment is verified.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub plan_type: PlanType,
    pub expires_at: Option<Timestamp>,
    pub is_active: bool,
    pub payment_id: Option<PaymentId>,
    pub created_at: Timestamp,
    pub activated_at: Option<Timestamp>,
}

impl SubscriptionRecord {
    /// Inactive placeholder created alongside a pending payment.
    pub fn inactive_for(payment: &PaymentRecord) -> Self {
        Self {
            id: SubscriptionId::new(),
            user_id: payment.user_id.clone(),
            plan_type: payment.plan_type,
            expires_at: None,
            is_active: false,
            payment_id: Some(payment.id),
            created_at: Timestamp::now(),
            activated_at: None,
        }
    }

    /// Active subscription for a payment that had no pre-created row.
    pub fn active_for(payment: &PaymentRecord, verified_at: Timestamp) -> Self {
        let mut subscription = Self::inactive_for(payment);
        subscription.activate(verified_at);
        subscription
    }

    /// Activates an inactive subscription.
    ///
    /// Returns false, leaving the record untouched, when already active.
    pub fn activate(&mut self, verified_at: Timestamp) -> bool {
        if self.is_active {
            return false;
        }
        self.is_active = true;
        self.expires_at = Some(self.plan_type.expires_at(verified_at));
        self.activated_at = Some(verified_at);
        true
    }
}
