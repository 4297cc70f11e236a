//! Payment record and its lifecycle.
//!
//! A payment starts `Pending` when a checkout session is opened and moves
//! exactly once to either `Verified` or `Failed`. Both are terminal: a later
//! webhook or reconciliation poll never overwrites them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{
    AnalysisId, PaymentId, StateMachine, Timestamp, UserId, ValidationError,
};

use super::notes::PaymentNotes;
use super::plan::PlanType;

/// Payment verification status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Checkout opened, processor has not confirmed yet.
    Pending,

    /// Processor confirmed the funds. Terminal.
    Verified,

    /// Processor reported failure, cancellation or expiry. Terminal.
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Verified => "verified",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "verified" => Ok(PaymentStatus::Verified),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

impl StateMachine for PaymentStatus {
    fn can_transition_to(&self, target: &Self) -> bool {
        use PaymentStatus::*;
        matches!((self, target), (Pending, Verified) | (Pending, Failed))
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use PaymentStatus::*;
        match self {
            Pending => vec![Verified, Failed],
            Verified | Failed => vec![],
        }
    }
}

/// Which rail the payment was made through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card checkout hosted by Stripe.
    Stripe,

    /// Local mobile-money gateway.
    MobileMoney,

    /// Recorded by an administrator; never polled.
    Manual,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "stripe",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::Manual => "manual",
        }
    }

    /// Returns true if a processor can be asked about this payment.
    pub fn is_processor_backed(&self) -> bool {
        !matches!(self, PaymentMethod::Manual)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "stripe" | "card" => Ok(PaymentMethod::Stripe),
            "mobile_money" => Ok(PaymentMethod::MobileMoney),
            "manual" => Ok(PaymentMethod::Manual),
            other => Err(ValidationError::invalid_format(
                "payment_method",
                format!("unknown payment method '{}'", other),
            )),
        }
    }
}

/// Amount in the currency's minor unit (cents, paisa).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount_minor: i64,
    currency: String,
}

impl Money {
    /// Creates a positive amount in a three-letter ISO-4217 currency.
    pub fn new(amount_minor: i64, currency: impl AsRef<str>) -> Result<Self, ValidationError> {
        if amount_minor <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, amount_minor));
        }
        let currency = currency.as_ref().trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::invalid_format(
                "currency",
                "expected a three-letter ISO-4217 code",
            ));
        }
        Ok(Self {
            amount_minor,
            currency: currency.to_ascii_uppercase(),
        })
    }

    pub fn amount_minor(&self) -> i64 {
        self.amount_minor
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Decimal rendering with two fraction digits, as mobile-money gateways expect.
    pub fn to_major_string(&self) -> String {
        format!("{}.{:02}", self.amount_minor / 100, self.amount_minor % 100)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_major_string(), self.currency)
    }
}

/// A payment as recorded by this service.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub user_id: UserId,
    pub analysis_id: Option<AnalysisId>,
    /// Processor session/invoice id, or a local placeholder (see `correlation`).
    pub transaction_id: String,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub plan_type: PlanType,
    pub status: PaymentStatus,
    /// Customer email or payer handle, kept for audit.
    pub sender_identifier: Option<String>,
    pub notes: PaymentNotes,
    pub created_at: Timestamp,
    pub verified_at: Option<Timestamp>,
}

impl PaymentRecord {
    /// Creates a pending record for a freshly opened checkout.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        id: PaymentId,
        user_id: UserId,
        analysis_id: Option<AnalysisId>,
        transaction_id: impl Into<String>,
        amount: Money,
        payment_method: PaymentMethod,
        plan_type: PlanType,
        sender_identifier: Option<String>,
        notes: PaymentNotes,
    ) -> Self {
        Self {
            id,
            user_id,
            analysis_id,
            transaction_id: transaction_id.into(),
            amount,
            payment_method,
            plan_type,
            status: PaymentStatus::Pending,
            sender_identifier,
            notes,
            created_at: Timestamp::now(),
            verified_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == PaymentStatus::Pending
    }

    /// Moves the record to a terminal status.
    ///
    /// `verified_at` is set only for `Verified`. An optional note is appended
    /// to the audit trail.
    pub fn transition(
        &mut self,
        target: PaymentStatus,
        at: Timestamp,
        note: Option<(&str, &str)>,
    ) -> Result<(), ValidationError> {
        self.status = self.status.transition_to(target)?;
        if target == PaymentStatus::Verified {
            self.verified_at = Some(at);
        }
        if let Some((key, value)) = note {
            self.notes.append(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pending_record() -> PaymentRecord {
        PaymentRecord::pending(
            PaymentId::new(),
            UserId::new("user-1").unwrap(),
            None,
            "cs_test_123",
            Money::new(999, "bdt").unwrap(),
            PaymentMethod::MobileMoney,
            PlanType::Unlimited,
            Some("payer@example.com".to_string()),
            PaymentNotes::default(),
        )
    }

    // ══════════════════════════════════════════════════════════════
    // Status Transitions
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn pending_can_become_verified_or_failed() {
        assert!(PaymentStatus::Pending.can_transition_to(&PaymentStatus::Verified));
        assert!(PaymentStatus::Pending.can_transition_to(&PaymentStatus::Failed));
    }

    #[test]
    fn verified_and_failed_are_terminal() {
        assert!(PaymentStatus::Verified.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(!PaymentStatus::Pending.is_terminal());
    }

    #[test]
    fn pending_cannot_transition_to_itself() {
        assert!(PaymentStatus::Pending
            .transition_to(PaymentStatus::Pending)
            .is_err());
    }

    fn any_status() -> impl Strategy<Value = PaymentStatus> {
        prop_oneof![
            Just(PaymentStatus::Pending),
            Just(PaymentStatus::Verified),
            Just(PaymentStatus::Failed),
        ]
    }

    proptest! {
        #[test]
        fn only_pending_has_outgoing_transitions(from in any_status(), to in any_status()) {
            let allowed = from.can_transition_to(&to);
            prop_assert_eq!(allowed, from == PaymentStatus::Pending && to != PaymentStatus::Pending);
            prop_assert_eq!(allowed, from.valid_transitions().contains(&to));
        }
    }

    #[test]
    fn transition_to_verified_stamps_verified_at() {
        let mut record = pending_record();
        let at = Timestamp::now();

        record.transition(PaymentStatus::Verified, at, None).unwrap();

        assert_eq!(record.status, PaymentStatus::Verified);
        assert_eq!(record.verified_at, Some(at));
    }

    #[test]
    fn transition_to_failed_records_reason_without_verified_at() {
        let mut record = pending_record();

        record
            .transition(
                PaymentStatus::Failed,
                Timestamp::now(),
                Some(("failure_reason", "expired")),
            )
            .unwrap();

        assert_eq!(record.status, PaymentStatus::Failed);
        assert!(record.verified_at.is_none());
        assert_eq!(record.notes.get("failure_reason"), Some("expired"));
    }

    #[test]
    fn second_transition_is_rejected() {
        let mut record = pending_record();
        record
            .transition(PaymentStatus::Verified, Timestamp::now(), None)
            .unwrap();

        let result = record.transition(PaymentStatus::Failed, Timestamp::now(), None);

        assert!(result.is_err());
        assert_eq!(record.status, PaymentStatus::Verified);
    }

    // ══════════════════════════════════════════════════════════════
    // Value Objects
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn money_normalizes_currency() {
        let money = Money::new(999, " bdt ").unwrap();
        assert_eq!(money.currency(), "BDT");
        assert_eq!(money.to_major_string(), "9.99");
    }

    #[test]
    fn money_rejects_non_positive_amounts() {
        assert!(Money::new(0, "USD").is_err());
        assert!(Money::new(-5, "USD").is_err());
    }

    #[test]
    fn money_rejects_malformed_currency() {
        assert!(Money::new(100, "US").is_err());
        assert!(Money::new(100, "U5D").is_err());
    }

    #[test]
    fn payment_method_parses_aliases() {
        assert_eq!("card".parse::<PaymentMethod>().unwrap(), PaymentMethod::Stripe);
        assert_eq!(
            "mobile-money".parse::<PaymentMethod>().unwrap(),
            PaymentMethod::MobileMoney
        );
        assert!(!PaymentMethod::Manual.is_processor_backed());
    }

    #[test]
    fn payment_status_parses_stored_values() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Verified,
            PaymentStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<PaymentStatus>().is_err());
    }
}
