//! Two-step lookup of the payment a processor event refers to.
//!
//! 1. exact match on the stored transaction id
//! 2. substring match against the payment notes (checkout URL, session id)
//!
//! Every outcome is logged under the `billing::correlation` target so
//! unmatched events can be alerted on separately from ordinary traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::billing::{CorrelationError, PaymentMethod, PaymentRecord};
use crate::ports::PaymentRepository;

/// Shortest reference the notes fallback will search for.
const MIN_NOTES_FRAGMENT_LEN: usize = 6;

/// How a payment was found.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    ByTransactionId(PaymentRecord),
    ByNotes(PaymentRecord),
}

impl Resolution {
    pub fn payment(&self) -> &PaymentRecord {
        match self {
            Resolution::ByTransactionId(p) | Resolution::ByNotes(p) => p,
        }
    }

    pub fn into_payment(self) -> PaymentRecord {
        match self {
            Resolution::ByTransactionId(p) | Resolution::ByNotes(p) => p,
        }
    }
}

pub struct PaymentResolver {
    repository: Arc<dyn PaymentRepository>,
    unresolved: AtomicU64,
}

impl PaymentResolver {
    pub fn new(repository: Arc<dyn PaymentRepository>) -> Self {
        Self {
            repository,
            unresolved: AtomicU64::new(0),
        }
    }

    /// Finds the payment of `method` that `reference` points at.
    ///
    /// # Errors
    ///
    /// - `CorrelationError::Unresolved` when neither step matches
    /// - `CorrelationError::Lookup` when the repository fails
    pub async fn resolve(
        &self,
        method: PaymentMethod,
        reference: &str,
    ) -> Result<Resolution, CorrelationError> {
        let reference = reference.trim();

        if !reference.is_empty() {
            if let Some(payment) = self
                .repository
                .find_by_transaction_id(method, reference)
                .await?
            {
                tracing::debug!(
                    target: "billing::correlation",
                    %method,
                    reference,
                    payment_id = %payment.id,
                    "resolved by transaction id"
                );
                return Ok(Resolution::ByTransactionId(payment));
            }
        }

        if reference.len() >= MIN_NOTES_FRAGMENT_LEN {
            if let Some(payment) = self
                .repository
                .find_by_notes_fragment(method, reference)
                .await?
            {
                tracing::info!(
                    target: "billing::correlation",
                    %method,
                    reference,
                    payment_id = %payment.id,
                    "resolved by notes"
                );
                return Ok(Resolution::ByNotes(payment));
            }
        }

        let total = self.unresolved.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!(
            target: "billing::correlation",
            %method,
            reference,
            unresolved_total = total,
            "processor reference matches no payment"
        );
        Err(CorrelationError::Unresolved {
            reference: reference.to_string(),
        })
    }

    /// Unresolved lookups since start.
    pub fn unresolved_count(&self) -> u64 {
        self.unresolved.load(Ordering::Relaxed)
    }
}
