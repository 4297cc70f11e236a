//! Billing domain - payments, subscriptions and processor vocabulary.
//!
//! # Key Types
//!
//! - `PaymentRecord` / `PaymentStatus` - a payment and its pending → terminal lifecycle
//! - `SubscriptionRecord` - the entitlement a verified payment grants
//! - `PlanType` - plans and their expiry offsets
//! - `PaymentOutcome` - what a processor reported, applied by the entitlement writer
//! - `signature` - HMAC verification of webhook bodies
//! - `correlation` - placeholder transaction ids and recovering processor ids

pub mod correlation;
mod errors;
mod notes;
mod outcome;
mod payment;
mod plan;
pub mod signature;
mod subscription;

pub use correlation::{
    is_placeholder, placeholder_transaction_id, processor_reference, CorrelationSource,
};
pub use errors::{
    BillingError, CorrelationError, ProcessorError, ProcessorErrorCode, WebhookError,
};
pub use notes::PaymentNotes;
pub use outcome::{
    classify_processor_status, OutcomeMetadata, OutcomeSource, PaymentOutcome, StatusVerdict,
};
pub use payment::{Money, PaymentMethod, PaymentRecord, PaymentStatus};
pub use plan::PlanType;
pub use signature::SignatureError;
pub use subscription::SubscriptionRecord;
