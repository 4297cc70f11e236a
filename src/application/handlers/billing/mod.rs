//! Billing handlers.
//!
//! ## Commands
//! - Opening a checkout (`CreateCheckoutHandler`)
//! - Processing processor webhooks (`HandleWebhookHandler`)
//! - Sweeping pending payments against processors (`ReconcilePendingHandler`)
//! - Applying a processor outcome (`ApplyOutcomeHandler`), shared by the two above
//!
//! ## Support
//! - `PaymentResolver` - maps processor references to payments
//! - `ProcessorRegistry` - processor per payment method

mod apply_outcome;
mod create_checkout;
mod handle_webhook;
mod processors;
mod reconcile_pending;
mod resolve_payment;

pub use apply_outcome::{ApplyOutcomeCommand, ApplyOutcomeHandler, ApplyOutcomeResult};
pub use create_checkout::{CheckoutCreated, CreateCheckoutCommand, CreateCheckoutHandler};
pub use handle_webhook::{HandleWebhookCommand, HandleWebhookHandler, WebhookOutcome};
pub use processors::ProcessorRegistry;
pub use reconcile_pending::{
    ReconcileError, ReconcilePendingCommand, ReconcilePendingHandler, ReconciliationReport,
    SweepSettings,
};
pub use resolve_payment::{PaymentResolver, Resolution};
