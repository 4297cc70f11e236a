//! Application handlers.
//!
//! Command handlers that orchestrate domain operations through ports.

pub mod billing;

pub use billing::{
    ApplyOutcomeCommand, ApplyOutcomeHandler, ApplyOutcomeResult, CheckoutCreated,
    CreateCheckoutCommand, CreateCheckoutHandler, HandleWebhookCommand, HandleWebhookHandler,
    PaymentResolver, ProcessorRegistry, ReconcileError, ReconcilePendingCommand,
    ReconcilePendingHandler, ReconciliationReport, Resolution, SweepSettings, WebhookOutcome,
};
