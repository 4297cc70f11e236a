//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing core and the outside world. Adapters implement these ports.
//!
//! - `PaymentRepository` - conditional writes to payments and subscriptions
//! - `PaymentProcessor` / `WebhookDecoder` - outbound and inbound processor traffic
//! - `ProcessedEventStore` - optional webhook event-id dedup
//! - `SessionValidator` - bearer token validation

mod payment_processor;
mod payment_repository;
mod processed_event_store;
mod session_validator;

pub use payment_processor::{
    CheckoutRequest, CheckoutSession, PaymentProcessor, ProcessorEvent, ProcessorEventKind,
    ProcessorPaymentStatus, SignatureCheck, WebhookDecoder,
};
pub use payment_repository::{
    CasResult, PaymentRepository, StatusTransition, SubscriptionActivation, SubscriptionChange,
};
pub use processed_event_store::ProcessedEventStore;
pub use session_validator::SessionValidator;
