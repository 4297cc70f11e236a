//! Billing HTTP adapter.
//!
//! Exposes checkout, processor webhooks, the reconciliation trigger and a
//! liveness probe.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    CheckoutResponse, CreateCheckoutRequest, ErrorBody, ErrorResponse, HealthResponse,
    ReconcileQuery, ReconcileResponse, WebhookAck,
};
pub use handlers::{BillingApiError, BillingAppState, BillingAppStateBuilder, WebhookApiError};
pub use routes::{admin_routes, billing_router, customer_routes, webhook_routes};
