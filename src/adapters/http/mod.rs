//! HTTP adapters - the REST surface of the billing service.

pub mod billing;
pub mod middleware;

pub use billing::{billing_router, BillingAppState};
