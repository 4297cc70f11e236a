//! Adapters - Implementations of port interfaces.
//!
//! - `postgres` / `memory` - `PaymentRepository` and friends
//! - `stripe` / `mobile_money` - `PaymentProcessor` and `WebhookDecoder`
//! - `redis` - `ProcessedEventStore`
//! - `auth` - `SessionValidator`
//! - `http` - axum routes
//! - `mock` - scriptable processor for tests

pub mod auth;
pub mod http;
pub mod memory;
pub mod mobile_money;
pub mod mock;
pub mod postgres;
mod processor_http;
pub mod redis;
pub mod stripe;
