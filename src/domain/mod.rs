//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors, auth)
//! - `billing` - Payments, subscriptions, signatures and correlation

pub mod billing;
pub mod foundation;
