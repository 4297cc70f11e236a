//! Subscription billing: payment verification and subscription activation.
//!
//! Customers pay through a card processor (Stripe Checkout) or a mobile-money
//! gateway. A payment is recorded as pending when the checkout opens and is
//! settled exactly once, by whichever arrives first: the processor's signed
//! webhook or the reconciliation sweep that polls processors for payments
//! whose webhook never came. Settling a payment as verified activates the
//! subscription it paid for.
//!
//! Layout follows ports and adapters:
//!
//! - `domain` - payments, subscriptions, plans, signatures, errors
//! - `ports` - traits the application layer depends on
//! - `application` - checkout, webhook, reconciliation and entitlement handlers
//! - `adapters` - PostgreSQL, Redis, processors, auth and HTTP
//! - `config` - environment-driven configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
