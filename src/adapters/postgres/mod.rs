//! PostgreSQL adapters.
//!
//! - `PostgresPaymentRepository` - payments and subscriptions, with the
//!   status compare-and-set and subscription activation in one transaction

mod payment_repository;

pub use payment_repository::PostgresPaymentRepository;
