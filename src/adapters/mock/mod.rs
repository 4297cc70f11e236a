//! Test doubles for outbound processor traffic.

mod mock_payment_processor;

pub use mock_payment_processor::{MethodCall, MockPaymentProcessor};
