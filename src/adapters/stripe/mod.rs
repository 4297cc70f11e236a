//! Stripe Checkout adapter (card payments).

mod stripe_adapter;
mod webhook_types;

pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
pub use webhook_types::{StripeCheckoutSession, StripeWebhookEvent};
