//! Mobile-money gateway adapter.

mod adapter;
mod types;

pub use adapter::{MobileMoneyAdapter, MobileMoneyConfig};
