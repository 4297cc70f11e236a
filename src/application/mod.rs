//! Application layer - Commands and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Handlers hold `Arc<dyn Port>` collaborators and never touch adapters directly.

pub mod handlers;

pub use handlers::billing;
