//! In-memory adapters.

mod payment_repository;
mod processed_event_store;

pub use payment_repository::InMemoryPaymentRepository;
pub use processed_event_store::InMemoryProcessedEventStore;
