//! Redis adapters.

mod processed_event_store;

pub use processed_event_store::{RedisProcessedEventStore, DEFAULT_RETENTION};
