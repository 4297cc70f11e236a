//! ProcessedEventStore port - remembers webhook event ids already applied.
//!
//! Purely an optimization: the entitlement writer is idempotent on its own,
//! so a store that is down or forgetful only costs a redundant
//! compare-and-set. Entries are marked after a successful apply.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

#[async_trait]
pub trait ProcessedEventStore: Send + Sync {
    /// Returns `true` if `event_id` from `provider` was already applied.
    async fn contains(&self, provider: &str, event_id: &str) -> Result<bool, DomainError>;

    /// Records `event_id` from `provider` as applied.
    async fn mark_processed(&self, provider: &str, event_id: &str) -> Result<(), DomainError>;
}
