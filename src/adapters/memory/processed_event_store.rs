//! In-memory processed-event store for tests and single-process runs.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::DomainError;
use crate::ports::ProcessedEventStore;

/// Clones share the same set.
#[derive(Clone, Default)]
pub struct InMemoryProcessedEventStore {
    processed: Arc<RwLock<HashSet<(String, String)>>>,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.processed.read().await.len()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn contains(&self, provider: &str, event_id: &str) -> Result<bool, DomainError> {
        Ok(self
            .processed
            .read()
            .await
            .contains(&(provider.to_string(), event_id.to_string())))
    }

    async fn mark_processed(&self, provider: &str, event_id: &str) -> Result<(), DomainError> {
        self.processed
            .write()
            .await
            .insert((provider.to_string(), event_id.to_string()));
        Ok(())
    }
}
