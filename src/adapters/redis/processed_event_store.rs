//! Redis-backed processed-event store for multi-instance deployments.
//!
//! Keys are `billing:webhook:<provider>:<event_id>` and expire after the
//! retention window, which only needs to outlast the processors' own
//! redelivery schedules.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::ProcessedEventStore;

/// Processors stop redelivering well within a week.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Clone)]
pub struct RedisProcessedEventStore {
    conn: MultiplexedConnection,
    retention: Duration,
}

impl RedisProcessedEventStore {
    pub fn new(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            retention: DEFAULT_RETENTION,
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }
}

fn event_key(provider: &str, event_id: &str) -> String {
    format!("billing:webhook:{}:{}", provider, event_id)
}

fn cache_error(e: redis::RedisError) -> DomainError {
    DomainError::new(ErrorCode::CacheError, e.to_string())
}

#[async_trait]
impl ProcessedEventStore for RedisProcessedEventStore {
    async fn contains(&self, provider: &str, event_id: &str) -> Result<bool, DomainError> {
        let mut conn = self.conn.clone();
        conn.exists(event_key(provider, event_id))
            .await
            .map_err(cache_error)
    }

    async fn mark_processed(&self, provider: &str, event_id: &str) -> Result<(), DomainError> {
        let mut conn = self.conn.clone();
        // SET NX EX: first writer wins, the key expires on its own.
        let _: Option<String> = redis::cmd("SET")
            .arg(event_key(provider, event_id))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(self.retention.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(cache_error)?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisProcessedEventStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisProcessedEventStore")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_per_provider() {
        assert_eq!(event_key("stripe", "evt_1"), "billing:webhook:stripe:evt_1");
        assert_ne!(event_key("stripe", "e"), event_key("mobile_money", "e"));
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis: cargo test -- --ignored
    async fn marks_and_detects_events() {
        let client = redis::Client::open("redis://127.0.0.1/").unwrap();
        let conn = client.get_multiplexed_tokio_connection().await.unwrap();
        let store = RedisProcessedEventStore::new(conn).with_retention(Duration::from_secs(30));
        let event_id = uuid::Uuid::new_v4().to_string();

        assert!(!store.contains("stripe", &event_id).await.unwrap());
        store.mark_processed("stripe", &event_id).await.unwrap();
        assert!(store.contains("stripe", &event_id).await.unwrap());
    }
}
