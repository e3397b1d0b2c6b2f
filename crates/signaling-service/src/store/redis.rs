//! Redis-backed call record store.
//!
//! # Key Patterns
//!
//! - `call:{id}:record` - whole call record (JSON string)
//!
//! # Connection Pattern
//!
//! `ConnectionManager` multiplexes like `MultiplexedConnection` and is cheap
//! to clone, so each operation clones it instead of locking a shared one.
//! It also re-establishes the connection after Redis drops it, so a store
//! outage fails only the events issued while Redis is unreachable.

use super::{CallRecord, CallStore};
use crate::errors::SignalingError;
use crate::observability::metrics::record_store_latency;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{error, instrument, warn};

/// Redis key holding the record for a call.
#[must_use]
pub fn record_key(call_id: &str) -> String {
    format!("call:{call_id}:record")
}

/// Call store backed by Redis.
#[derive(Clone)]
pub struct RedisCallStore {
    connection: ConnectionManager,
}

impl RedisCallStore {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Store` if the URL is invalid or the
    /// connection cannot be established.
    pub async fn connect(redis_url: &str) -> Result<Self, SignalingError> {
        let client = Client::open(redis_url).map_err(|e| {
            // redis_url may carry credentials, never log it
            error!(
                target: "sig.store.redis",
                error = %e,
                "Failed to open Redis client"
            );
            SignalingError::Store(format!("Failed to open Redis client: {e}"))
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| {
                error!(
                    target: "sig.store.redis",
                    error = %e,
                    "Failed to connect to Redis"
                );
                SignalingError::Store(format!("Failed to connect to Redis: {e}"))
            })?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl CallStore for RedisCallStore {
    #[instrument(skip_all, fields(call_id = %call_id))]
    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, SignalingError> {
        let mut conn = self.connection.clone();
        let key = record_key(call_id);

        let start = Instant::now();
        let raw: Option<String> = conn.get(&key).await.map_err(|e| {
            warn!(
                target: "sig.store.redis",
                error = %e,
                call_id = %call_id,
                "Failed to get call record"
            );
            SignalingError::Store(format!("Failed to get call record: {e}"))
        })?;
        record_store_latency("get", start.elapsed());

        raw.map(|json| {
            serde_json::from_str::<CallRecord>(&json).map_err(|e| {
                warn!(
                    target: "sig.store.redis",
                    error = %e,
                    call_id = %call_id,
                    "Stored call record is not valid JSON"
                );
                SignalingError::Store(format!("Corrupt call record: {e}"))
            })
        })
        .transpose()
    }

    #[instrument(skip_all, fields(call_id = %record.call_id))]
    async fn update(&self, record: CallRecord) -> Result<(), SignalingError> {
        let mut conn = self.connection.clone();
        let key = record_key(&record.call_id);
        let json = serde_json::to_string(&record)
            .map_err(|e| SignalingError::Internal(format!("Failed to encode call record: {e}")))?;

        let start = Instant::now();
        conn.set::<_, _, ()>(&key, json).await.map_err(|e| {
            warn!(
                target: "sig.store.redis",
                error = %e,
                call_id = %record.call_id,
                "Failed to write call record"
            );
            SignalingError::Store(format!("Failed to write call record: {e}"))
        })?;
        record_store_latency("update", start.elapsed());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_format() {
        assert_eq!(record_key("abc-123"), "call:abc-123:record");
    }

    #[test]
    fn test_store_is_shareable_across_actors() {
        fn assert_shareable<T: CallStore + Clone + 'static>() {}
        assert_shareable::<RedisCallStore>();
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_url() {
        let result = RedisCallStore::connect("not-a-redis-url").await;
        assert!(matches!(result, Err(SignalingError::Store(_))));
    }
}
