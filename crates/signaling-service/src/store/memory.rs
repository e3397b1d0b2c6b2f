//! Process-local call record store.

use super::{CallRecord, CallStore};
use crate::errors::SignalingError;
use crate::observability::metrics::record_store_latency;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Instant;
use tokio::sync::RwLock;

/// Call records held in a process-local map.
///
/// Suitable for single-node deployments and tests. Contents are lost on
/// restart.
#[derive(Debug, Default)]
pub struct InMemoryCallStore {
    records: RwLock<HashMap<String, CallRecord>>,
}

impl InMemoryCallStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with records.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = CallRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.call_id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(map),
        }
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl CallStore for InMemoryCallStore {
    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, SignalingError> {
        let start = Instant::now();
        let record = self.records.read().await.get(call_id).cloned();
        record_store_latency("get", start.elapsed());
        Ok(record)
    }

    async fn update(&self, record: CallRecord) -> Result<(), SignalingError> {
        let start = Instant::now();
        self.records
            .write()
            .await
            .insert(record.call_id.clone(), record);
        record_store_latency("update", start.elapsed());
        Ok(())
    }
}
