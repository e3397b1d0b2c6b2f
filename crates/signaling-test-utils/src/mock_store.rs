//! Call store mock for failure-isolation tests.
//!
//! Wraps the in-process store and lets a test make reads or writes fail,
//! either permanently or for the next N operations.
//!
//! # Example
//!
//! ```rust,ignore
//! use signaling_test_utils::MockCallStore;
//!
//! let store = MockCallStore::new().with_record(CallRecordBuilder::new("c1").build());
//! store.fail_next_updates(1);
//!
//! // The first write errors, the second succeeds
//! ```

use async_trait::async_trait;
use signaling_service::errors::SignalingError;
use signaling_service::store::{CallRecord, CallStore, InMemoryCallStore};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Call store with failure injection.
#[derive(Debug, Default)]
pub struct MockCallStore {
    inner: InMemoryCallStore,
    fail_gets: AtomicBool,
    fail_updates: AtomicBool,
    failing_updates_remaining: AtomicUsize,
    get_calls: AtomicUsize,
    update_calls: AtomicUsize,
}

impl MockCallStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = CallRecord>) -> Self {
        Self {
            inner: InMemoryCallStore::with_records(records),
            ..Self::default()
        }
    }

    /// Every read and write fails until [`recover`](Self::recover).
    pub fn set_unavailable(&self) {
        self.fail_gets.store(true, Ordering::SeqCst);
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    /// Only writes fail until [`recover`](Self::recover).
    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    /// The next `count` writes fail.
    pub fn fail_next_updates(&self, count: usize) {
        self.failing_updates_remaining.store(count, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        self.fail_gets.store(false, Ordering::SeqCst);
        self.fail_updates.store(false, Ordering::SeqCst);
        self.failing_updates_remaining.store(0, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Read a record directly, bypassing failure injection.
    pub async fn peek(&self, call_id: &str) -> Option<CallRecord> {
        self.inner.get(call_id).await.ok().flatten()
    }

    fn take_update_failure(&self) -> bool {
        if self.fail_updates.load(Ordering::SeqCst) {
            return true;
        }
        self.failing_updates_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl CallStore for MockCallStore {
    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, SignalingError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(SignalingError::Store("mock store unavailable".to_string()));
        }
        self.inner.get(call_id).await
    }

    async fn update(&self, record: CallRecord) -> Result<(), SignalingError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_update_failure() {
            return Err(SignalingError::Store("mock store write failed".to_string()));
        }
        self.inner.update(record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::CallRecordBuilder;

    #[tokio::test]
    async fn test_fail_next_updates_counts_down() {
        let store = MockCallStore::with_records([CallRecordBuilder::new("c1").build()]);
        store.fail_next_updates(1);

        let record = store.peek("c1").await.unwrap();
        assert!(store.update(record.clone()).await.is_err());
        assert!(store.update(record).await.is_ok());
        assert_eq!(store.update_calls(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_and_recover() {
        let store = MockCallStore::with_records([CallRecordBuilder::new("c1").build()]);
        store.set_unavailable();
        assert!(store.get("c1").await.is_err());

        store.recover();
        assert!(store.get("c1").await.unwrap().is_some());
        assert_eq!(store.get_calls(), 2);
    }
}
