//! Call record storage.
//!
//! One [`CallRecord`] per call id. Records are written whole (replace) and
//! are never deleted by the signaling service. Two backends exist:
//!
//! - [`memory::InMemoryCallStore`] - process-local map (single-node, tests)
//! - [`redis::RedisCallStore`] - JSON documents under `call:{id}:record`
//!
//! All mutations of a record happen inside the call's actor, so a
//! `get`-modify-`update` sequence for one call id never interleaves with
//! another event for the same call.

pub mod memory;
pub mod redis;

pub use self::memory::InMemoryCallStore;
pub use self::redis::RedisCallStore;

use crate::errors::SignalingError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle state of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Requested,
    Accepted,
    Declined,
    Ended,
}

impl CallState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CallState::Requested => "requested",
            CallState::Accepted => "accepted",
            CallState::Declined => "declined",
            CallState::Ended => "ended",
        }
    }

    /// `ended` is the only terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended)
    }

    /// Whether moving from `self` to `next` is permitted.
    ///
    /// Accept and decline race with last-writer-wins, so any non-terminal
    /// state may move to `accepted` or `declined`. Nothing returns to
    /// `requested` and nothing leaves `ended`.
    #[must_use]
    pub const fn can_transition_to(&self, next: CallState) -> bool {
        match (self, next) {
            (CallState::Ended, _) | (_, CallState::Requested) => false,
            (_, CallState::Accepted | CallState::Declined | CallState::Ended) => true,
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which half of the session description exchange a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

/// Persisted state of one call.
///
/// Timestamps are wall-clock milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub call_id: String,
    pub state: CallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_offer: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_answer: Option<Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CallRecord {
    /// A freshly requested call.
    #[must_use]
    pub fn requested(call_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            call_id: call_id.into(),
            state: CallState::Requested,
            staff_id: None,
            sdp_offer: None,
            sdp_answer: None,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    /// Bump `updated_at`, never moving it backwards.
    pub fn touch(&mut self, now_ms: i64) {
        self.updated_at = self.updated_at.max(now_ms);
    }

    /// Replace the stored offer or answer.
    pub fn set_sdp(&mut self, kind: SdpKind, sdp: Value) {
        match kind {
            SdpKind::Offer => self.sdp_offer = Some(sdp),
            SdpKind::Answer => self.sdp_answer = Some(sdp),
        }
    }
}

/// Keyed store of call records.
#[async_trait]
pub trait CallStore: Send + Sync {
    /// Fetch the record for a call id, `None` if unknown.
    async fn get(&self, call_id: &str) -> Result<Option<CallRecord>, SignalingError>;

    /// Upsert the whole record.
    async fn update(&self, record: CallRecord) -> Result<(), SignalingError>;
}

/// Current wall-clock time in milliseconds.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
