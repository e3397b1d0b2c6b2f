//! Actor metrics and mailbox monitoring.
//!
//! | Mailbox    | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Call       | < 100  | 100-400 | > 400    |
//! | Connection | < 50   | 50-200  | > 200    |
//!
//! Process-wide gauges are mirrored to Prometheus with the `sig_` prefix.

use crate::observability::metrics as prom;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Depth bands for one kind of mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxThresholds {
    pub normal: usize,
    pub warning: usize,
}

/// Bands sit below `CALL_CHANNEL_BUFFER` so a full call mailbox reads as
/// critical.
pub const CALL_MAILBOX: MailboxThresholds = MailboxThresholds {
    normal: 100,
    warning: 400,
};

pub const CONNECTION_MAILBOX: MailboxThresholds = MailboxThresholds {
    normal: 50,
    warning: 200,
};

/// Actor type for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// One per active call id.
    Call,
    /// Outbound mailbox of one socket.
    Connection,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Call => "call",
            ActorType::Connection => "connection",
        }
    }

    #[must_use]
    pub const fn thresholds(&self) -> MailboxThresholds {
        match self {
            ActorType::Call => CALL_MAILBOX,
            ActorType::Connection => CONNECTION_MAILBOX,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

impl MailboxLevel {
    #[must_use]
    pub const fn for_depth(depth: usize, thresholds: MailboxThresholds) -> Self {
        if depth > thresholds.warning {
            MailboxLevel::Critical
        } else if depth > thresholds.normal {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Queue depth and throughput for one mailbox, shared between the sending
/// handle and the receiving loop.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    /// Call id or connection id.
    owner: String,
    depth: AtomicUsize,
    peak: AtomicUsize,
    processed: AtomicU64,
    dropped: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, owner: impl Into<String>) -> Self {
        Self {
            actor_type,
            owner: owner.into(),
            depth: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            processed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak.fetch_max(depth, Ordering::Relaxed);

        let thresholds = self.actor_type.thresholds();
        match MailboxLevel::for_depth(depth, thresholds) {
            MailboxLevel::Critical => warn!(
                target: "sig.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                owner = %self.owner,
                depth,
                limit = thresholds.warning,
                "Mailbox backlog critical"
            ),
            // Only on the enqueue that crosses into the band
            MailboxLevel::Warning if depth == thresholds.normal + 1 => debug!(
                target: "sig.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                owner = %self.owner,
                depth,
                "Mailbox backlog building"
            ),
            _ => {}
        }
    }

    /// The receiver can see a message before the sender counted it, so the
    /// depth saturates at zero.
    pub fn record_dequeue(&self) {
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            });
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// A full mailbox refused a message.
    pub fn record_drop(&self) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_message_dropped(self.actor_type.as_str());
        warn!(
            target: "sig.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            owner = %self.owner,
            dropped,
            "Mailbox full, event dropped"
        );
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        MailboxLevel::for_depth(self.current_depth(), self.actor_type.thresholds())
    }
}

/// Process-wide actor counters.
///
/// Gauge changes are forwarded to the Prometheus recorder so `/metrics`
/// matches what the shutdown drain and tests read here.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    calls: AtomicUsize,
    connections: AtomicUsize,
    panics: AtomicU64,
    call_events: AtomicU64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn call_started(&self) {
        let now = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_calls_active(now as u64);
    }

    pub fn call_stopped(&self) {
        prom::set_calls_active(saturating_decrement(&self.calls) as u64);
    }

    pub fn connection_opened(&self) {
        let now = self.connections.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_connections_active(now as u64);
    }

    pub fn connection_closed(&self) {
        prom::set_connections_active(saturating_decrement(&self.connections) as u64);
    }

    pub fn record_panic(&self, actor_type: ActorType) {
        let total = self.panics.fetch_add(1, Ordering::Relaxed) + 1;
        prom::record_actor_panic(actor_type.as_str());
        error!(
            target: "sig.actor.panic",
            actor_type = actor_type.as_str(),
            total,
            "Actor panicked"
        );
    }

    /// One event handled by some call actor.
    pub fn record_message_processed(&self) {
        self.call_events.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn panic_count(&self) -> u64 {
        self.panics.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn call_events_processed(&self) -> u64 {
        self.call_events.load(Ordering::Relaxed)
    }
}

/// Returns the value after decrementing, never below zero.
fn saturating_decrement(counter: &AtomicUsize) -> usize {
    counter
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
            Some(v.saturating_sub(1))
        })
        .map_or(0, |previous| previous.saturating_sub(1))
}
