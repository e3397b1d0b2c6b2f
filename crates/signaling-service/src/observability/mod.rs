//! Observability for the signaling service.
//!
//! # Privacy by Default
//!
//! Instrumentation uses `#[instrument(skip_all)]` with explicit safe fields.
//! SDP and ICE payloads are never logged, only their sizes. Metric labels
//! are bounded by code (event names, outcomes, actor types).
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `sig_connections_active` | Gauge | none |
//! | `sig_calls_active` | Gauge | none |
//! | `sig_events_total` | Counter | `event`, `outcome` |
//! | `sig_event_latency_seconds` | Histogram | `event` |
//! | `sig_store_latency_seconds` | Histogram | `operation` |
//! | `sig_messages_dropped_total` | Counter | `actor_type` |
//! | `sig_actor_panics_total` | Counter | `actor_type` |

pub mod health;
pub mod metrics;

pub use self::health::{health_router, HealthState};
pub use self::metrics::init_metrics_recorder;
