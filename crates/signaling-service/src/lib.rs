//! Signaling Service Library
//!
//! Call signaling and presence for the campus assistant. The service lets a
//! client and a staff member find each other, exchange session descriptions
//! and network candidates, and see consistent call state even when one side
//! joins late, reconnects, or holds several sockets at once.
//!
//! # Architecture
//!
//! ```text
//! transport (axum /ws) ──► SignalingService
//!                          ├── RoomRegistry       (staff/dept/client/call rooms)
//!                          ├── CallSupervisor
//!                          │   └── CallActor      (one per active call id)
//!                          │       └── CallStore  (in-memory or Redis)
//!                          └── NotificationFanout
//!                              └── AppointmentRepository
//! ```
//!
//! # Key Design Decisions
//!
//! - **Serialized calls**: every event for a call id goes through that call's
//!   actor, so its read-modify-write never interleaves
//! - **Store is the truth**: late joiners are re-synced from the persisted
//!   record, never from actor memory
//! - **Non-blocking fan-out**: bounded per-socket mailboxes; a slow socket
//!   loses events, it never stalls a call
//!
//! # Modules
//!
//! - [`actors`] - Call actors, their supervisor and per-socket mailboxes
//! - [`appointments`] - Appointment model and repository interface
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with HTTP mappings
//! - [`notifications`] - Appointment notification fan-out
//! - [`observability`] - Metrics and health endpoints
//! - [`protocol`] - Wire events
//! - [`rooms`] - Room registry
//! - [`service`] - Event routing facade used by the transport
//! - [`store`] - Call record store
//! - [`transport`] - WebSocket endpoint

pub mod actors;
pub mod appointments;
pub mod config;
pub mod errors;
pub mod notifications;
pub mod observability;
pub mod protocol;
pub mod rooms;
pub mod service;
pub mod store;
pub mod transport;
