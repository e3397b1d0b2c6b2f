//! Actor model implementation for the signaling service.
//!
//! ```text
//! CallSupervisor (singleton per process)
//! └── supervises N CallActors
//!     └── CallActor (one per active call id)
//!         └── serializes every event for that call
//!
//! ConnectionHandle / ConnectionOutbox (one pair per socket)
//! └── bounded outbound mailbox, fed by rooms and call actors
//! ```
//!
//! # Key Design Decisions
//!
//! - **One actor per call**: events for one call never race on its record
//! - **No record cache**: actors read the store on every command, so an idle
//!   release loses nothing
//! - **CancellationToken propagation**: parents pass child tokens for graceful shutdown
//! - **Mailbox monitoring**: Depth thresholds with metrics (Call: 100/500, Connection: 50/200)
//!
//! # Modules
//!
//! - [`supervisor`] - `CallSupervisor` that spawns, routes to and watches call actors
//! - [`call`] - `CallActor` per active call
//! - [`connection`] - Outbound mailbox per socket
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics

pub mod call;
pub mod connection;
pub mod messages;
pub mod metrics;
pub mod supervisor;

// Re-export primary types
pub use self::call::{CallActor, CallActorHandle, CallContext};
pub use self::connection::{ConnectionHandle, ConnectionOutbox};
pub use self::messages::*;
pub use self::metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
pub use self::supervisor::CallSupervisor;
