//! # Signaling Test Utilities
//!
//! Shared test utilities for the signaling service.
//!
//! ## Modules
//!
//! - `fixtures` - Identities, call records and appointments
//! - `mock_store` - Call store with failure injection and call counting
//! - `events` - Outbox helpers with timeouts
//! - `harness` - A fully wired `SignalingService` over mocks
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signaling_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestService::with_calls([CallRecordBuilder::new("c1").build()]).await;
//!     let (staff, mut staff_out) = harness.connect(staff_identity("S1")).await;
//!
//!     harness.send(&staff, join_call("c1")).await;
//!     let snapshot = next_event(&mut staff_out).await.unwrap();
//! }
//! ```
//!
//! These helpers depend on `signaling-service` itself, so use them from
//! integration tests under `tests/`, not from unit tests inside the crate.

pub mod events;
pub mod fixtures;
pub mod harness;
pub mod mock_store;

// Re-export commonly used items
pub use events::*;
pub use fixtures::*;
pub use harness::*;
pub use mock_store::*;
