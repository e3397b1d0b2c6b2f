//! HTTP surface for signaling sockets.
//!
//! Defines the Axum router that upgrades `GET /ws` to a WebSocket once the
//! upstream gateway's identity headers check out.

pub mod ws;

use crate::service::SignalingService;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use self::ws::{identity_from_headers, HEADER_DEPARTMENT, HEADER_ROLE, HEADER_STAFF_ID, HEADER_SUBJECT};

/// Build the signaling routes.
///
/// - `/ws` - WebSocket upgrade, identity taken from gateway headers
/// - `TraceLayer` for request logging
pub fn signaling_router(service: Arc<SignalingService>) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
