//! WebSocket handler and per-socket task.
//!
//! Identity comes from headers stamped by the auth gateway in front of this
//! service. Nothing here validates tokens.

use crate::actors::{ConnectionHandle, ConnectionOutbox};
use crate::errors::SignalingError;
use crate::service::SignalingService;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use common::identity::IdentityContext;
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const HEADER_SUBJECT: &str = "x-auth-subject";
pub const HEADER_ROLE: &str = "x-auth-role";
pub const HEADER_STAFF_ID: &str = "x-auth-staff-id";
pub const HEADER_DEPARTMENT: &str = "x-auth-department";

/// Build the connection identity from gateway headers.
///
/// # Errors
///
/// Returns `Unauthenticated` if the subject or role is missing or the role
/// is unknown.
pub fn identity_from_headers(headers: &HeaderMap) -> Result<IdentityContext, SignalingError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    IdentityContext::from_claims(
        header(HEADER_SUBJECT),
        header(HEADER_ROLE),
        header(HEADER_STAFF_ID),
        header(HEADER_DEPARTMENT),
    )
    .map_err(|e| SignalingError::Unauthenticated(e.to_string()))
}

/// `GET /ws`
///
/// Identity is checked before the upgrade, so an unauthenticated request
/// gets a 401 and never becomes a socket.
pub async fn ws_handler(
    State(service): State<Arc<SignalingService>>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let identity = match identity_from_headers(&headers) {
        Ok(identity) => identity,
        Err(e) => {
            warn!(target: "sig.ws", error = %e, "Rejected socket without identity");
            return e.into_response();
        }
    };

    if service.is_shutting_down() {
        return SignalingError::ShuttingDown.into_response();
    }

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    upgrade.on_upgrade(move |socket| async move {
        match service.attach(identity).await {
            Ok((connection, outbox)) => {
                run_socket(&service, socket, &connection, outbox).await;
                service.detach(&connection).await;
            }
            Err(e) => {
                debug!(target: "sig.ws", error = %e, "Socket refused after upgrade");
            }
        }
    })
}

/// Pump one socket until it closes or the service shuts down.
///
/// Inbound frames are handled one at a time, in arrival order.
async fn run_socket(
    service: &SignalingService,
    socket: WebSocket,
    connection: &ConnectionHandle,
    mut outbox: ConnectionOutbox,
) {
    let (mut sink, mut stream) = socket.split();

    info!(
        target: "sig.ws",
        connection_id = %connection.id(),
        "Socket open"
    );

    loop {
        tokio::select! {
            () = connection.closed() => {
                debug!(target: "sig.ws", connection_id = %connection.id(), "Closing socket on shutdown");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }

            event = outbox.recv() => {
                let Some(event) = event else { break };
                match event.encode() {
                    Ok(text) => {
                        if sink.send(Message::Text(text)).await.is_err() {
                            debug!(target: "sig.ws", connection_id = %connection.id(), "Send failed, closing");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(target: "sig.ws", connection_id = %connection.id(), error = %e, "Dropping unencodable event");
                    }
                }
            }

            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        // Outcome is logged and counted by the service
                        let _ = service.handle_frame(connection, &text).await;
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        debug!(
                            target: "sig.ws",
                            connection_id = %connection.id(),
                            frame_bytes = bytes.len(),
                            "Ignoring binary frame"
                        );
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(target: "sig.ws", connection_id = %connection.id(), error = %e, "Socket read error");
                        break;
                    }
                }
            }
        }
    }

    info!(
        target: "sig.ws",
        connection_id = %connection.id(),
        "Socket closed"
    );
}
