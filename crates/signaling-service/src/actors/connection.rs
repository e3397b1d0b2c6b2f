//! Per-socket outbound mailbox.
//!
//! Each attached socket owns one bounded mailbox of [`ServerEvent`]s. Rooms
//! and call actors hold a cloneable [`ConnectionHandle`] and enqueue without
//! waiting; the socket task drains the paired [`ConnectionOutbox`] in FIFO
//! order. A full mailbox closes that one connection: a member that missed a
//! call broadcast must reconnect and re-sync through `join:call` rather
//! than keep a stale view.
//!
//! # Lifecycle
//!
//! 1. Opened when the transport accepts a socket with a verified identity
//! 2. Lives until the socket closes or the service shuts down
//! 3. Cancellation via child token of the service root token

use super::metrics::{ActorType, MailboxMonitor};
use crate::protocol::ServerEvent;

use common::identity::IdentityContext;
use common::types::ConnectionId;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cloneable sending side of a connection.
#[derive(Clone, Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    identity: Arc<IdentityContext>,
    sender: mpsc::Sender<ServerEvent>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionHandle {
    /// Open a mailbox for a newly attached socket.
    #[must_use]
    pub fn open(
        identity: IdentityContext,
        buffer: usize,
        cancel_token: CancellationToken,
    ) -> (ConnectionHandle, ConnectionOutbox) {
        let id = ConnectionId::new();
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Connection, id.to_string()));

        let handle = ConnectionHandle {
            id,
            identity: Arc::new(identity),
            sender,
            cancel_token: cancel_token.clone(),
            mailbox: Arc::clone(&mailbox),
        };
        let outbox = ConnectionOutbox {
            id,
            receiver,
            cancel_token,
            mailbox,
        };
        (handle, outbox)
    }

    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    #[must_use]
    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    /// Enqueue an event without waiting.
    ///
    /// Returns `false` if the event was not queued. A full mailbox also
    /// closes the connection.
    pub fn deliver(&self, event: ServerEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                true
            }
            Err(TrySendError::Full(event)) => {
                warn!(
                    target: "sig.connection",
                    connection_id = %self.id,
                    event = event.name(),
                    "Outbound mailbox full, closing connection"
                );
                self.mailbox.record_drop();
                self.close();
                false
            }
            Err(TrySendError::Closed(event)) => {
                debug!(
                    target: "sig.connection",
                    connection_id = %self.id,
                    event = event.name(),
                    "Connection closed, event not delivered"
                );
                false
            }
        }
    }

    /// Ask the socket task to close.
    pub fn close(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled() || self.sender.is_closed()
    }

    /// Resolves when the connection is asked to close, either directly or
    /// through service shutdown.
    pub async fn closed(&self) {
        self.cancel_token.cancelled().await;
    }

    #[must_use]
    pub fn mailbox(&self) -> &MailboxMonitor {
        &self.mailbox
    }
}

/// Receiving side of a connection mailbox, owned by the socket task.
#[derive(Debug)]
pub struct ConnectionOutbox {
    id: ConnectionId,
    receiver: mpsc::Receiver<ServerEvent>,
    cancel_token: CancellationToken,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionOutbox {
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Next queued event, `None` once all handles are gone.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        let event = self.receiver.recv().await;
        if event.is_some() {
            self.mailbox.record_dequeue();
        }
        event
    }

    /// Next queued event if one is immediately available.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        let event = self.receiver.try_recv().ok();
        if event.is_some() {
            self.mailbox.record_dequeue();
        }
        event
    }

    /// Resolves when the connection is asked to close.
    pub async fn closed(&self) {
        self.cancel_token.cancelled().await;
    }
}
