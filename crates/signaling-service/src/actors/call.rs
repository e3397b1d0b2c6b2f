//! `CallActor` - one actor per active call id.
//!
//! Every event for a call passes through this actor's mailbox, so the store
//! read-modify-write for one call never interleaves with another event for
//! the same call. Different calls run in parallel on their own actors.
//!
//! The actor keeps no copy of the record: each command reads the store,
//! decides, writes the whole record back, then broadcasts through the room
//! registry. A broadcast therefore always reflects what was persisted.
//!
//! # State machine
//!
//! ```text
//! requested ──► accepted ◄──► declined     (accept/decline: last writer wins)
//!     │            │             │
//!     └────────────┴─────────────┴──► ended (terminal)
//! ```
//!
//! # Lifecycle
//!
//! 1. Spawned by the `CallSupervisor` on the first event for a call id
//! 2. Idles out after a quiet period: closes its mailbox, drains what was
//!    already queued, exits. The record is untouched. An actor whose command
//!    found no record releases the same way right after answering, so
//!    unknown call ids never hold a resident actor.
//! 3. A replacement spawned while this actor drains waits for it to finish
//!    before handling anything.
//! 4. Cancellation via child token of the supervisor's token

use super::messages::{CallCommand, CallMessage, CallOutcome, DropReason};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::ConnectionHandle;
use crate::errors::SignalingError;
use crate::protocol::ServerEvent;
use crate::rooms::{Room, RoomRegistry};
use crate::store::{now_ms, CallRecord, CallState, CallStore, SdpKind};

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Channel buffer size for a call actor mailbox.
pub const CALL_CHANNEL_BUFFER: usize = 500;

/// Handle to a `CallActor`.
#[derive(Clone, Debug)]
pub struct CallActorHandle {
    sender: mpsc::Sender<CallMessage>,
    cancel_token: CancellationToken,
    call_id: String,
    mailbox: Arc<MailboxMonitor>,
}

impl CallActorHandle {
    #[must_use]
    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    /// Queue a message for the actor.
    ///
    /// # Errors
    ///
    /// Hands the message back if the actor has stopped accepting work
    /// (idled out or exited), so the caller can route it to a replacement.
    pub async fn send(&self, message: CallMessage) -> Result<(), CallMessage> {
        match self.sender.send(message).await {
            Ok(()) => {
                self.mailbox.record_enqueue();
                Ok(())
            }
            Err(mpsc::error::SendError(message)) => Err(message),
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn mailbox(&self) -> &MailboxMonitor {
        &self.mailbox
    }
}

/// Whether the last command found a record for this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Residency {
    Known,
    Unknown,
}

/// Collaborators shared by every call actor.
#[derive(Clone)]
pub struct CallContext {
    pub store: Arc<dyn CallStore>,
    pub rooms: Arc<RoomRegistry>,
    pub metrics: Arc<ActorMetrics>,
    pub idle_timeout: Duration,
}

/// The `CallActor` implementation.
pub struct CallActor {
    call_id: String,
    receiver: mpsc::Receiver<CallMessage>,
    cancel_token: CancellationToken,
    ctx: CallContext,
    mailbox: Arc<MailboxMonitor>,
    /// Finishes when the previous actor for this call id has exited.
    predecessor: Option<CancellationToken>,
}

impl CallActor {
    /// Spawn a new call actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        call_id: String,
        ctx: CallContext,
        cancel_token: CancellationToken,
        predecessor: Option<CancellationToken>,
    ) -> (CallActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(CALL_CHANNEL_BUFFER);
        let mailbox = Arc::new(MailboxMonitor::new(ActorType::Call, &call_id));

        let actor = Self {
            call_id: call_id.clone(),
            receiver,
            cancel_token: cancel_token.clone(),
            ctx,
            mailbox: Arc::clone(&mailbox),
            predecessor,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = CallActorHandle {
            sender,
            cancel_token,
            call_id,
            mailbox,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "sig.actor.call", fields(call_id = %self.call_id))]
    async fn run(mut self) {
        if let Some(predecessor) = self.predecessor.take() {
            tokio::select! {
                () = self.cancel_token.cancelled() => return,
                () = predecessor.cancelled() => {}
            }
        }

        debug!(target: "sig.actor.call", call_id = %self.call_id, "CallActor started");

        let idle = tokio::time::sleep(self.ctx.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sig.actor.call",
                        call_id = %self.call_id,
                        "CallActor received cancellation signal"
                    );
                    break;
                }

                () = &mut idle => {
                    self.release().await;
                    info!(
                        target: "sig.actor.call",
                        call_id = %self.call_id,
                        idle_secs = self.ctx.idle_timeout.as_secs(),
                        "CallActor idle, releasing"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            if self.process(message).await == Residency::Unknown {
                                // Nothing to serialize for a call the store lacks
                                self.release().await;
                                debug!(
                                    target: "sig.actor.call",
                                    call_id = %self.call_id,
                                    "No record for call, releasing"
                                );
                                break;
                            }
                            idle.as_mut().reset(Instant::now() + self.ctx.idle_timeout);
                        }
                        None => {
                            debug!(
                                target: "sig.actor.call",
                                call_id = %self.call_id,
                                "CallActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        debug!(
            target: "sig.actor.call",
            call_id = %self.call_id,
            messages_processed = self.mailbox.messages_processed(),
            "CallActor stopped"
        );
    }

    /// Refuse new work, then finish what is already queued.
    async fn release(&mut self) {
        self.receiver.close();
        while let Some(message) = self.receiver.recv().await {
            self.process(message).await;
        }
    }

    async fn process(&mut self, message: CallMessage) -> Residency {
        let CallMessage {
            command,
            respond_to,
        } = message;
        let result = self.handle_command(command).await;
        self.mailbox.record_dequeue();
        self.ctx.metrics.record_message_processed();

        let residency = match result {
            Ok(CallOutcome::Dropped(DropReason::NotFound)) => Residency::Unknown,
            _ => Residency::Known,
        };
        let _ = respond_to.send(result);
        residency
    }

    async fn handle_command(&self, command: CallCommand) -> Result<CallOutcome, SignalingError> {
        match command {
            CallCommand::Join { connection } => self.handle_join(&connection).await,
            CallCommand::Accept { connection } => {
                self.handle_decision(&connection, CallState::Accepted, None)
                    .await
            }
            CallCommand::Decline { connection, reason } => {
                self.handle_decision(&connection, CallState::Declined, reason)
                    .await
            }
            CallCommand::End { connection } => self.handle_end(&connection).await,
            CallCommand::Sdp {
                connection,
                kind,
                sdp,
            } => self.handle_sdp(&connection, kind, sdp).await,
            CallCommand::Ice {
                connection,
                candidate,
            } => self.handle_ice(&connection, candidate).await,
        }
    }

    fn room(&self) -> Room {
        Room::call(self.call_id.clone())
    }

    async fn load(&self) -> Result<Option<CallRecord>, SignalingError> {
        let record = self.ctx.store.get(&self.call_id).await?;
        if record.is_none() {
            debug!(
                target: "sig.actor.call",
                call_id = %self.call_id,
                "Unknown call id, dropping event"
            );
        }
        Ok(record)
    }

    /// Join the call room, then re-sync the joiner: state snapshot, stored
    /// answer (any role), stored offer (staff only).
    ///
    /// The room is joined even when no record exists yet so the socket
    /// receives events once the call is created.
    #[instrument(skip_all, fields(call_id = %self.call_id, connection_id = %connection.id()))]
    async fn handle_join(&self, connection: &ConnectionHandle) -> Result<CallOutcome, SignalingError> {
        self.ctx.rooms.join(connection, self.room()).await;

        let Some(record) = self.load().await? else {
            return Ok(CallOutcome::Dropped(DropReason::NotFound));
        };

        connection.deliver(ServerEvent::call_snapshot(
            record.state,
            record.staff_id.clone(),
        ));

        if let Some(answer) = record.sdp_answer {
            connection.deliver(ServerEvent::CallSdp {
                call_id: self.call_id.clone(),
                sdp_type: SdpKind::Answer,
                sdp: answer,
            });
        }

        if connection.identity().is_staff() {
            if let Some(offer) = record.sdp_offer {
                connection.deliver(ServerEvent::CallSdp {
                    call_id: self.call_id.clone(),
                    sdp_type: SdpKind::Offer,
                    sdp: offer,
                });
            }
        }

        debug!(
            target: "sig.actor.call",
            call_id = %self.call_id,
            connection_id = %connection.id(),
            state = %record.state,
            "Re-synced joining connection"
        );
        Ok(CallOutcome::Applied)
    }

    /// Accept or decline. Staff only; the acting staff id is bound to the
    /// record.
    #[instrument(skip_all, fields(call_id = %self.call_id, target_state = %target))]
    async fn handle_decision(
        &self,
        connection: &ConnectionHandle,
        target: CallState,
        reason: Option<String>,
    ) -> Result<CallOutcome, SignalingError> {
        let Some(staff_id) = connection.identity().acting_staff_id() else {
            warn!(
                target: "sig.actor.call",
                call_id = %self.call_id,
                connection_id = %connection.id(),
                role = %connection.identity().role,
                "Non-staff connection attempted call decision"
            );
            return Ok(CallOutcome::Dropped(DropReason::Unauthorized));
        };

        let Some(mut record) = self.load().await? else {
            return Ok(CallOutcome::Dropped(DropReason::NotFound));
        };

        if !record.state.can_transition_to(target) {
            debug!(
                target: "sig.actor.call",
                call_id = %self.call_id,
                from = %record.state,
                to = %target,
                "Transition not permitted"
            );
            return Ok(CallOutcome::Dropped(DropReason::InvalidTransition));
        }

        if record.state == target
            && target == CallState::Accepted
            && record.staff_id.as_deref() == Some(staff_id)
        {
            return Ok(CallOutcome::Unchanged);
        }

        record.state = target;
        record.staff_id = Some(staff_id.to_string());
        record.touch(now_ms());
        self.ctx.store.update(record).await?;

        let event = match target {
            CallState::Accepted => ServerEvent::CallUpdate {
                state: CallState::Accepted,
                staff_id: Some(staff_id.to_string()),
                reason: None,
            },
            _ => ServerEvent::CallUpdate {
                state: target,
                staff_id: None,
                reason,
            },
        };
        let delivered = self.ctx.rooms.broadcast(&self.room(), &event).await;

        info!(
            target: "sig.actor.call",
            call_id = %self.call_id,
            staff_id = %staff_id,
            state = %target,
            delivered,
            "Call decision applied"
        );
        Ok(CallOutcome::Applied)
    }

    /// End the call. Only members of the call room may end it.
    #[instrument(skip_all, fields(call_id = %self.call_id))]
    async fn handle_end(&self, connection: &ConnectionHandle) -> Result<CallOutcome, SignalingError> {
        if !self.ctx.rooms.is_member(&self.room(), connection.id()).await {
            warn!(
                target: "sig.actor.call",
                call_id = %self.call_id,
                connection_id = %connection.id(),
                "Connection outside the call room attempted to end it"
            );
            return Ok(CallOutcome::Dropped(DropReason::Unauthorized));
        }

        let Some(mut record) = self.load().await? else {
            return Ok(CallOutcome::Dropped(DropReason::NotFound));
        };

        if !record.state.can_transition_to(CallState::Ended) {
            return Ok(CallOutcome::Dropped(DropReason::InvalidTransition));
        }

        record.state = CallState::Ended;
        record.touch(now_ms());
        self.ctx.store.update(record).await?;

        let delivered = self
            .ctx
            .rooms
            .broadcast(&self.room(), &ServerEvent::call_snapshot(CallState::Ended, None))
            .await;

        info!(
            target: "sig.actor.call",
            call_id = %self.call_id,
            delivered,
            "Call ended"
        );
        Ok(CallOutcome::Applied)
    }

    /// Store the offer or answer (last write wins) and broadcast it to every
    /// member, the sender included.
    #[instrument(skip_all, fields(call_id = %self.call_id, sdp_type = kind.as_str()))]
    async fn handle_sdp(
        &self,
        connection: &ConnectionHandle,
        kind: SdpKind,
        sdp: Value,
    ) -> Result<CallOutcome, SignalingError> {
        let Some(mut record) = self.load().await? else {
            return Ok(CallOutcome::Dropped(DropReason::NotFound));
        };

        if record.state.is_terminal() {
            return Ok(CallOutcome::Dropped(DropReason::InvalidTransition));
        }

        let payload_bytes = payload_size(&sdp);
        record.set_sdp(kind, sdp.clone());
        record.touch(now_ms());
        self.ctx.store.update(record).await?;

        let event = ServerEvent::CallSdp {
            call_id: self.call_id.clone(),
            sdp_type: kind,
            sdp,
        };
        let delivered = self.ctx.rooms.broadcast(&self.room(), &event).await;

        debug!(
            target: "sig.actor.call",
            call_id = %self.call_id,
            connection_id = %connection.id(),
            sdp_type = kind.as_str(),
            payload_bytes,
            delivered,
            "Session description stored and broadcast"
        );
        Ok(CallOutcome::Applied)
    }

    /// Relay a candidate to the other members. No mutation.
    async fn handle_ice(
        &self,
        connection: &ConnectionHandle,
        candidate: Value,
    ) -> Result<CallOutcome, SignalingError> {
        let Some(record) = self.load().await? else {
            return Ok(CallOutcome::Dropped(DropReason::NotFound));
        };

        if record.state.is_terminal() {
            return Ok(CallOutcome::Dropped(DropReason::InvalidTransition));
        }

        let payload_bytes = payload_size(&candidate);
        let event = ServerEvent::CallIce {
            call_id: self.call_id.clone(),
            candidate,
        };
        let delivered = self
            .ctx
            .rooms
            .send_to_others(&self.room(), &event, connection.id())
            .await;

        debug!(
            target: "sig.actor.call",
            call_id = %self.call_id,
            connection_id = %connection.id(),
            payload_bytes,
            delivered,
            "Candidate relayed"
        );
        Ok(CallOutcome::Applied)
    }
}

/// Serialized size of an opaque payload, for logging in place of content.
fn payload_size(value: &Value) -> usize {
    serde_json::to_vec(value).map_or(0, |bytes| bytes.len())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::ConnectionOutbox;
    use crate::store::InMemoryCallStore;
    use common::identity::IdentityContext;
    use serde_json::json;
    use tokio::sync::oneshot;

    struct Fixture {
        store: Arc<InMemoryCallStore>,
        rooms: Arc<RoomRegistry>,
        handle: CallActorHandle,
        task: JoinHandle<()>,
    }

    fn fixture(records: Vec<CallRecord>, idle_timeout: Duration) -> Fixture {
        let store = Arc::new(InMemoryCallStore::with_records(records));
        let rooms = Arc::new(RoomRegistry::new());
        let ctx = CallContext {
            store: Arc::clone(&store) as Arc<dyn CallStore>,
            rooms: Arc::clone(&rooms),
            metrics: ActorMetrics::new(),
            idle_timeout,
        };
        let (handle, task) =
            CallActor::spawn("c1".to_string(), ctx, CancellationToken::new(), None);
        Fixture {
            store,
            rooms,
            handle,
            task,
        }
    }

    fn connect(identity: IdentityContext) -> (ConnectionHandle, ConnectionOutbox) {
        ConnectionHandle::open(identity, 32, CancellationToken::new())
    }

    async fn call(handle: &CallActorHandle, command: CallCommand) -> CallOutcome {
        let (tx, rx) = oneshot::channel();
        handle
            .send(CallMessage {
                command,
                respond_to: tx,
            })
            .await
            .map_err(|_| "actor stopped")
            .unwrap();
        rx.await.unwrap().unwrap()
    }

    fn drain(outbox: &mut ConnectionOutbox) -> Vec<ServerEvent> {
        std::iter::from_fn(|| outbox.try_recv()).collect()
    }

    #[tokio::test]
    async fn test_join_unknown_call_joins_room_without_resync() {
        let f = fixture(vec![], Duration::from_secs(60));
        let (conn, mut out) = connect(IdentityContext::client("C1"));

        let outcome = call(&f.handle, CallCommand::Join { connection: conn.clone() }).await;

        assert_eq!(outcome, CallOutcome::Dropped(DropReason::NotFound));
        assert!(f.rooms.is_member(&Room::call("c1"), conn.id()).await);
        assert!(drain(&mut out).is_empty());
        // Released without waiting for the idle timeout
        f.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_cannot_accept() {
        let f = fixture(vec![CallRecord::requested("c1", 1)], Duration::from_secs(60));
        let (client, mut out) = connect(IdentityContext::client("C1"));
        call(&f.handle, CallCommand::Join { connection: client.clone() }).await;
        drain(&mut out);

        let outcome = call(&f.handle, CallCommand::Accept { connection: client }).await;

        assert_eq!(outcome, CallOutcome::Dropped(DropReason::Unauthorized));
        assert!(drain(&mut out).is_empty());
        let stored = f.store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.state, CallState::Requested);
        assert_eq!(stored.updated_at, 1);
    }

    #[tokio::test]
    async fn test_repeat_accept_by_same_staff_is_unchanged() {
        let f = fixture(vec![CallRecord::requested("c1", 1)], Duration::from_secs(60));
        let (staff, mut out) = connect(IdentityContext::staff("u-1", "S1"));
        call(&f.handle, CallCommand::Join { connection: staff.clone() }).await;
        drain(&mut out);

        let first = call(&f.handle, CallCommand::Accept { connection: staff.clone() }).await;
        let second = call(&f.handle, CallCommand::Accept { connection: staff }).await;

        assert_eq!(first, CallOutcome::Applied);
        assert_eq!(second, CallOutcome::Unchanged);
        assert_eq!(drain(&mut out).len(), 1);
    }

    #[tokio::test]
    async fn test_decline_after_accept_last_writer_wins() {
        let f = fixture(vec![CallRecord::requested("c1", 1)], Duration::from_secs(60));
        let (s1, mut out1) = connect(IdentityContext::staff("u-1", "S1"));
        let (s2, _out2) = connect(IdentityContext::staff("u-2", "S2"));
        call(&f.handle, CallCommand::Join { connection: s1.clone() }).await;
        drain(&mut out1);

        call(&f.handle, CallCommand::Accept { connection: s1 }).await;
        let outcome = call(
            &f.handle,
            CallCommand::Decline {
                connection: s2,
                reason: Some("busy".to_string()),
            },
        )
        .await;

        assert_eq!(outcome, CallOutcome::Applied);
        let stored = f.store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.state, CallState::Declined);
        assert_eq!(stored.staff_id.as_deref(), Some("S2"));

        let events = drain(&mut out1);
        assert_eq!(events.len(), 2);
        assert_eq!(
            events.last(),
            Some(&ServerEvent::CallUpdate {
                state: CallState::Declined,
                staff_id: None,
                reason: Some("busy".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_end_requires_membership_and_is_terminal() {
        let f = fixture(vec![CallRecord::requested("c1", 1)], Duration::from_secs(60));
        let (member, mut out) = connect(IdentityContext::client("C1"));
        let (outsider, _o) = connect(IdentityContext::client("C2"));
        call(&f.handle, CallCommand::Join { connection: member.clone() }).await;
        drain(&mut out);

        let denied = call(&f.handle, CallCommand::End { connection: outsider }).await;
        assert_eq!(denied, CallOutcome::Dropped(DropReason::Unauthorized));

        let ended = call(&f.handle, CallCommand::End { connection: member.clone() }).await;
        assert_eq!(ended, CallOutcome::Applied);
        assert_eq!(
            drain(&mut out),
            vec![ServerEvent::call_snapshot(CallState::Ended, None)]
        );

        let again = call(&f.handle, CallCommand::End { connection: member.clone() }).await;
        assert_eq!(again, CallOutcome::Dropped(DropReason::InvalidTransition));

        let sdp = call(
            &f.handle,
            CallCommand::Sdp {
                connection: member,
                kind: SdpKind::Offer,
                sdp: json!({"sdp": "v=0"}),
            },
        )
        .await;
        assert_eq!(sdp, CallOutcome::Dropped(DropReason::InvalidTransition));
    }

    #[tokio::test]
    async fn test_sdp_is_broadcast_to_sender_too() {
        let f = fixture(vec![CallRecord::requested("c1", 1)], Duration::from_secs(60));
        let (client, mut out) = connect(IdentityContext::client("C1"));
        call(&f.handle, CallCommand::Join { connection: client.clone() }).await;
        drain(&mut out);

        let offer = json!({"type": "offer", "sdp": "v=0 o1"});
        call(
            &f.handle,
            CallCommand::Sdp {
                connection: client,
                kind: SdpKind::Offer,
                sdp: offer.clone(),
            },
        )
        .await;

        assert_eq!(
            drain(&mut out),
            vec![ServerEvent::CallSdp {
                call_id: "c1".to_string(),
                sdp_type: SdpKind::Offer,
                sdp: offer.clone(),
            }]
        );
        let stored = f.store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored.sdp_offer, Some(offer));
        assert!(stored.updated_at >= stored.created_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_actor_exits_without_touching_record() {
        let f = fixture(vec![CallRecord::requested("c1", 1)], Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(31)).await;
        f.task.await.unwrap();

        let (tx, _rx) = oneshot::channel();
        let (conn, _out) = connect(IdentityContext::client("C1"));
        let rejected = f
            .handle
            .send(CallMessage {
                command: CallCommand::Join { connection: conn },
                respond_to: tx,
            })
            .await;
        assert!(rejected.is_err(), "stopped actor must hand the message back");

        let stored = f.store.get("c1").await.unwrap().unwrap();
        assert_eq!(stored, CallRecord::requested("c1", 1));
    }

    #[tokio::test]
    async fn test_successor_waits_for_predecessor() {
        let store = Arc::new(InMemoryCallStore::with_records([CallRecord::requested("c1", 1)]));
        let ctx = CallContext {
            store: Arc::clone(&store) as Arc<dyn CallStore>,
            rooms: Arc::new(RoomRegistry::new()),
            metrics: ActorMetrics::new(),
            idle_timeout: Duration::from_secs(60),
        };
        let predecessor = CancellationToken::new();
        let (handle, _task) = CallActor::spawn(
            "c1".to_string(),
            ctx,
            CancellationToken::new(),
            Some(predecessor.clone()),
        );

        let (conn, _out) = connect(IdentityContext::client("C1"));
        let (tx, mut rx) = oneshot::channel();
        handle
            .send(CallMessage {
                command: CallCommand::Join { connection: conn },
                respond_to: tx,
            })
            .await
            .map_err(|_| "actor stopped")
            .unwrap();

        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err(), "must not run before predecessor exits");

        predecessor.cancel();
        assert_eq!(rx.await.unwrap().unwrap(), CallOutcome::Applied);
    }
}
