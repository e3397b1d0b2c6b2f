//! Signaling service facade.
//!
//! Owns the room registry, the call supervisor and the notification fan-out,
//! and is the only entry point the transport uses: attach a socket, feed it
//! frames, detach it.
//!
//! Event failures never reach the sender. Each frame yields an outcome that
//! is logged and counted, and the connection carries on.

use crate::actors::{
    ActorMetrics, CallCommand, CallContext, CallOutcome, CallSupervisor, ConnectionHandle,
    ConnectionOutbox, DropReason,
};
use crate::appointments::{AppointmentRepository, Decision};
use crate::config::Config;
use crate::errors::SignalingError;
use crate::notifications::NotificationFanout;
use crate::observability::metrics;
use crate::protocol::{ClientEvent, ServerEvent};
use crate::rooms::{Room, RoomRegistry};
use crate::store::{now_ms, CallStore};

use common::identity::IdentityContext;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Result of one handled event that did not fail.
pub type EventOutcome = CallOutcome;

/// Metric label for frames that never decoded to a known event.
const UNDECODED_EVENT: &str = "unknown";

pub struct SignalingService {
    rooms: Arc<RoomRegistry>,
    supervisor: CallSupervisor,
    fanout: NotificationFanout,
    appointments: Arc<dyn AppointmentRepository>,
    metrics: Arc<ActorMetrics>,
    connection_buffer: usize,
    cancel_token: CancellationToken,
}

impl SignalingService {
    /// Build the service. `cancel_token` is the root token; every call actor
    /// and connection derives a child from it.
    #[must_use]
    pub fn new(
        config: &Config,
        store: Arc<dyn CallStore>,
        appointments: Arc<dyn AppointmentRepository>,
        cancel_token: CancellationToken,
    ) -> Self {
        let rooms = Arc::new(RoomRegistry::new());
        let metrics = ActorMetrics::new();

        let ctx = CallContext {
            store,
            rooms: Arc::clone(&rooms),
            metrics: Arc::clone(&metrics),
            idle_timeout: config.call_idle_timeout(),
        };
        let supervisor = CallSupervisor::new(ctx, cancel_token.child_token());
        let fanout = NotificationFanout::new(
            Arc::clone(&rooms),
            Arc::clone(&appointments),
            config.pending_appointments_limit,
        );

        Self {
            rooms,
            supervisor,
            fanout,
            appointments,
            metrics,
            connection_buffer: config.connection_buffer,
            cancel_token,
        }
    }

    /// Register a newly verified socket.
    ///
    /// Staff join their own staff room and department room; clients join
    /// their client room. Staff then receive their pending appointments.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once shutdown has started.
    #[instrument(skip_all, fields(subject_id = %identity.subject_id, role = %identity.role))]
    pub async fn attach(
        &self,
        identity: IdentityContext,
    ) -> Result<(ConnectionHandle, ConnectionOutbox), SignalingError> {
        if self.cancel_token.is_cancelled() {
            return Err(SignalingError::ShuttingDown);
        }

        let (connection, outbox) = ConnectionHandle::open(
            identity,
            self.connection_buffer,
            self.cancel_token.child_token(),
        );
        self.metrics.connection_opened();

        let identity = connection.identity();
        if identity.is_staff() {
            if let Some(staff_id) = identity.staff_id.as_deref() {
                self.rooms.join(&connection, Room::staff(staff_id)).await;
            }
            if let Some(department) = identity.department.as_deref() {
                self.rooms.join(&connection, Room::dept(department)).await;
            }
        } else {
            self.rooms
                .join(&connection, Room::client(identity.subject_id.clone()))
                .await;
        }

        info!(
            target: "sig.service",
            connection_id = %connection.id(),
            subject_id = %identity.subject_id,
            role = %identity.role,
            "Connection attached"
        );

        self.fanout.on_connect(&connection).await;
        Ok((connection, outbox))
    }

    /// Remove a socket from every room. Call state is untouched.
    #[instrument(skip_all, fields(connection_id = %connection.id()))]
    pub async fn detach(&self, connection: &ConnectionHandle) {
        let rooms = self.rooms.leave_all(connection.id()).await;
        connection.close();
        self.metrics.connection_closed();

        info!(
            target: "sig.service",
            connection_id = %connection.id(),
            subject_id = %connection.identity().subject_id,
            rooms,
            "Connection detached"
        );
    }

    /// Decode and handle one inbound text frame.
    ///
    /// The outcome is logged and counted here; callers only need it for
    /// tests.
    ///
    /// # Errors
    ///
    /// `Malformed` for frames that fail decoding, otherwise whatever the
    /// event's handler returned.
    pub async fn handle_frame(
        &self,
        connection: &ConnectionHandle,
        frame: &str,
    ) -> Result<EventOutcome, SignalingError> {
        let started = Instant::now();

        let event = match ClientEvent::decode(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(
                    target: "sig.service",
                    connection_id = %connection.id(),
                    frame_bytes = frame.len(),
                    error = %e,
                    "Rejected malformed frame"
                );
                metrics::record_event(UNDECODED_EVENT, e.kind());
                return Err(e);
            }
        };

        let name = event.name();
        let result = self.handle_event(connection, event).await;

        match &result {
            Ok(outcome) => {
                debug!(
                    target: "sig.service",
                    connection_id = %connection.id(),
                    event = name,
                    outcome = %outcome,
                    "Event handled"
                );
                metrics::record_event(name, outcome.as_str());
            }
            Err(e) => {
                warn!(
                    target: "sig.service",
                    connection_id = %connection.id(),
                    event = name,
                    error = %e,
                    "Event failed"
                );
                metrics::record_event(name, e.kind());
            }
        }
        metrics::record_event_latency(name, started.elapsed());
        result
    }

    /// Route a decoded event.
    ///
    /// # Errors
    ///
    /// Store and repository failures for this event only.
    #[instrument(skip_all, fields(connection_id = %connection.id(), event = event.name()))]
    pub async fn handle_event(
        &self,
        connection: &ConnectionHandle,
        event: ClientEvent,
    ) -> Result<EventOutcome, SignalingError> {
        match event {
            ClientEvent::JoinStaff { staff_id } => self.join_staff(connection, staff_id).await,
            ClientEvent::JoinCall { call_id } => {
                self.call(&call_id, CallCommand::Join {
                    connection: connection.clone(),
                })
                .await
            }
            ClientEvent::LeaveCall { call_id } => {
                let left = self.rooms.leave(connection.id(), &Room::call(call_id)).await;
                Ok(if left {
                    EventOutcome::Applied
                } else {
                    EventOutcome::Unchanged
                })
            }
            ClientEvent::CallAccept { call_id } => {
                self.call(&call_id, CallCommand::Accept {
                    connection: connection.clone(),
                })
                .await
            }
            ClientEvent::CallDecline { call_id, reason } => {
                self.call(&call_id, CallCommand::Decline {
                    connection: connection.clone(),
                    reason,
                })
                .await
            }
            ClientEvent::CallEnd { call_id } => {
                self.call(&call_id, CallCommand::End {
                    connection: connection.clone(),
                })
                .await
            }
            ClientEvent::CallSdp {
                call_id,
                sdp_type,
                sdp,
            } => {
                self.call(&call_id, CallCommand::Sdp {
                    connection: connection.clone(),
                    kind: sdp_type,
                    sdp,
                })
                .await
            }
            ClientEvent::CallIce { call_id, candidate } => {
                self.call(&call_id, CallCommand::Ice {
                    connection: connection.clone(),
                    candidate,
                })
                .await
            }
            ClientEvent::AppointmentRequest {
                appointment_id,
                staff_id,
            } => self.appointment_requested(&appointment_id, &staff_id).await,
            ClientEvent::AppointmentDecision {
                appointment_id,
                decision,
                staff_id,
            } => {
                self.appointment_decided(connection, &appointment_id, decision, &staff_id)
                    .await
            }
            ClientEvent::NotificationsMarkRead { notification_id } => {
                connection.deliver(ServerEvent::NotificationRead { notification_id });
                Ok(EventOutcome::Applied)
            }
            ClientEvent::NotificationsMarkAllRead {} => {
                connection.deliver(ServerEvent::NotificationsAllRead { success: true });
                Ok(EventOutcome::Applied)
            }
        }
    }

    async fn call(&self, call_id: &str, command: CallCommand) -> Result<EventOutcome, SignalingError> {
        self.supervisor.dispatch(call_id, command).await
    }

    async fn join_staff(
        &self,
        connection: &ConnectionHandle,
        staff_id: String,
    ) -> Result<EventOutcome, SignalingError> {
        if !connection.identity().is_staff_member(&staff_id) {
            warn!(
                target: "sig.service",
                connection_id = %connection.id(),
                requested_staff_id = %staff_id,
                "Connection attempted to join another staff room"
            );
            return Ok(EventOutcome::Dropped(DropReason::Unauthorized));
        }

        let joined = self.rooms.join(connection, Room::staff(staff_id)).await;
        Ok(if joined {
            EventOutcome::Applied
        } else {
            EventOutcome::Unchanged
        })
    }

    async fn appointment_requested(
        &self,
        appointment_id: &str,
        staff_id: &str,
    ) -> Result<EventOutcome, SignalingError> {
        let Some(appointment) = self.appointments.get(appointment_id).await? else {
            debug!(
                target: "sig.service",
                appointment_id = %appointment_id,
                "Unknown appointment, dropping request notification"
            );
            return Ok(EventOutcome::Dropped(DropReason::NotFound));
        };

        if appointment.staff_id != staff_id {
            warn!(
                target: "sig.service",
                appointment_id = %appointment_id,
                requested_staff_id = %staff_id,
                "Appointment request names a different staff member"
            );
            return Ok(EventOutcome::Dropped(DropReason::Unauthorized));
        }

        self.fanout.on_appointment_created(&appointment).await;
        Ok(EventOutcome::Applied)
    }

    async fn appointment_decided(
        &self,
        connection: &ConnectionHandle,
        appointment_id: &str,
        decision: Decision,
        staff_id: &str,
    ) -> Result<EventOutcome, SignalingError> {
        if !connection.identity().is_staff_member(staff_id) {
            warn!(
                target: "sig.service",
                connection_id = %connection.id(),
                appointment_id = %appointment_id,
                "Connection attempted a decision for another staff member"
            );
            return Ok(EventOutcome::Dropped(DropReason::Unauthorized));
        }

        let Some(appointment) = self.appointments.get(appointment_id).await? else {
            return Ok(EventOutcome::Dropped(DropReason::NotFound));
        };

        if appointment.staff_id != staff_id {
            warn!(
                target: "sig.service",
                appointment_id = %appointment_id,
                staff_id = %staff_id,
                "Decision on an appointment assigned to someone else"
            );
            return Ok(EventOutcome::Dropped(DropReason::Unauthorized));
        }

        let updated = appointment.with_decision(decision, now_ms());
        self.appointments.update(updated.clone()).await?;

        info!(
            target: "sig.service",
            appointment_id = %appointment_id,
            staff_id = %staff_id,
            decision = decision.as_str(),
            status = %updated.status,
            "Appointment decision applied"
        );
        self.fanout.on_appointment_decision(&updated, decision).await;
        Ok(EventOutcome::Applied)
    }

    /// Stop accepting connections, close every socket and stop every call
    /// actor.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    #[must_use]
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    #[must_use]
    pub fn supervisor(&self) -> &CallSupervisor {
        &self.supervisor
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }
}
