//! Appointment notification fan-out.
//!
//! Runs after the appointment repository has already been mutated and only
//! decides which rooms hear about it. Nothing here writes appointments.

use crate::actors::ConnectionHandle;
use crate::appointments::{Appointment, AppointmentFilter, AppointmentRepository, Decision};
use crate::protocol::{NoticeKind, ServerEvent};
use crate::rooms::{Room, RoomRegistry};

use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Routes appointment events to staff, client and connection recipients.
#[derive(Clone)]
pub struct NotificationFanout {
    rooms: Arc<RoomRegistry>,
    repo: Arc<dyn AppointmentRepository>,
    pending_limit: usize,
}

impl NotificationFanout {
    #[must_use]
    pub fn new(
        rooms: Arc<RoomRegistry>,
        repo: Arc<dyn AppointmentRepository>,
        pending_limit: usize,
    ) -> Self {
        Self {
            rooms,
            repo,
            pending_limit,
        }
    }

    /// Tell the assigned staff member about a new request.
    #[instrument(skip_all, fields(appointment_id = %appointment.appointment_id))]
    pub async fn on_appointment_created(&self, appointment: &Appointment) -> usize {
        let event = ServerEvent::Appointment {
            kind: NoticeKind::NewAppointment,
            appointment: appointment.summary(),
        };
        let delivered = self
            .rooms
            .broadcast(&Room::staff(appointment.staff_id.clone()), &event)
            .await;

        debug!(
            target: "sig.notifications",
            appointment_id = %appointment.appointment_id,
            staff_id = %appointment.staff_id,
            delivered,
            "New appointment notification sent"
        );
        delivered
    }

    /// Tell both parties about a decision. `updated` already carries the new
    /// status.
    #[instrument(skip_all, fields(appointment_id = %updated.appointment_id, decision = decision.as_str()))]
    pub async fn on_appointment_decision(&self, updated: &Appointment, decision: Decision) {
        let to_client = ServerEvent::AppointmentDecision {
            appointment_id: updated.appointment_id.clone(),
            decision,
            appointment: updated.clone(),
        };
        let to_staff = ServerEvent::AppointmentUpdated {
            appointment_id: updated.appointment_id.clone(),
            status: updated.status,
        };

        let clients = self
            .rooms
            .broadcast(&Room::client(updated.client_id.clone()), &to_client)
            .await;
        let staff = self
            .rooms
            .broadcast(&Room::staff(updated.staff_id.clone()), &to_staff)
            .await;

        debug!(
            target: "sig.notifications",
            appointment_id = %updated.appointment_id,
            status = %updated.status,
            clients,
            staff,
            "Appointment decision notifications sent"
        );
    }

    /// Push the pending backlog to a freshly attached staff connection.
    ///
    /// Clients and staff identities without a staff id get nothing. A
    /// repository failure is logged and the connection carries on.
    #[instrument(skip_all, fields(connection_id = %connection.id()))]
    pub async fn on_connect(&self, connection: &ConnectionHandle) {
        let Some(staff_id) = connection.identity().acting_staff_id() else {
            return;
        };

        let pending = match self
            .repo
            .find_by_staff(staff_id, &AppointmentFilter::pending())
            .await
        {
            Ok(pending) => pending,
            Err(e) => {
                warn!(
                    target: "sig.notifications",
                    connection_id = %connection.id(),
                    staff_id = %staff_id,
                    error = %e,
                    "Pending appointment lookup failed"
                );
                return;
            }
        };

        if pending.is_empty() {
            return;
        }

        let count = pending.len();
        let appointments: Vec<Appointment> =
            pending.into_iter().take(self.pending_limit).collect();

        debug!(
            target: "sig.notifications",
            connection_id = %connection.id(),
            staff_id = %staff_id,
            count,
            sent = appointments.len(),
            "Sending pending appointments"
        );
        connection.deliver(ServerEvent::Appointments {
            kind: NoticeKind::PendingAppointments,
            count,
            appointments,
        });
    }
}
