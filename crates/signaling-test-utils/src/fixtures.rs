//! Test fixtures: identities, call records, appointments and frames.

use chrono::NaiveDate;
use common::identity::IdentityContext;
use serde_json::{json, Value};
use signaling_service::appointments::{
    Appointment, AppointmentStatus, AppointmentType, TimeSlot,
};
use signaling_service::store::{CallRecord, CallState};

/// Staff identity whose subject id is derived from the staff id.
pub fn staff_identity(staff_id: &str) -> IdentityContext {
    IdentityContext::staff(format!("user-{staff_id}"), staff_id)
}

/// Staff identity with a department.
pub fn staff_in_department(staff_id: &str, department: &str) -> IdentityContext {
    staff_identity(staff_id).with_department(department)
}

pub fn client_identity(client_id: &str) -> IdentityContext {
    IdentityContext::client(client_id)
}

/// Builder for call records seeded into a store.
#[derive(Debug, Clone)]
pub struct CallRecordBuilder {
    record: CallRecord,
}

impl CallRecordBuilder {
    /// A requested call created at t=1000ms.
    pub fn new(call_id: &str) -> Self {
        Self {
            record: CallRecord::requested(call_id, 1_000),
        }
    }

    pub fn state(mut self, state: CallState) -> Self {
        self.record.state = state;
        self
    }

    pub fn staff(mut self, staff_id: &str) -> Self {
        self.record.staff_id = Some(staff_id.to_string());
        self
    }

    pub fn offer(mut self, sdp: Value) -> Self {
        self.record.sdp_offer = Some(sdp);
        self
    }

    pub fn answer(mut self, sdp: Value) -> Self {
        self.record.sdp_answer = Some(sdp);
        self
    }

    pub fn build(self) -> CallRecord {
        self.record
    }
}

/// A session description payload the way a browser hands it over.
pub fn sdp(kind: &str, body: &str) -> Value {
    json!({ "type": kind, "sdp": body })
}

pub fn candidate(body: &str) -> Value {
    json!({ "candidate": body, "sdpMid": "0", "sdpMLineIndex": 0 })
}

/// Builder for pending appointments.
#[derive(Debug, Clone)]
pub struct AppointmentBuilder {
    appointment: Appointment,
}

impl AppointmentBuilder {
    /// Pending in-person appointment between `client_id` and `staff_id`.
    pub fn new(appointment_id: &str, client_id: &str, staff_id: &str) -> Self {
        Self {
            appointment: Appointment {
                appointment_id: appointment_id.to_string(),
                client_id: client_id.to_string(),
                staff_id: staff_id.to_string(),
                client_name: format!("Client {client_id}"),
                client_email: None,
                purpose: "Course advising".to_string(),
                appointment_date: NaiveDate::from_ymd_opt(2026, 5, 4).expect("valid date"),
                appointment_time: TimeSlot {
                    start: "14:00".to_string(),
                    end: "14:30".to_string(),
                },
                duration_minutes: 30,
                status: AppointmentStatus::Pending,
                appointment_type: AppointmentType::InPerson,
                location: Some("Faculty block, room 12".to_string()),
                created_at: 1_000,
                updated_at: 1_000,
            },
        }
    }

    pub fn status(mut self, status: AppointmentStatus) -> Self {
        self.appointment.status = status;
        self
    }

    /// Day of May 2026.
    pub fn on_day(mut self, day: u32) -> Self {
        self.appointment.appointment_date =
            NaiveDate::from_ymd_opt(2026, 5, day).expect("valid day of May");
        self
    }

    pub fn video(mut self) -> Self {
        self.appointment.appointment_type = AppointmentType::VideoCall;
        self.appointment.location = None;
        self
    }

    pub fn build(self) -> Appointment {
        self.appointment
    }
}

/// Encode an inbound frame.
pub fn frame(event: &str, data: Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

pub fn join_call(call_id: &str) -> String {
    frame("join:call", json!({ "callId": call_id }))
}

pub fn accept(call_id: &str) -> String {
    frame("call:accept", json!({ "callId": call_id }))
}

pub fn decline(call_id: &str, reason: Option<&str>) -> String {
    frame("call:decline", json!({ "callId": call_id, "reason": reason }))
}

pub fn end_call(call_id: &str) -> String {
    frame("call:end", json!({ "callId": call_id }))
}

pub fn send_sdp(call_id: &str, kind: &str, payload: Value) -> String {
    frame(
        "call:sdp",
        json!({ "callId": call_id, "type": kind, "sdp": payload }),
    )
}

pub fn send_ice(call_id: &str, payload: Value) -> String {
    frame("call:ice", json!({ "callId": call_id, "candidate": payload }))
}

pub fn decide(appointment_id: &str, decision: &str, staff_id: &str) -> String {
    frame(
        "appointment:decision",
        json!({ "appointmentId": appointment_id, "decision": decision, "staffId": staff_id }),
    )
}

pub fn request_appointment(appointment_id: &str, staff_id: &str) -> String {
    frame(
        "appointment:request",
        json!({ "appointmentId": appointment_id, "staffId": staff_id }),
    )
}
