//! Appointment model and repository interface.
//!
//! The appointment CRUD surface lives outside this service. Signaling reads
//! appointments to build notifications and applies staff decisions through
//! [`AppointmentRepository`].

use crate::errors::SignalingError;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    #[serde(rename = "No-Show")]
    NoShow,
}

impl AppointmentStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "Pending",
            AppointmentStatus::Confirmed => "Confirmed",
            AppointmentStatus::Completed => "Completed",
            AppointmentStatus::Cancelled => "Cancelled",
            AppointmentStatus::NoShow => "No-Show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentType {
    #[serde(rename = "Video Call")]
    VideoCall,
    #[serde(rename = "In-Person")]
    InPerson,
    #[serde(rename = "Phone Call")]
    PhoneCall,
}

/// Staff decision on a pending appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Rejected => "rejected",
        }
    }

    /// Status an appointment takes once this decision is applied.
    #[must_use]
    pub const fn resulting_status(&self) -> AppointmentStatus {
        match self {
            Decision::Approved => AppointmentStatus::Confirmed,
            Decision::Rejected => AppointmentStatus::Cancelled,
        }
    }
}

/// Start and end of an appointment slot, `HH:MM` local time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub appointment_id: String,
    pub client_id: String,
    pub staff_id: String,
    pub client_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    pub purpose: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeSlot,
    #[serde(rename = "duration")]
    pub duration_minutes: u32,
    pub status: AppointmentStatus,
    pub appointment_type: AppointmentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Appointment {
    /// Copy of this appointment with `decision` applied.
    #[must_use]
    pub fn with_decision(&self, decision: Decision, now_ms: i64) -> Self {
        let mut updated = self.clone();
        updated.status = decision.resulting_status();
        updated.updated_at = updated.updated_at.max(now_ms);
        updated
    }

    /// Short form pushed to staff when a new request arrives.
    #[must_use]
    pub fn summary(&self) -> AppointmentSummary {
        AppointmentSummary {
            appointment_id: self.appointment_id.clone(),
            client_name: self.client_name.clone(),
            purpose: self.purpose.clone(),
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSummary {
    pub appointment_id: String,
    pub client_name: String,
    pub purpose: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: TimeSlot,
}

/// Query filter for [`AppointmentRepository::find_by_staff`].
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    #[must_use]
    pub fn pending() -> Self {
        Self {
            status: Some(AppointmentStatus::Pending),
        }
    }

    fn matches(&self, appointment: &Appointment) -> bool {
        self.status.map_or(true, |s| appointment.status == s)
    }
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn create(&self, appointment: Appointment) -> Result<(), SignalingError>;

    async fn get(&self, appointment_id: &str) -> Result<Option<Appointment>, SignalingError>;

    /// Replace the stored appointment.
    async fn update(&self, appointment: Appointment) -> Result<(), SignalingError>;

    /// Appointments for a staff member, soonest first.
    async fn find_by_staff(
        &self,
        staff_id: &str,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, SignalingError>;
}

/// Process-local appointment repository.
#[derive(Debug, Default)]
pub struct InMemoryAppointmentRepository {
    appointments: RwLock<HashMap<String, Appointment>>,
}

impl InMemoryAppointmentRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn create(&self, appointment: Appointment) -> Result<(), SignalingError> {
        self.appointments
            .write()
            .await
            .insert(appointment.appointment_id.clone(), appointment);
        Ok(())
    }

    async fn get(&self, appointment_id: &str) -> Result<Option<Appointment>, SignalingError> {
        Ok(self.appointments.read().await.get(appointment_id).cloned())
    }

    async fn update(&self, appointment: Appointment) -> Result<(), SignalingError> {
        self.appointments
            .write()
            .await
            .insert(appointment.appointment_id.clone(), appointment);
        Ok(())
    }

    async fn find_by_staff(
        &self,
        staff_id: &str,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, SignalingError> {
        let mut found: Vec<Appointment> = self
            .appointments
            .read()
            .await
            .values()
            .filter(|a| a.staff_id == staff_id && filter.matches(a))
            .cloned()
            .collect();

        found.sort_by(|a, b| {
            (a.appointment_date, &a.appointment_time.start, &a.appointment_id).cmp(&(
                b.appointment_date,
                &b.appointment_time.start,
                &b.appointment_id,
            ))
        });
        Ok(found)
    }
}
