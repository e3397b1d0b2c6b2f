//! Verified identity attached to a connection.
//!
//! The identity is produced by the external auth collaborator before a
//! connection reaches the signaling layer. It is attached exactly once, when
//! the connection is accepted, and is never re-derived mid-handler.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Role of the party behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A campus visitor or student.
    Client,
    /// A staff member who answers calls and appointments.
    Staff,
}

impl Role {
    /// Returns the role as a string for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced while assembling an identity from upstream claims.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Missing identity field: {0}")]
    MissingField(&'static str),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

impl FromStr for Role {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "client" => Ok(Role::Client),
            "staff" => Ok(Role::Staff),
            other => Err(IdentityError::UnknownRole(other.to_string())),
        }
    }
}

/// Identity Context for one connection. Immutable after attach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityContext {
    /// Subject identifier (user id) issued by the auth collaborator.
    pub subject_id: String,
    /// Role of the subject.
    pub role: Role,
    /// Staff identifier, present for staff identities.
    pub staff_id: Option<String>,
    /// Department code, present for staff assigned to a department.
    pub department: Option<String>,
}

impl IdentityContext {
    /// Build a client identity.
    #[must_use]
    pub fn client(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            role: Role::Client,
            staff_id: None,
            department: None,
        }
    }

    /// Build a staff identity.
    #[must_use]
    pub fn staff(subject_id: impl Into<String>, staff_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            role: Role::Staff,
            staff_id: Some(staff_id.into()),
            department: None,
        }
    }

    /// Attach a department code.
    #[must_use]
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Assemble an identity from raw upstream claim values.
    ///
    /// Empty strings count as absent. A staff identity without a staff id is
    /// still valid; it simply cannot act on privileged call events.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError` if the subject or role is missing, or the role
    /// is not recognised.
    pub fn from_claims(
        subject_id: Option<&str>,
        role: Option<&str>,
        staff_id: Option<&str>,
        department: Option<&str>,
    ) -> Result<Self, IdentityError> {
        let subject_id = non_empty(subject_id).ok_or(IdentityError::MissingField("subject"))?;
        let role: Role = non_empty(role)
            .ok_or(IdentityError::MissingField("role"))?
            .parse()?;

        Ok(Self {
            subject_id: subject_id.to_string(),
            role,
            staff_id: non_empty(staff_id).map(str::to_string),
            department: non_empty(department).map(str::to_string),
        })
    }

    /// True if this identity has the staff role.
    #[must_use]
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }

    /// Staff id for a staff identity, `None` otherwise.
    #[must_use]
    pub fn acting_staff_id(&self) -> Option<&str> {
        if self.is_staff() {
            self.staff_id.as_deref()
        } else {
            None
        }
    }

    /// True if this identity is the staff member with the given id.
    #[must_use]
    pub fn is_staff_member(&self, staff_id: &str) -> bool {
        self.acting_staff_id() == Some(staff_id)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
