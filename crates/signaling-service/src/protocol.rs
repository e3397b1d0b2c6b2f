//! Signaling wire protocol.
//!
//! Every frame is a JSON text message `{"event": <name>, "data": {...}}`.
//! Inbound frames decode into [`ClientEvent`], outbound frames encode from
//! [`ServerEvent`]. Decoding validates required fields so that a malformed
//! event is rejected before it reaches the call actor or a repository.

use crate::appointments::{Appointment, AppointmentStatus, AppointmentSummary, Decision};
use crate::errors::SignalingError;
use crate::store::{CallState, SdpKind};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event received from a connected socket.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join:staff", rename_all = "camelCase")]
    JoinStaff { staff_id: String },

    #[serde(rename = "join:call", rename_all = "camelCase")]
    JoinCall { call_id: String },

    #[serde(rename = "leave:call", rename_all = "camelCase")]
    LeaveCall { call_id: String },

    #[serde(rename = "call:accept", rename_all = "camelCase")]
    CallAccept { call_id: String },

    #[serde(rename = "call:decline", rename_all = "camelCase")]
    CallDecline {
        call_id: String,
        #[serde(default)]
        reason: Option<String>,
    },

    #[serde(rename = "call:end", rename_all = "camelCase")]
    CallEnd { call_id: String },

    #[serde(rename = "call:sdp", rename_all = "camelCase")]
    CallSdp {
        call_id: String,
        #[serde(rename = "type")]
        sdp_type: SdpKind,
        sdp: Value,
    },

    #[serde(rename = "call:ice", rename_all = "camelCase")]
    CallIce { call_id: String, candidate: Value },

    #[serde(rename = "appointment:request", rename_all = "camelCase")]
    AppointmentRequest {
        appointment_id: String,
        staff_id: String,
    },

    #[serde(rename = "appointment:decision", rename_all = "camelCase")]
    AppointmentDecision {
        appointment_id: String,
        decision: Decision,
        staff_id: String,
    },

    #[serde(rename = "notifications:mark-read", rename_all = "camelCase")]
    NotificationsMarkRead { notification_id: String },

    #[serde(rename = "notifications:mark-all-read")]
    NotificationsMarkAllRead {},
}

/// Raw frame shape before the event name is resolved.
#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

impl ClientEvent {
    /// Decode and validate one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Malformed` for invalid JSON, unknown event
    /// names, missing fields, or empty identifiers.
    pub fn decode(frame: &str) -> Result<Self, SignalingError> {
        let envelope: Envelope = serde_json::from_str(frame)
            .map_err(|e| SignalingError::Malformed(format!("invalid frame: {e}")))?;

        // Events without a payload may omit `data` entirely
        let data = match envelope.data {
            Value::Null => Value::Object(serde_json::Map::new()),
            other => other,
        };

        let mut tagged = serde_json::Map::new();
        tagged.insert("event".to_string(), Value::String(envelope.event));
        tagged.insert("data".to_string(), data);

        let event: ClientEvent = serde_json::from_value(Value::Object(tagged))
            .map_err(|e| SignalingError::Malformed(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    /// Reject events whose required identifiers are blank or whose opaque
    /// payloads are null.
    fn validate(&self) -> Result<(), SignalingError> {
        fn required(field: &'static str, value: &str) -> Result<(), SignalingError> {
            if value.trim().is_empty() {
                return Err(SignalingError::Malformed(format!("{field} is empty")));
            }
            Ok(())
        }

        match self {
            ClientEvent::JoinStaff { staff_id } => required("staffId", staff_id),
            ClientEvent::JoinCall { call_id }
            | ClientEvent::LeaveCall { call_id }
            | ClientEvent::CallAccept { call_id }
            | ClientEvent::CallDecline { call_id, .. }
            | ClientEvent::CallEnd { call_id } => required("callId", call_id),
            ClientEvent::CallSdp { call_id, sdp, .. } => {
                required("callId", call_id)?;
                if sdp.is_null() {
                    return Err(SignalingError::Malformed("sdp is missing".to_string()));
                }
                Ok(())
            }
            ClientEvent::CallIce { call_id, candidate } => {
                required("callId", call_id)?;
                if candidate.is_null() {
                    return Err(SignalingError::Malformed(
                        "candidate is missing".to_string(),
                    ));
                }
                Ok(())
            }
            ClientEvent::AppointmentRequest {
                appointment_id,
                staff_id,
            }
            | ClientEvent::AppointmentDecision {
                appointment_id,
                staff_id,
                ..
            } => {
                required("appointmentId", appointment_id)?;
                required("staffId", staff_id)
            }
            ClientEvent::NotificationsMarkRead { notification_id } => {
                required("notificationId", notification_id)
            }
            ClientEvent::NotificationsMarkAllRead {} => Ok(()),
        }
    }

    /// Wire name of the event, used as a bounded metric label.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinStaff { .. } => "join:staff",
            ClientEvent::JoinCall { .. } => "join:call",
            ClientEvent::LeaveCall { .. } => "leave:call",
            ClientEvent::CallAccept { .. } => "call:accept",
            ClientEvent::CallDecline { .. } => "call:decline",
            ClientEvent::CallEnd { .. } => "call:end",
            ClientEvent::CallSdp { .. } => "call:sdp",
            ClientEvent::CallIce { .. } => "call:ice",
            ClientEvent::AppointmentRequest { .. } => "appointment:request",
            ClientEvent::AppointmentDecision { .. } => "appointment:decision",
            ClientEvent::NotificationsMarkRead { .. } => "notifications:mark-read",
            ClientEvent::NotificationsMarkAllRead {} => "notifications:mark-all-read",
        }
    }
}

/// Discriminator carried in the `type` field of appointment notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    NewAppointment,
    PendingAppointments,
}

/// Event delivered to a connected socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "call:update", rename_all = "camelCase")]
    CallUpdate {
        state: CallState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        staff_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    #[serde(rename = "call:sdp", rename_all = "camelCase")]
    CallSdp {
        call_id: String,
        #[serde(rename = "type")]
        sdp_type: SdpKind,
        sdp: Value,
    },

    #[serde(rename = "call:ice", rename_all = "camelCase")]
    CallIce { call_id: String, candidate: Value },

    #[serde(rename = "notifications:appointment")]
    Appointment {
        #[serde(rename = "type")]
        kind: NoticeKind,
        appointment: AppointmentSummary,
    },

    #[serde(rename = "notifications:appointment_decision", rename_all = "camelCase")]
    AppointmentDecision {
        appointment_id: String,
        decision: Decision,
        appointment: Appointment,
    },

    #[serde(rename = "notifications:appointment_updated", rename_all = "camelCase")]
    AppointmentUpdated {
        appointment_id: String,
        status: AppointmentStatus,
    },

    #[serde(rename = "notifications:appointments")]
    Appointments {
        #[serde(rename = "type")]
        kind: NoticeKind,
        count: usize,
        appointments: Vec<Appointment>,
    },

    #[serde(rename = "notifications:read", rename_all = "camelCase")]
    NotificationRead { notification_id: String },

    #[serde(rename = "notifications:all-read")]
    NotificationsAllRead { success: bool },
}

impl ServerEvent {
    /// Snapshot of a call's state as sent to a late joiner.
    #[must_use]
    pub fn call_snapshot(state: CallState, staff_id: Option<String>) -> Self {
        ServerEvent::CallUpdate {
            state,
            staff_id,
            reason: None,
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            ServerEvent::CallUpdate { .. } => "call:update",
            ServerEvent::CallSdp { .. } => "call:sdp",
            ServerEvent::CallIce { .. } => "call:ice",
            ServerEvent::Appointment { .. } => "notifications:appointment",
            ServerEvent::AppointmentDecision { .. } => "notifications:appointment_decision",
            ServerEvent::AppointmentUpdated { .. } => "notifications:appointment_updated",
            ServerEvent::Appointments { .. } => "notifications:appointments",
            ServerEvent::NotificationRead { .. } => "notifications:read",
            ServerEvent::NotificationsAllRead { .. } => "notifications:all-read",
        }
    }

    /// Encode as a text frame.
    ///
    /// # Errors
    ///
    /// Returns `SignalingError::Internal` if serialization fails.
    pub fn encode(&self) -> Result<String, SignalingError> {
        serde_json::to_string(self)
            .map_err(|e| SignalingError::Internal(format!("failed to encode {}: {e}", self.name())))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_call_sdp() {
        let frame = r#"{"event":"call:sdp","data":{"callId":"c1","type":"offer","sdp":{"type":"offer","sdp":"v=0"}}}"#;
        let event = ClientEvent::decode(frame).unwrap();

        assert_eq!(
            event,
            ClientEvent::CallSdp {
                call_id: "c1".to_string(),
                sdp_type: SdpKind::Offer,
                sdp: json!({"type": "offer", "sdp": "v=0"}),
            }
        );
        assert_eq!(event.name(), "call:sdp");
    }

    #[test]
    fn test_decode_decline_reason_is_optional() {
        let without = ClientEvent::decode(r#"{"event":"call:decline","data":{"callId":"c1"}}"#)
            .unwrap();
        assert_eq!(
            without,
            ClientEvent::CallDecline {
                call_id: "c1".to_string(),
                reason: None
            }
        );

        let with = ClientEvent::decode(
            r#"{"event":"call:decline","data":{"callId":"c1","reason":"busy"}}"#,
        )
        .unwrap();
        assert!(matches!(with, ClientEvent::CallDecline { reason: Some(r), .. } if r == "busy"));
    }

    #[test]
    fn test_decode_mark_all_read_without_data() {
        let event = ClientEvent::decode(r#"{"event":"notifications:mark-all-read"}"#).unwrap();
        assert_eq!(event, ClientEvent::NotificationsMarkAllRead {});

        let event =
            ClientEvent::decode(r#"{"event":"notifications:mark-all-read","data":{}}"#).unwrap();
        assert_eq!(event, ClientEvent::NotificationsMarkAllRead {});
    }

    #[test]
    fn test_decode_appointment_decision() {
        let event = ClientEvent::decode(
            r#"{"event":"appointment:decision","data":{"appointmentId":"A1","decision":"approved","staffId":"S1"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::AppointmentDecision {
                appointment_id: "A1".to_string(),
                decision: Decision::Approved,
                staff_id: "S1".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        let cases = [
            "not json",
            r#"{"data":{"callId":"c1"}}"#,
            r#"{"event":"call:teleport","data":{"callId":"c1"}}"#,
            r#"{"event":"join:call","data":{}}"#,
            r#"{"event":"join:call","data":{"callId":"   "}}"#,
            r#"{"event":"call:sdp","data":{"callId":"c1","type":"pranswer","sdp":{}}}"#,
            r#"{"event":"call:sdp","data":{"callId":"c1","type":"offer","sdp":null}}"#,
            r#"{"event":"call:ice","data":{"callId":"c1"}}"#,
            r#"{"event":"appointment:decision","data":{"appointmentId":"A1","decision":"maybe","staffId":"S1"}}"#,
            r#"{"event":"appointment:request","data":{"appointmentId":"","staffId":"S1"}}"#,
        ];

        for frame in cases {
            let result = ClientEvent::decode(frame);
            assert!(
                matches!(result, Err(SignalingError::Malformed(_))),
                "expected Malformed for {frame}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_encode_call_update_omits_absent_fields() {
        let frame = ServerEvent::call_snapshot(CallState::Requested, None)
            .encode()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({"event": "call:update", "data": {"state": "requested"}})
        );

        let accepted = ServerEvent::CallUpdate {
            state: CallState::Accepted,
            staff_id: Some("S1".to_string()),
            reason: None,
        };
        let value: Value = serde_json::from_str(&accepted.encode().unwrap()).unwrap();
        assert_eq!(value["data"], json!({"state": "accepted", "staffId": "S1"}));
    }

    #[test]
    fn test_encode_sdp_and_ice() {
        let sdp = ServerEvent::CallSdp {
            call_id: "c1".to_string(),
            sdp_type: SdpKind::Answer,
            sdp: json!({"sdp": "v=0"}),
        };
        let value: Value = serde_json::from_str(&sdp.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "call:sdp", "data": {"callId": "c1", "type": "answer", "sdp": {"sdp": "v=0"}}})
        );

        let ice = ServerEvent::CallIce {
            call_id: "c1".to_string(),
            candidate: json!({"candidate": "candidate:1 1 udp 1 10.0.0.1 5000 typ host"}),
        };
        let value: Value = serde_json::from_str(&ice.encode().unwrap()).unwrap();
        assert_eq!(value["event"], "call:ice");
        assert_eq!(value["data"]["callId"], "c1");
    }

    #[test]
    fn test_encode_notification_acks() {
        let read = ServerEvent::NotificationRead {
            notification_id: "n1".to_string(),
        };
        let value: Value = serde_json::from_str(&read.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "notifications:read", "data": {"notificationId": "n1"}})
        );

        let all = ServerEvent::NotificationsAllRead { success: true };
        let value: Value = serde_json::from_str(&all.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "notifications:all-read", "data": {"success": true}})
        );
    }

    #[test]
    fn test_server_event_decodes_back() {
        let update = ServerEvent::AppointmentUpdated {
            appointment_id: "A1".to_string(),
            status: AppointmentStatus::Confirmed,
        };
        let frame = update.encode().unwrap();
        assert!(frame.contains(r#""status":"Confirmed""#));

        let back: ServerEvent = serde_json::from_str(&frame).unwrap();
        assert_eq!(back, update);
    }
}
