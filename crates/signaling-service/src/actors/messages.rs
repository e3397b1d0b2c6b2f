//! Message types for actor communication.
//!
//! Commands travel to call actors over `tokio::sync::mpsc`; each carries a
//! `tokio::sync::oneshot` for the outcome so the sending socket task can
//! process its next frame only after this one is settled.

use super::connection::ConnectionHandle;
use crate::errors::SignalingError;
use crate::store::SdpKind;

use serde_json::Value;
use std::fmt;
use tokio::sync::oneshot;

/// Operation on one call, issued on behalf of one connection.
#[derive(Debug)]
pub enum CallCommand {
    /// Join the call room and re-sync the joiner from the store.
    Join { connection: ConnectionHandle },

    /// Staff accepts the call.
    Accept { connection: ConnectionHandle },

    /// Staff declines the call.
    Decline {
        connection: ConnectionHandle,
        reason: Option<String>,
    },

    /// A call room member ends the call.
    End { connection: ConnectionHandle },

    /// Store and broadcast an offer or answer.
    Sdp {
        connection: ConnectionHandle,
        kind: SdpKind,
        sdp: Value,
    },

    /// Relay a network candidate to the other members.
    Ice {
        connection: ConnectionHandle,
        candidate: Value,
    },
}

impl CallCommand {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            CallCommand::Join { .. } => "join",
            CallCommand::Accept { .. } => "accept",
            CallCommand::Decline { .. } => "decline",
            CallCommand::End { .. } => "end",
            CallCommand::Sdp { .. } => "sdp",
            CallCommand::Ice { .. } => "ice",
        }
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionHandle {
        match self {
            CallCommand::Join { connection }
            | CallCommand::Accept { connection }
            | CallCommand::Decline { connection, .. }
            | CallCommand::End { connection }
            | CallCommand::Sdp { connection, .. }
            | CallCommand::Ice { connection, .. } => connection,
        }
    }
}

/// Envelope delivered to a `CallActor` mailbox.
#[derive(Debug)]
pub struct CallMessage {
    pub command: CallCommand,
    pub respond_to: oneshot::Sender<Result<CallOutcome, SignalingError>>,
}

/// Why a call command had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No record exists for the call id.
    NotFound,
    /// Caller's role or membership does not permit the command.
    Unauthorized,
    /// The record's state does not permit the command.
    InvalidTransition,
}

impl DropReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DropReason::NotFound => "not_found",
            DropReason::Unauthorized => "unauthorized",
            DropReason::InvalidTransition => "invalid_transition",
        }
    }
}

/// Result of a call command that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// State was changed and/or events were delivered.
    Applied,
    /// Valid command that repeated the current state; nothing was written.
    Unchanged,
    /// Command was ignored; no state change, no broadcast.
    Dropped(DropReason),
}

impl CallOutcome {
    /// Bounded label for `sig_events_total`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Applied => "applied",
            CallOutcome::Unchanged => "unchanged",
            CallOutcome::Dropped(reason) => reason.as_str(),
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
