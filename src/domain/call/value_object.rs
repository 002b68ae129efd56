//! Call value objects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Call offered to us by the transport
    Inbound,
    /// Call we placed
    Outbound,
}

/// State of the single call slot
///
/// Exactly one state is active at a time. `Idle` ends every call but is not
/// terminal: the controller is reused for the lifetime of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallState {
    /// No call
    Idle,
    /// Outbound call requested, waiting for the transport
    Connecting,
    /// Remote party is being alerted
    Ringing,
    /// Inbound call waiting for answer/decline
    Incoming,
    /// Call is connected and media is flowing
    InCall,
    /// Call is connected but held
    OnHold,
}

impl CallState {
    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_state: &CallState) -> bool {
        use CallState::*;

        match (self, new_state) {
            // From Idle
            (Idle, Connecting) => true,
            (Idle, Incoming) => true,

            // From Connecting
            (Connecting, Ringing) => true,
            (Connecting, InCall) => true,
            (Connecting, Idle) => true,

            // From Ringing
            (Ringing, InCall) => true,
            (Ringing, Idle) => true,

            // From Incoming
            (Incoming, InCall) => true,
            (Incoming, Idle) => true,

            // From InCall; Ringing is a cold-transfer handoff
            (InCall, OnHold) => true,
            (InCall, Ringing) => true,
            (InCall, Idle) => true,

            // From OnHold
            (OnHold, InCall) => true,
            (OnHold, Ringing) => true,
            (OnHold, Idle) => true,

            _ => false,
        }
    }

    /// A call slot is in use
    pub fn is_active(&self) -> bool {
        !matches!(self, CallState::Idle)
    }

    /// Connected, whether held or not
    pub fn is_connected(&self) -> bool {
        matches!(self, CallState::InCall | CallState::OnHold)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Idle => "idle",
            CallState::Connecting => "connecting",
            CallState::Ringing => "ringing",
            CallState::Incoming => "incoming",
            CallState::InCall => "in_call",
            CallState::OnHold => "on_hold",
        }
    }

    /// Status label shown to the user
    pub fn label(&self) -> &'static str {
        match self {
            CallState::Idle => "Ready",
            CallState::Connecting => "Connecting...",
            CallState::Ringing => "Ringing...",
            CallState::Incoming => "Incoming call",
            CallState::InCall => "Connected",
            CallState::OnHold => "On hold",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a call returned to `Idle`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// We hung up
    LocalHangup,
    /// Remote party hung up
    RemoteHangup,
    /// We declined an incoming call
    Declined,
    /// Caller abandoned before we answered
    Cancelled,
    /// The call was handed to a transfer target
    Transferred,
    /// Transport or setup failure
    Failed(String),
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndReason::LocalHangup => f.write_str("local hangup"),
            EndReason::RemoteHangup => f.write_str("remote hangup"),
            EndReason::Declined => f.write_str("declined"),
            EndReason::Cancelled => f.write_str("cancelled"),
            EndReason::Transferred => f.write_str("transferred"),
            EndReason::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}
