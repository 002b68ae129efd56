//! Call domain events

use crate::domain::call::entity::Session;
use crate::domain::call::value_object::{CallState, EndReason};
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Emitted on every controller transition, in transition order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub metadata: EventMetadata,
    pub previous: CallState,
    pub current: CallState,
    /// Session after the transition; for `Idle`, the session that just ended
    pub session: Option<Session>,
    /// Set when `current` is `Idle`
    pub end_reason: Option<EndReason>,
}

impl StateChange {
    pub fn new(
        previous: CallState,
        current: CallState,
        session: Option<Session>,
        end_reason: Option<EndReason>,
    ) -> Self {
        Self {
            metadata: EventMetadata::now(),
            previous,
            current,
            session,
            end_reason,
        }
    }
}

impl DomainEvent for StateChange {
    const KIND: &'static str = "call.state_changed";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

/// Kind of provider-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    RegistrationFailed,
    CredentialRefreshFailed,
    ConnectFailed,
    CallDropped,
    TransferFailed,
    DeviceError,
    /// A session handle rejected a command that should always succeed
    TransportFault,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FaultKind::RegistrationFailed => "registration_failed",
            FaultKind::CredentialRefreshFailed => "credential_refresh_failed",
            FaultKind::ConnectFailed => "connect_failed",
            FaultKind::CallDropped => "call_dropped",
            FaultKind::TransferFailed => "transfer_failed",
            FaultKind::DeviceError => "device_error",
            FaultKind::TransportFault => "transport_fault",
        };
        f.write_str(name)
    }
}

/// Published on the fault channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFault {
    pub metadata: EventMetadata,
    pub kind: FaultKind,
    /// Human-readable reason
    pub reason: String,
    pub session_id: Option<SessionId>,
}

impl CallFault {
    pub fn new(kind: FaultKind, reason: impl Into<String>, session_id: Option<SessionId>) -> Self {
        Self {
            metadata: EventMetadata::now(),
            kind,
            reason: reason.into(),
            session_id,
        }
    }
}

impl DomainEvent for CallFault {
    const KIND: &'static str = "call.fault";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}

impl fmt::Display for CallFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.reason)
    }
}
