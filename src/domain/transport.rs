//! Transport capability port
//!
//! The signaling/media provider is an external collaborator. The core only
//! sees the narrow interface below; adapters live in the infrastructure layer.

use crate::domain::registration::Credential;
use crate::domain::shared::value_objects::PhoneNumber;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Failures reported by the transport capability
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Registration rejected: {0}")]
    Registration(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Session command failed: {0}")]
    Session(String),

    #[error("Device unavailable")]
    Unavailable,
}

/// Audio codec preference passed to the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Opus,
    Pcmu,
    Pcma,
}

/// Outbound call request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub target: PhoneNumber,
    pub display_name: Option<String>,
    pub codec_preferences: Vec<Codec>,
}

/// Lifecycle events of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Ringing,
    Accepted,
    Disconnected(String),
    /// Caller abandoned an inbound session before it was answered
    Cancelled,
    Error(String),
}

/// Control surface of one live session
///
/// Commands are queued by the provider and never block on the network.
pub trait SessionHandle: Send + Sync {
    /// Provider-assigned session identifier
    fn provider_id(&self) -> String;

    fn accept(&self) -> Result<(), TransportError>;

    fn reject(&self) -> Result<(), TransportError>;

    fn disconnect(&self) -> Result<(), TransportError>;

    fn mute(&self, muted: bool) -> Result<(), TransportError>;

    fn hold(&self, held: bool) -> Result<(), TransportError>;

    fn send_digits(&self, digits: &str) -> Result<(), TransportError>;
}

/// A session handle together with its event stream
pub struct Connection {
    pub handle: Arc<dyn SessionHandle>,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("provider_id", &self.handle.provider_id())
            .finish_non_exhaustive()
    }
}

/// Session offered by the provider
#[derive(Debug)]
pub struct IncomingCall {
    /// Caller number, `Unknown` when withheld
    pub from: String,
    pub caller_name: Option<String>,
    pub connection: Connection,
}

/// Device-level notifications
#[derive(Debug)]
pub enum DeviceEvent {
    Incoming(IncomingCall),
    /// The current credential is about to expire
    CredentialWillExpire,
    Unregistered,
    Error(String),
}

/// The signaling provider as seen by the core
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register the device with the given credential
    async fn register(&self, credential: &Credential) -> Result<(), TransportError>;

    /// Swap the credential of a registered device without touching live sessions
    async fn refresh_credential(&self, credential: &Credential) -> Result<(), TransportError>;

    /// Unregister the device
    async fn unregister(&self) -> Result<(), TransportError>;

    /// Originate an outbound session
    async fn connect(&self, request: ConnectRequest) -> Result<Connection, TransportError>;

    /// Device event stream; can be taken once
    fn take_device_events(&self) -> Option<mpsc::UnboundedReceiver<DeviceEvent>>;
}
