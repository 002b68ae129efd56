//! Device registration value objects and the credential port

use crate::domain::transport::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registration status of the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    Unregistered,
    Registering,
    Registered,
    Failed(String),
}

impl RegistrationStatus {
    /// Calls may be placed or accepted
    pub fn is_ready(&self) -> bool {
        matches!(self, RegistrationStatus::Registered)
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrationStatus::Unregistered => f.write_str("unregistered"),
            RegistrationStatus::Registering => f.write_str("registering"),
            RegistrationStatus::Registered => f.write_str("registered"),
            RegistrationStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Access token for the transport
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub identity: String,
    pub token: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            token: token.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Issues credentials for a device identity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn fetch(&self, identity: &str) -> Result<Credential, TransportError>;
}
