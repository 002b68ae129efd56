//! Transfer value objects

use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::{PhoneNumber, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transfer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Original leg is dropped only after the operator confirms
    Warm,
    /// Original leg is dropped as soon as the target starts ringing
    Cold,
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferMode::Warm => f.write_str("warm"),
            TransferMode::Cold => f.write_str("cold"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStage {
    Dialing,
    Confirmed,
    Completed,
    Aborted,
}

impl TransferStage {
    pub fn is_finished(&self) -> bool {
        matches!(self, TransferStage::Completed | TransferStage::Aborted)
    }
}

/// Where the call is being transferred to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTarget {
    pub number: PhoneNumber,
    /// Agent or department name, if the target was picked from a directory
    pub label: Option<String>,
}

impl TransferTarget {
    pub fn new(number: PhoneNumber) -> Self {
        Self {
            number,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One transfer attempt; never outlives the session it operates on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAttempt {
    /// Identifier of the second leg
    pub leg_id: SessionId,
    pub target: TransferTarget,
    pub mode: TransferMode,
    pub stage: TransferStage,
    /// The second leg has been answered
    pub target_answered: bool,
    pub started_at: DateTime<Utc>,
}

impl TransferAttempt {
    pub fn new(leg_id: SessionId, target: TransferTarget, mode: TransferMode) -> Self {
        Self {
            leg_id,
            target,
            mode,
            stage: TransferStage::Dialing,
            target_answered: false,
            started_at: Utc::now(),
        }
    }
}

/// Progress of a transfer attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferEvent {
    pub metadata: EventMetadata,
    pub attempt: TransferAttempt,
    /// Why the attempt was aborted
    pub reason: Option<String>,
}

impl TransferEvent {
    pub fn new(attempt: TransferAttempt, reason: Option<String>) -> Self {
        Self {
            metadata: EventMetadata::now(),
            attempt,
            reason,
        }
    }
}

impl DomainEvent for TransferEvent {
    const KIND: &'static str = "call.transfer";

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
