//! Envelope for everything the controller publishes
//!
//! Each event type names itself once through [`DomainEvent::KIND`]; the
//! per-instance part is just an id and a timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Id and timestamp stamped on an event when it is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    pub fn now() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
        }
    }
}

pub trait DomainEvent {
    /// Dotted event name, e.g. `call.state_changed`
    const KIND: &'static str;

    fn metadata(&self) -> &EventMetadata;

    fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata().occurred_at
    }

    /// `kind#id` tag for log lines
    fn tag(&self) -> String {
        format!("{}#{}", Self::KIND, self.metadata().event_id)
    }
}
