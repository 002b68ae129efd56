//! Call entities

use crate::domain::call::value_object::CallDirection;
use crate::domain::shared::value_objects::{DtmfDigit, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The call leg currently tracked by the controller
///
/// At most one exists at a time; the controller enforces that, not this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Local leg identifier
    id: SessionId,
    /// Identifier assigned by the transport (call SID), once known
    provider_id: Option<String>,
    direction: CallDirection,
    counterparty_number: String,
    /// Equal to the number when the name is unknown
    counterparty_name: String,
    /// First transition into `InCall`
    started_at: Option<DateTime<Utc>>,
    muted: bool,
    /// DTMF sent during this call
    dialed_digits: String,
}

impl Session {
    pub fn new(
        id: SessionId,
        direction: CallDirection,
        counterparty_number: String,
        counterparty_name: Option<String>,
    ) -> Self {
        let counterparty_name = counterparty_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| counterparty_number.clone());

        Self {
            id,
            provider_id: None,
            direction,
            counterparty_number,
            counterparty_name,
            started_at: None,
            muted: false,
            dialed_digits: String::new(),
        }
    }

    pub(crate) fn set_provider_id(&mut self, provider_id: String) {
        self.provider_id = Some(provider_id);
    }

    /// Records the first connect; later calls keep the original time.
    pub(crate) fn mark_started(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
    }

    pub(crate) fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub(crate) fn push_digit(&mut self, digit: DtmfDigit) {
        self.dialed_digits.push(digit.as_char());
    }

    // Getters
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn provider_id(&self) -> Option<&str> {
        self.provider_id.as_deref()
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn counterparty_number(&self) -> &str {
        &self.counterparty_number
    }

    pub fn counterparty_name(&self) -> &str {
        &self.counterparty_name
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn dialed_digits(&self) -> &str {
        &self.dialed_digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_name_falls_back_to_number() {
        let session = Session::new(
            SessionId::new(),
            CallDirection::Inbound,
            "+15559876543".to_string(),
            None,
        );
        assert_eq!(session.counterparty_name(), "+15559876543");

        let blank = Session::new(
            SessionId::new(),
            CallDirection::Inbound,
            "+15559876543".to_string(),
            Some("  ".to_string()),
        );
        assert_eq!(blank.counterparty_name(), "+15559876543");
    }

    #[test]
    fn test_started_at_is_set_once() {
        let mut session = Session::new(
            SessionId::new(),
            CallDirection::Outbound,
            "+15551234567".to_string(),
            Some("Alice".to_string()),
        );
        assert!(session.started_at().is_none());

        session.mark_started();
        let first = session.started_at();
        assert!(first.is_some());

        session.mark_started();
        assert_eq!(session.started_at(), first);
    }

    #[test]
    fn test_dialed_digits_accumulate() {
        let mut session = Session::new(
            SessionId::new(),
            CallDirection::Outbound,
            "101".to_string(),
            None,
        );
        session.push_digit(DtmfDigit::new('1').unwrap());
        session.push_digit(DtmfDigit::new('#').unwrap());
        assert_eq!(session.dialed_digits(), "1#");
    }
}
