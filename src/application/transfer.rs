//! Transfer coordinator
//!
//! Runs inside the controller actor. It owns the second leg of a transfer
//! and decides, per event, what the controller has to do with the original
//! leg: nothing yet, hand the slot over to the second leg, or restore the
//! pre-transfer state.

use crate::application::controller::{Command, Dialer};
use crate::application::session_leg::SessionLeg;
use crate::domain::call::{CallDirection, CallState, Session};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::SessionId;
use crate::domain::transfer::{
    TransferAttempt, TransferEvent, TransferMode, TransferStage, TransferTarget,
};
use crate::domain::transport::{Connection, SessionEvent, TransportError};
use crate::infrastructure::telemetry;
use tokio::sync::mpsc::{UnboundedSender, WeakUnboundedSender};
use tracing::{debug, info, warn};

/// What the controller must do after a transfer step
pub(crate) enum TransferOutcome {
    Pending,
    /// Drop the original leg; the second leg now owns the call slot in `state`
    Handoff { leg: SessionLeg, state: CallState },
    /// Transfer aborted; bring the original leg back to `to`
    Restore {
        to: CallState,
        failure: Option<String>,
    },
}

struct ActiveTransfer {
    attempt: TransferAttempt,
    leg: SessionLeg,
    restore_to: CallState,
}

#[derive(Default)]
pub(crate) struct TransferCoordinator {
    active: Option<ActiveTransfer>,
    subscribers: Vec<UnboundedSender<TransferEvent>>,
}

impl TransferCoordinator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&mut self, tx: UnboundedSender<TransferEvent>) {
        self.subscribers.push(tx);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub(crate) fn attempt(&self) -> Option<&TransferAttempt> {
        self.active.as_ref().map(|t| &t.attempt)
    }

    /// The session id belongs to the live second leg
    pub(crate) fn owns(&self, id: SessionId) -> bool {
        self.active.as_ref().map(|t| t.leg.id() == id).unwrap_or(false)
    }

    /// Start dialing the target; the original leg must already be held
    pub(crate) fn begin(
        &mut self,
        target: TransferTarget,
        mode: TransferMode,
        restore_to: CallState,
        dialer: &Dialer,
    ) -> TransferAttempt {
        let leg_id = SessionId::new();
        let session = Session::new(
            leg_id,
            CallDirection::Outbound,
            target.number.to_string(),
            target.label.clone(),
        );
        let attempt = TransferAttempt::new(leg_id, target.clone(), mode);

        info!(
            "Starting {} transfer to {} (leg {})",
            mode, target.number, leg_id
        );
        dialer.dial(leg_id, target.number, target.label);

        self.active = Some(ActiveTransfer {
            attempt: attempt.clone(),
            leg: SessionLeg::pending(session),
            restore_to,
        });
        self.publish(attempt.clone(), None);
        attempt
    }

    pub(crate) fn on_connected(
        &mut self,
        result: std::result::Result<Connection, TransportError>,
        mailbox: WeakUnboundedSender<Command>,
    ) -> TransferOutcome {
        match result {
            Ok(connection) => {
                if let Some(active) = self.active.as_mut() {
                    active.leg.attach(connection, mailbox);
                    debug!("Transfer leg {} connected to transport", active.leg.id());
                }
                TransferOutcome::Pending
            }
            Err(e) => self.abort(format!("transfer target unreachable: {}", e), true),
        }
    }

    pub(crate) fn on_leg_event(&mut self, event: SessionEvent) -> TransferOutcome {
        let Some(active) = self.active.as_mut() else {
            return TransferOutcome::Pending;
        };
        let mode = active.attempt.mode;

        match event {
            SessionEvent::Ringing => match mode {
                TransferMode::Cold => self.complete(CallState::Ringing),
                TransferMode::Warm => {
                    debug!("Transfer target is ringing");
                    TransferOutcome::Pending
                }
            },
            SessionEvent::Accepted => {
                active.attempt.target_answered = true;
                active.leg.session_mut().mark_started();
                match mode {
                    TransferMode::Cold => self.complete(CallState::InCall),
                    TransferMode::Warm => {
                        info!("Transfer target answered, awaiting confirmation");
                        let attempt = active.attempt.clone();
                        self.publish(attempt, None);
                        TransferOutcome::Pending
                    }
                }
            }
            SessionEvent::Disconnected(reason) => {
                self.abort(format!("transfer target disconnected: {}", reason), true)
            }
            SessionEvent::Cancelled => self.abort("transfer target cancelled".to_string(), true),
            SessionEvent::Error(reason) => {
                self.abort(format!("transfer leg error: {}", reason), true)
            }
        }
    }

    /// Operator confirmation of a warm transfer
    pub(crate) fn confirm(&mut self) -> Result<TransferOutcome> {
        let Some(active) = self.active.as_mut() else {
            return Err(DomainError::NoTransfer);
        };
        if active.attempt.mode == TransferMode::Cold {
            return Err(DomainError::ValidationError(
                "cold transfers complete without confirmation".to_string(),
            ));
        }
        if !active.attempt.target_answered {
            return Err(DomainError::invalid_state(
                "confirm transfer",
                "the transfer target has not answered",
            ));
        }

        active.attempt.stage = TransferStage::Confirmed;
        let attempt = active.attempt.clone();
        self.publish(attempt, None);
        Ok(self.complete(CallState::InCall))
    }

    /// Operator cancellation before completion
    pub(crate) fn cancel(&mut self) -> Result<TransferOutcome> {
        let Some(active) = self.active.as_ref() else {
            return Err(DomainError::NoTransfer);
        };
        if let Err(e) = active.leg.disconnect() {
            warn!("Failed to disconnect transfer leg {}: {}", active.leg.id(), e);
        }
        Ok(self.abort("cancelled by operator".to_string(), false))
    }

    /// Drop any live attempt because the call itself is ending
    pub(crate) fn teardown(&mut self, reason: &str) {
        if let Some(active) = self.active.as_ref() {
            if let Err(e) = active.leg.disconnect() {
                warn!("Failed to disconnect transfer leg {}: {}", active.leg.id(), e);
            }
            self.abort(reason.to_string(), false);
        }
    }

    fn complete(&mut self, state: CallState) -> TransferOutcome {
        let Some(mut active) = self.active.take() else {
            return TransferOutcome::Pending;
        };
        active.attempt.stage = TransferStage::Completed;
        info!(
            "{} transfer to {} completed",
            active.attempt.mode, active.attempt.target.number
        );
        telemetry::record_transfer("completed");
        self.publish(active.attempt, None);

        TransferOutcome::Handoff {
            leg: active.leg,
            state,
        }
    }

    fn abort(&mut self, reason: String, failed: bool) -> TransferOutcome {
        let Some(mut active) = self.active.take() else {
            return TransferOutcome::Pending;
        };
        active.attempt.stage = TransferStage::Aborted;
        warn!(
            "Transfer to {} aborted: {}",
            active.attempt.target.number, reason
        );
        telemetry::record_transfer("aborted");
        self.publish(active.attempt, Some(reason.clone()));

        TransferOutcome::Restore {
            to: active.restore_to,
            failure: failed.then_some(reason),
        }
    }

    fn publish(&mut self, attempt: TransferAttempt, reason: Option<String>) {
        let event = TransferEvent::new(attempt, reason);
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}
