//! Call session controller
//!
//! A single actor owns the call slot. Public operations and transport
//! callbacks all arrive through one mailbox and are processed strictly in
//! order, so no two operations ever see an intermediate state. Subscribers
//! receive transitions through their own channels and can never re-enter
//! the transition logic.

use crate::application::session_leg::SessionLeg;
use crate::application::transfer::{TransferCoordinator, TransferOutcome};
use crate::config::Config;
use crate::domain::call::{
    CallDirection, CallFault, CallState, EndReason, FaultKind, Session, StateChange,
};
use crate::domain::registration::RegistrationStatus;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::events::DomainEvent;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{DtmfDigit, PhoneNumber, SessionId};
use crate::domain::transfer::{TransferAttempt, TransferEvent, TransferMode, TransferTarget};
use crate::domain::transport::{
    Codec, Connection, ConnectRequest, IncomingCall, SessionEvent, Transport, TransportError,
};
use crate::infrastructure::telemetry;
use crate::infrastructure::timer::DurationTimer;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, error, info, warn};

type Reply<T> = oneshot::Sender<Result<T>>;

/// Everything the actor can be asked to do
pub(crate) enum Command {
    MakeCall {
        target: String,
        display_name: Option<String>,
        reply: Reply<SessionId>,
    },
    Answer(Reply<()>),
    Decline(Reply<()>),
    HangUp(Reply<()>),
    ToggleMute(Reply<bool>),
    ToggleHold(Reply<CallState>),
    SendDigit {
        digit: char,
        reply: Reply<()>,
    },
    Transfer {
        target: TransferTarget,
        mode: TransferMode,
        reply: Reply<SessionId>,
    },
    ConfirmTransfer(Reply<()>),
    CancelTransfer(Reply<()>),
    Subscribe(UnboundedSender<StateChange>),
    SubscribeTransfers(UnboundedSender<TransferEvent>),
    /// An outbound `connect` finished
    Connected {
        id: SessionId,
        result: std::result::Result<Connection, TransportError>,
    },
    Incoming(IncomingCall),
    Session {
        id: SessionId,
        event: SessionEvent,
    },
    Shutdown(oneshot::Sender<()>),
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize)]
pub struct CallSnapshot {
    pub state: CallState,
    pub session: Option<Session>,
    pub transfer: Option<TransferAttempt>,
    pub last_end_reason: Option<EndReason>,
    pub last_fault: Option<CallFault>,
}

impl Default for CallSnapshot {
    fn default() -> Self {
        Self {
            state: CallState::Idle,
            session: None,
            transfer: None,
            last_end_reason: None,
            last_fault: None,
        }
    }
}

/// Originates outbound sessions without blocking the actor
pub(crate) struct Dialer {
    transport: Arc<dyn Transport>,
    mailbox: WeakUnboundedSender<Command>,
    codec_preferences: Vec<Codec>,
}

impl Dialer {
    pub(crate) fn mailbox(&self) -> WeakUnboundedSender<Command> {
        self.mailbox.clone()
    }

    /// The result comes back to the actor as `Command::Connected`
    pub(crate) fn dial(&self, id: SessionId, target: PhoneNumber, display_name: Option<String>) {
        let transport = Arc::clone(&self.transport);
        let mailbox = self.mailbox.clone();
        let request = ConnectRequest {
            target,
            display_name,
            codec_preferences: self.codec_preferences.clone(),
        };

        tokio::spawn(async move {
            let result = transport.connect(request).await;
            let undelivered = match mailbox.upgrade() {
                Some(tx) => match tx.send(Command::Connected { id, result }) {
                    Ok(()) => None,
                    Err(mpsc::error::SendError(Command::Connected { result, .. })) => Some(result),
                    Err(_) => None,
                },
                None => Some(result),
            };
            // Nobody is left to own the session
            if let Some(Ok(connection)) = undelivered {
                let _ = connection.handle.disconnect();
            }
        });
    }
}

/// Handle to the call session controller
///
/// Cheap to clone; every clone talks to the same actor.
#[derive(Clone)]
pub struct CallSessionController {
    commands: UnboundedSender<Command>,
    snapshot: watch::Receiver<CallSnapshot>,
    duration: watch::Receiver<u64>,
    registration: watch::Receiver<RegistrationStatus>,
    faults: broadcast::Sender<CallFault>,
}

impl CallSessionController {
    /// Spawn the controller actor on the current tokio runtime
    pub fn spawn(
        transport: Arc<dyn Transport>,
        registration: watch::Receiver<RegistrationStatus>,
        faults: broadcast::Sender<CallFault>,
        config: &Config,
    ) -> Self {
        let (commands, mailbox) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(CallSnapshot::default());
        let timer = DurationTimer::new(config.call.tick_interval());
        let duration = timer.subscribe();

        let actor = ControllerActor {
            state: CallState::Idle,
            primary: None,
            timer,
            transfers: TransferCoordinator::new(),
            dialer: Dialer {
                transport,
                mailbox: commands.downgrade(),
                codec_preferences: config.device.codec_preferences.clone(),
            },
            registration: registration.clone(),
            snapshot: snapshot_tx,
            last_end_reason: None,
            last_fault: None,
            subscribers: Vec::new(),
            faults: faults.clone(),
            mailbox,
        };
        tokio::spawn(actor.run());

        Self {
            commands,
            snapshot,
            duration,
            registration,
            faults,
        }
    }

    // Queries

    pub fn state(&self) -> CallState {
        self.snapshot.borrow().state
    }

    pub fn session(&self) -> Option<Session> {
        self.snapshot.borrow().session.clone()
    }

    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.registration.borrow().is_ready()
    }

    pub fn is_muted(&self) -> bool {
        self.snapshot
            .borrow()
            .session
            .as_ref()
            .map(Session::is_muted)
            .unwrap_or(false)
    }

    /// Seconds spent in `InCall` for the current call
    pub fn elapsed(&self) -> u64 {
        *self.duration.borrow()
    }

    pub fn transfer(&self) -> Option<TransferAttempt> {
        self.snapshot.borrow().transfer.clone()
    }

    pub fn last_fault(&self) -> Option<CallFault> {
        self.snapshot.borrow().last_fault.clone()
    }

    // Subscriptions

    /// Every transition, in order, from the moment of subscription
    pub fn subscribe(&self) -> UnboundedReceiver<StateChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.commands.send(Command::Subscribe(tx));
        rx
    }

    pub fn subscribe_transfers(&self) -> UnboundedReceiver<TransferEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.commands.send(Command::SubscribeTransfers(tx));
        rx
    }

    pub fn subscribe_faults(&self) -> broadcast::Receiver<CallFault> {
        self.faults.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe_duration(&self) -> watch::Receiver<u64> {
        self.duration.clone()
    }

    // Operations

    /// Place an outbound call; returns the new session id once `Connecting`
    pub async fn make_call(&self, target: &str, display_name: Option<&str>) -> Result<SessionId> {
        let target = target.to_string();
        let display_name = display_name.map(str::to_string);
        self.request(|reply| Command::MakeCall {
            target,
            display_name,
            reply,
        })
        .await
    }

    pub async fn answer(&self) -> Result<()> {
        self.request(Command::Answer).await
    }

    pub async fn decline(&self) -> Result<()> {
        self.request(Command::Decline).await
    }

    pub async fn hang_up(&self) -> Result<()> {
        self.request(Command::HangUp).await
    }

    /// Returns the new mute state
    pub async fn toggle_mute(&self) -> Result<bool> {
        self.request(Command::ToggleMute).await
    }

    /// Returns the state after toggling
    pub async fn toggle_hold(&self) -> Result<CallState> {
        self.request(Command::ToggleHold).await
    }

    pub async fn send_digit(&self, digit: char) -> Result<()> {
        self.request(|reply| Command::SendDigit { digit, reply }).await
    }

    /// Start a transfer; returns the id of the second leg
    pub async fn transfer_call(
        &self,
        target: TransferTarget,
        mode: TransferMode,
    ) -> Result<SessionId> {
        self.request(|reply| Command::Transfer {
            target,
            mode,
            reply,
        })
        .await
    }

    pub async fn confirm_transfer(&self) -> Result<()> {
        self.request(Command::ConfirmTransfer).await
    }

    pub async fn cancel_transfer(&self) -> Result<()> {
        self.request(Command::CancelTransfer).await
    }

    /// Tear down any call and stop the actor
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Hand a provider-offered session to the controller
    pub fn deliver_incoming(&self, call: IncomingCall) {
        if let Err(mpsc::error::SendError(Command::Incoming(call))) =
            self.commands.send(Command::Incoming(call))
        {
            warn!("Controller stopped; rejecting incoming call from {}", call.from);
            let _ = call.connection.handle.reject();
        }
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .map_err(|_| DomainError::ControllerStopped)?;
        rx.await.map_err(|_| DomainError::ControllerStopped)?
    }
}

struct ControllerActor {
    state: CallState,
    primary: Option<SessionLeg>,
    timer: DurationTimer,
    transfers: TransferCoordinator,
    dialer: Dialer,
    registration: watch::Receiver<RegistrationStatus>,
    snapshot: watch::Sender<CallSnapshot>,
    last_end_reason: Option<EndReason>,
    last_fault: Option<CallFault>,
    subscribers: Vec<UnboundedSender<StateChange>>,
    faults: broadcast::Sender<CallFault>,
    mailbox: UnboundedReceiver<Command>,
}

impl ControllerActor {
    async fn run(mut self) {
        info!("Call session controller started");
        while let Some(command) = self.mailbox.recv().await {
            if let Command::Shutdown(done) = command {
                self.stop();
                let _ = done.send(());
                break;
            }
            self.handle(command);
        }
        self.stop();
        info!("Call session controller stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::MakeCall {
                target,
                display_name,
                reply,
            } => {
                let _ = reply.send(self.make_call(target, display_name));
            }
            Command::Answer(reply) => {
                let _ = reply.send(self.answer());
            }
            Command::Decline(reply) => {
                let _ = reply.send(self.decline());
            }
            Command::HangUp(reply) => {
                let _ = reply.send(self.hang_up());
            }
            Command::ToggleMute(reply) => {
                let _ = reply.send(self.toggle_mute());
            }
            Command::ToggleHold(reply) => {
                let _ = reply.send(self.toggle_hold());
            }
            Command::SendDigit { digit, reply } => {
                let _ = reply.send(self.send_digit(digit));
            }
            Command::Transfer {
                target,
                mode,
                reply,
            } => {
                let _ = reply.send(self.transfer_call(target, mode));
            }
            Command::ConfirmTransfer(reply) => {
                let result = self.transfers.confirm().map(|outcome| self.apply(outcome));
                self.publish_snapshot();
                let _ = reply.send(result);
            }
            Command::CancelTransfer(reply) => {
                let result = self.transfers.cancel().map(|outcome| self.apply(outcome));
                self.publish_snapshot();
                let _ = reply.send(result);
            }
            Command::Subscribe(tx) => self.subscribers.push(tx),
            Command::SubscribeTransfers(tx) => self.transfers.subscribe(tx),
            Command::Connected { id, result } => self.on_connected(id, result),
            Command::Incoming(call) => self.on_incoming(call),
            Command::Session { id, event } => self.on_session_event(id, event),
            Command::Shutdown(_) => {}
        }
    }

    fn is_ready(&self) -> bool {
        self.registration.borrow().is_ready()
    }

    // Operations

    fn make_call(&mut self, target: String, display_name: Option<String>) -> Result<SessionId> {
        if self.state != CallState::Idle {
            warn!("makeCall to {} rejected: call in progress ({})", target, self.state);
            return Err(DomainError::CallInProgress);
        }
        if !self.is_ready() {
            warn!("makeCall to {} rejected: device not registered", target);
            return Err(DomainError::NotReady);
        }
        let target = PhoneNumber::parse(&target).map_err(DomainError::ValidationError)?;

        let id = SessionId::new();
        let session = Session::new(
            id,
            CallDirection::Outbound,
            target.to_string(),
            display_name.clone(),
        );
        self.primary = Some(SessionLeg::pending(session));
        self.last_end_reason = None;

        info!("Placing call to {} (session {})", target, id);
        telemetry::record_call_placed();
        self.transition(CallState::Connecting, None);
        self.dialer.dial(id, target, display_name);
        Ok(id)
    }

    fn answer(&mut self) -> Result<()> {
        if self.state != CallState::Incoming {
            return Err(DomainError::invalid_state("answer", self.state));
        }
        let result = self.primary_leg()?.accept();
        if let Err(e) = result {
            return Err(self.fail_safe(e));
        }
        self.connected();
        Ok(())
    }

    fn decline(&mut self) -> Result<()> {
        if self.state != CallState::Incoming {
            return Err(DomainError::invalid_state("decline", self.state));
        }
        let result = self.primary_leg()?.reject();
        if let Err(e) = result {
            return Err(self.fail_safe(e));
        }
        self.end_call(EndReason::Declined);
        Ok(())
    }

    fn hang_up(&mut self) -> Result<()> {
        if self.state == CallState::Idle {
            return Err(DomainError::invalid_state("hang up", self.state));
        }
        // Hanging up an unanswered incoming call is a decline
        let (result, reason) = match (&self.primary, self.state) {
            (Some(leg), CallState::Incoming) => (leg.reject(), EndReason::Declined),
            (Some(leg), _) => (leg.disconnect(), EndReason::LocalHangup),
            (None, _) => (Ok(()), EndReason::LocalHangup),
        };
        if let Err(e) = result {
            let session_id = self.primary.as_ref().map(SessionLeg::id);
            self.publish_fault(FaultKind::TransportFault, e.to_string(), session_id);
        }
        self.end_call(reason);
        Ok(())
    }

    fn toggle_mute(&mut self) -> Result<bool> {
        if !self.state.is_connected() {
            return Err(DomainError::invalid_state("toggle mute", self.state));
        }
        let muted = !self.primary_leg()?.session().is_muted();
        let result = self.primary_leg()?.mute(muted);
        if let Err(e) = result {
            return Err(self.fail_safe(e));
        }
        if let Some(leg) = self.primary.as_mut() {
            leg.session_mut().set_muted(muted);
        }
        debug!("Microphone {}", if muted { "muted" } else { "unmuted" });
        self.publish_snapshot();
        Ok(muted)
    }

    fn toggle_hold(&mut self) -> Result<CallState> {
        if self.transfers.is_active() {
            return Err(DomainError::TransferInProgress);
        }
        match self.state {
            CallState::InCall => {
                self.hold_primary()?;
                Ok(self.state)
            }
            CallState::OnHold => {
                self.resume_primary()?;
                Ok(self.state)
            }
            state => Err(DomainError::invalid_state("toggle hold", state)),
        }
    }

    fn send_digit(&mut self, digit: char) -> Result<()> {
        if !self.state.is_connected() {
            return Err(DomainError::invalid_state("send digits", self.state));
        }
        let digit = DtmfDigit::new(digit).map_err(DomainError::ValidationError)?;
        let result = self.primary_leg()?.send_digits(&digit.to_string());
        if let Err(e) = result {
            return Err(self.fail_safe(e));
        }
        if let Some(leg) = self.primary.as_mut() {
            leg.session_mut().push_digit(digit);
        }
        self.publish_snapshot();
        Ok(())
    }

    fn transfer_call(&mut self, target: TransferTarget, mode: TransferMode) -> Result<SessionId> {
        if !self.state.is_connected() {
            return Err(DomainError::invalid_state("transfer", self.state));
        }
        if self.transfers.is_active() {
            return Err(DomainError::TransferInProgress);
        }

        let restore_to = self.state;
        if self.state == CallState::InCall {
            self.hold_primary()?;
        }
        let attempt = self.transfers.begin(target, mode, restore_to, &self.dialer);
        self.publish_snapshot();
        Ok(attempt.leg_id)
    }

    // Transport callbacks

    fn on_connected(&mut self, id: SessionId, result: std::result::Result<Connection, TransportError>) {
        let primary_pending = self
            .primary
            .as_ref()
            .map(|leg| leg.id() == id && !leg.is_attached())
            .unwrap_or(false);

        if primary_pending {
            match result {
                Ok(connection) => {
                    let mailbox = self.dialer.mailbox();
                    if let Some(leg) = self.primary.as_mut() {
                        leg.attach(connection, mailbox);
                        debug!("Session {} attached to {:?}", id, leg.session().provider_id());
                    }
                    self.publish_snapshot();
                }
                Err(e) => {
                    self.publish_fault(FaultKind::ConnectFailed, e.to_string(), Some(id));
                    self.end_call(EndReason::Failed(e.to_string()));
                }
            }
        } else if self.transfers.owns(id) {
            let outcome = self.transfers.on_connected(result, self.dialer.mailbox());
            self.apply(outcome);
            self.publish_snapshot();
        } else if let Ok(connection) = result {
            debug!("Discarding stale connection for session {}", id);
            let _ = connection.handle.disconnect();
        }
    }

    fn on_incoming(&mut self, call: IncomingCall) {
        if self.state != CallState::Idle || !self.is_ready() {
            warn!(
                "Rejecting incoming call from {}: {}",
                call.from,
                if self.state != CallState::Idle { "busy" } else { "device not registered" }
            );
            telemetry::record_incoming_rejected();
            if let Err(e) = call.connection.handle.reject() {
                warn!("Failed to reject incoming call: {}", e);
            }
            return;
        }

        let id = SessionId::new();
        let session = Session::new(id, CallDirection::Inbound, call.from, call.caller_name);
        let mut leg = SessionLeg::pending(session);
        leg.attach(call.connection, self.dialer.mailbox());

        info!(
            "Incoming call from {} (session {})",
            leg.session().counterparty_number(),
            id
        );
        self.primary = Some(leg);
        self.last_end_reason = None;
        self.transition(CallState::Incoming, None);
    }

    fn on_session_event(&mut self, id: SessionId, event: SessionEvent) {
        if self.primary.as_ref().map(|leg| leg.id() == id).unwrap_or(false) {
            self.on_primary_event(id, event);
        } else if self.transfers.owns(id) {
            let outcome = self.transfers.on_leg_event(event);
            self.apply(outcome);
            self.publish_snapshot();
        } else {
            debug!("Ignoring {:?} for stale session {}", event, id);
        }
    }

    fn on_primary_event(&mut self, id: SessionId, event: SessionEvent) {
        match (self.state, event) {
            (CallState::Connecting, SessionEvent::Ringing) => {
                self.transition(CallState::Ringing, None);
            }
            (CallState::Connecting | CallState::Ringing, SessionEvent::Accepted) => {
                self.connected();
            }
            (CallState::Incoming, SessionEvent::Cancelled | SessionEvent::Disconnected(_)) => {
                info!("Caller abandoned session {}", id);
                self.end_call(EndReason::Cancelled);
            }
            (CallState::Connecting | CallState::Ringing, SessionEvent::Disconnected(reason)) => {
                let reason = format!("call not answered: {}", reason);
                self.publish_fault(FaultKind::ConnectFailed, reason.clone(), Some(id));
                self.end_call(EndReason::Failed(reason));
            }
            (CallState::InCall | CallState::OnHold, SessionEvent::Disconnected(reason)) => {
                info!("Remote party hung up session {}: {}", id, reason);
                self.end_call(EndReason::RemoteHangup);
            }
            (state, SessionEvent::Error(reason)) => {
                let kind = if state.is_connected() {
                    FaultKind::CallDropped
                } else {
                    FaultKind::ConnectFailed
                };
                self.publish_fault(kind, reason.clone(), Some(id));
                self.end_call(EndReason::Failed(reason));
            }
            (_, SessionEvent::Cancelled) => {
                self.end_call(EndReason::RemoteHangup);
            }
            (state, event) => {
                debug!("Ignoring {:?} in state {}", event, state);
            }
        }
    }

    // Transitions

    fn primary_leg(&self) -> Result<&SessionLeg> {
        self.primary
            .as_ref()
            .ok_or_else(|| DomainError::invalid_state("control the session", "no session exists"))
    }

    /// Enter `InCall` from a ringing or incoming leg
    fn connected(&mut self) {
        if let Some(leg) = self.primary.as_mut() {
            leg.session_mut().mark_started();
        }
        self.timer.start();
        telemetry::record_call_answered();
        self.transition(CallState::InCall, None);
    }

    fn hold_primary(&mut self) -> Result<()> {
        let result = self.primary_leg()?.hold(true);
        if let Err(e) = result {
            return Err(self.fail_safe(e));
        }
        self.timer.pause();
        self.transition(CallState::OnHold, None);
        Ok(())
    }

    fn resume_primary(&mut self) -> Result<()> {
        let result = self.primary_leg()?.hold(false);
        if let Err(e) = result {
            return Err(self.fail_safe(e));
        }
        self.timer.resume();
        self.transition(CallState::InCall, None);
        Ok(())
    }

    /// Apply what the transfer coordinator decided
    fn apply(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Pending => {}
            TransferOutcome::Handoff { leg, state } => {
                if let Some(original) = self.primary.take() {
                    if let Err(e) = original.disconnect() {
                        warn!("Failed to disconnect original leg {}: {}", original.id(), e);
                    }
                }
                info!("Call slot handed over to transfer leg {}", leg.id());
                self.primary = Some(leg);
                self.last_end_reason = Some(EndReason::Transferred);
                if state == CallState::InCall {
                    self.timer.resume();
                }
                self.transition(state, None);
            }
            TransferOutcome::Restore { to, failure } => {
                if let Some(reason) = failure {
                    let session_id = self.primary.as_ref().map(SessionLeg::id);
                    self.publish_fault(FaultKind::TransferFailed, reason, session_id);
                }
                if to == CallState::InCall && self.state == CallState::OnHold {
                    // A failed resume has already failed safe to Idle
                    let _ = self.resume_primary();
                }
            }
        }
    }

    /// A session handle refused a command: resolve to `Idle`
    fn fail_safe(&mut self, e: TransportError) -> DomainError {
        let reason = e.to_string();
        let session_id = self.primary.as_ref().map(SessionLeg::id);
        error!("Transport fault in state {}: {}", self.state, reason);
        self.publish_fault(FaultKind::TransportFault, reason.clone(), session_id);

        if let Some(leg) = self.primary.as_ref() {
            let _ = leg.disconnect();
        }
        self.end_call(EndReason::Failed(reason.clone()));
        DomainError::Transport(reason)
    }

    /// Release every owned resource and return to `Idle`
    fn end_call(&mut self, reason: EndReason) {
        if self.state == CallState::Idle {
            return;
        }
        self.transfers.teardown("call ended");
        self.timer.reset();
        if let EndReason::Failed(r) = &reason {
            telemetry::record_call_failed(r);
        }
        info!("Call ended: {}", reason);

        let ended = self.primary.take();
        self.last_end_reason = Some(reason.clone());
        self.transition_with(
            CallState::Idle,
            ended.as_ref().map(|leg| leg.session().clone()),
            Some(reason),
        );
    }

    fn transition(&mut self, to: CallState, end_reason: Option<EndReason>) {
        let session = self.primary.as_ref().map(|leg| leg.session().clone());
        self.transition_with(to, session, end_reason);
    }

    fn transition_with(
        &mut self,
        to: CallState,
        session: Option<Session>,
        end_reason: Option<EndReason>,
    ) {
        let from = self.state;
        if !from.can_transition_to(&to) {
            warn!("Unexpected transition {} -> {}", from, to);
        }
        self.state = to;
        info!("Call state: {} -> {}", from, to);
        telemetry::set_call_active(to.is_active());

        self.publish_snapshot();
        let change = StateChange::new(from, to, session, end_reason);
        self.subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    fn publish_snapshot(&self) {
        self.snapshot.send_replace(CallSnapshot {
            state: self.state,
            session: self.primary.as_ref().map(|leg| leg.session().clone()),
            transfer: self.transfers.attempt().cloned(),
            last_end_reason: self.last_end_reason.clone(),
            last_fault: self.last_fault.clone(),
        });
    }

    fn publish_fault(&mut self, kind: FaultKind, reason: String, session_id: Option<SessionId>) {
        let fault = CallFault::new(kind, reason, session_id);
        warn!("Call fault {} ({}): {}", fault.tag(), fault.kind, fault.reason);
        self.last_fault = Some(fault.clone());
        // No receivers is fine
        let _ = self.faults.send(fault);
        self.publish_snapshot();
    }

    fn stop(&mut self) {
        if self.state == CallState::Idle {
            return;
        }
        if let Some(leg) = self.primary.as_ref() {
            let _ = if self.state == CallState::Incoming {
                leg.reject()
            } else {
                leg.disconnect()
            };
        }
        self.end_call(EndReason::LocalHangup);
    }
}
