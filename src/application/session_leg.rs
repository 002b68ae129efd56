//! Session handle adapter
//!
//! A `SessionLeg` pairs the domain `Session` with the transport handle that
//! drives it, and pumps the handle's lifecycle events into the controller
//! mailbox. Dropping a leg stops its pump.

use crate::application::controller::Command;
use crate::domain::call::Session;
use crate::domain::shared::value_objects::SessionId;
use crate::domain::transport::{Connection, SessionEvent, SessionHandle, TransportError};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, WeakUnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

pub(crate) struct SessionLeg {
    session: Session,
    handle: Option<Arc<dyn SessionHandle>>,
    pump: Option<JoinHandle<()>>,
}

impl SessionLeg {
    /// A leg whose transport session does not exist yet
    pub(crate) fn pending(session: Session) -> Self {
        Self {
            session,
            handle: None,
            pump: None,
        }
    }

    /// Bind the transport session and start forwarding its events
    pub(crate) fn attach(&mut self, connection: Connection, mailbox: WeakUnboundedSender<Command>) {
        let Connection { handle, events } = connection;
        self.session.set_provider_id(handle.provider_id());
        self.handle = Some(handle);

        if let Some(old) = self.pump.take() {
            old.abort();
        }
        self.pump = Some(tokio::spawn(pump(self.session.id(), events, mailbox)));
    }

    pub(crate) fn id(&self) -> SessionId {
        self.session.id()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub(crate) fn accept(&self) -> Result<(), TransportError> {
        self.with_handle(|h| h.accept())
    }

    pub(crate) fn reject(&self) -> Result<(), TransportError> {
        self.with_handle(|h| h.reject())
    }

    /// No-op for a leg that never got a transport session
    pub(crate) fn disconnect(&self) -> Result<(), TransportError> {
        match &self.handle {
            Some(handle) => handle.disconnect(),
            None => Ok(()),
        }
    }

    pub(crate) fn mute(&self, muted: bool) -> Result<(), TransportError> {
        self.with_handle(|h| h.mute(muted))
    }

    pub(crate) fn hold(&self, held: bool) -> Result<(), TransportError> {
        self.with_handle(|h| h.hold(held))
    }

    pub(crate) fn send_digits(&self, digits: &str) -> Result<(), TransportError> {
        self.with_handle(|h| h.send_digits(digits))
    }

    fn with_handle<F>(&self, f: F) -> Result<(), TransportError>
    where
        F: FnOnce(&dyn SessionHandle) -> Result<(), TransportError>,
    {
        match &self.handle {
            Some(handle) => f(handle.as_ref()),
            None => Err(TransportError::Session(format!(
                "session {} is not connected yet",
                self.session.id()
            ))),
        }
    }
}

impl Drop for SessionLeg {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

async fn pump(
    id: SessionId,
    mut events: UnboundedReceiver<SessionEvent>,
    mailbox: WeakUnboundedSender<Command>,
) {
    while let Some(event) = events.recv().await {
        let Some(tx) = mailbox.upgrade() else {
            break;
        };
        if tx.send(Command::Session { id, event }).is_err() {
            break;
        }
    }
    debug!("Event pump for session {} finished", id);
}
