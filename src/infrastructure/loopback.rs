//! In-process transport
//!
//! A scriptable stand-in for a vendor signaling SDK. It never touches the
//! network: tests and the demo binary drive it by firing session and device
//! events and inspect the commands the core issued.

use crate::domain::registration::{Credential, CredentialProvider};
use crate::domain::transport::{
    Connection, ConnectRequest, DeviceEvent, IncomingCall, SessionEvent, SessionHandle, Transport,
    TransportError,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::debug;

/// Command issued by the core on a loopback session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Accept,
    Reject,
    Disconnect,
    Mute(bool),
    Hold(bool),
    Digits(String),
}

struct LoopbackSession {
    provider_id: String,
    log: Arc<Mutex<Vec<SessionCommand>>>,
    broken: Arc<Mutex<bool>>,
}

impl LoopbackSession {
    fn record(&self, command: SessionCommand) -> Result<(), TransportError> {
        if *lock(&self.broken) {
            return Err(TransportError::Session(format!(
                "session {} rejected {:?}",
                self.provider_id, command
            )));
        }
        debug!("Loopback session {} <- {:?}", self.provider_id, command);
        lock(&self.log).push(command);
        Ok(())
    }
}

impl SessionHandle for LoopbackSession {
    fn provider_id(&self) -> String {
        self.provider_id.clone()
    }

    fn accept(&self) -> Result<(), TransportError> {
        self.record(SessionCommand::Accept)
    }

    fn reject(&self) -> Result<(), TransportError> {
        self.record(SessionCommand::Reject)
    }

    fn disconnect(&self) -> Result<(), TransportError> {
        self.record(SessionCommand::Disconnect)
    }

    fn mute(&self, muted: bool) -> Result<(), TransportError> {
        self.record(SessionCommand::Mute(muted))
    }

    fn hold(&self, held: bool) -> Result<(), TransportError> {
        self.record(SessionCommand::Hold(held))
    }

    fn send_digits(&self, digits: &str) -> Result<(), TransportError> {
        self.record(SessionCommand::Digits(digits.to_string()))
    }
}

struct SessionEntry {
    events: mpsc::UnboundedSender<SessionEvent>,
    log: Arc<Mutex<Vec<SessionCommand>>>,
    broken: Arc<Mutex<bool>>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, SessionEntry>,
    order: Vec<String>,
    dialed: Vec<ConnectRequest>,
    registered_token: Option<String>,
    fail_register: Option<String>,
    fail_refresh: Option<String>,
    fail_connect: Option<String>,
}

/// Scriptable in-memory [`Transport`]
pub struct LoopbackTransport {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
    device_tx: mpsc::UnboundedSender<DeviceEvent>,
    device_rx: Mutex<Option<mpsc::UnboundedReceiver<DeviceEvent>>>,
    connect_gate: watch::Sender<bool>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        let (device_tx, device_rx) = mpsc::unbounded_channel();
        let (connect_gate, _) = watch::channel(true);
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
            device_tx,
            device_rx: Mutex::new(Some(device_rx)),
            connect_gate,
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }

    fn open_session(&self) -> (String, Connection) {
        let provider_id = format!("LB{:04}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let log = Arc::new(Mutex::new(Vec::new()));
        let broken = Arc::new(Mutex::new(false));

        let handle = LoopbackSession {
            provider_id: provider_id.clone(),
            log: Arc::clone(&log),
            broken: Arc::clone(&broken),
        };

        let mut inner = self.inner();
        inner.sessions.insert(
            provider_id.clone(),
            SessionEntry {
                events: events_tx,
                log,
                broken,
            },
        );
        inner.order.push(provider_id.clone());

        (
            provider_id,
            Connection {
                handle: Arc::new(handle),
                events: events_rx,
            },
        )
    }

    /// Offer an inbound session; returns its provider id
    pub fn ring_in(&self, from: &str, caller_name: Option<&str>) -> String {
        let (provider_id, connection) = self.open_session();
        let _ = self.device_tx.send(DeviceEvent::Incoming(IncomingCall {
            from: from.to_string(),
            caller_name: caller_name.map(str::to_string),
            connection,
        }));
        provider_id
    }

    /// Fire a lifecycle event on a session; false if nobody is listening
    pub fn emit(&self, provider_id: &str, event: SessionEvent) -> bool {
        match self.inner().sessions.get(provider_id) {
            Some(entry) => entry.events.send(event).is_ok(),
            None => false,
        }
    }

    pub fn expire_credential(&self) {
        let _ = self.device_tx.send(DeviceEvent::CredentialWillExpire);
    }

    pub fn device_error(&self, reason: &str) {
        let _ = self.device_tx.send(DeviceEvent::Error(reason.to_string()));
    }

    pub fn drop_registration(&self) {
        self.inner().registered_token = None;
        let _ = self.device_tx.send(DeviceEvent::Unregistered);
    }

    pub fn fail_next_registration(&self, reason: &str) {
        self.inner().fail_register = Some(reason.to_string());
    }

    pub fn fail_next_refresh(&self, reason: &str) {
        self.inner().fail_refresh = Some(reason.to_string());
    }

    pub fn fail_next_connect(&self, reason: &str) {
        self.inner().fail_connect = Some(reason.to_string());
    }

    /// Make every later command on the session fail
    pub fn break_session(&self, provider_id: &str) {
        if let Some(entry) = self.inner().sessions.get(provider_id) {
            *lock(&entry.broken) = true;
        }
    }

    /// Park `connect` calls until [`release_connects`](Self::release_connects)
    pub fn stall_connects(&self) {
        self.connect_gate.send_replace(false);
    }

    pub fn release_connects(&self) {
        self.connect_gate.send_replace(true);
    }

    /// Most recently opened session
    pub fn last_session(&self) -> Option<String> {
        self.inner().order.last().cloned()
    }

    pub fn session_count(&self) -> usize {
        self.inner().order.len()
    }

    pub fn commands(&self, provider_id: &str) -> Vec<SessionCommand> {
        self.inner()
            .sessions
            .get(provider_id)
            .map(|entry| lock(&entry.log).clone())
            .unwrap_or_default()
    }

    pub fn dialed(&self) -> Vec<ConnectRequest> {
        self.inner().dialed.clone()
    }

    pub fn registered_token(&self) -> Option<String> {
        self.inner().registered_token.clone()
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn register(&self, credential: &Credential) -> Result<(), TransportError> {
        let mut inner = self.inner();
        if let Some(reason) = inner.fail_register.take() {
            return Err(TransportError::Registration(reason));
        }
        inner.registered_token = Some(credential.token.clone());
        Ok(())
    }

    async fn refresh_credential(&self, credential: &Credential) -> Result<(), TransportError> {
        let mut inner = self.inner();
        if let Some(reason) = inner.fail_refresh.take() {
            return Err(TransportError::Credential(reason));
        }
        inner.registered_token = Some(credential.token.clone());
        Ok(())
    }

    async fn unregister(&self) -> Result<(), TransportError> {
        self.inner().registered_token = None;
        Ok(())
    }

    async fn connect(&self, request: ConnectRequest) -> Result<Connection, TransportError> {
        let mut gate = self.connect_gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|_| TransportError::Unavailable)?;

        {
            let mut inner = self.inner();
            inner.dialed.push(request);
            if let Some(reason) = inner.fail_connect.take() {
                return Err(TransportError::Connect(reason));
            }
        }

        let (_, connection) = self.open_session();
        Ok(connection)
    }

    fn take_device_events(&self) -> Option<mpsc::UnboundedReceiver<DeviceEvent>> {
        lock(&self.device_rx).take()
    }
}

/// Credential provider issuing sequential tokens
pub struct StaticCredentialProvider {
    issued: AtomicU64,
    fail_next: Mutex<Option<String>>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self {
            issued: AtomicU64::new(0),
            fail_next: Mutex::new(None),
        }
    }

    pub fn fail_next(&self, reason: &str) {
        *lock(&self.fail_next) = Some(reason.to_string());
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }
}

impl Default for StaticCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn fetch(&self, identity: &str) -> Result<Credential, TransportError> {
        if let Some(reason) = lock(&self.fail_next).take() {
            return Err(TransportError::Credential(reason));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Credential::new(identity, format!("{}-token-{}", identity, n)))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::PhoneNumber;

    fn request(number: &str) -> ConnectRequest {
        ConnectRequest {
            target: PhoneNumber::parse(number).unwrap(),
            display_name: None,
            codec_preferences: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_connect_records_request_and_commands() {
        let transport = LoopbackTransport::new();
        let connection = transport.connect(request("+15551234567")).await.unwrap();
        let id = connection.handle.provider_id();

        connection.handle.mute(true).unwrap();
        connection.handle.send_digits("12").unwrap();

        assert_eq!(transport.dialed().len(), 1);
        assert_eq!(
            transport.commands(&id),
            vec![SessionCommand::Mute(true), SessionCommand::Digits("12".to_string())]
        );
    }

    #[tokio::test]
    async fn test_emit_reaches_connection() {
        let transport = LoopbackTransport::new();
        let mut connection = transport.connect(request("101")).await.unwrap();
        let id = connection.handle.provider_id();

        assert!(transport.emit(&id, SessionEvent::Ringing));
        assert_eq!(connection.events.recv().await, Some(SessionEvent::Ringing));
        assert!(!transport.emit("missing", SessionEvent::Ringing));
    }

    #[tokio::test]
    async fn test_scripted_failures_fire_once() {
        let transport = LoopbackTransport::new();
        transport.fail_next_connect("busy");

        assert!(transport.connect(request("101")).await.is_err());
        assert!(transport.connect(request("101")).await.is_ok());
    }

    #[tokio::test]
    async fn test_broken_session_rejects_commands() {
        let transport = LoopbackTransport::new();
        let connection = transport.connect(request("101")).await.unwrap();
        let id = connection.handle.provider_id();

        transport.break_session(&id);
        assert!(connection.handle.hold(true).is_err());
        assert!(transport.commands(&id).is_empty());
    }

    #[tokio::test]
    async fn test_device_events_taken_once() {
        let transport = LoopbackTransport::new();
        let mut events = transport.take_device_events().unwrap();
        assert!(transport.take_device_events().is_none());

        transport.ring_in("+15559876543", Some("Bob"));
        match events.recv().await {
            Some(DeviceEvent::Incoming(call)) => {
                assert_eq!(call.from, "+15559876543");
                assert_eq!(call.caller_name.as_deref(), Some("Bob"));
            }
            other => panic!("unexpected device event: {:?}", other),
        }
    }
}
