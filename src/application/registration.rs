//! Device registration manager
//!
//! Owns the registration lifecycle of the shared transport and its credential.
//! Registration failures are never retried automatically; only an explicit
//! `retry` registers again. Credential refreshes swap the token in place and
//! never touch a live call.

use crate::application::controller::CallSnapshot;
use crate::domain::call::{CallFault, CallState, FaultKind};
use crate::domain::registration::{CredentialProvider, RegistrationStatus};
use crate::domain::shared::events::DomainEvent;
use crate::domain::transport::{Transport, TransportError};
use crate::infrastructure::telemetry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Inner {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    identity: String,
    status: watch::Sender<RegistrationStatus>,
    faults: broadcast::Sender<CallFault>,
    /// Serializes register/refresh/unregister
    op_lock: Mutex<()>,
    /// Bumped by every credential change; a deferred degrade only applies
    /// if nothing newer happened in between
    generation: AtomicU64,
}

#[derive(Clone)]
pub struct DeviceRegistrationManager {
    inner: Arc<Inner>,
}

impl DeviceRegistrationManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        identity: impl Into<String>,
        faults: broadcast::Sender<CallFault>,
    ) -> Self {
        let (status, _) = watch::channel(RegistrationStatus::Unregistered);
        Self {
            inner: Arc::new(Inner {
                transport,
                credentials,
                identity: identity.into(),
                status,
                faults,
                op_lock: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn status(&self) -> RegistrationStatus {
        self.inner.status.borrow().clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.status.borrow().is_ready()
    }

    pub fn watch(&self) -> watch::Receiver<RegistrationStatus> {
        self.inner.status.subscribe()
    }

    /// Register in the background
    pub fn start(&self) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let _ = manager.register().await;
        })
    }

    /// Explicit re-registration after a failure
    pub async fn retry(&self) -> Result<(), TransportError> {
        info!("Registration retry requested for {}", self.inner.identity);
        self.register().await
    }

    async fn register(&self) -> Result<(), TransportError> {
        let _guard = self.inner.op_lock.lock().await;
        if self.is_ready() {
            debug!("Device {} already registered", self.inner.identity);
            return Ok(());
        }

        self.set_status(RegistrationStatus::Registering);
        let result = async {
            let credential = self.inner.credentials.fetch(&self.inner.identity).await?;
            self.inner.transport.register(&credential).await
        }
        .await;

        telemetry::record_registration(result.is_ok());
        match &result {
            Ok(()) => {
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
                info!("Device {} registered", self.inner.identity);
                self.set_status(RegistrationStatus::Registered);
            }
            Err(e) => {
                self.set_status(RegistrationStatus::Failed(e.to_string()));
                self.fault(FaultKind::RegistrationFailed, e.to_string());
            }
        }
        result
    }

    /// Swap in a fresh credential; `calls` tells whether a call is live
    pub async fn refresh_credential(
        &self,
        calls: watch::Receiver<CallSnapshot>,
    ) -> Result<(), TransportError> {
        let _guard = self.inner.op_lock.lock().await;
        if !self.is_ready() {
            debug!("Skipping credential refresh: device is {}", self.status());
            return Ok(());
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let result = async {
            let credential = self.inner.credentials.fetch(&self.inner.identity).await?;
            self.inner.transport.refresh_credential(&credential).await
        }
        .await;

        match result {
            Ok(()) => {
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
                info!("Credential refreshed for {}", self.inner.identity);
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                self.fault(FaultKind::CredentialRefreshFailed, reason.clone());

                if calls.borrow().state == CallState::Idle {
                    self.set_status(RegistrationStatus::Failed(reason));
                } else {
                    info!("Credential refresh failed during a call; degrading once it ends");
                    self.degrade_when_idle(calls, generation, reason);
                }
                Err(e)
            }
        }
    }

    /// Provider reported the registration gone
    pub fn mark_unregistered(&self) {
        warn!("Device {} was unregistered by the provider", self.inner.identity);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.set_status(RegistrationStatus::Unregistered);
    }

    pub async fn unregister(&self) -> Result<(), TransportError> {
        let _guard = self.inner.op_lock.lock().await;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        let result = self.inner.transport.unregister().await;
        if let Err(e) = &result {
            warn!("Unregister failed: {}", e);
        }
        self.set_status(RegistrationStatus::Unregistered);
        result
    }

    fn degrade_when_idle(
        &self,
        mut calls: watch::Receiver<CallSnapshot>,
        generation: u64,
        reason: String,
    ) {
        let manager = self.clone();
        tokio::spawn(async move {
            let idle = calls
                .wait_for(|snapshot| snapshot.state == CallState::Idle)
                .await
                .is_ok();
            if !idle {
                return;
            }
            let _guard = manager.inner.op_lock.lock().await;
            let current = manager.inner.generation.load(Ordering::SeqCst);
            if current == generation && manager.is_ready() {
                manager.set_status(RegistrationStatus::Failed(reason));
            }
        });
    }

    fn set_status(&self, status: RegistrationStatus) {
        debug!("Registration status: {}", status);
        self.inner.status.send_replace(status);
    }

    fn fault(&self, kind: FaultKind, reason: String) {
        let fault = CallFault::new(kind, reason, None);
        warn!("Registration fault {} ({}): {}", fault.tag(), fault.kind, fault.reason);
        let _ = self.inner.faults.send(fault);
    }
}
