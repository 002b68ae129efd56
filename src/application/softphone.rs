//! Softphone facade
//!
//! Wires one transport to the registration manager and the call session
//! controller, and routes device-level events to whichever of them owns
//! the concern.

use crate::application::controller::CallSessionController;
use crate::application::registration::DeviceRegistrationManager;
use crate::config::Config;
use crate::domain::call::{CallFault, FaultKind};
use crate::domain::registration::CredentialProvider;
use crate::domain::transport::{DeviceEvent, Transport, TransportError};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct Softphone {
    controller: CallSessionController,
    registration: DeviceRegistrationManager,
    device_pump: Option<JoinHandle<()>>,
}

impl Softphone {
    /// Build the softphone and start registering in the background
    pub fn start(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        config: &Config,
    ) -> Self {
        let (faults, _) = broadcast::channel(config.events.fault_capacity.max(1));
        let registration = DeviceRegistrationManager::new(
            Arc::clone(&transport),
            credentials,
            config.device.identity.clone(),
            faults.clone(),
        );
        let controller = CallSessionController::spawn(
            Arc::clone(&transport),
            registration.watch(),
            faults.clone(),
            config,
        );

        let device_pump = match transport.take_device_events() {
            Some(events) => Some(tokio::spawn(route_device_events(
                events,
                controller.clone(),
                registration.clone(),
                faults,
            ))),
            None => {
                warn!("Device events already taken; incoming calls will not be delivered");
                None
            }
        };

        info!("Softphone started for {}", config.device.identity);
        registration.start();

        Self {
            controller,
            registration,
            device_pump,
        }
    }

    pub fn controller(&self) -> &CallSessionController {
        &self.controller
    }

    pub fn registration(&self) -> &DeviceRegistrationManager {
        &self.registration
    }

    pub async fn retry_registration(&self) -> Result<(), TransportError> {
        self.registration.retry().await
    }

    /// End any call, unregister and stop routing device events
    pub async fn shutdown(mut self) {
        self.controller.shutdown().await;
        if let Some(pump) = self.device_pump.take() {
            pump.abort();
        }
        if let Err(e) = self.registration.unregister().await {
            warn!("Unregister during shutdown failed: {}", e);
        }
        info!("Softphone stopped");
    }
}

impl Drop for Softphone {
    fn drop(&mut self) {
        if let Some(pump) = self.device_pump.take() {
            pump.abort();
        }
    }
}

async fn route_device_events(
    mut events: mpsc::UnboundedReceiver<DeviceEvent>,
    controller: CallSessionController,
    registration: DeviceRegistrationManager,
    faults: broadcast::Sender<CallFault>,
) {
    while let Some(event) = events.recv().await {
        match event {
            DeviceEvent::Incoming(call) => controller.deliver_incoming(call),
            DeviceEvent::CredentialWillExpire => {
                debug!("Credential about to expire; refreshing");
                let registration = registration.clone();
                let calls = controller.watch();
                tokio::spawn(async move {
                    let _ = registration.refresh_credential(calls).await;
                });
            }
            DeviceEvent::Unregistered => registration.mark_unregistered(),
            DeviceEvent::Error(reason) => {
                warn!("Device error: {}", reason);
                let _ = faults.send(CallFault::new(FaultKind::DeviceError, reason, None));
            }
        }
    }
    debug!("Device event stream closed");
}
