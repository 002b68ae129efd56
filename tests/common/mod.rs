//! Shared harness for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use yakphone::config::Config;
use yakphone::domain::call::{CallFault, CallState};
use yakphone::domain::registration::RegistrationStatus;
use yakphone::domain::transport::{DeviceEvent, SessionEvent, Transport};
use yakphone::infrastructure::LoopbackTransport;
use yakphone::CallSessionController;

pub struct Harness {
    pub transport: Arc<LoopbackTransport>,
    pub controller: CallSessionController,
    pub registration: watch::Sender<RegistrationStatus>,
    pub faults: broadcast::Receiver<CallFault>,
}

/// Controller over a loopback transport with a registered device
pub fn harness() -> Harness {
    let transport = Arc::new(LoopbackTransport::new());
    let (registration, registration_rx) = watch::channel(RegistrationStatus::Registered);
    let (faults_tx, faults) = broadcast::channel(32);
    let controller = CallSessionController::spawn(
        transport.clone(),
        registration_rx,
        faults_tx,
        &Config::default(),
    );

    let mut device_events = transport.take_device_events().expect("device events");
    let router = controller.clone();
    tokio::spawn(async move {
        while let Some(event) = device_events.recv().await {
            if let DeviceEvent::Incoming(call) = event {
                router.deliver_incoming(call);
            }
        }
    });
    Harness {
        transport,
        controller,
        registration,
        faults,
    }
}

/// Let spawned tasks run without moving the clock
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Move the paused clock forward one tick at a time
pub async fn tick(seconds: u64) {
    for _ in 0..seconds {
        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
    }
}

pub async fn wait_state(controller: &CallSessionController, state: CallState) {
    let mut snapshots = controller.watch();
    tokio::time::timeout(
        Duration::from_secs(5),
        snapshots.wait_for(|snapshot| snapshot.state == state),
    )
    .await
    .expect("timed out waiting for state")
    .expect("controller stopped");
}

/// Provider id of the newest loopback session other than `previous`
pub async fn next_leg(transport: &LoopbackTransport, previous: Option<&str>) -> String {
    for _ in 0..100 {
        if let Some(id) = transport.last_session() {
            if previous != Some(id.as_str()) {
                settle().await;
                return id;
            }
        }
        settle().await;
    }
    panic!("transport never opened a session");
}

/// Place an outbound call and drive it to `InCall`; returns the provider id
pub async fn outbound_in_call(h: &Harness, number: &str) -> String {
    h.controller.make_call(number, None).await.unwrap();
    let provider_id = next_leg(&h.transport, None).await;
    assert!(h.transport.emit(&provider_id, SessionEvent::Ringing));
    assert!(h.transport.emit(&provider_id, SessionEvent::Accepted));
    wait_state(&h.controller, CallState::InCall).await;
    provider_id
}

/// Offer an inbound call and wait for `Incoming`; returns the provider id
pub async fn incoming(h: &Harness, from: &str) -> String {
    let provider_id = h.transport.ring_in(from, None);
    wait_state(&h.controller, CallState::Incoming).await;
    provider_id
}
