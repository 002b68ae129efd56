//! Device Registration Integration Tests

mod common;

use common::{next_leg, settle, wait_state};
use std::sync::Arc;
use std::time::Duration;
use yakphone::config::Config;
use yakphone::domain::call::{CallState, FaultKind};
use yakphone::domain::registration::RegistrationStatus;
use yakphone::domain::transport::SessionEvent;
use yakphone::infrastructure::{LoopbackTransport, SessionCommand, StaticCredentialProvider};
use yakphone::{DomainError, Softphone};

struct Phone {
    transport: Arc<LoopbackTransport>,
    credentials: Arc<StaticCredentialProvider>,
    softphone: Softphone,
}

fn phone() -> Phone {
    let transport = Arc::new(LoopbackTransport::new());
    let credentials = Arc::new(StaticCredentialProvider::new());
    let softphone = Softphone::start(transport.clone(), credentials.clone(), &Config::default());
    Phone {
        transport,
        credentials,
        softphone,
    }
}

async fn wait_status<F>(phone: &Phone, mut accept: F)
where
    F: FnMut(&RegistrationStatus) -> bool,
{
    let mut status = phone.softphone.registration().watch();
    tokio::time::timeout(Duration::from_secs(5), status.wait_for(|s| accept(s)))
        .await
        .expect("timed out waiting for registration status")
        .unwrap();
}

async fn in_call(phone: &Phone) -> String {
    let controller = phone.softphone.controller();
    let previous = phone.transport.last_session();
    controller.make_call("+15551234567", None).await.unwrap();
    let provider_id = next_leg(&phone.transport, previous.as_deref()).await;
    phone.transport.emit(&provider_id, SessionEvent::Accepted);
    wait_state(controller, CallState::InCall).await;
    provider_id
}

#[tokio::test(start_paused = true)]
async fn test_registers_on_start() {
    let phone = phone();
    assert!(!phone.softphone.controller().is_ready());

    wait_status(&phone, RegistrationStatus::is_ready).await;

    assert!(phone.softphone.controller().is_ready());
    assert_eq!(
        phone.transport.registered_token().as_deref(),
        Some("softphone-token-1")
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_registration_waits_for_retry() {
    let transport = Arc::new(LoopbackTransport::new());
    let credentials = Arc::new(StaticCredentialProvider::new());
    credentials.fail_next("token service unavailable");
    let softphone = Softphone::start(transport.clone(), credentials.clone(), &Config::default());
    let phone = Phone {
        transport,
        credentials,
        softphone,
    };
    let mut faults = phone.softphone.controller().subscribe_faults();

    wait_status(&phone, |s| matches!(s, RegistrationStatus::Failed(_))).await;
    assert_eq!(faults.recv().await.unwrap().kind, FaultKind::RegistrationFailed);

    // No silent retry
    settle().await;
    tokio::time::advance(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(phone.credentials.issued(), 0);
    assert_eq!(
        phone.softphone.controller().make_call("+15551234567", None).await,
        Err(DomainError::NotReady)
    );

    phone.softphone.retry_registration().await.unwrap();
    assert!(phone.softphone.registration().is_ready());
    assert!(phone.softphone.controller().make_call("+15551234567", None).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_credential_refresh_keeps_call_alive() {
    let phone = phone();
    wait_status(&phone, RegistrationStatus::is_ready).await;
    let provider_id = in_call(&phone).await;

    phone.transport.expire_credential();
    for _ in 0..5 {
        settle().await;
    }

    assert_eq!(
        phone.transport.registered_token().as_deref(),
        Some("softphone-token-2")
    );
    assert_eq!(phone.softphone.controller().state(), CallState::InCall);
    assert!(phone.transport.commands(&provider_id).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_during_call_degrades_afterwards() {
    let phone = phone();
    wait_status(&phone, RegistrationStatus::is_ready).await;
    let mut faults = phone.softphone.controller().subscribe_faults();
    in_call(&phone).await;

    phone.transport.fail_next_refresh("token revoked");
    phone.transport.expire_credential();

    let fault = faults.recv().await.unwrap();
    assert_eq!(fault.kind, FaultKind::CredentialRefreshFailed);
    assert_eq!(phone.softphone.controller().state(), CallState::InCall);
    assert!(phone.softphone.registration().is_ready());

    phone.softphone.controller().hang_up().await.unwrap();
    wait_status(&phone, |s| matches!(s, RegistrationStatus::Failed(_))).await;
    assert!(!phone.softphone.controller().is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_while_idle_degrades() {
    let phone = phone();
    wait_status(&phone, RegistrationStatus::is_ready).await;

    phone.transport.fail_next_refresh("token revoked");
    phone.transport.expire_credential();

    wait_status(&phone, |s| matches!(s, RegistrationStatus::Failed(_))).await;
    assert!(!phone.softphone.controller().is_ready());
}

#[tokio::test(start_paused = true)]
async fn test_incoming_routed_to_controller() {
    let phone = phone();
    wait_status(&phone, RegistrationStatus::is_ready).await;
    let controller = phone.softphone.controller();

    let offered = phone.transport.ring_in("+15559876543", Some("Dana"));
    wait_state(controller, CallState::Incoming).await;
    assert_eq!(controller.session().unwrap().counterparty_name(), "Dana");

    controller.answer().await.unwrap();
    assert_eq!(phone.transport.commands(&offered), vec![SessionCommand::Accept]);
}

#[tokio::test(start_paused = true)]
async fn test_provider_unregistration_blocks_calls() {
    let phone = phone();
    wait_status(&phone, RegistrationStatus::is_ready).await;

    phone.transport.drop_registration();
    wait_status(&phone, |s| *s == RegistrationStatus::Unregistered).await;

    let offered = phone.transport.ring_in("+15559876543", None);
    settle().await;
    assert_eq!(phone.softphone.controller().state(), CallState::Idle);
    assert_eq!(phone.transport.commands(&offered), vec![SessionCommand::Reject]);
}

#[tokio::test(start_paused = true)]
async fn test_device_error_is_published() {
    let phone = phone();
    wait_status(&phone, RegistrationStatus::is_ready).await;
    let mut faults = phone.softphone.controller().subscribe_faults();

    phone.transport.device_error("audio device lost");

    let fault = faults.recv().await.unwrap();
    assert_eq!(fault.kind, FaultKind::DeviceError);
    assert_eq!(fault.reason, "audio device lost");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_ends_call_and_unregisters() {
    let phone = phone();
    wait_status(&phone, RegistrationStatus::is_ready).await;
    let provider_id = in_call(&phone).await;
    let controller = phone.softphone.controller().clone();

    phone.softphone.shutdown().await;

    assert_eq!(controller.state(), CallState::Idle);
    assert_eq!(phone.transport.commands(&provider_id), vec![SessionCommand::Disconnect]);
    assert!(phone.transport.registered_token().is_none());
}
