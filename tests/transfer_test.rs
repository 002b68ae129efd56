//! Transfer Integration Tests

mod common;

use common::{harness, next_leg, outbound_in_call, settle, tick, wait_state, Harness};
use yakphone::domain::call::{CallState, EndReason, FaultKind};
use yakphone::domain::shared::value_objects::PhoneNumber;
use yakphone::domain::transfer::{TransferMode, TransferStage, TransferTarget};
use yakphone::domain::transport::SessionEvent;
use yakphone::infrastructure::SessionCommand;
use yakphone::DomainError;

fn target(number: &str) -> TransferTarget {
    TransferTarget::new(PhoneNumber::parse(number).unwrap())
}

/// Start a transfer from the current call and return the second leg's provider id
async fn start_transfer(h: &Harness, original: &str, mode: TransferMode) -> String {
    h.controller
        .transfer_call(target("+15550001111").with_label("Billing"), mode)
        .await
        .unwrap();
    next_leg(&h.transport, Some(original)).await
}

async fn wait_target_answered(h: &Harness) {
    let mut snapshots = h.controller.watch();
    snapshots
        .wait_for(|snapshot| {
            snapshot
                .transfer
                .as_ref()
                .map(|attempt| attempt.target_answered)
                .unwrap_or(false)
        })
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_warm_transfer_hands_call_to_second_leg() {
    let h = harness();
    let mut transfers = h.controller.subscribe_transfers();
    let original = outbound_in_call(&h, "+15551234567").await;
    tick(5).await;

    let leg_id = h
        .controller
        .transfer_call(target("+15550001111"), TransferMode::Warm)
        .await
        .unwrap();
    assert_eq!(h.controller.state(), CallState::OnHold);
    assert_eq!(h.controller.transfer().unwrap().leg_id, leg_id);

    let second = next_leg(&h.transport, Some(&original)).await;
    h.transport.emit(&second, SessionEvent::Ringing);
    h.transport.emit(&second, SessionEvent::Accepted);
    wait_target_answered(&h).await;

    // The original party is still held until the operator confirms
    assert_eq!(h.controller.state(), CallState::OnHold);
    assert_eq!(h.transport.commands(&original), vec![SessionCommand::Hold(true)]);

    h.controller.confirm_transfer().await.unwrap();

    assert_eq!(h.controller.state(), CallState::InCall);
    let session = h.controller.session().unwrap();
    assert_eq!(session.id(), leg_id);
    assert_eq!(session.counterparty_number(), "+15550001111");
    assert!(h.controller.transfer().is_none());
    assert_eq!(
        h.controller.snapshot().last_end_reason,
        Some(EndReason::Transferred)
    );
    assert_eq!(
        h.transport.commands(&original),
        vec![SessionCommand::Hold(true), SessionCommand::Disconnect]
    );

    // Elapsed time carries over to the transferred call
    tick(2).await;
    assert_eq!(h.controller.elapsed(), 7);

    let mut last = None;
    while let Ok(event) = transfers.try_recv() {
        last = Some(event);
    }
    assert_eq!(last.unwrap().attempt.stage, TransferStage::Completed);

    // The second leg is now the primary session
    h.transport.emit(&second, SessionEvent::Disconnected("bye".to_string()));
    wait_state(&h.controller, CallState::Idle).await;
}

#[tokio::test(start_paused = true)]
async fn test_confirm_requires_answered_target() {
    let h = harness();
    assert_eq!(h.controller.confirm_transfer().await, Err(DomainError::NoTransfer));

    let original = outbound_in_call(&h, "+15551234567").await;
    let second = start_transfer(&h, &original, TransferMode::Warm).await;
    h.transport.emit(&second, SessionEvent::Ringing);
    settle().await;

    assert!(matches!(
        h.controller.confirm_transfer().await,
        Err(DomainError::InvalidState { .. })
    ));
    assert_eq!(h.controller.state(), CallState::OnHold);
    assert!(h.controller.transfer().is_some());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_restores_in_call() {
    let h = harness();
    let original = outbound_in_call(&h, "+15551234567").await;
    tick(3).await;

    let second = start_transfer(&h, &original, TransferMode::Warm).await;
    h.transport.emit(&second, SessionEvent::Accepted);
    wait_target_answered(&h).await;

    h.controller.cancel_transfer().await.unwrap();
    settle().await;

    assert_eq!(h.controller.state(), CallState::InCall);
    assert!(h.controller.transfer().is_none());
    assert_eq!(
        h.transport.commands(&original),
        vec![SessionCommand::Hold(true), SessionCommand::Hold(false)]
    );
    assert_eq!(h.transport.commands(&second), vec![SessionCommand::Disconnect]);

    tick(2).await;
    assert_eq!(h.controller.elapsed(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_restores_on_hold() {
    let h = harness();
    let original = outbound_in_call(&h, "+15551234567").await;
    h.controller.toggle_hold().await.unwrap();

    let second = start_transfer(&h, &original, TransferMode::Warm).await;
    h.controller.cancel_transfer().await.unwrap();
    settle().await;

    assert_eq!(h.controller.state(), CallState::OnHold);
    assert_eq!(h.transport.commands(&original), vec![SessionCommand::Hold(true)]);
    assert_eq!(h.transport.commands(&second), vec![SessionCommand::Disconnect]);
    assert_eq!(h.controller.cancel_transfer().await, Err(DomainError::NoTransfer));
}

#[tokio::test(start_paused = true)]
async fn test_failed_second_leg_restores_call() {
    let mut h = harness();
    let mut transfers = h.controller.subscribe_transfers();
    let original = outbound_in_call(&h, "+15551234567").await;

    let second = start_transfer(&h, &original, TransferMode::Warm).await;
    h.transport.emit(&second, SessionEvent::Disconnected("busy".to_string()));
    wait_state(&h.controller, CallState::InCall).await;

    let fault = h.faults.recv().await.unwrap();
    assert_eq!(fault.kind, FaultKind::TransferFailed);
    assert!(fault.reason.contains("busy"));

    let mut aborted = None;
    while let Ok(event) = transfers.try_recv() {
        aborted = Some(event);
    }
    let aborted = aborted.unwrap();
    assert_eq!(aborted.attempt.stage, TransferStage::Aborted);
    assert!(aborted.reason.unwrap().contains("busy"));
}

#[tokio::test(start_paused = true)]
async fn test_unreachable_target_restores_call() {
    let mut h = harness();
    let original = outbound_in_call(&h, "+15551234567").await;
    h.transport.fail_next_connect("404 not found");

    h.controller
        .transfer_call(target("+15550001111"), TransferMode::Warm)
        .await
        .unwrap();
    wait_state(&h.controller, CallState::InCall).await;
    settle().await;

    assert!(h.controller.transfer().is_none());
    assert_eq!(h.faults.recv().await.unwrap().kind, FaultKind::TransferFailed);
    assert_eq!(
        h.transport.commands(&original),
        vec![SessionCommand::Hold(true), SessionCommand::Hold(false)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_cold_transfer_hands_off_on_ringing() {
    let h = harness();
    let original = outbound_in_call(&h, "+15551234567").await;
    tick(4).await;

    let second = start_transfer(&h, &original, TransferMode::Cold).await;
    h.transport.emit(&second, SessionEvent::Ringing);
    wait_state(&h.controller, CallState::Ringing).await;

    assert_eq!(h.transport.commands(&original).last(), Some(&SessionCommand::Disconnect));
    assert!(h.controller.transfer().is_none());
    assert_eq!(
        h.controller.session().unwrap().provider_id(),
        Some(second.as_str())
    );

    h.transport.emit(&second, SessionEvent::Accepted);
    wait_state(&h.controller, CallState::InCall).await;
    tick(1).await;
    assert_eq!(h.controller.elapsed(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cold_transfer_needs_no_confirmation() {
    let h = harness();
    let original = outbound_in_call(&h, "+15551234567").await;
    start_transfer(&h, &original, TransferMode::Cold).await;

    assert!(matches!(
        h.controller.confirm_transfer().await,
        Err(DomainError::ValidationError(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_hang_up_mid_transfer_tears_down_both_legs() {
    let h = harness();
    let original = outbound_in_call(&h, "+15551234567").await;
    let second = start_transfer(&h, &original, TransferMode::Warm).await;
    h.transport.emit(&second, SessionEvent::Ringing);
    settle().await;

    h.controller.hang_up().await.unwrap();
    settle().await;

    assert_eq!(h.controller.state(), CallState::Idle);
    assert!(h.controller.transfer().is_none());
    assert_eq!(h.controller.elapsed(), 0);
    assert_eq!(h.transport.commands(&original).last(), Some(&SessionCommand::Disconnect));
    assert_eq!(h.transport.commands(&second), vec![SessionCommand::Disconnect]);

    // Events from the torn-down leg are ignored
    h.transport.emit(&second, SessionEvent::Accepted);
    settle().await;
    assert_eq!(h.controller.state(), CallState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_transfer_preconditions() {
    let h = harness();
    assert!(matches!(
        h.controller
            .transfer_call(target("+15550001111"), TransferMode::Warm)
            .await,
        Err(DomainError::InvalidState { .. })
    ));

    let original = outbound_in_call(&h, "+15551234567").await;
    start_transfer(&h, &original, TransferMode::Warm).await;

    assert_eq!(
        h.controller
            .transfer_call(target("+15550002222"), TransferMode::Cold)
            .await,
        Err(DomainError::TransferInProgress)
    );
    assert_eq!(
        h.controller.toggle_hold().await,
        Err(DomainError::TransferInProgress)
    );
    assert_eq!(h.controller.state(), CallState::OnHold);
}
