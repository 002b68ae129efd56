use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yakphone::config::Config;
use yakphone::domain::call::CallState;
use yakphone::domain::shared::events::DomainEvent;
use yakphone::domain::shared::value_objects::PhoneNumber;
use yakphone::domain::transfer::{TransferMode, TransferTarget};
use yakphone::domain::transport::SessionEvent;
use yakphone::infrastructure::telemetry::describe_metrics;
use yakphone::infrastructure::{format_duration, LoopbackTransport, StaticCredentialProvider};
use yakphone::{CallSessionController, Softphone};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(path.as_deref())?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Starting YakPhone softphone core");
    info!("Configuration loaded: {:?}", config);
    describe_metrics();

    let transport = Arc::new(LoopbackTransport::new());
    let softphone = Softphone::start(
        transport.clone(),
        Arc::new(StaticCredentialProvider::new()),
        &config,
    );

    softphone
        .registration()
        .watch()
        .wait_for(|status| status.is_ready())
        .await?;
    info!("Device registered as {}", config.device.identity);

    demo_call_lifecycle(&transport, softphone.controller()).await?;

    softphone.shutdown().await;
    info!("YakPhone softphone core stopped");
    Ok(())
}

async fn demo_call_lifecycle(
    transport: &LoopbackTransport,
    controller: &CallSessionController,
) -> anyhow::Result<()> {
    info!("=== Call Lifecycle Demo ===");

    let mut changes = controller.subscribe();
    tokio::spawn(async move {
        while let Some(change) = changes.recv().await {
            info!(
                "Transition {}: {} -> {}",
                change.tag(),
                change.previous.label(),
                change.current.label()
            );
        }
    });

    // Place the call and let the remote side answer
    let session_id = controller.make_call("+1 (555) 010-0199", Some("Alice")).await?;
    info!("Call placed (session {})", session_id);

    let provider_id = wait_for_new_leg(transport, None).await?;
    transport.emit(&provider_id, SessionEvent::Ringing);
    transport.emit(&provider_id, SessionEvent::Accepted);
    wait_for_state(controller, CallState::InCall).await?;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    info!("Elapsed: {}", format_duration(controller.elapsed()));

    // Hold, resume and a few digits
    controller.toggle_hold().await?;
    controller.toggle_hold().await?;
    for digit in ['1', '2', '#'] {
        controller.send_digit(digit).await?;
    }
    controller.toggle_mute().await?;

    // Warm transfer to a second party
    let target = TransferTarget::new(
        PhoneNumber::parse("+15550100200").map_err(|e| anyhow::anyhow!(e))?,
    )
    .with_label("Bob");
    controller.transfer_call(target, TransferMode::Warm).await?;

    let transfer_leg = wait_for_new_leg(transport, Some(&provider_id)).await?;
    transport.emit(&transfer_leg, SessionEvent::Ringing);
    transport.emit(&transfer_leg, SessionEvent::Accepted);
    controller
        .watch()
        .wait_for(|snapshot| {
            snapshot
                .transfer
                .as_ref()
                .map(|attempt| attempt.target_answered)
                .unwrap_or(false)
        })
        .await?;
    controller.confirm_transfer().await?;

    let snapshot = controller.snapshot();
    info!("Snapshot: {}", serde_json::to_string_pretty(&snapshot)?);

    controller.hang_up().await?;
    info!("Call ended after {}", format_duration(controller.elapsed()));

    info!("=== Call Lifecycle Demo Complete ===");
    Ok(())
}

/// Provider id of the next loopback session other than `previous`
async fn wait_for_new_leg(
    transport: &LoopbackTransport,
    previous: Option<&str>,
) -> anyhow::Result<String> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(id) = transport.last_session() {
                if previous != Some(id.as_str()) {
                    return id;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("transport never opened a session"))
}

async fn wait_for_state(controller: &CallSessionController, state: CallState) -> anyhow::Result<()> {
    controller
        .watch()
        .wait_for(|snapshot| snapshot.state == state)
        .await?;
    Ok(())
}
