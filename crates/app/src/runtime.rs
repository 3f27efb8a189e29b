//! Device runtime wiring: one BLE link feeding one relay connection.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::task::JoinError;

use voxlink_device::DeviceLink;
use voxlink_foundation::{DeviceError, Settings, TransportError};
use voxlink_telemetry::PipelineMetrics;

use crate::relay;

enum Outcome {
    Link(Result<(), DeviceError>),
    Relay(Result<Result<(), TransportError>, JoinError>),
    Shutdown,
}

/// Connect to the wearable and the backend, stream until either side
/// ends or Ctrl-C arrives, then tear both down.
pub async fn run_device_runtime(settings: Settings) -> anyhow::Result<()> {
    if settings.device.mac.is_empty() {
        return Err(anyhow!(
            "device.mac is not configured (set VOXLINK__DEVICE__MAC or pass --device)"
        ));
    }

    let settings = Arc::new(settings);
    let metrics = Arc::new(PipelineMetrics::default());

    let mut link = DeviceLink::new(&settings.device)?.with_metrics(Arc::clone(&metrics));
    let audio_rx = link
        .take_audio_stream()
        .context("device audio stream already taken")?;

    let mut relay_task = tokio::spawn(relay::sender::run(
        Arc::clone(&settings),
        audio_rx,
        Arc::clone(&metrics),
    ));

    let outcome = tokio::select! {
        result = link.connect(|_pcm| {}) => Outcome::Link(result),
        result = &mut relay_task => Outcome::Relay(result),
        _ = tokio::signal::ctrl_c() => Outcome::Shutdown,
    };

    // Teardown order mirrors startup in reverse: quiesce the audio
    // source, then the relay.
    link.disconnect().await;

    match outcome {
        Outcome::Link(result) => {
            relay_task.abort();
            let _ = relay_task.await;
            result.context("device link failed")?;
            tracing::info!("Device link ended");
        }
        Outcome::Relay(result) => match result {
            Ok(relay_result) => {
                relay_result.context("relay connection failed")?;
                tracing::info!("Relay connection ended");
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => return Err(anyhow!(e).context("relay task panicked")),
        },
        Outcome::Shutdown => {
            tracing::info!("Shutting down device runtime");
            relay_task.abort();
            let _ = relay_task.await;
        }
    }

    Ok(())
}
