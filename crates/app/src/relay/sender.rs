//! Device half of the transport relay.
//!
//! Opens one long-lived connection to the backend per runtime launch,
//! forwards decoded PCM chunks as binary frames in order, and reads back
//! backend events concurrently. Neither direction waits on the other.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use voxlink_foundation::{Settings, TransportError};
use voxlink_telemetry::PipelineMetrics;

use crate::relay::protocol::ServerEvent;

/// Connect to the backend and relay until the audio source ends or the
/// backend goes away.
pub async fn run(
    settings: Arc<Settings>,
    mut audio_rx: mpsc::Receiver<Vec<u8>>,
    metrics: Arc<PipelineMetrics>,
) -> Result<(), TransportError> {
    let url = format!(
        "{}/voice/transcribe?user_id={}",
        settings.device.websocket_base_url(),
        settings.device.user_id
    );
    tracing::info!(url = %url, "Connecting to backend");

    let (stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    tracing::info!("Connected to backend");

    let (mut write, mut read) = stream.split();

    // Uplink: PCM chunks -> binary frames, in arrival order.
    let send_metrics = Arc::clone(&metrics);
    let mut send_task = tokio::spawn(async move {
        while let Some(chunk) = audio_rx.recv().await {
            send_metrics.frames_relayed.fetch_add(1, Ordering::Relaxed);
            send_metrics
                .bytes_relayed
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
            if let Err(e) = write.send(Message::Binary(chunk)).await {
                tracing::warn!(error = %e, "Audio uplink failed");
                return Err(TransportError::Send(e.to_string()));
            }
        }
        let _ = write.send(Message::Close(None)).await;
        Ok(())
    });

    // Downlink: backend JSON events.
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => handle_backend_event(&text),
                Ok(Message::Close(_)) => {
                    tracing::info!("Backend closed the voice channel");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Backend read failed");
                    return Err(TransportError::Closed);
                }
            }
        }
        Ok(())
    });

    // Either direction ending ends the relay.
    let result = tokio::select! {
        uplink = &mut send_task => {
            recv_task.abort();
            uplink.unwrap_or(Err(TransportError::Closed))
        }
        downlink = &mut recv_task => {
            send_task.abort();
            downlink.unwrap_or(Err(TransportError::Closed))
        }
    };

    tracing::info!("Relay connection finished");
    result
}

/// Decode and surface one backend event. Unknown payloads are logged and
/// skipped, never fatal.
fn handle_backend_event(text: &str) {
    let event: ServerEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Skipping unrecognized backend event");
            return;
        }
    };

    match event {
        ServerEvent::Transcription {
            text,
            wake_word_active,
        } => {
            if wake_word_active {
                tracing::info!(target: "voice", active = true, "[ACTIVE] {}", text);
            } else {
                tracing::info!(target: "voice", active = false, "{}", text);
            }
        }
        ServerEvent::WakeWord { message } => {
            tracing::info!(target: "voice", "{}", message);
        }
        ServerEvent::Intent {
            intent, confidence, ..
        } => {
            tracing::info!(target: "voice", intent = %intent, confidence, "Intent");
        }
        ServerEvent::Error { message } => {
            tracing::error!(target: "voice", "Backend error: {}", message);
        }
    }
}
