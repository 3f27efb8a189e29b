//! Backend half of the transport relay.
//!
//! Accepts one WebSocket connection per user session, feeds inbound
//! binary audio into the transcription session, and writes gate and
//! dispatch events back on the same connection. Inbound audio, outbound
//! events, and transcript consumption each run on their own task so a
//! slow direction never stalls the others.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::sync::OnceCell;

use voxlink_foundation::Settings;
use voxlink_stt::{TranscriptEvent, TranscriptionSession};
use voxlink_telemetry::PipelineMetrics;
use voxlink_wake::WakeGate;

use crate::dispatch::{CollaboratorFactory, CommandDispatcher};
use crate::relay::protocol::ServerEvent;
use crate::session::{SessionRegistry, SessionState};

const OUTBOUND_QUEUE_DEPTH: usize = 32;

pub struct RelayState {
    pub settings: Arc<Settings>,
    pub metrics: Arc<PipelineMetrics>,
    pub registry: Arc<SessionRegistry>,
    pub collaborators: Arc<dyn CollaboratorFactory>,
}

#[derive(Debug, Deserialize)]
struct TranscribeQuery {
    user_id: String,
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/voice/transcribe", get(ws_upgrade))
        .with_state(state)
}

async fn ws_upgrade(
    State(state): State<Arc<RelayState>>,
    Query(query): Query<TranscribeQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query.user_id))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<RelayState>, user_id: String) {
    let session_state = state.registry.register(&user_id);
    state.metrics.session_opened();

    // A session that cannot reach the provider never becomes usable:
    // report once, close, clean up.
    let (stt, events) =
        match TranscriptionSession::start(&state.settings.stt, Arc::clone(&state.metrics)).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "Transcription startup failed");
                let event = ServerEvent::error(format!("Transcription unavailable: {}", e));
                if let Ok(json) = serde_json::to_string(&event) {
                    let _ = socket.send(Message::Text(json.into())).await;
                }
                state.registry.remove(&session_state.connection_id);
                state.metrics.session_closed();
                return;
            }
        };
    let stt = Arc::new(stt);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE_DEPTH);

    // Outbound: event channel -> WebSocket text frames.
    let send_metrics = Arc::clone(&state.metrics);
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
            send_metrics.events_sent.fetch_add(1, Ordering::Relaxed);
        }
    });

    // Inbound: binary audio frames -> provider, preserving order.
    let recv_metrics = Arc::clone(&state.metrics);
    let recv_stt = Arc::clone(&stt);
    let recv_user = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    recv_metrics.frames_relayed.fetch_add(1, Ordering::Relaxed);
                    recv_metrics
                        .bytes_relayed
                        .fetch_add(data.len() as u64, Ordering::Relaxed);
                    recv_stt.send_audio(data.to_vec()).await;
                }
                Message::Close(_) => {
                    tracing::info!(user_id = %recv_user, "Client closed the voice channel");
                    break;
                }
                _ => {}
            }
        }
    });

    // Transcripts: provider events -> gate -> dispatcher -> outbound.
    let mut transcript_task = tokio::spawn(run_transcript_loop(
        events,
        Arc::clone(&state),
        Arc::clone(&session_state),
        out_tx,
    ));

    // Whichever side ends first takes the whole session down with it.
    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
            transcript_task.abort();
        }
        _ = &mut recv_task => {
            send_task.abort();
            transcript_task.abort();
        }
        _ = &mut transcript_task => {
            send_task.abort();
            recv_task.abort();
        }
    }

    stt.stop();
    state.registry.remove(&session_state.connection_id);
    state.metrics.session_closed();
    tracing::info!(user_id = %user_id, "Voice session torn down");
}

async fn run_transcript_loop(
    mut events: mpsc::Receiver<TranscriptEvent>,
    state: Arc<RelayState>,
    session: Arc<SessionState>,
    out_tx: mpsc::Sender<ServerEvent>,
) {
    let mut gate = WakeGate::new(state.settings.wake.phrase.as_str());
    let dispatcher: OnceCell<CommandDispatcher> = OnceCell::new();

    while let Some(event) = events.recv().await {
        let decision = gate.observe(&event.text);

        if decision.activated_now {
            session.activate();
            state.metrics.wake_activations.fetch_add(1, Ordering::Relaxed);
            tracing::info!(user_id = %session.user_id, "Session entered command mode");
            if out_tx.send(ServerEvent::wake_word_detected()).await.is_err() {
                break;
            }
        }

        // Consumers always see the raw transcript plus gating status.
        let annotated = ServerEvent::Transcription {
            text: event.text.clone(),
            wake_word_active: decision.active,
        };
        if out_tx.send(annotated).await.is_err() {
            break;
        }

        // Command dispatch covers transcripts arriving after activation;
        // the fragment that tripped the gate is the trigger, not a command.
        if decision.active && !decision.activated_now {
            let built = dispatcher
                .get_or_try_init(|| state.collaborators.build(&session.user_id))
                .await;
            let outcome = match built {
                Ok(dispatcher) => dispatcher.dispatch(&event.text).await,
                Err(e) => Err(e),
            };
            let reply = match outcome {
                Ok(outcome) => ServerEvent::Intent {
                    intent: outcome.intent,
                    confidence: outcome.confidence,
                    entities: outcome.entities,
                },
                Err(e) => {
                    tracing::warn!(user_id = %session.user_id, error = %e, "Dispatch failed");
                    ServerEvent::error(e.to_string())
                }
            };
            if out_tx.send(reply).await.is_err() {
                break;
            }
        }
    }

    tracing::debug!(user_id = %session.user_id, "Transcript loop finished");
}
