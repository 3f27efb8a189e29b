//! Streaming transcription session
//!
//! One session owns one WebSocket connection to the transcription
//! provider. Audio is forwarded by a writer task; provider messages are
//! normalized by a reader task and delivered through a channel, so
//! consumer work never runs inline on the read loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

use voxlink_foundation::{SttError, SttSettings};
use voxlink_telemetry::PipelineMetrics;

use crate::payload::ProviderPayload;
use crate::types::TranscriptEvent;

/// How long the reader waits on a full event channel before dropping a
/// transcript. Keeps a stalled consumer from wedging the provider read
/// loop.
const EVENT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

const AUDIO_QUEUE_DEPTH: usize = 64;
const EVENT_QUEUE_DEPTH: usize = 64;

pub struct TranscriptionSession {
    audio_tx: mpsc::Sender<Vec<u8>>,
    stop_tx: watch::Sender<bool>,
    stopped: Arc<AtomicBool>,
    writer_handle: JoinHandle<()>,
    reader_handle: JoinHandle<()>,
}

impl TranscriptionSession {
    /// Open a streaming connection to the provider, requesting interim
    /// and final results over 16-bit/16 kHz/mono PCM.
    ///
    /// A connection failure here is fatal for the session: the error is
    /// returned and no session handle exists.
    pub async fn start(
        settings: &SttSettings,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<(Self, mpsc::Receiver<TranscriptEvent>), SttError> {
        let url = Self::request_url(settings)?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| SttError::Connect(e.to_string()))?;
        if !settings.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Token {}", settings.api_key))
                .map_err(|e| SttError::Connect(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| SttError::Connect(e.to_string()))?;

        tracing::info!(
            target: "stt",
            endpoint = %settings.endpoint,
            model = %settings.model,
            language = %settings.language,
            "Provider connection established"
        );

        let (write, read) = stream.split();
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<u8>>(AUDIO_QUEUE_DEPTH);
        let (event_tx, event_rx) = mpsc::channel::<TranscriptEvent>(EVENT_QUEUE_DEPTH);
        let (stop_tx, stop_rx) = watch::channel(false);

        let writer_handle = tokio::spawn(Self::run_writer(write, audio_rx, stop_rx.clone()));
        let reader_handle = tokio::spawn(Self::run_reader(read, event_tx, stop_rx, metrics));

        Ok((
            Self {
                audio_tx,
                stop_tx,
                stopped: Arc::new(AtomicBool::new(false)),
                writer_handle,
                reader_handle,
            },
            event_rx,
        ))
    }

    fn request_url(settings: &SttSettings) -> Result<url::Url, SttError> {
        let mut url =
            url::Url::parse(&settings.endpoint).map_err(|e| SttError::Connect(e.to_string()))?;
        url.query_pairs_mut()
            .append_pair("model", &settings.model)
            .append_pair("language", &settings.language)
            .append_pair("encoding", "linear16")
            .append_pair("sample_rate", "16000")
            .append_pair("channels", "1")
            .append_pair("punctuate", "true")
            .append_pair("interim_results", "true")
            .append_pair("smart_format", "true");
        Ok(url)
    }

    /// Forward one PCM chunk to the provider. A warning no-op when the
    /// session is stopped or the connection has gone away.
    pub async fn send_audio(&self, chunk: Vec<u8>) {
        if self.stopped.load(Ordering::SeqCst) {
            tracing::warn!(target: "stt", "Audio ignored: transcription session is stopped");
            return;
        }
        if self.audio_tx.send(chunk).await.is_err() {
            tracing::warn!(target: "stt", "Audio ignored: provider writer has shut down");
        }
    }

    /// Stop the session. Idempotent and callable from any state; unblocks
    /// both the writer and reader tasks.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(target: "stt", "Stopping transcription session");
        let _ = self.stop_tx.send(true);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn run_writer<S>(
        mut write: S,
        mut audio_rx: mpsc::Receiver<Vec<u8>>,
        mut stop_rx: watch::Receiver<bool>,
    ) where
        S: Sink<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        loop {
            tokio::select! {
                maybe = audio_rx.recv() => match maybe {
                    Some(chunk) => {
                        if let Err(e) = write.send(Message::Binary(chunk)).await {
                            tracing::warn!(target: "stt", error = %e, "Audio send failed, writer stopping");
                            break;
                        }
                    }
                    None => break,
                },
                _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => break,
            }
        }

        // Best-effort close so the provider finalizes promptly.
        let _ = write.send(Message::Close(None)).await;
        tracing::debug!(target: "stt", "Provider writer finished");
    }

    async fn run_reader<R, E>(
        mut read: R,
        event_tx: mpsc::Sender<TranscriptEvent>,
        mut stop_rx: watch::Receiver<bool>,
        metrics: Arc<PipelineMetrics>,
    ) where
        R: Stream<Item = Result<Message, E>> + Unpin,
        E: std::fmt::Display,
    {
        loop {
            tokio::select! {
                _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => break,
                maybe = read.next() => match maybe {
                    Some(Ok(Message::Text(text))) => {
                        Self::handle_provider_message(&text, &event_tx, &metrics).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!(target: "stt", "Provider closed the connection");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping/pong and unexpected binary frames carry no
                        // transcripts.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(target: "stt", error = %e, "Provider read failed, reader stopping");
                        break;
                    }
                    None => {
                        tracing::info!(target: "stt", "Provider stream ended");
                        break;
                    }
                },
            }
        }
        tracing::debug!(target: "stt", "Provider reader finished");
    }

    async fn handle_provider_message(
        text: &str,
        event_tx: &mpsc::Sender<TranscriptEvent>,
        metrics: &PipelineMetrics,
    ) {
        let payload: ProviderPayload = match serde_json::from_str(text) {
            Ok(payload) => payload,
            Err(e) => {
                metrics
                    .provider_parse_failures
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(target: "stt", error = %e, "Skipping unparseable provider message");
                return;
            }
        };

        if !payload.is_recognized() {
            metrics
                .provider_parse_failures
                .fetch_add(1, Ordering::Relaxed);
            tracing::warn!(target: "stt", "Skipping unrecognized provider payload shape");
            return;
        }

        let Some(event) = payload.normalize() else {
            // Recognized shape with nothing to say (empty transcript).
            return;
        };

        if event.is_final {
            tracing::info!(target: "stt", "Final: {}", event.text);
        } else {
            tracing::debug!(target: "stt", "Partial: {}", event.text);
        }
        metrics.record_transcript(event.is_final);

        // Timed send: a stalled consumer drops this transcript instead of
        // wedging the read loop.
        match tokio::time::timeout(EVENT_SEND_TIMEOUT, event_tx.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                tracing::debug!(target: "stt", "Transcript channel closed");
            }
            Err(_) => {
                tracing::warn!(target: "stt", "Transcript consumer too slow, event dropped");
            }
        }
    }
}

impl Drop for TranscriptionSession {
    fn drop(&mut self) {
        self.writer_handle.abort();
        self.reader_handle.abort();
    }
}
