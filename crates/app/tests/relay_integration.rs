//! End-to-end tests for the voice relay: a WebSocket client plays the
//! device runtime, an in-process WebSocket server plays the
//! transcription provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async};

use voxlink_app::dispatch::{
    CollaboratorFactory, CommandDispatcher, IntentClassifier, IntentOutcome,
};
use voxlink_app::relay::{self, RelayState, ServerEvent};
use voxlink_app::session::SessionRegistry;
use voxlink_foundation::{DispatchError, Settings};
use voxlink_telemetry::PipelineMetrics;

const TIMEOUT: Duration = Duration::from_secs(5);

struct FakeProvider {
    endpoint: String,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    connection_closed: Arc<Notify>,
    is_closed: Arc<AtomicBool>,
}

/// Accepts one provider connection: plays the scripted transcript
/// payloads, then records every binary audio frame until the peer goes
/// away.
async fn spawn_provider(script: Vec<String>) -> FakeProvider {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let connection_closed = Arc::new(Notify::new());
    let is_closed = Arc::new(AtomicBool::new(false));

    let received_task = Arc::clone(&received);
    let closed_task = Arc::clone(&connection_closed);
    let is_closed_task = Arc::clone(&is_closed);
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        for payload in script {
            ws.send(Message::Text(payload)).await.unwrap();
        }

        loop {
            match ws.next().await {
                Some(Ok(Message::Binary(frame))) => {
                    received_task.lock().push(frame);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            }
        }
        is_closed_task.store(true, Ordering::SeqCst);
        closed_task.notify_waiters();
    });

    FakeProvider {
        endpoint: format!("ws://127.0.0.1:{}", port),
        received,
        connection_closed,
        is_closed,
    }
}

struct RecordingClassifier {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl IntentClassifier for RecordingClassifier {
    async fn classify(&self, text: &str, _user_id: &str) -> Result<IntentOutcome, DispatchError> {
        self.seen.lock().push(text.to_string());
        Ok(IntentOutcome {
            intent: "check_slack".into(),
            confidence: 0.93,
            entities: serde_json::json!({}),
        })
    }
}

struct TestFactory {
    seen: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl CollaboratorFactory for TestFactory {
    async fn build(&self, user_id: &str) -> Result<CommandDispatcher, DispatchError> {
        Ok(CommandDispatcher::new(
            Arc::new(RecordingClassifier {
                seen: Arc::clone(&self.seen),
            }),
            None,
            user_id,
            Arc::new(PipelineMetrics::default()),
        ))
    }
}

struct Backend {
    ws_base: String,
    registry: Arc<SessionRegistry>,
    metrics: Arc<PipelineMetrics>,
}

async fn spawn_backend(provider_endpoint: &str, seen: Arc<Mutex<Vec<String>>>) -> Backend {
    let mut settings = Settings::default();
    settings.stt.endpoint = provider_endpoint.to_string();
    settings.stt.api_key = String::new();

    let metrics = Arc::new(PipelineMetrics::default());
    let registry = Arc::new(SessionRegistry::new());
    let state = Arc::new(RelayState {
        settings: Arc::new(settings),
        metrics: Arc::clone(&metrics),
        registry: Arc::clone(&registry),
        collaborators: Arc::new(TestFactory { seen }),
    });

    let app = relay::router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Backend {
        ws_base: format!("ws://127.0.0.1:{}", port),
        registry,
        metrics,
    }
}

async fn next_event<S>(ws: &mut S) -> ServerEvent
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for backend event")
            .expect("connection ended while waiting for event")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("backend event json");
        }
    }
}

fn final_payload(text: &str) -> String {
    format!(
        r#"{{"channel":{{"alternatives":[{{"transcript":"{}"}}]}},"is_final":true}}"#,
        text
    )
}

#[tokio::test(flavor = "multi_thread")]
async fn audio_frames_reach_the_provider_in_order() {
    let provider = spawn_provider(Vec::new()).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let backend = spawn_backend(&provider.endpoint, seen).await;

    let url = format!("{}/voice/transcribe?user_id=alice", backend.ws_base);
    let (mut ws, _) = connect_async(&url).await.unwrap();

    for i in 1u8..=5 {
        ws.send(Message::Binary(vec![i; 8])).await.unwrap();
    }

    // Wait until all five frames landed at the provider.
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    loop {
        if provider.received.lock().len() == 5 {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "provider never saw all frames"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let firsts: Vec<u8> = provider.received.lock().iter().map(|f| f[0]).collect();
    assert_eq!(firsts, vec![1, 2, 3, 4, 5]);
    assert_eq!(backend.metrics.frames_relayed.load(Ordering::SeqCst), 5);

    ws.close(None).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn wake_flow_annotates_transcripts_and_dispatches_commands() {
    let script = vec![
        final_payload("good"),
        final_payload("morning"),
        final_payload("dadd-e"),
        final_payload("check slack"),
    ];
    let provider = spawn_provider(script).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let backend = spawn_backend(&provider.endpoint, Arc::clone(&seen)).await;

    let url = format!("{}/voice/transcribe?user_id=alice", backend.ws_base);
    let (mut ws, _) = connect_async(&url).await.unwrap();

    assert_eq!(
        next_event(&mut ws).await,
        ServerEvent::Transcription {
            text: "good".into(),
            wake_word_active: false
        }
    );
    assert_eq!(
        next_event(&mut ws).await,
        ServerEvent::Transcription {
            text: "morning".into(),
            wake_word_active: false
        }
    );

    // The activating fragment: wake event first, then the annotated
    // transcript. The trigger itself is not classified.
    assert!(matches!(next_event(&mut ws).await, ServerEvent::WakeWord { .. }));
    assert_eq!(
        next_event(&mut ws).await,
        ServerEvent::Transcription {
            text: "dadd-e".into(),
            wake_word_active: true
        }
    );

    assert_eq!(
        next_event(&mut ws).await,
        ServerEvent::Transcription {
            text: "check slack".into(),
            wake_word_active: true
        }
    );
    match next_event(&mut ws).await {
        ServerEvent::Intent {
            intent, confidence, ..
        } => {
            assert_eq!(intent, "check_slack");
            assert!(confidence > 0.9);
        }
        other => panic!("expected intent event, got {:?}", other),
    }

    assert_eq!(seen.lock().as_slice(), ["check slack"]);

    ws.close(None).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn client_close_tears_down_provider_and_session() {
    let provider = spawn_provider(Vec::new()).await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let backend = spawn_backend(&provider.endpoint, seen).await;

    let url = format!("{}/voice/transcribe?user_id=alice", backend.ws_base);
    let (mut ws, _) = connect_async(&url).await.unwrap();
    ws.send(Message::Binary(vec![7; 8])).await.unwrap();

    // Session is live before the close.
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while backend.registry.is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "session never registered");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    ws.close(None).await.unwrap();

    // Closing the duplex connection ends the provider connection too.
    if !provider.is_closed.load(Ordering::SeqCst) {
        tokio::time::timeout(TIMEOUT, provider.connection_closed.notified())
            .await
            .expect("provider connection did not close in time");
    }

    // And the session registry drains.
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while !backend.registry.is_empty() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session was not removed after close"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn provider_startup_failure_reports_one_error_and_closes() {
    // Point the session at a port nothing listens on.
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://127.0.0.1:{}", unused.local_addr().unwrap().port());
    drop(unused);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let backend = spawn_backend(&endpoint, seen).await;

    let url = format!("{}/voice/transcribe?user_id=alice", backend.ws_base);
    let (mut ws, _) = connect_async(&url).await.unwrap();

    match next_event(&mut ws).await {
        ServerEvent::Error { message } => {
            assert!(message.contains("Transcription unavailable"));
        }
        other => panic!("expected error event, got {:?}", other),
    }

    // The backend closes the connection; the stream ends.
    let end = tokio::time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(end.is_ok(), "connection did not close after startup failure");

    assert!(backend.registry.is_empty());
}
