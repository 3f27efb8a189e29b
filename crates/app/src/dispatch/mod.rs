//! Command dispatch for active sessions.
//!
//! Once a session's gate is active, transcripts are submitted to an
//! external intent classifier and recorded through an action log. Both
//! collaborators tolerate failure without taking the audio pipeline down,
//! and both are built lazily, exactly once per session.

pub mod http;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use voxlink_foundation::DispatchError;
use voxlink_telemetry::PipelineMetrics;

pub use http::HttpCollaboratorFactory;

/// Classifier verdict for one transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentOutcome {
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub entities: serde_json::Value,
}

/// One dispatched command, as recorded by the action log.
#[derive(Debug, Clone, Serialize)]
pub struct ActionEntry {
    pub user_id: String,
    pub action_type: &'static str,
    pub intent: String,
    pub text: String,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, text: &str, user_id: &str) -> Result<IntentOutcome, DispatchError>;
}

#[async_trait]
pub trait ActionLog: Send + Sync {
    async fn log(&self, entry: ActionEntry) -> Result<(), DispatchError>;
}

/// Builds the collaborators a session needs once it goes active.
///
/// `build` runs at most once per session (guarded by a `OnceCell` at the
/// call site); a failed build is retried on the next active transcript.
#[async_trait]
pub trait CollaboratorFactory: Send + Sync {
    async fn build(&self, user_id: &str) -> Result<CommandDispatcher, DispatchError>;
}

/// Forwards command transcripts to the classifier and the action log.
pub struct CommandDispatcher {
    classifier: Arc<dyn IntentClassifier>,
    /// The action log is best-effort: a session without one still
    /// classifies commands, mirroring a persistence outage.
    action_log: Option<Arc<dyn ActionLog>>,
    user_id: String,
    metrics: Arc<PipelineMetrics>,
}

impl CommandDispatcher {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        action_log: Option<Arc<dyn ActionLog>>,
        user_id: impl Into<String>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            classifier,
            action_log,
            user_id: user_id.into(),
            metrics,
        }
    }

    /// Classify one command transcript. Classifier errors surface to the
    /// caller as non-fatal dispatch errors; action-log errors are only
    /// logged.
    pub async fn dispatch(&self, text: &str) -> Result<IntentOutcome, DispatchError> {
        let outcome = match self.classifier.classify(text, &self.user_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.metrics.dispatch_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        tracing::info!(
            user_id = %self.user_id,
            intent = %outcome.intent,
            confidence = outcome.confidence,
            "Intent classified"
        );
        self.metrics.intents_dispatched.fetch_add(1, Ordering::Relaxed);

        if let Some(action_log) = &self.action_log {
            let entry = ActionEntry {
                user_id: self.user_id.clone(),
                action_type: "voice_command",
                intent: outcome.intent.clone(),
                text: text.to_string(),
            };
            if let Err(e) = action_log.log(entry).await {
                tracing::warn!(user_id = %self.user_id, error = %e, "Action log write failed");
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::OnceCell;

    struct RecordingClassifier {
        seen: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl IntentClassifier for RecordingClassifier {
        async fn classify(
            &self,
            text: &str,
            _user_id: &str,
        ) -> Result<IntentOutcome, DispatchError> {
            if self.fail {
                return Err(DispatchError::Classification("unavailable".into()));
            }
            self.seen.lock().push(text.to_string());
            Ok(IntentOutcome {
                intent: "check_slack".into(),
                confidence: 0.9,
                entities: serde_json::Value::Null,
            })
        }
    }

    struct FailingLog;

    #[async_trait]
    impl ActionLog for FailingLog {
        async fn log(&self, _entry: ActionEntry) -> Result<(), DispatchError> {
            Err(DispatchError::Logging("down".into()))
        }
    }

    #[tokio::test]
    async fn classifier_failure_is_non_fatal_and_counted() {
        let metrics = Arc::new(PipelineMetrics::default());
        let dispatcher = CommandDispatcher::new(
            Arc::new(RecordingClassifier {
                seen: Arc::new(Mutex::new(Vec::new())),
                fail: true,
            }),
            None,
            "alice",
            metrics.clone(),
        );
        assert!(dispatcher.dispatch("check slack").await.is_err());
        assert_eq!(metrics.dispatch_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn action_log_failure_does_not_fail_dispatch() {
        let metrics = Arc::new(PipelineMetrics::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = CommandDispatcher::new(
            Arc::new(RecordingClassifier {
                seen: Arc::clone(&seen),
                fail: false,
            }),
            Some(Arc::new(FailingLog)),
            "alice",
            metrics.clone(),
        );
        let outcome = dispatcher.dispatch("check slack").await.unwrap();
        assert_eq!(outcome.intent, "check_slack");
        assert_eq!(seen.lock().as_slice(), ["check slack"]);
        assert_eq!(metrics.intents_dispatched.load(Ordering::Relaxed), 1);
    }

    struct CountingFactory {
        builds: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl CollaboratorFactory for CountingFactory {
        async fn build(&self, user_id: &str) -> Result<CommandDispatcher, DispatchError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            // Small delay widens the race window for the test below.
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(CommandDispatcher::new(
                Arc::new(RecordingClassifier {
                    seen: Arc::new(Mutex::new(Vec::new())),
                    fail: false,
                }),
                None,
                user_id,
                Arc::new(PipelineMetrics::default()),
            ))
        }
    }

    #[tokio::test]
    async fn lazy_init_builds_collaborators_exactly_once_under_races() {
        let builds = Arc::new(AtomicUsize::new(0));
        let factory = Arc::new(CountingFactory {
            builds: Arc::clone(&builds),
        });
        let cell: Arc<OnceCell<CommandDispatcher>> = Arc::new(OnceCell::new());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let factory = Arc::clone(&factory);
            let cell = Arc::clone(&cell);
            handles.push(tokio::spawn(async move {
                cell.get_or_try_init(|| factory.build("alice"))
                    .await
                    .map(|_| ())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }
}
