//! HTTP-backed collaborator implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use voxlink_foundation::{DispatchError, DispatchSettings};
use voxlink_telemetry::PipelineMetrics;

use super::{
    ActionEntry, ActionLog, CollaboratorFactory, CommandDispatcher, IntentClassifier,
    IntentOutcome,
};

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
    context: ClassifyContext<'a>,
}

#[derive(Serialize)]
struct ClassifyContext<'a> {
    user_id: &'a str,
}

pub struct HttpIntentClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpIntentClassifier {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl IntentClassifier for HttpIntentClassifier {
    async fn classify(&self, text: &str, user_id: &str) -> Result<IntentOutcome, DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .json(&ClassifyRequest {
                text,
                context: ClassifyContext { user_id },
            })
            .send()
            .await
            .map_err(|e| DispatchError::Classification(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Classification(format!(
                "classifier returned {}: {}",
                status, body
            )));
        }

        response
            .json::<IntentOutcome>()
            .await
            .map_err(|e| DispatchError::Classification(e.to_string()))
    }
}

pub struct HttpActionLog {
    client: reqwest::Client,
    url: String,
}

impl HttpActionLog {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl ActionLog for HttpActionLog {
    async fn log(&self, entry: ActionEntry) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(&self.url)
            .json(&entry)
            .send()
            .await
            .map_err(|e| DispatchError::Logging(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::Logging(format!(
                "action log returned {}",
                status
            )));
        }
        Ok(())
    }
}

/// Builds HTTP collaborators from the dispatch settings. One shared
/// reqwest client; construction itself is cheap, so the lazy guard at the
/// call site is about doing it once, not about cost.
pub struct HttpCollaboratorFactory {
    client: reqwest::Client,
    settings: DispatchSettings,
    metrics: Arc<PipelineMetrics>,
}

impl HttpCollaboratorFactory {
    pub fn new(settings: DispatchSettings, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            metrics,
        }
    }
}

#[async_trait]
impl CollaboratorFactory for HttpCollaboratorFactory {
    async fn build(&self, user_id: &str) -> Result<CommandDispatcher, DispatchError> {
        let classifier = Arc::new(HttpIntentClassifier::new(
            self.client.clone(),
            self.settings.classifier_url.clone(),
        ));

        // The action log is optional: without a configured URL the
        // session still classifies, it just stops recording.
        let action_log: Option<Arc<dyn ActionLog>> = if self.settings.action_log_url.is_empty() {
            tracing::warn!("No action log configured, commands will not be recorded");
            None
        } else {
            Some(Arc::new(HttpActionLog::new(
                self.client.clone(),
                self.settings.action_log_url.clone(),
            )))
        };

        tracing::info!(user_id = %user_id, "Dispatch collaborators initialized");
        Ok(CommandDispatcher::new(
            classifier,
            action_log,
            user_id,
            Arc::clone(&self.metrics),
        ))
    }
}
