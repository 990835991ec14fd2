//! AI insight adapter.
//!
//! Wraps a generative model behind the same [`AdapterResult`] contract as the other backends.
//! Failures carry the raw provider fault text and are not sub-classified.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::backends::prometheus::Series;
use crate::backends::{AdapterResult, ErrorKind};

pub mod gemini;

pub use gemini::GeminiModel;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not available: {0}")]
    NotAvailable(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Timeout")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

impl ProviderError {
    pub fn other(s: impl Into<String>) -> Self {
        ProviderError::Other(s.into())
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A generative chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model name, for logs.
    fn name(&self) -> &str;

    /// Produce the next model turn for `history`, whose last turn is the user's.
    async fn generate(&self, history: &[Turn]) -> Result<String>;
}

/// How long a conversation lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SessionScope {
    /// Every call starts from an empty history.
    #[default]
    PerRequest,
    /// One history shared by every user and chat for the life of the process.
    Shared,
}

/// The five insight operations over a [`ChatModel`].
pub struct InsightAssistant {
    model: Arc<dyn ChatModel>,
    scope: SessionScope,
    history: Mutex<Vec<Turn>>,
}

impl InsightAssistant {
    pub fn new(model: Arc<dyn ChatModel>, scope: SessionScope) -> Self {
        Self {
            model,
            scope,
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn scope(&self) -> SessionScope {
        self.scope
    }

    async fn send(&self, prompt: String) -> Result<String> {
        match self.scope {
            SessionScope::PerRequest => self.model.generate(&[Turn::user(prompt)]).await,
            SessionScope::Shared => {
                // Held across the call so turns from concurrent chats never interleave.
                let mut history = self.history.lock().await;
                history.push(Turn::user(prompt));
                match self.model.generate(&history).await {
                    Ok(reply) => {
                        history.push(Turn::model(reply.clone()));
                        Ok(reply)
                    }
                    Err(e) => {
                        history.pop();
                        Err(e)
                    }
                }
            }
        }
    }

    async fn run(&self, operation: &str, error_prefix: &str, prompt: String) -> AdapterResult {
        tracing::debug!(model = self.model.name(), operation, "Sending insight prompt");
        match self.send(prompt).await {
            Ok(text) => AdapterResult::ok(text.trim().to_string()),
            Err(e) => {
                tracing::error!(model = self.model.name(), operation, "Insight request failed: {}", e);
                AdapterResult::failed(ErrorKind::Unexpected, format!("{}: {}", error_prefix, e))
            }
        }
    }

    pub async fn analyze_logs(&self, logs: &str) -> AdapterResult {
        let prompt = format!(
            "Review the following logs. Report:\n\
             1. Recurring errors\n\
             2. Performance problems\n\
             3. Security issues\n\
             4. Recommended actions\n\n\
             Logs:\n{}",
            logs
        );
        self.run("analyze_logs", "Error analyzing logs", prompt).await
    }

    pub async fn suggest_optimizations(&self, metrics: &BTreeMap<String, String>) -> AdapterResult {
        let prompt = format!(
            "Suggest optimizations for a system with these metrics, covering:\n\
             1. Resource utilization\n\
             2. Performance tuning\n\
             3. Cost reduction\n\n\
             Metrics:\n{}",
            to_json(metrics)
        );
        self.run("suggest_optimizations", "Error generating suggestions", prompt)
            .await
    }

    pub async fn predict_anomalies(&self, series: &[Series]) -> AdapterResult {
        let prompt = format!(
            "Study this time series data and describe:\n\
             1. Likely anomalies\n\
             2. The overall trend\n\
             3. What to expect next\n\n\
             Data:\n{}",
            to_json(series)
        );
        self.run("predict_anomalies", "Error predicting anomalies", prompt).await
    }

    pub async fn incident_report(&self, incident: &str, details: &BTreeMap<String, String>) -> AdapterResult {
        let data = IncidentInput { incident, details };
        let prompt = format!(
            "Write an incident report with these sections:\n\
             1. Root cause\n\
             2. Impact\n\
             3. Resolution\n\
             4. Prevention\n\n\
             Incident data:\n{}",
            to_json(&data)
        );
        self.run("incident_report", "Error generating report", prompt).await
    }

    pub async fn workflow_improvements(&self, workflow: &str, details: &BTreeMap<String, String>) -> AdapterResult {
        let data = WorkflowInput { workflow, details };
        let prompt = format!(
            "Review this DevOps workflow and suggest improvements in:\n\
             1. Automation\n\
             2. Efficiency\n\
             3. Best practices\n\
             4. Risk reduction\n\n\
             Workflow data:\n{}",
            to_json(&data)
        );
        self.run("workflow_improvements", "Error generating suggestions", prompt)
            .await
    }
}

#[derive(Serialize)]
struct IncidentInput<'a> {
    incident: &'a str,
    #[serde(flatten)]
    details: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
struct WorkflowInput<'a> {
    workflow: &'a str,
    #[serde(flatten)]
    details: &'a BTreeMap<String, String>,
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    /// Records every history it is asked to continue.
    #[derive(Default)]
    pub struct FakeModel {
        pub fail: Option<String>,
        pub seen: StdMutex<Vec<Vec<Turn>>>,
    }

    impl FakeModel {
        pub fn failing(message: &str) -> Self {
            Self {
                fail: Some(message.to_string()),
                ..Default::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }

        pub fn last_prompt(&self) -> String {
            self.seen
                .lock()
                .unwrap()
                .last()
                .and_then(|h| h.last())
                .map(|t| t.text.clone())
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn name(&self) -> &str {
            "fake"
        }

        async fn generate(&self, history: &[Turn]) -> Result<String> {
            self.seen.lock().unwrap().push(history.to_vec());
            match &self.fail {
                Some(message) => Err(ProviderError::ApiError(message.clone())),
                None => Ok(format!("insight #{}", history.len())),
            }
        }
    }

    #[tokio::test]
    async fn per_request_scope_starts_fresh() {
        let model = Arc::new(FakeModel::default());
        let assistant = InsightAssistant::new(model.clone(), SessionScope::PerRequest);

        assistant.analyze_logs("first").await;
        assistant.analyze_logs("second").await;

        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|h| h.len() == 1));
    }

    #[tokio::test]
    async fn shared_scope_accumulates_history() {
        let model = Arc::new(FakeModel::default());
        let assistant = InsightAssistant::new(model.clone(), SessionScope::Shared);

        assistant.analyze_logs("first").await;
        let second = assistant.analyze_logs("second").await;

        assert_eq!(second.message(), "insight #3");
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[1][1], Turn::model("insight #1"));
    }

    #[tokio::test]
    async fn failures_embed_the_raw_fault() {
        let model = Arc::new(FakeModel::failing("quota exceeded"));
        let assistant = InsightAssistant::new(model, SessionScope::Shared);

        let result = assistant.analyze_logs("boom").await;

        assert!(!result.is_ok());
        assert_eq!(result.kind(), Some(ErrorKind::Unexpected));
        assert_eq!(result.message(), "Error analyzing logs: API error: quota exceeded");
        assert!(assistant.history.lock().await.is_empty());
    }

    #[tokio::test]
    async fn incident_details_are_flattened_into_the_prompt() {
        let model = Arc::new(FakeModel::default());
        let assistant = InsightAssistant::new(model.clone(), SessionScope::PerRequest);
        let details = BTreeMap::from([("severity".to_string(), "high".to_string())]);

        assistant.incident_report("db-outage", &details).await;

        let prompt = model.last_prompt();
        assert!(prompt.contains("\"incident\": \"db-outage\""));
        assert!(prompt.contains("\"severity\": \"high\""));
    }
}
