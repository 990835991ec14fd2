//! Turns one invocation into exactly one reply.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::Instrument;
use uuid::Uuid;

use super::{args, unavailable, Registry};
use crate::backends::AdapterResult;
use crate::context::BackendContext;
use crate::error::Result;

pub const FAILURE_GLYPH: &str = "❌";

/// One inbound command event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Canonical command name, without the leading slash.
    pub command: String,
    /// Raw argument text after the command name.
    pub text: String,
    pub chat_id: i64,
    pub user: String,
}

impl Invocation {
    pub fn new(command: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            text: text.into(),
            chat_id: 0,
            user: "local".to_string(),
        }
    }
}

/// Where acknowledgements and replies for one invocation go.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Signal that the command was received. Sent before any backend call.
    async fn ack(&self) -> Result<()>;

    async fn reply(&self, text: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Registry>,
    ctx: Arc<BackendContext>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, ctx: Arc<BackendContext>) -> Self {
        Self { registry, ctx }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn context(&self) -> &BackendContext {
        &self.ctx
    }

    /// Acknowledge, resolve and reply. Returns the reply that was sent.
    pub async fn dispatch(&self, invocation: Invocation, responder: &dyn Responder) -> String {
        let span = tracing::info_span!(
            "dispatch",
            command = %invocation.command,
            user = %invocation.user,
            id = %Uuid::new_v4(),
        );
        async {
            if let Err(e) = responder.ack().await {
                tracing::warn!("Failed to acknowledge command: {}", e);
            }
            let reply = self.resolve(&invocation).await;
            if let Err(e) = responder.reply(&reply).await {
                tracing::error!("Failed to send reply: {}", e);
            }
            reply
        }
        .instrument(span)
        .await
    }

    /// Compute the reply for an invocation.
    pub async fn resolve(&self, invocation: &Invocation) -> String {
        let name = invocation.command.as_str();
        let Some(descriptor) = self.registry.lookup(name) else {
            tracing::info!("Unknown command /{}", name);
            return format!(
                "{} Unknown command `/{}`. Send /help to see the available commands.",
                FAILURE_GLYPH, name
            );
        };

        let operation = match args::parse(&descriptor.rule, &invocation.text)
            .and_then(|parsed| descriptor.command.parse(parsed))
        {
            Ok(op) => op,
            Err(e) => {
                tracing::info!("Usage error: {}", e);
                return format!(
                    "{} {}\nUsage: `{}`\nSend `/help {}` for examples.",
                    FAILURE_GLYPH, e, descriptor.usage, descriptor.name
                );
            }
        };

        if let Some(missing) = descriptor
            .command
            .backends()
            .iter()
            .find(|b| !self.ctx.available(**b))
        {
            tracing::info!(backend = missing.key(), "Backend unavailable");
            return format!("{} {}", FAILURE_GLYPH, unavailable(*missing).message());
        }

        tracing::debug!(?operation, "Invoking handler");
        let ctx = self.ctx.clone();
        let registry = self.registry.clone();
        let outcome = tokio::spawn(async move { operation.invoke(&ctx, &registry).await }).await;

        match outcome {
            Ok(AdapterResult::Ok(payload)) => format!("{} {}", descriptor.glyph, payload),
            Ok(AdapterResult::Failed { message, .. }) => format!("{} {}", FAILURE_GLYPH, message),
            Err(e) => {
                let fault = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    e.to_string()
                };
                tracing::error!("Handler for /{} failed: {}", name, fault);
                format!(
                    "{} An unexpected error occurred while running `/{}`: {}",
                    FAILURE_GLYPH, name, fault
                )
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::backends::docker::tests::FakeDocker;
    use crate::backends::jenkins::{BuildInfo, CiApi, JobInfo};
    use crate::backends::kubernetes::tests::FakeCluster;
    use crate::backends::prometheus::tests::FakeMetrics;
    use crate::backends::BackendError;
    use crate::backends::jenkins::tests::FakeCi;
    use crate::commands::ArgRule;
    use crate::insight::tests::FakeModel;
    use crate::insight::{InsightAssistant, SessionScope};

    /// Records acks and replies in order.
    #[derive(Default)]
    pub struct RecordingResponder {
        pub events: Mutex<Vec<String>>,
    }

    impl RecordingResponder {
        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Responder for RecordingResponder {
        async fn ack(&self) -> Result<()> {
            self.events.lock().unwrap().push("ack".to_string());
            Ok(())
        }

        async fn reply(&self, text: &str) -> Result<()> {
            self.events.lock().unwrap().push(format!("reply: {}", text));
            Ok(())
        }
    }

    struct PanickingCi;

    #[async_trait]
    impl CiApi for PanickingCi {
        async fn build(&self, _job: &str, _params: &BTreeMap<String, String>) -> std::result::Result<(), BackendError> {
            panic!("connection pool poisoned");
        }

        async fn job_info(&self, _job: &str) -> std::result::Result<JobInfo, BackendError> {
            Ok(JobInfo::default())
        }

        async fn build_info(&self, _job: &str, _build: &str) -> std::result::Result<BuildInfo, BackendError> {
            Ok(BuildInfo::default())
        }

        async fn console_text(&self, _job: &str, _build: &str) -> std::result::Result<String, BackendError> {
            Ok(String::new())
        }
    }

    fn dispatcher(ctx: BackendContext) -> Dispatcher {
        Dispatcher::new(Arc::new(Registry::builtin().unwrap()), Arc::new(ctx))
    }

    #[tokio::test]
    async fn test_ack_precedes_exactly_one_reply() {
        let docker = Arc::new(FakeDocker::default());
        let d = dispatcher(BackendContext {
            containers: Some(docker.clone()),
            ..Default::default()
        });
        let responder = RecordingResponder::default();

        let reply = d.dispatch(Invocation::new("docker-ps", ""), &responder).await;

        assert_eq!(reply, "📋 No running Docker containers found.");
        assert_eq!(responder.events(), vec!["ack".to_string(), format!("reply: {}", reply)]);
        assert_eq!(docker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let d = dispatcher(BackendContext::default());
        let reply = d.resolve(&Invocation::new("deploy-everything", "now")).await;
        assert!(reply.starts_with("❌ Unknown command `/deploy-everything`"));
        assert!(reply.contains("/help"));
    }

    #[tokio::test]
    async fn test_usage_error_makes_no_backend_calls() {
        let cluster = Arc::new(FakeCluster::default());
        let d = dispatcher(BackendContext {
            pods: Some(cluster.clone()),
            deployments: Some(cluster.clone()),
            ..Default::default()
        });

        let reply = d
            .resolve(&Invocation::new("k8s-restart-deployment", "web namespace=staging"))
            .await;

        assert!(reply.starts_with("❌ `namespace=staging` looks like key=value"));
        assert!(reply.contains("Usage: `/k8s-restart-deployment <name> [namespace]`"));
        assert!(cluster.calls().is_empty());
    }

    #[tokio::test]
    async fn test_positional_namespace_is_used() {
        let cluster = Arc::new(FakeCluster::default());
        let d = dispatcher(BackendContext {
            pods: Some(cluster.clone()),
            deployments: Some(cluster.clone()),
            ..Default::default()
        });

        let reply = d.resolve(&Invocation::new("k8s-restart-deployment", "web staging")).await;

        assert!(reply.starts_with("✅ "));
        assert_eq!(cluster.calls(), vec!["restart web staging".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_backend_is_service_unavailable() {
        let d = dispatcher(BackendContext::default());
        let reply = d.resolve(&Invocation::new("jenkins-status", "build-app")).await;
        assert!(reply.starts_with("❌ Service unavailable: Jenkins"));
    }

    #[tokio::test]
    async fn test_composite_needs_every_backend() {
        let d = dispatcher(BackendContext {
            containers: Some(Arc::new(FakeDocker::default())),
            ..Default::default()
        });
        let reply = d.resolve(&Invocation::new("ai-analyze-container", "web")).await;
        assert!(reply.starts_with("❌ Service unavailable: the AI assistant"));
    }

    #[tokio::test]
    async fn test_adapter_failure_gets_failure_glyph() {
        let cluster = Arc::new(FakeCluster {
            error: Some(BackendError::not_found("namespaces \"nope\" not found")),
            ..Default::default()
        });
        let d = dispatcher(BackendContext {
            pods: Some(cluster.clone()),
            deployments: Some(cluster),
            ..Default::default()
        });
        let reply = d.resolve(&Invocation::new("k8s-pods", "nope")).await;
        assert_eq!(reply, "❌ Error: Namespace `nope` not found.");
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_unexpected_error() {
        let d = dispatcher(BackendContext {
            ci: Some(Arc::new(PanickingCi)),
            ..Default::default()
        });
        let responder = RecordingResponder::default();

        let reply = d
            .dispatch(Invocation::new("jenkins-trigger", "build-app"), &responder)
            .await;

        assert_eq!(
            reply,
            "❌ An unexpected error occurred while running `/jenkins-trigger`: connection pool poisoned"
        );
        assert_eq!(responder.events().len(), 2);
    }

    #[tokio::test]
    async fn test_help_needs_no_backend() {
        let d = dispatcher(BackendContext::default());
        let reply = d.resolve(&Invocation::new("help", "")).await;
        assert!(reply.starts_with("ℹ️ Available commands:"));
    }

    #[tokio::test]
    async fn test_flag_like_docker_names_never_reach_the_daemon() {
        let docker = Arc::new(FakeDocker::default());
        let d = dispatcher(BackendContext {
            containers: Some(docker.clone()),
            ..Default::default()
        });

        let deploy = d.resolve(&Invocation::new("docker-deploy", "--help")).await;
        assert!(deploy.starts_with("❌ <image> must be a container or image name"));
        assert!(deploy.contains("Usage: `/docker-deploy <image>`"));

        let logs = d.resolve(&Invocation::new("docker-logs", "--timestamps")).await;
        assert!(logs.starts_with("❌ <container> must be a container or image name"));

        assert_eq!(docker.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_arguments_never_call_a_backend() {
        let ci = Arc::new(FakeCi::default());
        let docker = Arc::new(FakeDocker::default());
        let cluster = Arc::new(FakeCluster::default());
        let metrics = Arc::new(FakeMetrics::default());
        let model = Arc::new(FakeModel::default());
        let d = dispatcher(BackendContext {
            ci: Some(ci.clone()),
            containers: Some(docker.clone()),
            pods: Some(cluster.clone()),
            deployments: Some(cluster.clone()),
            metrics: Some(metrics.clone()),
            insight: Some(Arc::new(InsightAssistant::new(model.clone(), SessionScope::PerRequest))),
        });

        let registry = Registry::builtin().unwrap();
        let needs_args: Vec<_> = registry
            .descriptors()
            .into_iter()
            .filter(|desc| match desc.rule {
                ArgRule::None => false,
                ArgRule::FreeText { required, .. } => required,
                ArgRule::Positional { required, .. } => required > 0,
                ArgRule::KeyValueTail { .. } => true,
            })
            .collect();
        assert!(needs_args.len() >= 10);

        for desc in needs_args {
            let reply = d.resolve(&Invocation::new(desc.name, "")).await;
            assert!(reply.starts_with("❌ Missing required argument"), "/{}: {}", desc.name, reply);
            assert!(reply.contains(&format!("Usage: `{}`", desc.usage)), "/{}: {}", desc.name, reply);
        }

        assert_eq!(ci.call_count(), 0);
        assert_eq!(docker.call_count(), 0);
        assert!(cluster.calls().is_empty());
        assert_eq!(metrics.query_count(), 0);
        assert_eq!(model.calls(), 0);
    }
}
