//! Backend handles shared by the dispatcher, the alert poller and the health server.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use crate::backends::docker::{ContainerApi, DockerCli};
use crate::backends::jenkins::{CiApi, JenkinsClient};
use crate::backends::kubernetes::{DeploymentManager, KubeCluster, PodReader};
use crate::backends::prometheus::{MetricsApi, PrometheusClient};
use crate::backends::Backend;
use crate::config::Settings;
use crate::insight::{GeminiModel, InsightAssistant};

/// Every backend that initialized successfully at startup.
///
/// A missing handle means the backend was not configured or failed to connect; commands that
/// need it answer with a fixed "service unavailable" reply.
#[derive(Clone, Default)]
pub struct BackendContext {
    pub ci: Option<Arc<dyn CiApi>>,
    pub containers: Option<Arc<dyn ContainerApi>>,
    pub pods: Option<Arc<dyn PodReader>>,
    pub deployments: Option<Arc<dyn DeploymentManager>>,
    pub metrics: Option<Arc<dyn MetricsApi>>,
    pub insight: Option<Arc<InsightAssistant>>,
}

fn degraded(backend: Backend, err: impl Display) {
    tracing::warn!(backend = backend.key(), "{} unavailable: {}", backend.display_name(), err);
}

impl BackendContext {
    /// Initialize every configured backend. Failures are logged and leave the handle empty.
    pub async fn connect(settings: &Settings) -> Self {
        let timeout = settings.request_timeout();
        let mut ctx = Self::default();

        match settings.jenkins() {
            Ok(Some(config)) => match JenkinsClient::connect(&config, timeout).await {
                Ok(client) => ctx.ci = Some(Arc::new(client)),
                Err(e) => degraded(Backend::Jenkins, e),
            },
            Ok(None) => tracing::info!("Jenkins not configured"),
            Err(e) => degraded(Backend::Jenkins, e),
        }

        match settings.docker() {
            Ok(config) => match DockerCli::connect(&config, timeout).await {
                Ok(cli) => ctx.containers = Some(Arc::new(cli)),
                Err(e) => degraded(Backend::Docker, e),
            },
            Err(e) => degraded(Backend::Docker, e),
        }

        match KubeCluster::connect(settings.kube_context().as_deref(), timeout).await {
            Ok(cluster) => {
                let cluster = Arc::new(cluster);
                ctx.pods = Some(cluster.clone());
                ctx.deployments = Some(cluster);
            }
            Err(e) => degraded(Backend::Kubernetes, e),
        }

        match settings.prometheus() {
            Ok(Some(config)) => match PrometheusClient::new(&config, timeout) {
                Ok(client) => ctx.metrics = Some(Arc::new(client)),
                Err(e) => degraded(Backend::Prometheus, e),
            },
            Ok(None) => tracing::info!("Prometheus not configured"),
            Err(e) => degraded(Backend::Prometheus, e),
        }

        match settings.ai() {
            Some(config) => match GeminiModel::new(&config, timeout) {
                Ok(model) => {
                    tracing::info!("AI assistant using {} ({:?} sessions)", config.model, config.scope);
                    ctx.insight = Some(Arc::new(InsightAssistant::new(Arc::new(model), config.scope)));
                }
                Err(e) => degraded(Backend::Ai, e),
            },
            None => tracing::info!("GEMINI_API_KEY not set; AI commands disabled"),
        }

        ctx
    }

    pub fn available(&self, backend: Backend) -> bool {
        match backend {
            Backend::Jenkins => self.ci.is_some(),
            Backend::Docker => self.containers.is_some(),
            Backend::Kubernetes => self.pods.is_some() && self.deployments.is_some(),
            Backend::Prometheus => self.metrics.is_some(),
            Backend::Ai => self.insight.is_some(),
        }
    }

    /// Availability of every backend, keyed by [`Backend::key`].
    pub fn status(&self) -> BTreeMap<&'static str, bool> {
        [
            Backend::Jenkins,
            Backend::Docker,
            Backend::Kubernetes,
            Backend::Prometheus,
            Backend::Ai,
        ]
        .into_iter()
        .map(|b| (b.key(), self.available(b)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::prometheus::tests::FakeMetrics;

    #[test]
    fn test_empty_context_has_nothing() {
        let ctx = BackendContext::default();
        assert!(ctx.status().values().all(|up| !up));
    }

    #[test]
    fn test_status_reflects_handles() {
        let ctx = BackendContext {
            metrics: Some(Arc::new(FakeMetrics::default())),
            ..Default::default()
        };
        let status = ctx.status();
        assert_eq!(status.get("prometheus"), Some(&true));
        assert_eq!(status.get("jenkins"), Some(&false));
        assert_eq!(status.len(), 5);
    }
}
