//! Kubernetes adapter.
//!
//! One `kube::Client` backs two capability handles: a pod reader and a deployment manager.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};

use super::table::{col, Column, Table};
use super::{AdapterResult, Backend, BackendError, ErrorKind, Target};
use crate::error::{Error, Result};

pub const DEFAULT_NAMESPACE: &str = "default";

const RESTARTED_AT: &str = "kubectl.kubernetes.io/restartedAt";

const POD_COLUMNS: [Column; 4] = [
    col("NAME", 39),
    col("STATUS", 14),
    col("RESTARTS", 9),
    col("AGE", 9),
];

const DEPLOYMENT_COLUMNS: [Column; 4] = [
    col("NAME", 39),
    col("READY", 9),
    col("UP-TO-DATE", 10),
    col("AVAILABLE", 9),
];

/// Summary of one pod.
#[derive(Debug, Clone, Default)]
pub struct PodRow {
    pub name: String,
    pub phase: String,
    pub restarts: i32,
    pub created: Option<DateTime<Utc>>,
}

impl From<Pod> for PodRow {
    fn from(pod: Pod) -> Self {
        let status = pod.status.unwrap_or_default();
        Self {
            name: pod.metadata.name.unwrap_or_default(),
            phase: status.phase.unwrap_or_else(|| "Unknown".to_string()),
            restarts: status
                .container_statuses
                .iter()
                .flatten()
                .map(|c| c.restart_count)
                .sum(),
            created: pod.metadata.creation_timestamp.map(|t| t.0),
        }
    }
}

/// Summary of one deployment.
#[derive(Debug, Clone, Default)]
pub struct DeploymentRow {
    pub name: String,
    pub desired: i32,
    pub ready: i32,
    pub updated: i32,
    pub available: i32,
}

impl From<Deployment> for DeploymentRow {
    fn from(deployment: Deployment) -> Self {
        let status = deployment.status.unwrap_or_default();
        Self {
            name: deployment.metadata.name.unwrap_or_default(),
            desired: deployment.spec.and_then(|s| s.replicas).unwrap_or(1),
            ready: status.ready_replicas.unwrap_or(0),
            updated: status.updated_replicas.unwrap_or(0),
            available: status.available_replicas.unwrap_or(0),
        }
    }
}

/// Pod-level capability.
#[async_trait]
pub trait PodReader: Send + Sync {
    async fn list_pods(&self, namespace: &str) -> std::result::Result<Vec<PodRow>, BackendError>;
}

/// Deployment-level capability.
#[async_trait]
pub trait DeploymentManager: Send + Sync {
    async fn list_deployments(&self, namespace: &str) -> std::result::Result<Vec<DeploymentRow>, BackendError>;
    async fn restart_deployment(&self, name: &str, namespace: &str) -> std::result::Result<(), BackendError>;
}

/// Cluster handle shared by both capabilities.
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    timeout: Duration,
}

impl KubeCluster {
    /// Load cluster configuration (kubeconfig, then in-cluster) and build the client.
    pub async fn connect(context: Option<&str>, timeout: Duration) -> Result<Self> {
        let config = match context {
            Some(ctx) => {
                let options = KubeConfigOptions {
                    context: Some(ctx.to_string()),
                    ..Default::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| Error::config(format!("Kubernetes context {}: {}", ctx, e)))?
            }
            None => Config::infer()
                .await
                .map_err(|e| Error::config(format!("Kubernetes configuration: {}", e)))?,
        };
        tracing::info!("Loaded Kubernetes configuration for {}", config.cluster_url);

        let client = Client::try_from(config)
            .map_err(|e| Error::config(format!("Kubernetes client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    fn list_params(&self) -> ListParams {
        let secs = u32::try_from(self.timeout.as_secs()).unwrap_or(u32::MAX).max(1);
        ListParams::default().timeout(secs)
    }

    async fn bounded<T, F>(&self, fut: F) -> std::result::Result<T, BackendError>
    where
        F: Future<Output = std::result::Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(BackendError::timeout(format!(
                "no answer from the API server within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Classify a kube error.
pub fn classify(e: kube::Error) -> BackendError {
    match e {
        kube::Error::Api(response) => BackendError::new(
            ErrorKind::from_status(response.code),
            format!("{} ({})", response.message, response.reason),
        ),
        kube::Error::Auth(e) => BackendError::new(ErrorKind::PermissionDenied, e.to_string()),
        kube::Error::SerdeError(e) => BackendError::unexpected(e.to_string()),
        other => BackendError::unreachable(other.to_string()),
    }
}

#[async_trait]
impl PodReader for KubeCluster {
    async fn list_pods(&self, namespace: &str) -> std::result::Result<Vec<PodRow>, BackendError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = self.list_params();
        let pods = self.bounded(api.list(&params)).await?;
        Ok(pods.items.into_iter().map(PodRow::from).collect())
    }
}

#[async_trait]
impl DeploymentManager for KubeCluster {
    async fn list_deployments(&self, namespace: &str) -> std::result::Result<Vec<DeploymentRow>, BackendError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let params = self.list_params();
        let deployments = self.bounded(api.list(&params)).await?;
        Ok(deployments.items.into_iter().map(DeploymentRow::from).collect())
    }

    async fn restart_deployment(&self, name: &str, namespace: &str) -> std::result::Result<(), BackendError> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({
            "spec": {
                "template": {
                    "metadata": {
                        "annotations": { RESTARTED_AT: Utc::now().to_rfc3339() }
                    }
                }
            }
        });
        let params = PatchParams::default();
        self.bounded(api.patch(name, &params, &Patch::Merge(&patch))).await?;
        Ok(())
    }
}

/// Human-readable age: `3d 4h`, `2h 5m`, `4m 10s`, `12s`.
pub fn format_age(age: chrono::Duration) -> String {
    let total = age.num_seconds().max(0);
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Pods of a namespace as a table.
pub async fn list_pods(api: &dyn PodReader, namespace: &str) -> AdapterResult {
    let target = Target::new(Backend::Kubernetes, "list pods in", "namespace", namespace);
    tracing::info!("Listing pods in namespace {}", namespace);

    let pods = match api.list_pods(namespace).await {
        Ok(p) => p,
        Err(e) => return target.failure(e),
    };
    if pods.is_empty() {
        return AdapterResult::ok(format!("No pods found in namespace `{}`.", namespace));
    }

    let now = Utc::now();
    let mut table = Table::new(&POD_COLUMNS);
    for pod in &pods {
        let age = pod
            .created
            .map(|c| format_age(now - c))
            .unwrap_or_else(|| "N/A".to_string());
        table.row([pod.name.clone(), pod.phase.clone(), pod.restarts.to_string(), age]);
    }
    AdapterResult::ok(format!("Pods in namespace `{}`:\n{}", namespace, table.render()))
}

/// Deployments of a namespace as a table.
pub async fn list_deployments(api: &dyn DeploymentManager, namespace: &str) -> AdapterResult {
    let target = Target::new(Backend::Kubernetes, "list deployments in", "namespace", namespace);
    tracing::info!("Listing deployments in namespace {}", namespace);

    let deployments = match api.list_deployments(namespace).await {
        Ok(d) => d,
        Err(e) => return target.failure(e),
    };
    if deployments.is_empty() {
        return AdapterResult::ok(format!("No deployments found in namespace `{}`.", namespace));
    }

    let mut table = Table::new(&DEPLOYMENT_COLUMNS);
    for d in &deployments {
        table.row([
            d.name.clone(),
            format!("{}/{}", d.ready, d.desired),
            d.updated.to_string(),
            d.available.to_string(),
        ]);
    }
    AdapterResult::ok(format!("Deployments in namespace `{}`:\n{}", namespace, table.render()))
}

/// Rollout restart. Fire-and-confirm: returns once the API server accepted the patch.
pub async fn restart_deployment(api: &dyn DeploymentManager, name: &str, namespace: &str) -> AdapterResult {
    let target = Target::new(Backend::Kubernetes, "restart", "deployment", name);
    tracing::info!("Restarting deployment {} in namespace {}", name, namespace);

    match api.restart_deployment(name, namespace).await {
        Ok(()) => AdapterResult::ok(format!(
            "Rollout restart requested for deployment `{}` in namespace `{}`. Pods will be replaced gradually.",
            name, namespace
        )),
        Err(e) => target.failure(e),
    }
}
