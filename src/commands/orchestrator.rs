//! Kubernetes commands.

use super::args::{ParsedArgs, UsageError};
use super::unavailable;
use crate::backends::kubernetes::{self, DEFAULT_NAMESPACE};
use crate::backends::{AdapterResult, Backend};
use crate::context::BackendContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorCommand {
    Pods,
    Deployments,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorOp {
    Pods { namespace: String },
    Deployments { namespace: String },
    Restart { name: String, namespace: String },
}

fn namespace(value: Option<&str>) -> String {
    value.unwrap_or(DEFAULT_NAMESPACE).to_string()
}

impl OrchestratorCommand {
    pub fn parse(self, parsed: ParsedArgs) -> Result<OrchestratorOp, UsageError> {
        match self {
            OrchestratorCommand::Pods => Ok(OrchestratorOp::Pods {
                namespace: namespace(parsed.get(0)),
            }),
            OrchestratorCommand::Deployments => Ok(OrchestratorOp::Deployments {
                namespace: namespace(parsed.get(0)),
            }),
            OrchestratorCommand::Restart => {
                let name = parsed
                    .get(0)
                    .ok_or_else(|| UsageError::new("Missing required argument <name>."))?;
                Ok(OrchestratorOp::Restart {
                    name: name.to_string(),
                    namespace: namespace(parsed.get(1)),
                })
            }
        }
    }
}

impl OrchestratorOp {
    pub async fn invoke(self, ctx: &BackendContext) -> AdapterResult {
        match self {
            OrchestratorOp::Pods { namespace } => match ctx.pods.as_deref() {
                Some(api) => kubernetes::list_pods(api, &namespace).await,
                None => unavailable(Backend::Kubernetes),
            },
            OrchestratorOp::Deployments { namespace } => match ctx.deployments.as_deref() {
                Some(api) => kubernetes::list_deployments(api, &namespace).await,
                None => unavailable(Backend::Kubernetes),
            },
            OrchestratorOp::Restart { name, namespace } => match ctx.deployments.as_deref() {
                Some(api) => kubernetes::restart_deployment(api, &name, &namespace).await,
                None => unavailable(Backend::Kubernetes),
            },
        }
    }
}
