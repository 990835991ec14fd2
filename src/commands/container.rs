//! Docker commands.

use super::args::{self, ParsedArgs, UsageError};
use super::unavailable;
use crate::backends::{docker, AdapterResult, Backend};
use crate::context::BackendContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerCommand {
    List,
    Logs,
    Deploy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerOp {
    List,
    Logs { container: String, lines: u32 },
    Deploy { image: String },
}

impl ContainerCommand {
    pub fn parse(self, parsed: ParsedArgs) -> Result<ContainerOp, UsageError> {
        match self {
            ContainerCommand::List => Ok(ContainerOp::List),
            ContainerCommand::Logs => Ok(ContainerOp::Logs {
                container: args::docker_ref("container", parsed.get(0))?,
                lines: args::lines(parsed.get(1))?,
            }),
            ContainerCommand::Deploy => Ok(ContainerOp::Deploy {
                image: args::docker_ref("image", parsed.get(0))?,
            }),
        }
    }
}

impl ContainerOp {
    pub async fn invoke(self, ctx: &BackendContext) -> AdapterResult {
        let Some(api) = ctx.containers.as_deref() else {
            return unavailable(Backend::Docker);
        };
        match self {
            ContainerOp::List => docker::list_running(api).await,
            ContainerOp::Logs { container, lines } => docker::logs(api, &container, lines).await,
            ContainerOp::Deploy { image } => docker::deploy(api, &image).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_takes_one_image() {
        let op = ContainerCommand::Deploy
            .parse(ParsedArgs::Text(Some("nginx:1.27".to_string())))
            .unwrap();
        assert_eq!(op, ContainerOp::Deploy { image: "nginx:1.27".to_string() });

        let err = ContainerCommand::Deploy
            .parse(ParsedArgs::Text(Some("nginx latest".to_string())))
            .unwrap_err();
        assert!(err.to_string().contains("single word"));
    }

    #[test]
    fn test_flag_like_names_are_usage_errors() {
        let err = ContainerCommand::Deploy
            .parse(ParsedArgs::Text(Some("--help".to_string())))
            .unwrap_err();
        assert!(err.to_string().contains("option-like"));

        let parsed = ParsedArgs::Positional(vec!["--timestamps".to_string()]);
        assert!(ContainerCommand::Logs.parse(parsed).is_err());
    }

    #[test]
    fn test_logs_line_count() {
        let parsed = ParsedArgs::Positional(vec!["web".to_string(), "20".to_string()]);
        assert_eq!(
            ContainerCommand::Logs.parse(parsed).unwrap(),
            ContainerOp::Logs { container: "web".to_string(), lines: 20 }
        );
    }
}
