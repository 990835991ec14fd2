//! Docker adapter.
//!
//! Drives the `docker` CLI rather than the engine socket so that contexts, `DOCKER_HOST` and TLS
//! material behave exactly as they do for an operator's shell.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::table::{col, Column, Table};
use super::{truncate_log, code_block, AdapterResult, Backend, BackendError, ErrorKind, Target, LOG_CHAR_BUDGET};
use crate::config::DockerConfig;
use crate::error::{Error, Result};

/// Image pulls are slow; they get this multiple of the request timeout.
const PULL_TIMEOUT_FACTOR: u32 = 10;

const CONTAINER_COLUMNS: [Column; 4] = [
    col("CONTAINER ID", 14),
    col("IMAGE", 29),
    col("STATUS", 24),
    col("NAMES", 24),
];

/// One line of `docker ps --format '{{json .}}'`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContainerSummary {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Names")]
    pub names: String,
}

/// Operations chatops needs from a container runtime.
#[async_trait]
pub trait ContainerApi: Send + Sync {
    async fn list_running(&self) -> std::result::Result<Vec<ContainerSummary>, BackendError>;
    async fn logs(&self, container: &str, tail_lines: u32) -> std::result::Result<String, BackendError>;
    async fn pull(&self, image: &str) -> std::result::Result<(), BackendError>;
    /// Start a detached container, replacing any container with the same name. Returns its id.
    async fn run(&self, image: &str, name: &str) -> std::result::Result<String, BackendError>;
}

/// `docker` CLI runner.
pub struct DockerCli {
    bin: String,
    global_args: Vec<String>,
    timeout: Duration,
}

impl DockerCli {
    pub fn new(config: &DockerConfig, timeout: Duration) -> Self {
        let mut global_args = Vec::new();
        if let Some(host) = &config.host {
            global_args.push("-H".to_string());
            global_args.push(host.clone());
        }
        if config.tls_verify {
            global_args.push("--tlsverify".to_string());
        }
        if let Some(dir) = &config.cert_path {
            for (flag, file) in [("--tlscacert", "ca.pem"), ("--tlscert", "cert.pem"), ("--tlskey", "key.pem")] {
                global_args.push(flag.to_string());
                global_args.push(dir.join(file).display().to_string());
            }
        }

        Self {
            bin: config.bin.clone(),
            global_args,
            timeout,
        }
    }

    /// Build the runner and check that the daemon answers.
    pub async fn connect(config: &DockerConfig, timeout: Duration) -> Result<Self> {
        let cli = Self::new(config, timeout);
        let version = cli
            .exec(&["version", "--format", "{{.Server.Version}}"], timeout)
            .await
            .map_err(|e| Error::Other(format!("Docker daemon not reachable: {}", e.detail)))?;
        tracing::info!("Connected to Docker daemon (server {})", version.trim());
        Ok(cli)
    }

    async fn exec(&self, args: &[&str], timeout: Duration) -> std::result::Result<String, BackendError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(&self.global_args)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!("Running {} {}", self.bin, args.join(" "));

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(BackendError::unreachable(format!("could not run `{}`: {}", self.bin, e)));
            }
            Err(_) => {
                return Err(BackendError::timeout(format!(
                    "`docker {}` did not finish within {}s",
                    args.first().copied().unwrap_or(""),
                    timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if output.status.success() {
            // `docker logs` replays the container's stderr on our stderr.
            if args.first() == Some(&"logs") && !stderr.is_empty() {
                return Ok(format!("{}{}", stdout, stderr));
            }
            Ok(stdout)
        } else {
            Err(classify_stderr(&stderr))
        }
    }
}

/// Classify a failed CLI call by its stderr.
pub fn classify_stderr(stderr: &str) -> BackendError {
    let lower = stderr.to_lowercase();
    let kind = if lower.contains("no such container")
        || lower.contains("no such image")
        || lower.contains("not found")
        || lower.contains("does not exist")
    {
        ErrorKind::NotFound
    } else if lower.contains("cannot connect to the docker daemon")
        || lower.contains("error during connect")
        || lower.contains("is the docker daemon running")
    {
        ErrorKind::Unreachable
    } else if lower.contains("permission denied") || lower.contains("unauthorized") || lower.contains("denied") {
        ErrorKind::PermissionDenied
    } else {
        ErrorKind::Unexpected
    };
    BackendError::new(kind, stderr.trim().to_string())
}

/// Parse `docker ps --format '{{json .}}'` output.
pub fn parse_ps_lines(stdout: &str) -> std::result::Result<Vec<ContainerSummary>, BackendError> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<ContainerSummary>(line)
                .map_err(|e| BackendError::unexpected(format!("unreadable `docker ps` line: {}", e)))
        })
        .collect()
}

#[async_trait]
impl ContainerApi for DockerCli {
    async fn list_running(&self) -> std::result::Result<Vec<ContainerSummary>, BackendError> {
        let out = self.exec(&["ps", "--format", "{{json .}}"], self.timeout).await?;
        parse_ps_lines(&out)
    }

    async fn logs(&self, container: &str, tail_lines: u32) -> std::result::Result<String, BackendError> {
        let tail = tail_lines.to_string();
        self.exec(&["logs", "--tail", &tail, "--", container], self.timeout).await
    }

    async fn pull(&self, image: &str) -> std::result::Result<(), BackendError> {
        self.exec(&["pull", "--quiet", "--", image], self.timeout * PULL_TIMEOUT_FACTOR)
            .await
            .map(|_| ())
    }

    async fn run(&self, image: &str, name: &str) -> std::result::Result<String, BackendError> {
        match self.exec(&["rm", "--force", "--", name], self.timeout).await {
            Ok(_) => tracing::info!("Removed existing container {}", name),
            Err(e) if e.kind == ErrorKind::NotFound => {
                tracing::debug!("No existing container {}", name);
            }
            Err(e) => return Err(e),
        }
        let out = self
            .exec(&["run", "--detach", "--name", name, "--restart", "always", "--", image], self.timeout)
            .await?;
        Ok(out.trim().to_string())
    }
}

/// Container name for an image: `registry/team/web:1.2` becomes `web-container`.
pub fn container_name_for(image: &str) -> String {
    let without_digest = image.split('@').next().unwrap_or(image);
    let last = without_digest.rsplit('/').next().unwrap_or(without_digest);
    let repo = last.split(':').next().unwrap_or(last);
    let sanitized: String = repo
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let base = if sanitized.is_empty() { "app".to_string() } else { sanitized };
    format!("{}-container", base)
}

fn short_id(id: &str) -> &str {
    let end = id.char_indices().nth(12).map(|(i, _)| i).unwrap_or(id.len());
    &id[..end]
}

/// Table of running containers.
pub async fn list_running(api: &dyn ContainerApi) -> AdapterResult {
    let target = Target::new(Backend::Docker, "list", "running containers on host", "docker");
    tracing::info!("Listing running Docker containers");

    let containers = match api.list_running().await {
        Ok(c) => c,
        Err(e) => return target.failure(e),
    };
    if containers.is_empty() {
        return AdapterResult::ok("No running Docker containers found.");
    }

    let mut table = Table::new(&CONTAINER_COLUMNS);
    for c in &containers {
        table.row([short_id(&c.id), c.image.as_str(), c.status.as_str(), c.names.as_str()]);
    }
    AdapterResult::ok(format!("Running containers:\n{}", table.render()))
}

/// Fetch container logs, keeping the tail within the log budget.
pub async fn fetch_logs(
    api: &dyn ContainerApi,
    container: &str,
    tail_lines: u32,
) -> std::result::Result<String, AdapterResult> {
    let target = Target::new(Backend::Docker, "fetch logs for", "container", container);
    api.logs(container, tail_lines)
        .await
        .map(|text| truncate_log(&text, LOG_CHAR_BUDGET))
        .map_err(|e| target.failure(e))
}

/// Recent logs of one container.
pub async fn logs(api: &dyn ContainerApi, container: &str, tail_lines: u32) -> AdapterResult {
    match fetch_logs(api, container, tail_lines).await {
        Ok(text) if text.trim().is_empty() => {
            AdapterResult::ok(format!("Container `{}` has no log output.", container))
        }
        Ok(text) => AdapterResult::ok(format!(
            "Last {} log lines of `{}`:\n{}",
            tail_lines,
            container,
            code_block(&text)
        )),
        Err(failure) => failure,
    }
}

/// Pull an image and start it. Fire-and-confirm; a failed second step is a partial failure.
pub async fn deploy(api: &dyn ContainerApi, image: &str) -> AdapterResult {
    let name = container_name_for(image);
    tracing::info!("Deploying image {} as {}", image, name);

    if let Err(e) = api.pull(image).await {
        let failure = Target::new(Backend::Docker, "pull", "image", image).failure(e);
        return AdapterResult::failed(
            failure.kind().unwrap_or(ErrorKind::Unexpected),
            format!("Deploy failed at step 1/2 (pull image): {}", failure.message()),
        );
    }

    match api.run(image, &name).await {
        Ok(id) => AdapterResult::ok(format!(
            "Deploy request accepted for `{}`.\n• Container: `{}`\n• ID: `{}`",
            image,
            name,
            short_id(&id)
        )),
        Err(e) => {
            let failure = Target::new(Backend::Docker, "start", "container", &name).failure(e);
            AdapterResult::failed(
                failure.kind().unwrap_or(ErrorKind::Unexpected),
                format!(
                    "Partial deploy: image `{}` was pulled, but step 2/2 (start container) failed: {}",
                    image,
                    failure.message()
                ),
            )
        }
    }
}
