//! Jenkins CI adapter.
//!
//! Talks to the Jenkins JSON API with basic auth (username + API token). API tokens are exempt
//! from CSRF crumbs, so build requests are plain POSTs.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

use super::{truncate_log, code_block, AdapterResult, Backend, BackendError, ErrorKind, Target, LOG_CHAR_BUDGET};
use crate::config::JenkinsConfig;
use crate::error::{Error, Result};

/// Literal build id resolving to the newest build.
pub const LAST_BUILD: &str = "lastBuild";

const PERMALINKS: [&str; 7] = [
    "lastBuild",
    "lastSuccessfulBuild",
    "lastFailedBuild",
    "lastCompletedBuild",
    "lastStableBuild",
    "lastUnstableBuild",
    "lastUnsuccessfulBuild",
];

/// A build number or one of Jenkins' permalink names.
pub fn is_valid_build_id(id: &str) -> bool {
    PERMALINKS.contains(&id) || (!id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRef {
    pub number: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    #[serde(default)]
    pub next_build_number: Option<u64>,
    #[serde(default)]
    pub last_build: Option<BuildRef>,
    #[serde(default)]
    pub last_completed_build: Option<BuildRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub building: bool,
    /// Milliseconds.
    #[serde(default)]
    pub duration: u64,
    /// Milliseconds.
    #[serde(default)]
    pub estimated_duration: u64,
    #[serde(default)]
    pub url: Option<String>,
}

/// Operations chatops needs from a CI server.
#[async_trait]
pub trait CiApi: Send + Sync {
    async fn build(&self, job: &str, params: &BTreeMap<String, String>) -> std::result::Result<(), BackendError>;
    async fn job_info(&self, job: &str) -> std::result::Result<JobInfo, BackendError>;
    async fn build_info(&self, job: &str, build: &str) -> std::result::Result<BuildInfo, BackendError>;
    async fn console_text(&self, job: &str, build: &str) -> std::result::Result<String, BackendError>;
}

/// HTTP client for one Jenkins server.
pub struct JenkinsClient {
    client: Client,
    base_url: Url,
    username: String,
    token: String,
}


impl JenkinsClient {
    pub fn new(config: &JenkinsConfig, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(config.url.trim_end_matches('/'))
            .map_err(|e| Error::config(format!("Invalid JENKINS_URL '{}': {}", config.url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::config(format!("Invalid JENKINS_URL '{}'", config.url)));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::config(format!("Failed to build Jenkins HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url,
            username: config.username.clone(),
            token: config.token.clone(),
        })
    }

    /// Build the client and verify the credentials against `/me/api/json`.
    pub async fn connect(config: &JenkinsConfig, timeout: Duration) -> Result<Self> {
        let client = Self::new(config, timeout)?;
        client.whoami().await?;
        tracing::info!("Connected to Jenkins at {}", client.base_url);
        Ok(client)
    }

    async fn whoami(&self) -> std::result::Result<(), BackendError> {
        self.get(self.endpoint("", &["me", "api", "json"])?).await?;
        Ok(())
    }

    /// URL for a job resource. `folder/job` becomes `job/folder/job/job`; every segment is
    /// percent-encoded, so `?` or `#` in a name stay part of the path.
    pub fn endpoint(&self, job: &str, tail: &[&str]) -> std::result::Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BackendError::unexpected(format!("{} cannot be a base URL", self.base_url)))?;
            segments.pop_if_empty();
            for name in job.split('/').filter(|segment| !segment.is_empty()) {
                segments.push("job").push(name);
            }
            segments.extend(tail);
        }
        Ok(url)
    }

    async fn get(&self, url: Url) -> std::result::Result<reqwest::Response, BackendError> {
        let response = self
            .client
            .get(url)
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await?;
        check_status(response)
    }
}

fn check_status(response: reqwest::Response) -> std::result::Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BackendError::new(
            ErrorKind::from_status(status.as_u16()),
            format!("{} {}", status, response.url().path()),
        ))
    }
}

#[async_trait]
impl CiApi for JenkinsClient {
    async fn build(&self, job: &str, params: &BTreeMap<String, String>) -> std::result::Result<(), BackendError> {
        let endpoint = if params.is_empty() { "build" } else { "buildWithParameters" };
        let url = self.endpoint(job, &[endpoint])?;
        let response = self
            .client
            .post(url)
            .basic_auth(&self.username, Some(&self.token))
            .form(params)
            .send()
            .await?;
        let response = check_status(response)?;
        if response.status() != StatusCode::CREATED {
            tracing::debug!("Jenkins answered {} to build request for {}", response.status(), job);
        }
        Ok(())
    }

    async fn job_info(&self, job: &str) -> std::result::Result<JobInfo, BackendError> {
        let response = self.get(self.endpoint(job, &["api", "json"])?).await?;
        response
            .json::<JobInfo>()
            .await
            .map_err(|e| BackendError::unexpected(format!("invalid job JSON: {}", e)))
    }

    async fn build_info(&self, job: &str, build: &str) -> std::result::Result<BuildInfo, BackendError> {
        let response = self.get(self.endpoint(job, &[build, "api", "json"])?).await?;
        response
            .json::<BuildInfo>()
            .await
            .map_err(|e| BackendError::unexpected(format!("invalid build JSON: {}", e)))
    }

    async fn console_text(&self, job: &str, build: &str) -> std::result::Result<String, BackendError> {
        let response = self.get(self.endpoint(job, &[build, "consoleText"])?).await?;
        Ok(response.text().await?)
    }
}

/// Start a build. Fire-and-confirm: reports the next build number, not the outcome.
pub async fn trigger(api: &dyn CiApi, job: &str, params: &BTreeMap<String, String>) -> AdapterResult {
    let target = Target::new(Backend::Jenkins, "trigger", "job", job);
    tracing::info!("Triggering Jenkins job {} with {} parameter(s)", job, params.len());

    if let Err(e) = api.build(job, params).await {
        return target.failure(e);
    }

    let next = match api.job_info(job).await {
        Ok(info) => info
            .next_build_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        Err(e) => {
            tracing::warn!("Triggered {} but could not read job info: {}", job, e);
            "N/A".to_string()
        }
    };

    let mut message = format!(
        "Trigger request sent for job `{}`. Next build should be number `{}`.",
        job, next
    );
    if !params.is_empty() {
        let rendered = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(", ");
        message.push_str(&format!("\nParameters: `{}`", rendered));
    }
    AdapterResult::ok(message)
}

/// Status of the last completed build, or of the build currently running.
pub async fn status(api: &dyn CiApi, job: &str) -> AdapterResult {
    let target = Target::new(Backend::Jenkins, "get status for", "job", job);

    let info = match api.job_info(job).await {
        Ok(info) => info,
        Err(e) => return target.failure(e),
    };

    let Some(completed) = info.last_completed_build else {
        if let Some(last) = info.last_build {
            match api.build_info(job, &last.number.to_string()).await {
                Ok(build) if build.building => {
                    return AdapterResult::ok(format!(
                        "Job `{}` build `#{}` is currently RUNNING (estimated duration: {}s).",
                        job,
                        last.number,
                        build.estimated_duration / 1000
                    ));
                }
                Ok(_) => {}
                Err(e) if e.kind == ErrorKind::NotFound => {}
                Err(e) => return target.failure(e),
            }
        }
        return AdapterResult::ok(format!(
            "Job `{}` found, but no completed builds yet (or last build is running).",
            job
        ));
    };

    let build = match api.build_info(job, &completed.number.to_string()).await {
        Ok(build) => build,
        Err(e) => return target.failure(e),
    };

    let result = build.result.as_deref().unwrap_or("UNKNOWN");
    let mut message = format!(
        "Status for `{}` (Build `#{}`): `{}` (Duration: {}s)",
        job,
        completed.number,
        result,
        build.duration / 1000
    );
    if let Some(url) = build.url {
        message.push_str(&format!("\nView build: {}", url));
    }
    AdapterResult::ok(message)
}

/// Fetch a build's console text, keeping the tail within the log budget.
pub async fn fetch_log(api: &dyn CiApi, job: &str, build: &str) -> std::result::Result<String, AdapterResult> {
    let target = Target::new(Backend::Jenkins, "fetch the console log of", "job", job);
    api.console_text(job, build)
        .await
        .map(|text| truncate_log(&text, LOG_CHAR_BUDGET))
        .map_err(|e| target.failure(e))
}

/// Console log of a build.
pub async fn log(api: &dyn CiApi, job: &str, build: &str) -> AdapterResult {
    match fetch_log(api, job, build).await {
        Ok(text) if text.trim().is_empty() => {
            AdapterResult::ok(format!("Build `{}` of `{}` has an empty console log.", build, job))
        }
        Ok(text) => AdapterResult::ok(format!(
            "Console log for `{}` (build `{}`):\n{}",
            job,
            build,
            code_block(&text)
        )),
        Err(failure) => failure,
    }
}
