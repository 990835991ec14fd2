//! Configuration loading for chatops.
//!
//! Every setting is a CLI flag with an environment fallback. Raw values are validated into
//! per-backend configs: `None` when a backend is not configured at all, `Error::Config` when it
//! is configured only partially.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::{Error, Result};
use crate::insight::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::insight::SessionScope;

#[derive(Args, Debug, Clone, Default)]
pub struct Settings {
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_bot_token: Option<String>,

    /// Chat that receives alert notifications
    #[arg(long, env = "ALERT_CHAT_ID", allow_hyphen_values = true)]
    pub alert_chat_id: Option<i64>,

    #[command(flatten)]
    pub jenkins: JenkinsSettings,

    #[command(flatten)]
    pub docker: DockerSettings,

    /// kubeconfig context to use instead of the current one
    #[arg(long, env = "KUBE_CONTEXT")]
    pub kube_context: Option<String>,

    /// Prometheus base URL
    #[arg(long, env = "PROMETHEUS_URL")]
    pub prometheus_url: Option<String>,

    #[command(flatten)]
    pub ai: AiSettings,

    /// Timeout for every backend call, in seconds
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 15)]
    pub request_timeout_secs: u64,

    /// Seconds between alert polls
    #[arg(long, env = "ALERT_POLL_INTERVAL_SECS", default_value_t = 300)]
    pub alert_poll_interval_secs: u64,

    /// Health server bind address
    #[arg(long, env = "HEALTH_HOST", default_value = "0.0.0.0")]
    pub health_host: String,

    /// Health server port
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,
}

#[derive(Args, Debug, Clone, Default)]
pub struct JenkinsSettings {
    /// Jenkins base URL
    #[arg(long = "jenkins-url", env = "JENKINS_URL")]
    pub url: Option<String>,

    /// Jenkins user
    #[arg(long = "jenkins-username", env = "JENKINS_USERNAME")]
    pub username: Option<String>,

    /// Jenkins API token
    #[arg(long = "jenkins-api-token", env = "JENKINS_API_TOKEN", hide_env_values = true)]
    pub token: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DockerSettings {
    /// Docker CLI binary
    #[arg(long = "docker-bin", env = "DOCKER_BIN", default_value = "docker")]
    pub bin: String,

    /// Docker daemon address; the local socket when unset
    #[arg(long = "docker-host", env = "DOCKER_HOST")]
    pub host: Option<String>,

    /// Verify the daemon's TLS certificate
    #[arg(long = "docker-tls-verify", env = "DOCKER_TLS_VERIFY", action = clap::ArgAction::Set, value_parser = parse_flag, default_value = "false")]
    pub tls_verify: bool,

    /// Directory holding ca.pem, cert.pem and key.pem
    #[arg(long = "docker-cert-path", env = "DOCKER_CERT_PATH")]
    pub cert_path: Option<PathBuf>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AiSettings {
    /// Gemini API key
    #[arg(long = "gemini-api-key", env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Gemini model
    #[arg(long = "gemini-model", env = "GEMINI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Gemini API base URL
    #[arg(long = "gemini-base-url", env = "GEMINI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Conversation scope for the AI assistant
    #[arg(long = "ai-session-scope", env = "AI_SESSION_SCOPE", value_enum, default_value_t = SessionScope::PerRequest)]
    pub scope: SessionScope,
}

/// Docker's convention: any non-empty value other than `0`/`false` enables the flag.
fn parse_flag(s: &str) -> std::result::Result<bool, String> {
    Ok(!matches!(s.trim().to_ascii_lowercase().as_str(), "" | "0" | "false" | "no"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct JenkinsConfig {
    pub url: String,
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DockerConfig {
    pub bin: String,
    pub host: Option<String>,
    pub tls_verify: bool,
    pub cert_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrometheusConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub scope: SessionScope,
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn check_url(name: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::config(format!("{} must start with http:// or https:// (got '{}')", name, url)))
    }
}

impl Settings {
    /// The bot token; its absence is the only fatal configuration error.
    pub fn bot_token(&self) -> Result<String> {
        non_empty(&self.telegram_bot_token)
            .ok_or_else(|| Error::config("TELEGRAM_BOT_TOKEN is not set"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn alert_poll_interval(&self) -> Duration {
        Duration::from_secs(self.alert_poll_interval_secs.max(1))
    }

    pub fn jenkins(&self) -> Result<Option<JenkinsConfig>> {
        let url = non_empty(&self.jenkins.url);
        let username = non_empty(&self.jenkins.username);
        let token = non_empty(&self.jenkins.token);

        match (url, username, token) {
            (None, None, None) => Ok(None),
            (Some(url), Some(username), Some(token)) => {
                check_url("JENKINS_URL", &url)?;
                Ok(Some(JenkinsConfig {
                    url: url.trim_end_matches('/').to_string(),
                    username,
                    token,
                }))
            }
            (url, username, token) => {
                let missing: Vec<&str> = [
                    ("JENKINS_URL", url.is_none()),
                    ("JENKINS_USERNAME", username.is_none()),
                    ("JENKINS_API_TOKEN", token.is_none()),
                ]
                .into_iter()
                .filter_map(|(name, absent)| absent.then_some(name))
                .collect();
                Err(Error::config(format!(
                    "Jenkins is partially configured; missing {}",
                    missing.join(", ")
                )))
            }
        }
    }

    pub fn docker(&self) -> Result<DockerConfig> {
        if self.docker.tls_verify && self.docker.cert_path.is_none() {
            return Err(Error::config("DOCKER_TLS_VERIFY is set but DOCKER_CERT_PATH is not"));
        }
        Ok(DockerConfig {
            bin: self.docker.bin.clone(),
            host: non_empty(&self.docker.host),
            tls_verify: self.docker.tls_verify,
            cert_path: self.docker.cert_path.clone(),
        })
    }

    pub fn kube_context(&self) -> Option<String> {
        non_empty(&self.kube_context)
    }

    pub fn prometheus(&self) -> Result<Option<PrometheusConfig>> {
        match non_empty(&self.prometheus_url) {
            None => Ok(None),
            Some(url) => {
                check_url("PROMETHEUS_URL", &url)?;
                Ok(Some(PrometheusConfig {
                    url: url.trim_end_matches('/').to_string(),
                }))
            }
        }
    }

    pub fn ai(&self) -> Option<AiConfig> {
        non_empty(&self.ai.api_key).map(|api_key| AiConfig {
            api_key,
            model: self.ai.model.clone(),
            base_url: self.ai.base_url.clone(),
            scope: self.ai.scope,
        })
    }

    pub fn alert_chat_id(&self) -> Option<i64> {
        self.alert_chat_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        settings: Settings,
    }

    fn parse(args: &[&str]) -> Settings {
        let mut argv = vec!["chatops"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().settings
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&[]);
        assert_eq!(settings.request_timeout(), Duration::from_secs(15));
        assert_eq!(settings.alert_poll_interval(), Duration::from_secs(300));
        assert_eq!(settings.port, 3000);
        assert_eq!(settings.ai.model, "gemini-2.0-flash");
        assert_eq!(settings.ai.scope, SessionScope::PerRequest);
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let settings = Settings::default();
        assert!(matches!(settings.bot_token(), Err(Error::Config(_))));
    }

    #[test]
    fn test_absent_jenkins_is_none() {
        assert_eq!(Settings::default().jenkins().unwrap(), None);
    }

    #[test]
    fn test_partial_jenkins_is_a_config_error() {
        let settings = parse(&["--jenkins-url", "https://ci.example.com", "--jenkins-username", "bot"]);
        let err = settings.jenkins().unwrap_err().to_string();
        assert!(err.contains("JENKINS_API_TOKEN"));
        assert!(!err.contains("JENKINS_URL,"));
    }

    #[test]
    fn test_full_jenkins_trims_trailing_slash() {
        let settings = parse(&[
            "--jenkins-url",
            "https://ci.example.com/",
            "--jenkins-username",
            "bot",
            "--jenkins-api-token",
            "secret",
        ]);
        let jenkins = settings.jenkins().unwrap().unwrap();
        assert_eq!(jenkins.url, "https://ci.example.com");
    }

    #[test]
    fn test_prometheus_url_must_be_http() {
        let settings = parse(&["--prometheus-url", "prometheus:9090"]);
        assert!(settings.prometheus().is_err());
    }

    #[test]
    fn test_docker_tls_needs_cert_path() {
        let settings = parse(&["--docker-tls-verify", "1"]);
        assert!(settings.docker().is_err());
        let settings = parse(&["--docker-tls-verify", "1", "--docker-cert-path", "/certs"]);
        assert!(settings.docker().unwrap().tls_verify);
    }

    #[test]
    fn test_session_scope_values() {
        let settings = parse(&["--ai-session-scope", "shared", "--gemini-api-key", "k"]);
        assert_eq!(settings.ai().unwrap().scope, SessionScope::Shared);
    }
}
