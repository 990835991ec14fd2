//! Backend adapters.
//!
//! Every adapter operation returns an [`AdapterResult`]. The low-level clients behind them return
//! `Result<T, BackendError>`, and the adapter functions turn those into chat-ready text that
//! names the operation, the target and the class of failure.

use std::fmt;

use thiserror::Error;

pub mod docker;
pub mod jenkins;
pub mod kubernetes;
pub mod prometheus;
pub mod table;

/// Character budget for log payloads shown in chat.
pub const LOG_CHAR_BUDGET: usize = 3000;

/// The external systems chatops talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Jenkins,
    Docker,
    Kubernetes,
    Prometheus,
    Ai,
}

impl Backend {
    pub fn display_name(&self) -> &'static str {
        match self {
            Backend::Jenkins => "Jenkins",
            Backend::Docker => "the Docker daemon",
            Backend::Kubernetes => "Kubernetes",
            Backend::Prometheus => "Prometheus",
            Backend::Ai => "the AI assistant",
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Backend::Jenkins => "jenkins",
            Backend::Docker => "docker",
            Backend::Kubernetes => "kubernetes",
            Backend::Prometheus => "prometheus",
            Backend::Ai => "ai",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Classified backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    PermissionDenied,
    Unreachable,
    Timeout,
    Api { status: u16 },
    Unexpected,
}

impl ErrorKind {
    /// Map an HTTP status code to a kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => ErrorKind::NotFound,
            401 | 403 => ErrorKind::PermissionDenied,
            502..=504 => ErrorKind::Unreachable,
            _ => ErrorKind::Api { status },
        }
    }
}

#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {detail}")]
pub struct BackendError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl BackendError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, detail)
    }

    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unreachable, detail)
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, detail)
    }

    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, detail)
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        let kind = if e.is_timeout() {
            ErrorKind::Timeout
        } else if e.is_connect() || e.is_request() {
            ErrorKind::Unreachable
        } else if let Some(status) = e.status() {
            ErrorKind::from_status(status.as_u16())
        } else {
            ErrorKind::Unexpected
        };
        BackendError::new(kind, e.to_string())
    }
}

/// Normalized outcome of one adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterResult {
    Ok(String),
    Failed { kind: ErrorKind, message: String },
}

impl AdapterResult {
    pub fn ok(message: impl Into<String>) -> Self {
        AdapterResult::Ok(message.into())
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        AdapterResult::Failed {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, AdapterResult::Ok(_))
    }

    pub fn message(&self) -> &str {
        match self {
            AdapterResult::Ok(m) => m,
            AdapterResult::Failed { message, .. } => message,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AdapterResult::Ok(_) => None,
            AdapterResult::Failed { kind, .. } => Some(*kind),
        }
    }

    /// Prefix a successful payload; failures pass through untouched.
    pub fn map_ok(self, f: impl FnOnce(String) -> String) -> Self {
        match self {
            AdapterResult::Ok(m) => AdapterResult::Ok(f(m)),
            failed => failed,
        }
    }
}

/// What an adapter was doing when it failed, used to phrase the error.
#[derive(Debug, Clone)]
pub struct Target<'a> {
    pub backend: Backend,
    /// Verb phrase, e.g. "list pods in".
    pub action: &'a str,
    /// Noun for the target, e.g. "namespace".
    pub noun: &'a str,
    pub name: &'a str,
}

impl<'a> Target<'a> {
    pub fn new(backend: Backend, action: &'a str, noun: &'a str, name: &'a str) -> Self {
        Self {
            backend,
            action,
            noun,
            name,
        }
    }

    /// Turn a classified backend error into a user-facing failure.
    pub fn failure(&self, err: BackendError) -> AdapterResult {
        tracing::error!(
            backend = self.backend.key(),
            kind = ?err.kind,
            "Failed to {} {} {}: {}",
            self.action,
            self.noun,
            self.name,
            err.detail
        );
        let message = match err.kind {
            ErrorKind::NotFound => {
                format!("Error: {} `{}` not found.", capitalize(self.noun), self.name)
            }
            ErrorKind::PermissionDenied => format!(
                "Error: insufficient permissions to {} {} `{}`.",
                self.action, self.noun, self.name
            ),
            ErrorKind::Unreachable => format!(
                "Error: could not {} {} `{}`: {} is unreachable ({}).",
                self.action, self.noun, self.name, self.backend, err.detail
            ),
            ErrorKind::Timeout => format!(
                "Error: could not {} {} `{}`: {} is unreachable (request timed out).",
                self.action, self.noun, self.name, self.backend
            ),
            ErrorKind::Api { status } => format!(
                "Error trying to {} {} `{}` (API error {}). Check bot logs.",
                self.action, self.noun, self.name, status
            ),
            ErrorKind::Unexpected => format!(
                "An unexpected error occurred while trying to {} {} `{}`: {}",
                self.action, self.noun, self.name, err.detail
            ),
        };
        AdapterResult::failed(err.kind, message)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Keep the tail of a log within `budget` characters.
///
/// Over-budget input gets a notice naming the original and shown sizes.
pub fn truncate_log(log: &str, budget: usize) -> String {
    let total = log.chars().count();
    if total <= budget {
        return log.to_string();
    }
    let skip = total - budget;
    let start = log
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(log.len());
    format!(
        "(log truncated: showing last {} of {} characters)\n{}",
        budget,
        total,
        &log[start..]
    )
}

/// Wrap text in a monospace block.
pub fn code_block(text: &str) -> String {
    format!("```\n{}\n```", text.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_unreachable_read_differently() {
        let target = Target::new(Backend::Kubernetes, "list pods in", "namespace", "prod");
        let missing = target.failure(BackendError::not_found("namespaces \"prod\" not found"));
        let down = target.failure(BackendError::unreachable("connection refused"));

        assert!(!missing.is_ok());
        assert!(!down.is_ok());
        assert_eq!(missing.message(), "Error: Namespace `prod` not found.");
        assert!(down.message().contains("unreachable"));
        assert_ne!(missing.message(), down.message());
    }

    #[test]
    fn timeout_is_reported_as_unreachable() {
        let target = Target::new(Backend::Jenkins, "get status for", "job", "build-app");
        let result = target.failure(BackendError::timeout("operation timed out"));
        assert_eq!(result.kind(), Some(ErrorKind::Timeout));
        assert!(result.message().contains("Jenkins is unreachable (request timed out)"));
    }

    #[test]
    fn status_codes_are_classified() {
        assert_eq!(ErrorKind::from_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_status(403), ErrorKind::PermissionDenied);
        assert_eq!(ErrorKind::from_status(401), ErrorKind::PermissionDenied);
        assert_eq!(ErrorKind::from_status(503), ErrorKind::Unreachable);
        assert_eq!(ErrorKind::from_status(500), ErrorKind::Api { status: 500 });
    }

    #[test]
    fn short_logs_are_returned_verbatim() {
        let log = "line one\nline two";
        assert_eq!(truncate_log(log, 100), log);
    }

    #[test]
    fn long_logs_keep_the_tail() {
        let log: String = (0..50).map(|i| format!("{:02}", i)).collect();
        let out = truncate_log(&log, 10);
        assert!(out.starts_with("(log truncated: showing last 10 of 100 characters)"));
        assert!(out.ends_with("4546474849"));
        assert!(!out.contains("0001"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let log = "ééééé";
        let out = truncate_log(log, 2);
        assert!(out.ends_with("éé"));
        assert!(out.contains("of 5 characters"));
    }

    #[test]
    fn map_ok_leaves_failures_alone() {
        let failed = AdapterResult::failed(ErrorKind::Unexpected, "boom");
        assert_eq!(failed.clone().map_ok(|m| format!("x{}", m)), failed);
        let ok = AdapterResult::ok("done").map_ok(|m| format!("Result: {}", m));
        assert_eq!(ok.message(), "Result: done");
    }
}
