//! Command registry.
//!
//! Every chat command is described by a [`Descriptor`]: its name, how its text is parsed, which
//! handler family runs it and how it is explained in `/help`. The registry is built once at
//! startup and never changes afterwards.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

pub mod args;
pub mod ci;
pub mod container;
pub mod dispatch;
pub mod insight;
pub mod metrics;
pub mod orchestrator;

pub use args::{ArgRule, ParsedArgs, UsageError};
pub use dispatch::{Dispatcher, Invocation, Responder};

use crate::backends::{AdapterResult, Backend, ErrorKind};
use crate::context::BackendContext;
use args::{arg, ArgSpec};
use ci::{CiCommand, CiOp};
use container::{ContainerCommand, ContainerOp};
use insight::{InsightCommand, InsightOp};
use metrics::{MetricsCommand, MetricsOp};
use orchestrator::{OrchestratorCommand, OrchestratorOp};

/// Handler family of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Ci(CiCommand),
    Container(ContainerCommand),
    Orchestrator(OrchestratorCommand),
    Metrics(MetricsCommand),
    Insight(InsightCommand),
}

/// A parsed, validated invocation ready to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Help(Option<String>),
    Ci(CiOp),
    Container(ContainerOp),
    Orchestrator(OrchestratorOp),
    Metrics(MetricsOp),
    Insight(InsightOp),
}

impl Command {
    /// Backends that must be available before the handler runs.
    pub fn backends(self) -> &'static [Backend] {
        match self {
            Command::Help => &[],
            Command::Ci(_) => &[Backend::Jenkins],
            Command::Container(_) => &[Backend::Docker],
            Command::Orchestrator(_) => &[Backend::Kubernetes],
            Command::Metrics(_) => &[Backend::Prometheus],
            Command::Insight(c) => c.backends(),
        }
    }

    pub fn parse(self, parsed: ParsedArgs) -> Result<Operation, UsageError> {
        Ok(match self {
            Command::Help => Operation::Help(parsed.get(0).map(|t| t.trim_start_matches('/').to_string())),
            Command::Ci(c) => Operation::Ci(c.parse(parsed)?),
            Command::Container(c) => Operation::Container(c.parse(parsed)?),
            Command::Orchestrator(c) => Operation::Orchestrator(c.parse(parsed)?),
            Command::Metrics(c) => Operation::Metrics(c.parse(parsed)?),
            Command::Insight(c) => Operation::Insight(c.parse(parsed)?),
        })
    }
}

impl Operation {
    pub async fn invoke(self, ctx: &BackendContext, registry: &Registry) -> AdapterResult {
        match self {
            Operation::Help(topic) => AdapterResult::ok(registry.help(topic.as_deref())),
            Operation::Ci(op) => op.invoke(ctx).await,
            Operation::Container(op) => op.invoke(ctx).await,
            Operation::Orchestrator(op) => op.invoke(ctx).await,
            Operation::Metrics(op) => op.invoke(ctx).await,
            Operation::Insight(op) => op.invoke(ctx).await,
        }
    }
}

/// Fixed reply for a command whose backend never initialized.
pub fn unavailable(backend: Backend) -> AdapterResult {
    AdapterResult::failed(
        ErrorKind::Unreachable,
        format!(
            "Service unavailable: {} is not configured or failed to initialize. Check the bot's configuration.",
            backend.display_name()
        ),
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct Descriptor {
    pub name: &'static str,
    pub summary: &'static str,
    pub usage: &'static str,
    pub examples: &'static [&'static str],
    pub notes: &'static str,
    #[serde(skip)]
    pub rule: ArgRule,
    #[serde(skip)]
    pub command: Command,
    #[serde(skip)]
    pub glyph: &'static str,
}

impl Descriptor {
    /// Name as Telegram accepts it in a command menu (`[a-z0-9_]`).
    pub fn menu_name(&self) -> String {
        self.name.replace('-', "_")
    }

    pub fn help_text(&self) -> String {
        let mut text = format!("`{}`\n{}", self.usage, self.summary);
        if !self.examples.is_empty() {
            text.push_str("\n\nExamples:");
            for example in self.examples {
                text.push_str(&format!("\n`{}`", example));
            }
        }
        if !self.notes.is_empty() {
            text.push_str(&format!("\n\nNote: {}", self.notes));
        }
        text
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("command '{0}' is already registered")]
pub struct DuplicateCommand(pub String);

#[derive(Debug, Default)]
pub struct Registry {
    commands: HashMap<&'static str, Descriptor>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: Descriptor) -> Result<(), DuplicateCommand> {
        if self.commands.contains_key(descriptor.name) {
            return Err(DuplicateCommand(descriptor.name.to_string()));
        }
        self.commands.insert(descriptor.name, descriptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Descriptor> {
        self.commands.get(name)
    }

    /// Command names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.commands.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Descriptors in name order.
    pub fn descriptors(&self) -> Vec<&Descriptor> {
        self.names().into_iter().filter_map(|n| self.lookup(n)).collect()
    }

    /// Help for one command, or the full listing when the name is absent or unknown.
    pub fn help(&self, name: Option<&str>) -> String {
        match name.map(|n| n.trim_start_matches('/')) {
            Some(n) => match self.lookup(n) {
                Some(descriptor) => descriptor.help_text(),
                None => format!("No help available for `{}`.\n\n{}", n, self.listing()),
            },
            None => self.listing(),
        }
    }

    fn listing(&self) -> String {
        let lines: Vec<String> = self
            .descriptors()
            .iter()
            .map(|d| format!("/{} - {}", d.name, d.summary))
            .collect();
        format!(
            "Available commands:\n{}\n\nSend `/help <command>` for usage and examples.",
            lines.join("\n")
        )
    }

    /// The registry with every built-in command.
    pub fn builtin() -> Result<Self, DuplicateCommand> {
        let mut registry = Self::new();
        for descriptor in builtin_descriptors() {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }
}

const LISTING: &str = "📋";
const ACTION: &str = "✅";
const METRICS: &str = "📊";
const AI: &str = "🤖";
const INFO: &str = "ℹ️";

const JOB_BUILD: &[ArgSpec] = &[arg("job"), arg("build")];
const CONTAINER_LINES: &[ArgSpec] = &[arg("container"), arg("lines")];
const NAMESPACE: &[ArgSpec] = &[arg("namespace")];
const NAME_NAMESPACE: &[ArgSpec] = &[arg("name"), arg("namespace")];
const DURATION: &[ArgSpec] = &[arg("duration")];
const METRIC_DURATION: &[ArgSpec] = &[arg("metric"), arg("duration")];

fn builtin_descriptors() -> Vec<Descriptor> {
    vec![
        Descriptor {
            name: "help",
            summary: "List commands or show help for one",
            usage: "/help [command]",
            examples: &["/help", "/help k8s-pods"],
            notes: "",
            rule: ArgRule::FreeText { name: "command", required: false },
            command: Command::Help,
            glyph: INFO,
        },
        Descriptor {
            name: "jenkins-trigger",
            summary: "Trigger a Jenkins job",
            usage: "/jenkins-trigger <job> [key=value ...]",
            examples: &["/jenkins-trigger build-app", "/jenkins-trigger deploy-app env=prod version=1.4.2"],
            notes: "With parameters the job is started through buildWithParameters. Tokens without '=' are ignored.",
            rule: ArgRule::KeyValueTail { head: "job" },
            command: Command::Ci(CiCommand::Trigger),
            glyph: ACTION,
        },
        Descriptor {
            name: "jenkins-status",
            summary: "Status of a job's last completed build",
            usage: "/jenkins-status <job>",
            examples: &["/jenkins-status build-app", "/jenkins-status team/build-app"],
            notes: "Folder jobs are written folder/job.",
            rule: ArgRule::FreeText { name: "job", required: true },
            command: Command::Ci(CiCommand::Status),
            glyph: LISTING,
        },
        Descriptor {
            name: "jenkins-log",
            summary: "Console log of a build",
            usage: "/jenkins-log <job> [build]",
            examples: &["/jenkins-log build-app", "/jenkins-log build-app 42", "/jenkins-log build-app lastFailedBuild"],
            notes: "Build defaults to lastBuild. Long logs show the last 3000 characters.",
            rule: ArgRule::Positional { args: JOB_BUILD, required: 1 },
            command: Command::Ci(CiCommand::Log),
            glyph: LISTING,
        },
        Descriptor {
            name: "docker-ps",
            summary: "List running containers",
            usage: "/docker-ps",
            examples: &["/docker-ps"],
            notes: "",
            rule: ArgRule::None,
            command: Command::Container(ContainerCommand::List),
            glyph: LISTING,
        },
        Descriptor {
            name: "docker-logs",
            summary: "Recent logs of a container",
            usage: "/docker-logs <container> [lines]",
            examples: &["/docker-logs web", "/docker-logs web 500"],
            notes: "Lines default to 100 (max 5000). Long logs show the last 3000 characters.",
            rule: ArgRule::Positional { args: CONTAINER_LINES, required: 1 },
            command: Command::Container(ContainerCommand::Logs),
            glyph: LISTING,
        },
        Descriptor {
            name: "docker-deploy",
            summary: "Pull an image and start a container from it",
            usage: "/docker-deploy <image>",
            examples: &["/docker-deploy nginx:1.27"],
            notes: "The container is named after the image and restarts automatically.",
            rule: ArgRule::FreeText { name: "image", required: true },
            command: Command::Container(ContainerCommand::Deploy),
            glyph: ACTION,
        },
        Descriptor {
            name: "k8s-pods",
            summary: "List pods in a namespace",
            usage: "/k8s-pods [namespace]",
            examples: &["/k8s-pods", "/k8s-pods kube-system"],
            notes: "Namespace defaults to default.",
            rule: ArgRule::Positional { args: NAMESPACE, required: 0 },
            command: Command::Orchestrator(OrchestratorCommand::Pods),
            glyph: LISTING,
        },
        Descriptor {
            name: "k8s-deployments",
            summary: "List deployments in a namespace",
            usage: "/k8s-deployments [namespace]",
            examples: &["/k8s-deployments", "/k8s-deployments staging"],
            notes: "Namespace defaults to default.",
            rule: ArgRule::Positional { args: NAMESPACE, required: 0 },
            command: Command::Orchestrator(OrchestratorCommand::Deployments),
            glyph: LISTING,
        },
        Descriptor {
            name: "k8s-restart-deployment",
            summary: "Rolling restart of a deployment",
            usage: "/k8s-restart-deployment <name> [namespace]",
            examples: &["/k8s-restart-deployment web", "/k8s-restart-deployment web staging"],
            notes: "Namespace is positional: write `web staging`, not `web namespace=staging`.",
            rule: ArgRule::Positional { args: NAME_NAMESPACE, required: 1 },
            command: Command::Orchestrator(OrchestratorCommand::Restart),
            glyph: ACTION,
        },
        Descriptor {
            name: "metrics-status",
            summary: "Health of Prometheus scrape targets",
            usage: "/metrics-status",
            examples: &["/metrics-status"],
            notes: "",
            rule: ArgRule::None,
            command: Command::Metrics(MetricsCommand::Status),
            glyph: METRICS,
        },
        Descriptor {
            name: "metrics-query",
            summary: "Run a PromQL instant query",
            usage: "/metrics-query <expression>",
            examples: &["/metrics-query up", "/metrics-query sum by (pod) (rate(http_requests_total[5m]))"],
            notes: "",
            rule: ArgRule::FreeText { name: "expression", required: true },
            command: Command::Metrics(MetricsCommand::Query),
            glyph: METRICS,
        },
        Descriptor {
            name: "metrics-alerts",
            summary: "Alerts currently firing",
            usage: "/metrics-alerts",
            examples: &["/metrics-alerts"],
            notes: "",
            rule: ArgRule::None,
            command: Command::Metrics(MetricsCommand::Alerts),
            glyph: METRICS,
        },
        Descriptor {
            name: "ai-analyze-build",
            summary: "AI analysis of a build's console log",
            usage: "/ai-analyze-build <job> [build]",
            examples: &["/ai-analyze-build build-app", "/ai-analyze-build build-app lastFailedBuild"],
            notes: "Build defaults to lastBuild.",
            rule: ArgRule::Positional { args: JOB_BUILD, required: 1 },
            command: Command::Insight(InsightCommand::AnalyzeBuild),
            glyph: AI,
        },
        Descriptor {
            name: "ai-analyze-container",
            summary: "AI analysis of a container's logs",
            usage: "/ai-analyze-container <container> [lines]",
            examples: &["/ai-analyze-container web", "/ai-analyze-container web 300"],
            notes: "Lines default to 100 (max 5000).",
            rule: ArgRule::Positional { args: CONTAINER_LINES, required: 1 },
            command: Command::Insight(InsightCommand::AnalyzeContainer),
            glyph: AI,
        },
        Descriptor {
            name: "ai-optimize",
            summary: "AI optimization suggestions from CPU usage",
            usage: "/ai-optimize [duration]",
            examples: &["/ai-optimize", "/ai-optimize 6h"],
            notes: "Duration uses Prometheus syntax and defaults to 1h.",
            rule: ArgRule::Positional { args: DURATION, required: 0 },
            command: Command::Insight(InsightCommand::Optimize),
            glyph: AI,
        },
        Descriptor {
            name: "ai-anomalies",
            summary: "AI anomaly prediction for a metric",
            usage: "/ai-anomalies <metric> [duration]",
            examples: &["/ai-anomalies node_load1", "/ai-anomalies http_requests_total 24h"],
            notes: "Duration uses Prometheus syntax and defaults to 1h.",
            rule: ArgRule::Positional { args: METRIC_DURATION, required: 1 },
            command: Command::Insight(InsightCommand::Anomalies),
            glyph: AI,
        },
        Descriptor {
            name: "ai-incident-report",
            summary: "AI-written incident report",
            usage: "/ai-incident-report <incident> [key=value ...]",
            examples: &["/ai-incident-report db-outage severity=high duration=45m service=orders"],
            notes: "",
            rule: ArgRule::KeyValueTail { head: "incident" },
            command: Command::Insight(InsightCommand::IncidentReport),
            glyph: AI,
        },
        Descriptor {
            name: "ai-workflow",
            summary: "AI suggestions for a DevOps workflow",
            usage: "/ai-workflow <workflow> [key=value ...]",
            examples: &["/ai-workflow release stages=build,test,deploy approvals=2"],
            notes: "",
            rule: ArgRule::KeyValueTail { head: "workflow" },
            command: Command::Insight(InsightCommand::Workflow),
            glyph: AI,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry() {
        let registry = Registry::builtin().unwrap();
        assert_eq!(registry.names().len(), 19);
        assert!(registry.lookup("jenkins-trigger").is_some());
        assert!(registry.lookup("jenkins_trigger").is_none());
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = Registry::new();
        let descriptor = builtin_descriptors().remove(0);
        registry.register(descriptor.clone()).unwrap();
        assert_eq!(
            registry.register(descriptor),
            Err(DuplicateCommand("help".to_string()))
        );
    }

    #[test]
    fn test_help_for_known_command() {
        let registry = Registry::builtin().unwrap();
        let text = registry.help(Some("/k8s-restart-deployment"));
        assert!(text.starts_with("`/k8s-restart-deployment <name> [namespace]`"));
        assert!(text.contains("Examples:"));
    }

    #[test]
    fn test_help_for_unknown_command_lists_everything() {
        let registry = Registry::builtin().unwrap();
        let text = registry.help(Some("deploy-everything"));
        assert!(text.starts_with("No help available for `deploy-everything`."));
        for name in registry.names() {
            assert!(text.contains(&format!("/{} ", name)));
        }
    }

    #[test]
    fn test_menu_names_are_telegram_safe() {
        let registry = Registry::builtin().unwrap();
        for d in registry.descriptors() {
            let menu = d.menu_name();
            assert!(menu.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
        }
    }

    #[test]
    fn test_every_command_needs_its_family_backend() {
        let registry = Registry::builtin().unwrap();
        let restart = registry.lookup("k8s-restart-deployment").unwrap();
        assert_eq!(restart.command.backends(), &[Backend::Kubernetes]);
        let analyze = registry.lookup("ai-analyze-container").unwrap();
        assert_eq!(analyze.command.backends(), &[Backend::Docker, Backend::Ai]);
        assert!(registry.lookup("help").unwrap().command.backends().is_empty());
    }
}
