//! CLI for chatops using clap.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use teloxide::Bot;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertPoller;
use crate::commands::{Dispatcher, Invocation, Registry, Responder};
use crate::config::Settings;
use crate::context::BackendContext;
use crate::telegram::{self, TelegramSender};
use crate::web::{run_server, HealthServerConfig};

/// chatops - run Jenkins, Docker, Kubernetes, Prometheus and AI operations from Telegram.
#[derive(Parser)]
#[command(name = "chatops")]
#[command(version)]
#[command(about = "Telegram operations console", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the Telegram gateway, alert poller and health server (default)
    Serve,

    /// Print the command reference
    Commands {
        /// Show usage and examples for one command
        name: Option<String>,
    },

    /// Run one chat command locally and print its reply
    Exec {
        /// Command name, e.g. k8s-pods
        command: String,

        /// Argument text
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

impl Cli {
    /// Whether this invocation runs the long-lived service.
    pub fn is_serve(&self) -> bool {
        matches!(self.command, None | Some(Command::Serve))
    }

    pub async fn run(self) -> Result<()> {
        match self.command.unwrap_or(Command::Serve) {
            Command::Serve => serve(self.settings).await,
            Command::Commands { name } => {
                let registry = Registry::builtin()?;
                println!("{}", registry.help(name.as_deref()));
                Ok(())
            }
            Command::Exec { command, args } => exec(self.settings, &command, &args.join(" ")).await,
        }
    }
}

async fn serve(settings: Settings) -> Result<()> {
    let token = settings.bot_token()?;

    let registry = Arc::new(Registry::builtin()?);
    let ctx = Arc::new(BackendContext::connect(&settings).await);
    for (backend, up) in ctx.status() {
        tracing::info!("Backend {}: {}", backend, if up { "available" } else { "unavailable" });
    }
    let dispatcher = Arc::new(Dispatcher::new(registry, ctx.clone()));

    let bot = Bot::new(token);
    let shutdown = CancellationToken::new();

    let poller = AlertPoller::new(
        ctx.metrics.clone(),
        Arc::new(TelegramSender::new(bot.clone())),
        settings.alert_chat_id(),
        settings.alert_poll_interval(),
    )
    .spawn(shutdown.clone());

    let health_config = HealthServerConfig {
        host: settings.health_host.clone(),
        port: settings.port,
    };
    let health = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = run_server(health_config, dispatcher, shutdown).await {
                tracing::error!("Health server failed: {}", e);
            }
        }
    });

    let result = telegram::run(bot, dispatcher).await;

    tracing::info!("Shutting down...");
    shutdown.cancel();
    if let Err(e) = poller.await {
        tracing::warn!("Alert poller task ended abnormally: {}", e);
    }
    if let Err(e) = health.await {
        tracing::warn!("Health server task ended abnormally: {}", e);
    }

    result.map_err(Into::into)
}

/// Prints acknowledgements and replies to stdout.
struct StdoutResponder;

#[async_trait]
impl Responder for StdoutResponder {
    async fn ack(&self) -> crate::error::Result<()> {
        println!("⏳ working...");
        Ok(())
    }

    async fn reply(&self, text: &str) -> crate::error::Result<()> {
        println!("{}", text);
        Ok(())
    }
}

/// Normalize `/jenkins_trigger` and `jenkins-trigger` to the registry name.
pub fn command_name(raw: &str) -> String {
    raw.trim_start_matches('/').to_ascii_lowercase().replace('_', "-")
}

async fn exec(settings: Settings, command: &str, text: &str) -> Result<()> {
    let registry = Arc::new(Registry::builtin()?);
    let ctx = Arc::new(BackendContext::connect(&settings).await);
    let dispatcher = Dispatcher::new(registry, ctx);

    let mut invocation = Invocation::new(command_name(command), text);
    invocation.user = std::env::var("USER").unwrap_or_else(|_| "local".to_string());

    dispatcher.dispatch(invocation, &StdoutResponder).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_serve() {
        let cli = Cli::try_parse_from(["chatops"]).unwrap();
        assert!(cli.is_serve());
    }

    #[test]
    fn test_exec_collects_arguments() {
        let cli = Cli::try_parse_from(["chatops", "exec", "/k8s_restart_deployment", "web", "staging"]).unwrap();
        let Some(Command::Exec { command, args }) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(command_name(&command), "k8s-restart-deployment");
        assert_eq!(args, vec!["web", "staging"]);
    }

    #[test]
    fn test_exec_keeps_key_value_arguments() {
        let cli = Cli::try_parse_from(["chatops", "exec", "jenkins-trigger", "deploy-app", "env=prod"]).unwrap();
        let Some(Command::Exec { args, .. }) = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(args.join(" "), "deploy-app env=prod");
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
