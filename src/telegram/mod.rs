//! Telegram chat gateway.

use std::sync::Arc;

use async_trait::async_trait;
use teloxide::dispatching::Dispatcher as UpdateDispatcher;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ChatAction, ParseMode};

pub mod format;

use crate::alerts::ChatSender;
use crate::commands::{Dispatcher, Invocation, Registry, Responder};
use crate::error::Result;
use format::{clip, mentions, parse_command, render_html};

/// The bot's own username, used to recognize mentions and `/cmd@bot`.
#[derive(Debug, Clone)]
pub struct BotName(pub String);

/// Replies to the chat an invocation came from.
pub struct TelegramResponder {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramResponder {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        Self { bot, chat_id }
    }
}

#[async_trait]
impl Responder for TelegramResponder {
    async fn ack(&self) -> Result<()> {
        self.bot.send_chat_action(self.chat_id, ChatAction::Typing).await?;
        Ok(())
    }

    async fn reply(&self, text: &str) -> Result<()> {
        self.bot
            .send_message(self.chat_id, render_html(&clip(text)))
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

/// Outbound messages for the alert poller.
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatSender for TelegramSender {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.bot
            .send_message(ChatId(chat_id), render_html(&clip(text)))
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

/// Menu entries for every registered command, using Telegram-safe names.
pub fn menu(registry: &Registry) -> Vec<BotCommand> {
    registry
        .descriptors()
        .into_iter()
        .map(|d| BotCommand::new(d.menu_name(), d.summary))
        .collect()
}

pub fn greeting(sender: &str, text: &str) -> String {
    format!("Hi {}! You mentioned me. You said: '{}'", sender, text)
}

async fn handle_message(
    bot: Bot,
    msg: Message,
    commands: Arc<Dispatcher>,
    me: Arc<BotName>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let user = msg
        .from
        .as_ref()
        .map(|u| u.username.clone().unwrap_or_else(|| u.id.to_string()))
        .unwrap_or_else(|| "unknown".to_string());

    if let Some((command, args)) = parse_command(text, &me.0) {
        tracing::info!("/{} from {} in chat {}", command, user, msg.chat.id);
        let invocation = Invocation {
            command,
            text: args,
            chat_id: msg.chat.id.0,
            user,
        };
        let responder = TelegramResponder::new(bot, msg.chat.id);
        // Commands from one chat must not wait on each other.
        tokio::spawn(async move {
            commands.dispatch(invocation, &responder).await;
        });
        return Ok(());
    }

    if msg.chat.is_private() || mentions(text, &me.0) {
        let name = msg
            .from
            .as_ref()
            .map(|u| u.first_name.clone())
            .unwrap_or_else(|| "there".to_string());
        tracing::debug!("Mention from {} in chat {}", user, msg.chat.id);
        bot.send_message(msg.chat.id, greeting(&name, text)).await?;
    }
    Ok(())
}

/// Run the gateway until Ctrl-C.
pub async fn run(bot: Bot, commands: Arc<Dispatcher>) -> Result<()> {
    tracing::info!("Starting Telegram gateway...");

    let me = bot.get_me().await?;
    let name = Arc::new(BotName(me.username().to_string()));
    tracing::info!("Connected to Telegram as @{}", name.0);

    if let Err(e) = bot.set_my_commands(menu(commands.registry())).await {
        tracing::warn!("Failed to set commands: {}", e);
    }

    let handler = Update::filter_message().endpoint(handle_message);
    UpdateDispatcher::builder(bot, handler)
        .dependencies(dptree::deps![commands, name])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("Telegram gateway stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_covers_every_command() {
        let registry = Registry::builtin().unwrap();
        let menu = menu(&registry);
        assert_eq!(menu.len(), registry.names().len());
        assert!(menu.iter().any(|c| c.command == "k8s_restart_deployment"));
    }

    #[test]
    fn test_greeting_echoes_text() {
        assert_eq!(
            greeting("Ada", "hello @opsbot"),
            "Hi Ada! You mentioned me. You said: 'hello @opsbot'"
        );
    }
}
