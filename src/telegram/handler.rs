//! Telegram message handling.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{MessageEntityKind, User};
use teloxide::RequestError;

use crate::commands::{parse_command, Command, TextMention};
use crate::dispatch::{self, Invocation, Reply, GENERIC_FAILURE};
use crate::ops::Operations;
use crate::store::ChatTarget;

use super::client::{send_reply, TelegramSink};

/// Shared state injected into every handler call.
pub struct BotState {
    pub ops: Arc<Operations>,
    pub sink: Arc<TelegramSink>,
    pub bot_username: Option<String>,
}

/// Handle incoming messages.
pub async fn handle_message(bot: Bot, msg: Message, state: Arc<BotState>) -> Result<(), RequestError> {
    state.sink.remember(&msg.chat).await;

    let Some(text) = msg.text() else {
        return Ok(());
    };
    let Some(sender) = msg.from.as_ref() else {
        return Ok(());
    };

    let mention = first_text_mention(&msg);
    let command = match parse_command(text, state.bot_username.as_deref(), mention.as_ref()) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(()),
        Err(e) => {
            return match dispatch::recover(e) {
                Ok(reply) => send_reply(&bot, msg.chat.id, &reply).await,
                Err(e) => {
                    tracing::error!("Failed to parse command: {}", e);
                    Ok(())
                }
            };
        }
    };

    tracing::debug!(
        "Command from {} ({}) in chat {}",
        sender.full_name(),
        sender.id.0,
        msg.chat.id.0
    );

    let elevated = match command {
        Command::TaskChannel(_) => is_elevated(&bot, &msg, sender).await,
        _ => false,
    };
    let invocation = Invocation {
        sender: sender.id.0 as i64,
        chat: Some(ChatTarget::Id(msg.chat.id.0)),
        elevated,
    };

    let reply = match dispatch::dispatch(&state.ops, &invocation, command).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!("Command failed in chat {}: {}", msg.chat.id.0, e);
            Reply::Text(GENERIC_FAILURE.to_string())
        }
    };
    send_reply(&bot, msg.chat.id, &reply).await
}

/// Private chats always qualify; in groups the sender must be an
/// administrator or the owner.
async fn is_elevated(bot: &Bot, msg: &Message, sender: &User) -> bool {
    if msg.chat.is_private() {
        return true;
    }
    match bot.get_chat_member(msg.chat.id, sender.id).await {
        Ok(member) => member.kind.is_privileged(),
        Err(e) => {
            tracing::warn!("Failed to check permissions for {}: {}", sender.id.0, e);
            false
        }
    }
}

/// First mention Telegram already resolved to a user id, with its text span.
fn first_text_mention(msg: &Message) -> Option<TextMention> {
    msg.parse_entities()?
        .into_iter()
        .find_map(|entity| match entity.kind() {
            MessageEntityKind::TextMention { user } => Some(TextMention {
                user_id: user.id.0 as i64,
                text: entity.text().to_string(),
            }),
            _ => None,
        })
}
