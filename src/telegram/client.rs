//! Telegram bot client: connection lifecycle, delivery and the digest sink.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{Chat, ParseMode, Recipient};
use teloxide::utils::html;
use teloxide::RequestError;
use tokio::sync::{watch, Mutex};

use crate::config::{Settings, TOKEN_ENV};
use crate::digest::{run_digest, DigestOutcome, DigestSchedule, DigestScheduler, DigestSink};
use crate::dispatch::Reply;
use crate::error::{Error, Result};
use crate::ops::Operations;
use crate::store::{ChatTarget, Store};

use super::commands::bot_commands;
use super::handler::{handle_message, BotState};

/// Message text and parse mode for a reply.
fn render(reply: &Reply) -> (String, Option<ParseMode>) {
    match reply {
        Reply::Text(text) => (text.clone(), None),
        Reply::Html { html, .. } => (html.clone(), Some(ParseMode::Html)),
        Reply::Table { title, body } => {
            let block = html::code_block(body);
            let text = match title {
                Some(title) => format!("{}\n{}", html::bold(&html::escape(title)), block),
                None => block,
            };
            (text, Some(ParseMode::Html))
        }
    }
}

/// Send a reply to a chat.
pub async fn send_reply(bot: &Bot, chat_id: ChatId, reply: &Reply) -> std::result::Result<(), RequestError> {
    let (text, mode) = render(reply);
    let request = bot.send_message(chat_id, text);
    match mode {
        Some(mode) => request.parse_mode(mode).await?,
        None => request.await?,
    };
    Ok(())
}

fn recipient(target: &ChatTarget) -> Recipient {
    match target {
        ChatTarget::Id(id) => Recipient::Id(ChatId(*id)),
        ChatTarget::Username(name) => Recipient::ChannelUsername(format!("@{}", name)),
    }
}

/// Digest delivery over Telegram. Keeps a cache of chats the bot has seen
/// or resolved.
pub struct TelegramSink {
    bot: Bot,
    known: Mutex<HashMap<ChatTarget, ChatId>>,
}

impl TelegramSink {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            known: Mutex::new(HashMap::new()),
        }
    }

    /// Record a chat the bot has received a message from.
    pub async fn remember(&self, chat: &Chat) {
        let mut known = self.known.lock().await;
        known.insert(ChatTarget::Id(chat.id.0), chat.id);
        if let Some(name) = chat.username() {
            known.insert(ChatTarget::Username(name.to_string()), chat.id);
        }
    }
}

#[async_trait]
impl DigestSink for TelegramSink {
    type Handle = ChatId;

    async fn cached(&self, target: &ChatTarget) -> Option<ChatId> {
        self.known.lock().await.get(target).copied()
    }

    async fn fetch(&self, target: &ChatTarget) -> Result<ChatId> {
        let chat = self
            .bot
            .get_chat(recipient(target))
            .await
            .map_err(|e| Error::Unavailable(format!("getChat {}: {}", target, e)))?;
        self.known.lock().await.insert(target.clone(), chat.id);
        Ok(chat.id)
    }

    async fn send(&self, handle: &ChatId, reply: &Reply) -> Result<()> {
        send_reply(&self.bot, *handle, reply)
            .await
            .map_err(|e| Error::Unavailable(format!("sendMessage {}: {}", handle.0, e)))
    }
}

fn bot_from_settings(settings: &Settings) -> Result<Bot> {
    let token = settings.telegram.bot_token.clone().ok_or_else(|| {
        Error::Telegram(format!(
            "No bot token configured. Set {} or telegram.bot_token",
            TOKEN_ENV
        ))
    })?;
    Ok(Bot::new(token))
}

fn operations(settings: &Settings) -> Result<Arc<Operations>> {
    let store = Store::open(settings.database_path()?)?;
    Ok(Arc::new(Operations::new(store, settings.clear_timeout())))
}

/// Run the bot until Ctrl-C: command handling plus the daily digest.
pub async fn run_bot_daemon(settings: &Settings) -> Result<()> {
    tracing::info!("Starting Telegram bot...");

    let bot = bot_from_settings(settings)?;
    let ops = operations(settings)?;
    let sink = Arc::new(TelegramSink::new(bot.clone()));

    let (ready_tx, ready_rx) = watch::channel(false);
    let scheduler = if settings.digest.enabled {
        let schedule = DigestSchedule::daily(&settings.digest.time, &settings.digest.timezone)?;
        Some(DigestScheduler::new(schedule, Arc::clone(&ops), Arc::clone(&sink)).spawn(ready_rx))
    } else {
        tracing::info!("Daily digest disabled");
        None
    };

    let me = bot
        .get_me()
        .await
        .map_err(|e| Error::Telegram(format!("getMe failed: {}", e)))?;
    let bot_username = me.user.username.clone();
    tracing::info!("Logged in as @{}", bot_username.as_deref().unwrap_or("unknown"));
    ready_tx.send_replace(true);

    if let Err(e) = bot.set_my_commands(bot_commands()).await {
        tracing::warn!("Failed to set commands: {}", e);
    }

    let state = Arc::new(BotState {
        ops,
        sink,
        bot_username,
    });

    Dispatcher::builder(bot, Update::filter_message().endpoint(handle_message))
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    drop(ready_tx);
    if let Some(handle) = scheduler {
        handle.abort();
    }
    tracing::info!("Telegram bot stopped");
    Ok(())
}

/// Send the digest once, now.
pub async fn send_digest_now(settings: &Settings) -> Result<DigestOutcome> {
    let bot = bot_from_settings(settings)?;
    let ops = operations(settings)?;
    bot.get_me()
        .await
        .map_err(|e| Error::Telegram(format!("getMe failed: {}", e)))?;
    let sink = TelegramSink::new(bot);
    run_digest(ops.as_ref(), &sink).await
}
