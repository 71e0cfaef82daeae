//! Command boundary: run one command and turn the outcome into a reply.
//!
//! User-facing errors end here as plain-text replies. Anything else (store
//! or IO failures) is returned to the transport, which logs it and answers
//! with [`GENERIC_FAILURE`].

use crate::commands::{self, Command, TextMention};
use crate::error::{Error, Result};
use crate::format;
use crate::ops::{ClearOutcome, Operations};
use crate::store::{ChatTarget, MemberFilter, Task};

pub const GENERIC_FAILURE: &str = "Something went wrong while running that command.";
pub const PERMISSION_DENIED: &str = "You need administrator rights to set the task channel.";

/// Who sent a command and from where.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub sender: i64,
    /// Chat the command came from; `None` outside any chat (local CLI).
    pub chat: Option<ChatTarget>,
    /// Sender may change bot settings in this chat. Decided by the transport.
    pub elevated: bool,
}

/// Outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    /// Telegram HTML with a plain-text fallback for terminals.
    Html { html: String, plain: String },
    /// Preformatted block, rendered monospace by the transport.
    Table { title: Option<String>, body: String },
}

impl Reply {
    fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }

    /// Plain-text form, for terminals and logs.
    pub fn to_plain(&self) -> String {
        match self {
            Reply::Text(text) => text.clone(),
            Reply::Html { plain, .. } => plain.clone(),
            Reply::Table { title: Some(title), body } => format!("{}\n{}", title, body),
            Reply::Table { title: None, body } => body.clone(),
        }
    }
}

/// Reply listing the open tasks. Shared by `tasks` and the daily digest.
pub fn active_tasks_reply(tasks: &[Task]) -> Reply {
    if tasks.is_empty() {
        return Reply::text("There are no active tasks.");
    }
    Reply::Table {
        title: Some("Active Tasks".to_string()),
        body: format::tasks_table(tasks),
    }
}

fn table(body: String) -> Reply {
    Reply::Table { title: None, body }
}

/// Parse `text` and run it. `Ok(None)` when the text is not a command for
/// this bot.
pub async fn dispatch_text(
    ops: &Operations,
    invocation: &Invocation,
    text: &str,
    bot_username: Option<&str>,
    mention: Option<&TextMention>,
) -> Result<Option<Reply>> {
    let command = match commands::parse_command(text, bot_username, mention) {
        Ok(Some(command)) => command,
        Ok(None) => return Ok(None),
        Err(e) => return recover(e).map(Some),
    };
    dispatch(ops, invocation, command).await.map(Some)
}

/// Run a parsed command.
pub async fn dispatch(ops: &Operations, invocation: &Invocation, command: Command) -> Result<Reply> {
    tracing::debug!("Dispatching {:?} from {}", command, invocation.sender);
    match execute(ops, invocation, command).await {
        Ok(reply) => Ok(reply),
        Err(e) => recover(e),
    }
}

pub fn recover(error: Error) -> Result<Reply> {
    if error.is_user_facing() {
        tracing::debug!("Command rejected: {}", error);
        Ok(Reply::Text(error.to_string()))
    } else {
        Err(error)
    }
}

async fn execute(ops: &Operations, invocation: &Invocation, command: Command) -> Result<Reply> {
    let reply = match command {
        Command::Task { assignee, description } => {
            let id = ops.create_task(&assignee, &description, Some(invocation.sender))?;
            Reply::Html {
                html: format!("Task {} created for {}.", id, format::mention_html(&assignee)),
                plain: format!("Task {} created for {}.", id, format::mention(&assignee)),
            }
        }
        Command::Tasks => active_tasks_reply(&ops.active_tasks()?),
        Command::Complete(id) => {
            ops.complete_task(id)?;
            Reply::text(format!("Task {} marked as complete.", id))
        }
        Command::Reopen(id) => {
            ops.reopen_task(id)?;
            Reply::text(format!("Task {} reopened.", id))
        }
        Command::TaskChannel(target) => {
            if !invocation.elevated {
                return Err(Error::Permission(PERMISSION_DENIED.to_string()));
            }
            let target = target
                .or_else(|| invocation.chat.clone())
                .ok_or_else(|| Error::Usage(commands::parse::CHANNEL_USAGE.to_string()))?;
            ops.set_task_channel(&target)?;
            Reply::text(format!(
                "Daily task summaries will post in {}.",
                format::channel(&target)
            ))
        }
        Command::Register(registration) => {
            ops.register(&registration)?;
            Reply::text(format!(
                "Registered {} with paid={}.",
                registration.name, registration.paid
            ))
        }
        Command::Members => {
            let members = ops.members(&MemberFilter::All)?;
            if members.is_empty() {
                Reply::text("No members found.")
            } else {
                table(format::members_table(&members))
            }
        }
        Command::ClearTable { confirm } => match ops.clear_members(invocation.sender, confirm).await? {
            ClearOutcome::Requested { window } => Reply::text(format!(
                "This will remove all members. Run /clear_table confirm within {} seconds to proceed.",
                window.as_secs()
            )),
            ClearOutcome::Cleared { .. } => Reply::text("All members have been removed."),
        },
        Command::Delete(id) => {
            ops.delete_member(id)?;
            Reply::text(format!("Member {} removed.", id))
        }
        Command::Update { id, update } => {
            ops.update_member(id, &update)?;
            Reply::text(format!("Member {} updated.", id))
        }
        Command::Find(query) => {
            let members = ops.members(&MemberFilter::Search(query))?;
            if members.is_empty() {
                Reply::text("No matching members found.")
            } else {
                table(format::members_table(&members))
            }
        }
        Command::Unpaid => {
            let members = ops.members(&MemberFilter::Unpaid)?;
            if members.is_empty() {
                Reply::text("No unpaid members found.")
            } else {
                table(format::unpaid_table(&members))
            }
        }
        Command::Stats => Reply::text(format::stats(&ops.stats()?)),
        Command::UnpayAll => {
            let updated = ops.unpay_all()?;
            Reply::text(format!("Updated {} members to unpaid.", updated))
        }
        Command::Help => Reply::text(commands::help_text()),
        Command::Ping => Reply::text("pong"),
    };
    Ok(reply)
}
