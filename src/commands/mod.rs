//! Chat command surface: typed commands, the command table and help text.

pub mod parse;

use crate::store::{ChatTarget, MemberUpdate, UserRef};

pub use parse::{parse_bool, parse_command, TextMention};

/// Prefix every command starts with.
pub const PREFIX: char = '/';

/// A validated command, ready for the domain layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Task { assignee: UserRef, description: String },
    Tasks,
    Complete(i64),
    Reopen(i64),
    /// `None` means the chat the command was sent from.
    TaskChannel(Option<ChatTarget>),
    Register(Registration),
    Members,
    ClearTable { confirm: bool },
    Delete(i64),
    Update { id: i64, update: MemberUpdate },
    Find(String),
    Unpaid,
    Stats,
    UnpayAll,
    Help,
    Ping,
}

/// Parsed arguments of `register`.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub name: String,
    pub paid: bool,
    pub comment: Option<String>,
}

/// One row of the command table.
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub args: &'static str,
    pub about: &'static str,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec { name: "task", aliases: &[], args: "@member <description>", about: "Create a task for a member" },
    CommandSpec { name: "tasks", aliases: &[], args: "", about: "List active tasks" },
    CommandSpec { name: "complete", aliases: &["complete_task"], args: "<id>", about: "Mark a task complete" },
    CommandSpec { name: "reopen", aliases: &["reopen_task"], args: "<id>", about: "Reopen a completed task" },
    CommandSpec { name: "taskchannel", aliases: &["set_task_channel"], args: "[@channel]", about: "Configure the daily task summary channel" },
    CommandSpec { name: "register", aliases: &[], args: "<first> [last] <paid> [comment]", about: "Register a member" },
    CommandSpec { name: "members", aliases: &[], args: "", about: "List all registered members" },
    CommandSpec { name: "clear_table", aliases: &[], args: "[confirm]", about: "Remove all members" },
    CommandSpec { name: "delete", aliases: &[], args: "<id>", about: "Remove a member" },
    CommandSpec { name: "update", aliases: &[], args: "<id> <paid> [comment]", about: "Update a member" },
    CommandSpec { name: "find", aliases: &[], args: "<query>", about: "Search for members" },
    CommandSpec { name: "unpaid", aliases: &[], args: "", about: "List unpaid members" },
    CommandSpec { name: "stats", aliases: &[], args: "", about: "Show member statistics" },
    CommandSpec { name: "unpay_all", aliases: &[], args: "", about: "Mark all members as unpaid" },
    CommandSpec { name: "help", aliases: &[], args: "", about: "Show this message" },
];

/// Static usage text listing every command.
pub fn help_text() -> String {
    COMMANDS
        .iter()
        .map(|spec| {
            let mut line = format!("{}{}", PREFIX, spec.name);
            if !spec.args.is_empty() {
                line.push(' ');
                line.push_str(spec.args);
            }
            if !spec.aliases.is_empty() {
                let aliases = spec
                    .aliases
                    .iter()
                    .map(|a| format!("{}{}", PREFIX, a))
                    .collect::<Vec<_>>()
                    .join(", ");
                line.push_str(&format!(" (alias: {})", aliases));
            }
            format!("{} - {}", line, spec.about)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
