//! Command menu published to Telegram.

use teloxide::types::BotCommand;

use crate::commands::COMMANDS;

/// One menu entry per command; aliases stay out of the menu.
pub fn bot_commands() -> Vec<BotCommand> {
    COMMANDS
        .iter()
        .map(|spec| BotCommand::new(spec.name, spec.about))
        .collect()
}
