//! Parse raw command text into typed [`Command`]s.
//!
//! Everything here runs before the store is touched; a `Command` that comes
//! out of [`parse_command`] is well formed.

use crate::error::{Error, Result};
use crate::store::{ChatTarget, MemberUpdate, UserRef};

use super::{Command, Registration, PREFIX};

pub const TASK_USAGE: &str =
    "Please mention a valid member and provide a description. Usage: /task @member <description>";
pub const EMPTY_DESCRIPTION: &str = "Task description cannot be empty.";
pub const COMPLETE_USAGE: &str =
    "Please provide the numeric ID of the task to complete. Usage: /complete <id>";
pub const REOPEN_USAGE: &str =
    "Please provide the numeric ID of the task to reopen. Usage: /reopen <id>";
pub const CHANNEL_USAGE: &str = "Please mention a valid channel.";
pub const REGISTER_USAGE: &str = "Usage: /register <first> [last] <paid> [comment]";
pub const DELETE_USAGE: &str = "Please provide the numeric ID of the member. Usage: /delete <id>";
pub const UPDATE_USAGE: &str = "Usage: /update <id> <paid> [comment]";
pub const PAID_VALUE: &str = "Paid value must be true or false";
pub const FIND_USAGE: &str = "Usage: /find <query>";
pub const UNKNOWN_COMMAND: &str = "Unknown command. Send /help for available commands.";

/// A mention entity the chat platform resolved to a user id, with the text
/// span it covers in the message.
#[derive(Debug, Clone, PartialEq)]
pub struct TextMention {
    pub user_id: i64,
    pub text: String,
}

/// Boolean-like token. `None` means "not a boolean", which callers use to
/// tell flags apart from names.
pub fn parse_bool(token: &str) -> Option<bool> {
    match token.to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// Parse one line of chat text.
///
/// Returns `Ok(None)` for text that is not addressed to this bot: no prefix,
/// a bare prefix, or a `/cmd@otherbot` suffix naming a different bot.
pub fn parse_command(
    text: &str,
    bot_username: Option<&str>,
    mention: Option<&TextMention>,
) -> Result<Option<Command>> {
    let text = text.trim();
    let Some(body) = text.strip_prefix(PREFIX) else {
        return Ok(None);
    };

    let (word, args) = match body.find(char::is_whitespace) {
        Some(idx) => (&body[..idx], body[idx..].trim()),
        None => (body, ""),
    };

    let (name, addressee) = match word.split_once('@') {
        Some((name, bot)) => (name, Some(bot)),
        None => (word, None),
    };
    if let (Some(addressee), Some(me)) = (addressee, bot_username) {
        if !addressee.eq_ignore_ascii_case(me) {
            return Ok(None);
        }
    }
    if name.is_empty() {
        return Ok(None);
    }

    let command = match name.to_lowercase().as_str() {
        "task" => parse_task(args, mention)?,
        "tasks" => Command::Tasks,
        "complete" | "complete_task" => Command::Complete(parse_id(args, COMPLETE_USAGE)?),
        "reopen" | "reopen_task" => Command::Reopen(parse_id(args, REOPEN_USAGE)?),
        "taskchannel" | "set_task_channel" => Command::TaskChannel(parse_channel(args)?),
        "register" => Command::Register(parse_register(args)?),
        "members" => Command::Members,
        "clear_table" => Command::ClearTable {
            confirm: args.split_whitespace().next() == Some("confirm"),
        },
        "delete" => Command::Delete(parse_id(args, DELETE_USAGE)?),
        "update" => parse_update(args)?,
        "find" => {
            if args.is_empty() {
                return Err(Error::Usage(FIND_USAGE.to_string()));
            }
            Command::Find(args.to_string())
        }
        "unpaid" => Command::Unpaid,
        "stats" => Command::Stats,
        "unpay_all" => Command::UnpayAll,
        "help" | "start" => Command::Help,
        "ping" => Command::Ping,
        _ => return Err(Error::Usage(UNKNOWN_COMMAND.to_string())),
    };

    tracing::debug!("Parsed command: {:?}", command);
    Ok(Some(command))
}

/// Strict integer id from the first argument token.
pub fn parse_id(args: &str, usage: &str) -> Result<i64> {
    args.split_whitespace()
        .next()
        .and_then(|token| token.parse::<i64>().ok())
        .ok_or_else(|| Error::Usage(usage.to_string()))
}

/// `<first> [last] <paid> [comment]`.
///
/// Token 2 is probed as the flag before token 1, so `Bob yes no` reads as
/// the name "Bob yes" with flag `no`.
pub fn parse_register(args: &str) -> Result<Registration> {
    let tokens: Vec<&str> = args.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(Error::Usage(REGISTER_USAGE.to_string()));
    }

    let (name, paid, rest) = if let Some(paid) = tokens.get(2).and_then(|t| parse_bool(t)) {
        (format!("{} {}", tokens[0], tokens[1]), paid, &tokens[3..])
    } else if let Some(paid) = parse_bool(tokens[1]) {
        (tokens[0].to_string(), paid, &tokens[2..])
    } else {
        return Err(Error::Usage(REGISTER_USAGE.to_string()));
    };

    let comment = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Ok(Registration { name, paid, comment })
}

fn parse_update(args: &str) -> Result<Command> {
    let mut tokens = args.split_whitespace();
    let id = tokens
        .next()
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or_else(|| Error::Usage(UPDATE_USAGE.to_string()))?;
    let paid_token = tokens
        .next()
        .ok_or_else(|| Error::Usage(UPDATE_USAGE.to_string()))?;
    let paid = parse_bool(paid_token).ok_or_else(|| Error::Usage(PAID_VALUE.to_string()))?;

    let comment = tokens.collect::<Vec<_>>().join(" ");
    let comment = if comment.is_empty() { None } else { Some(comment) };

    Ok(Command::Update {
        id,
        update: MemberUpdate {
            paid: Some(paid),
            comment,
        },
    })
}

/// `@member <description>`. A platform-resolved mention at the start of the
/// arguments wins over parsing the first token.
fn parse_task(args: &str, mention: Option<&TextMention>) -> Result<Command> {
    let (assignee, rest) = match mention {
        Some(m) if mention_leads(args, &m.text) => (UserRef::Id(m.user_id), &args[m.text.len()..]),
        _ => {
            let (first, rest) = match args.find(char::is_whitespace) {
                Some(idx) => (&args[..idx], &args[idx..]),
                None => (args, ""),
            };
            let assignee = first
                .parse::<UserRef>()
                .map_err(|_| Error::Usage(TASK_USAGE.to_string()))?;
            (assignee, rest)
        }
    };

    let description = rest.trim();
    if description.is_empty() {
        return Err(Error::Usage(EMPTY_DESCRIPTION.to_string()));
    }

    Ok(Command::Task {
        assignee,
        description: description.to_string(),
    })
}

/// `args` opens with the whole mention span, not just a prefix of a word.
fn mention_leads(args: &str, span: &str) -> bool {
    !span.is_empty()
        && args
            .strip_prefix(span)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

fn parse_channel(args: &str) -> Result<Option<ChatTarget>> {
    match args.split_whitespace().next() {
        None => Ok(None),
        Some(token) => token
            .parse::<ChatTarget>()
            .map(Some)
            .map_err(|_| Error::Usage(CHANNEL_USAGE.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Option<Command>> {
        parse_command(text, Some("duesbot"), None)
    }

    fn usage_message(result: Result<impl std::fmt::Debug>) -> String {
        match result {
            Err(Error::Usage(msg)) => msg,
            other => panic!("expected usage error, got {:?}", other),
        }
    }

    #[test]
    fn bool_tokens() {
        for t in ["true", "TRUE", "1", "yes", "Yes", "y", "Y"] {
            assert_eq!(parse_bool(t), Some(true), "{}", t);
        }
        for t in ["false", "False", "0", "no", "NO", "n", "N"] {
            assert_eq!(parse_bool(t), Some(false), "{}", t);
        }
        for t in ["", "maybe", "2", "tru", "yess", "-1"] {
            assert_eq!(parse_bool(t), None, "{}", t);
        }
    }

    #[test]
    fn register_one_word_name() {
        let reg = parse_register("Alice true").unwrap();
        assert_eq!(reg, Registration { name: "Alice".into(), paid: true, comment: None });
    }

    #[test]
    fn register_two_word_name_with_comment() {
        let reg = parse_register("Alice Smith no paid at the door").unwrap();
        assert_eq!(reg.name, "Alice Smith");
        assert!(!reg.paid);
        assert_eq!(reg.comment.as_deref(), Some("paid at the door"));
    }

    #[test]
    fn register_one_word_name_with_comment() {
        let reg = parse_register("Alice y late fee").unwrap();
        assert_eq!(reg.name, "Alice");
        assert!(reg.paid);
        assert_eq!(reg.comment.as_deref(), Some("late fee"));
    }

    #[test]
    fn register_prefers_third_token_as_flag() {
        let reg = parse_register("Bob yes no").unwrap();
        assert_eq!(reg.name, "Bob yes");
        assert!(!reg.paid);
        assert_eq!(reg.comment, None);
    }

    #[test]
    fn register_rejects_missing_flag() {
        assert_eq!(usage_message(parse_register("Alice")), REGISTER_USAGE);
        assert_eq!(usage_message(parse_register("")), REGISTER_USAGE);
        assert_eq!(usage_message(parse_register("Alice Smith Jones")), REGISTER_USAGE);
    }

    #[test]
    fn ids_are_strict() {
        assert_eq!(parse_id("12", COMPLETE_USAGE).unwrap(), 12);
        assert_eq!(parse_id("12 extra", COMPLETE_USAGE).unwrap(), 12);
        assert_eq!(usage_message(parse_id("", COMPLETE_USAGE)), COMPLETE_USAGE);
        assert_eq!(usage_message(parse_id("twelve", COMPLETE_USAGE)), COMPLETE_USAGE);
        assert_eq!(usage_message(parse_id("1.5", COMPLETE_USAGE)), COMPLETE_USAGE);
    }

    #[test]
    fn aliases_map_to_same_command() {
        assert_eq!(parse("/complete 3").unwrap(), Some(Command::Complete(3)));
        assert_eq!(parse("/complete_task 3").unwrap(), Some(Command::Complete(3)));
        assert_eq!(parse("/reopen_task 4").unwrap(), Some(Command::Reopen(4)));
        assert_eq!(parse("/set_task_channel").unwrap(), Some(Command::TaskChannel(None)));
    }

    #[test]
    fn ignores_text_not_for_us() {
        assert_eq!(parse("hello there").unwrap(), None);
        assert_eq!(parse("/").unwrap(), None);
        assert_eq!(parse("/tasks@otherbot").unwrap(), None);
        assert_eq!(parse("/tasks@DuesBot").unwrap(), Some(Command::Tasks));
        assert_eq!(parse_command("/tasks@anybot", None, None).unwrap(), Some(Command::Tasks));
    }

    #[test]
    fn unknown_command_is_usage_error() {
        assert_eq!(usage_message(parse("/dance")), UNKNOWN_COMMAND);
    }

    #[test]
    fn task_with_username() {
        let cmd = parse("/task @alice_b   book the hall ").unwrap().unwrap();
        assert_eq!(
            cmd,
            Command::Task {
                assignee: UserRef::Username("alice_b".into()),
                description: "book the hall".into(),
            }
        );
    }

    #[test]
    fn task_with_text_mention_spanning_words() {
        let mention = TextMention { user_id: 99, text: "Jane Doe".into() };
        let cmd = parse_command("/task Jane Doe order snacks", None, Some(&mention))
            .unwrap()
            .unwrap();
        assert_eq!(
            cmd,
            Command::Task { assignee: UserRef::Id(99), description: "order snacks".into() }
        );
    }

    #[test]
    fn text_mention_must_cover_a_whole_word() {
        let mention = TextMention { user_id: 99, text: "Jan".into() };
        let cmd = parse_command("/task Jan order snacks", None, Some(&mention))
            .unwrap()
            .unwrap();
        assert_eq!(
            cmd,
            Command::Task { assignee: UserRef::Id(99), description: "order snacks".into() }
        );
        assert_eq!(
            usage_message(parse_command("/task Janet order snacks", None, Some(&mention))),
            TASK_USAGE
        );
    }

    #[test]
    fn task_errors() {
        assert_eq!(usage_message(parse("/task")), TASK_USAGE);
        assert_eq!(usage_message(parse("/task nobody do it")), TASK_USAGE);
        assert_eq!(usage_message(parse("/task @alice_b")), EMPTY_DESCRIPTION);
    }

    #[test]
    fn update_arguments() {
        assert_eq!(
            parse("/update 1 false note").unwrap(),
            Some(Command::Update {
                id: 1,
                update: MemberUpdate { paid: Some(false), comment: Some("note".into()) },
            })
        );
        assert_eq!(
            parse("/update 2 yes").unwrap(),
            Some(Command::Update {
                id: 2,
                update: MemberUpdate { paid: Some(true), comment: None },
            })
        );
        assert_eq!(usage_message(parse("/update 1 maybe")), PAID_VALUE);
        assert_eq!(usage_message(parse("/update x true")), UPDATE_USAGE);
        assert_eq!(usage_message(parse("/update 1")), UPDATE_USAGE);
    }

    #[test]
    fn clear_table_needs_exact_keyword() {
        assert_eq!(parse("/clear_table").unwrap(), Some(Command::ClearTable { confirm: false }));
        assert_eq!(
            parse("/clear_table confirm").unwrap(),
            Some(Command::ClearTable { confirm: true })
        );
        assert_eq!(
            parse("/clear_table CONFIRM").unwrap(),
            Some(Command::ClearTable { confirm: false })
        );
    }

    #[test]
    fn channel_argument() {
        assert_eq!(
            parse("/taskchannel @club_news").unwrap(),
            Some(Command::TaskChannel(Some(ChatTarget::Username("club_news".into()))))
        );
        assert_eq!(
            parse("/taskchannel -100123").unwrap(),
            Some(Command::TaskChannel(Some(ChatTarget::Id(-100123))))
        );
        assert_eq!(usage_message(parse("/taskchannel #general")), CHANNEL_USAGE);
    }

    #[test]
    fn find_keeps_whole_query() {
        assert_eq!(parse("/find late fee").unwrap(), Some(Command::Find("late fee".into())));
        assert_eq!(usage_message(parse("/find")), FIND_USAGE);
    }
}
