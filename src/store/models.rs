//! Row types for members, tasks and settings.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Settings key for the digest destination.
pub const TASK_CHANNEL_KEY: &str = "task_channel_id";

/// A registered member and their dues status.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Member {
    pub id: i64,
    pub name: String,
    pub paid: bool,
    pub comment: Option<String>,
}

/// Fields to change on a member. `None` leaves the column untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemberUpdate {
    pub paid: Option<bool>,
    pub comment: Option<String>,
}

/// Which members to list.
#[derive(Clone, Debug, PartialEq)]
pub enum MemberFilter {
    All,
    Unpaid,
    /// Case-insensitive substring over name and comment.
    Search(String),
}

/// Member counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberStats {
    pub total: i64,
    pub paid: i64,
}

impl MemberStats {
    pub fn unpaid(&self) -> i64 {
        self.total - self.paid
    }
}

/// A task assigned to a user.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Task {
    pub id: i64,
    pub description: String,
    pub assignee: UserRef,
    pub creator: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_active(&self) -> bool {
        !self.completed
    }
}

fn username_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@[A-Za-z][A-Za-z0-9_]{4,31}$").expect("valid username regex"))
}

/// Reference to a chat user: a numeric id or an @username.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(into = "String", try_from = "String")]
pub enum UserRef {
    Id(i64),
    Username(String),
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRef::Id(id) => write!(f, "{}", id),
            UserRef::Username(name) => write!(f, "@{}", name),
        }
    }
}

impl FromStr for UserRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            if id > 0 {
                return Ok(UserRef::Id(id));
            }
        }
        if username_re().is_match(s) {
            return Ok(UserRef::Username(s[1..].to_string()));
        }
        Err(format!("not a user reference: {}", s))
    }
}

impl From<UserRef> for String {
    fn from(user: UserRef) -> Self {
        user.to_string()
    }
}

impl TryFrom<String> for UserRef {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Where a message can be delivered: a chat id or a public @channel.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatTarget::Id(id) => write!(f, "{}", id),
            ChatTarget::Username(name) => write!(f, "@{}", name),
        }
    }
}

impl FromStr for ChatTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            if id != 0 {
                return Ok(ChatTarget::Id(id));
            }
        }
        if username_re().is_match(s) {
            return Ok(ChatTarget::Username(s[1..].to_string()));
        }
        Err(format!("not a chat reference: {}", s))
    }
}
