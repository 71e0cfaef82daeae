//! Persistent store: members, tasks and settings in SQLite.

pub mod models;
pub mod sqlite;

pub use models::{
    ChatTarget, Member, MemberFilter, MemberStats, MemberUpdate, Task, UserRef, TASK_CHANNEL_KEY,
};
pub use sqlite::Store;
