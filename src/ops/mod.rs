//! Domain operations over the store.
//!
//! Each method is one logical operation; failures that users can act on come
//! back as `Usage`, `NotFound` or `Duplicate` errors.

pub mod pending;

use std::time::Duration;

use crate::commands::Registration;
use crate::error::{Error, Result};
use crate::store::{
    ChatTarget, Member, MemberFilter, MemberStats, MemberUpdate, Store, Task, UserRef,
    TASK_CHANNEL_KEY,
};

pub use pending::PendingConfirmations;

pub const ACTIVE_TASK_NOT_FOUND: &str = "Active task not found with that ID.";
pub const COMPLETED_TASK_NOT_FOUND: &str = "Completed task not found with that ID.";
pub const MEMBER_NOT_FOUND: &str = "Member not found.";
pub const NOTHING_PENDING: &str = "Please run /clear_table first to confirm.";

/// Result of a `clear_table` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Confirmation window opened; nothing deleted yet.
    Requested { window: Duration },
    /// Members deleted.
    Cleared { removed: usize },
}

pub struct Operations {
    store: Store,
    pending: PendingConfirmations,
}

impl Operations {
    pub fn new(store: Store, clear_timeout: Duration) -> Self {
        Self {
            store,
            pending: PendingConfirmations::new(clear_timeout),
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    // Tasks

    pub fn create_task(&self, assignee: &UserRef, description: &str, creator: Option<i64>) -> Result<i64> {
        let description = description.trim();
        if description.is_empty() {
            return Err(Error::Usage(crate::commands::parse::EMPTY_DESCRIPTION.to_string()));
        }
        let id = self.store.create_task(description, assignee, creator)?;
        tracing::info!("Created task {} for {}", id, assignee);
        Ok(id)
    }

    pub fn active_tasks(&self) -> Result<Vec<Task>> {
        self.store.list_active_tasks()
    }

    /// Open -> Completed. Completing a task that is not open is reported as
    /// not found.
    pub fn complete_task(&self, id: i64) -> Result<()> {
        if self.store.complete_task(id)? == 0 {
            return Err(Error::NotFound(ACTIVE_TASK_NOT_FOUND.to_string()));
        }
        tracing::info!("Completed task {}", id);
        Ok(())
    }

    /// Completed -> Open.
    pub fn reopen_task(&self, id: i64) -> Result<()> {
        if self.store.reopen_task(id)? == 0 {
            return Err(Error::NotFound(COMPLETED_TASK_NOT_FOUND.to_string()));
        }
        tracing::info!("Reopened task {}", id);
        Ok(())
    }

    pub fn set_task_channel(&self, target: &ChatTarget) -> Result<()> {
        self.store.set_setting(TASK_CHANNEL_KEY, &target.to_string())?;
        tracing::info!("Digest channel set to {}", target);
        Ok(())
    }

    /// Configured digest destination. A stored value that no longer parses
    /// counts as unset.
    pub fn task_channel(&self) -> Result<Option<ChatTarget>> {
        let raw = self.store.get_setting(TASK_CHANNEL_KEY)?;
        Ok(raw.and_then(|value| match value.parse::<ChatTarget>() {
            Ok(target) => Some(target),
            Err(e) => {
                tracing::warn!("Ignoring stored digest channel: {}", e);
                None
            }
        }))
    }

    // Members

    /// Register a member. Names are unique ignoring case.
    pub fn register(&self, registration: &Registration) -> Result<i64> {
        let id = self.store.create_member(
            &registration.name,
            registration.paid,
            registration.comment.as_deref(),
        )?;
        tracing::info!("Registered member {} as {}", registration.name, id);
        Ok(id)
    }

    pub fn members(&self, filter: &MemberFilter) -> Result<Vec<Member>> {
        self.store.list_members(filter)
    }

    pub fn update_member(&self, id: i64, update: &MemberUpdate) -> Result<()> {
        if self.store.update_member(id, update)? == 0 {
            return Err(Error::NotFound(MEMBER_NOT_FOUND.to_string()));
        }
        tracing::info!("Updated member {}", id);
        Ok(())
    }

    pub fn delete_member(&self, id: i64) -> Result<()> {
        if self.store.delete_member(id)? == 0 {
            return Err(Error::NotFound(MEMBER_NOT_FOUND.to_string()));
        }
        tracing::info!("Deleted member {}", id);
        Ok(())
    }

    pub fn stats(&self) -> Result<MemberStats> {
        self.store.count_members()
    }

    pub fn unpay_all(&self) -> Result<usize> {
        let updated = self.store.unpay_all()?;
        tracing::info!("Marked {} members unpaid", updated);
        Ok(updated)
    }

    /// Two-phase delete of every member. Without `confirm` this (re)opens
    /// the caller's confirmation window; with it, the delete runs only if the
    /// caller's window is still open.
    pub async fn clear_members(&self, user: i64, confirm: bool) -> Result<ClearOutcome> {
        if !confirm {
            self.pending.request(user).await;
            return Ok(ClearOutcome::Requested {
                window: self.pending.window(),
            });
        }

        if !self.pending.confirm(user).await {
            return Err(Error::NotFound(NOTHING_PENDING.to_string()));
        }

        let removed = self.store.clear_all_members()?;
        tracing::info!("User {} cleared all {} members", user, removed);
        Ok(ClearOutcome::Cleared { removed })
    }
}
