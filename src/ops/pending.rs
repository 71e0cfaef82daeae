//! Per-user pending confirmations for destructive commands.
//!
//! Each entry pairs an expiry deadline with the handle of the timer task that
//! removes it. All mutations go through one async mutex: a replacement
//! aborts the previous timer before installing the new entry, and a timer
//! only removes the entry it was created for.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

struct PendingEntry {
    ticket: u64,
    deadline: Instant,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<i64, PendingEntry>,
    next_ticket: u64,
}

/// Registry of users with an unconfirmed request.
pub struct PendingConfirmations {
    window: Duration,
    registry: Arc<Mutex<Registry>>,
}

impl PendingConfirmations {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Open (or restart) the confirmation window for `user`. Any earlier
    /// request from the same user is cancelled first.
    pub async fn request(&self, user: i64) -> Instant {
        let mut registry = self.registry.lock().await;

        if let Some(previous) = registry.entries.remove(&user) {
            previous.timer.abort();
            tracing::debug!("Replaced pending confirmation for user {}", user);
        }

        registry.next_ticket += 1;
        let ticket = registry.next_ticket;
        let deadline = Instant::now() + self.window;

        let shared = Arc::clone(&self.registry);
        let timer = tokio::spawn(async move {
            sleep_until(deadline).await;
            let mut registry = shared.lock().await;
            let ours = registry
                .entries
                .get(&user)
                .is_some_and(|entry| entry.ticket == ticket);
            if ours {
                registry.entries.remove(&user);
                tracing::debug!("Pending confirmation for user {} expired", user);
            }
        });

        registry.entries.insert(
            user,
            PendingEntry {
                ticket,
                deadline,
                timer,
            },
        );
        deadline
    }

    /// Consume the pending request for `user`. True only if one existed and
    /// its window has not elapsed.
    pub async fn confirm(&self, user: i64) -> bool {
        let mut registry = self.registry.lock().await;
        match registry.entries.remove(&user) {
            Some(entry) => {
                entry.timer.abort();
                Instant::now() < entry.deadline
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_pending(&self, user: i64) -> bool {
        self.registry.lock().await.entries.contains_key(&user)
    }
}

impl Drop for PendingConfirmations {
    fn drop(&mut self) {
        if let Ok(registry) = self.registry.try_lock() {
            for entry in registry.entries.values() {
                entry.timer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn confirm_within_window() {
        let pending = PendingConfirmations::new(Duration::from_secs(30));
        pending.request(1).await;
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(pending.confirm(1).await);
        assert!(!pending.is_pending(1).await);
        assert!(!pending.confirm(1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_window() {
        let pending = PendingConfirmations::new(Duration::from_secs(30));
        pending.request(1).await;
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!pending.is_pending(1).await);
        assert!(!pending.confirm(1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn rerequest_restarts_window() {
        let pending = PendingConfirmations::new(Duration::from_secs(30));
        pending.request(1).await;
        tokio::time::sleep(Duration::from_secs(20)).await;
        pending.request(1).await;

        // Past the first deadline: the stale timer must not remove the new entry.
        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(pending.is_pending(1).await);
        assert!(pending.confirm(1).await);
    }

    #[tokio::test(start_paused = true)]
    async fn users_are_independent() {
        let pending = PendingConfirmations::new(Duration::from_secs(30));
        pending.request(1).await;
        assert!(!pending.confirm(2).await);
        assert!(pending.is_pending(1).await);
    }
}
