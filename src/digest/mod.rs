//! Daily digest of active tasks.

pub mod scheduler;

use async_trait::async_trait;

use crate::dispatch::{active_tasks_reply, Reply};
use crate::error::Result;
use crate::ops::Operations;
use crate::store::ChatTarget;

pub use scheduler::{DigestSchedule, DigestScheduler};

/// Outbound side of the digest, implemented by the chat transport.
#[async_trait]
pub trait DigestSink: Send + Sync {
    /// Resolved destination ready to send to.
    type Handle: Send + Sync;

    /// Look the destination up among already-known chats. No network.
    async fn cached(&self, target: &ChatTarget) -> Option<Self::Handle>;

    /// Resolve the destination on demand.
    async fn fetch(&self, target: &ChatTarget) -> Result<Self::Handle>;

    async fn send(&self, handle: &Self::Handle, reply: &Reply) -> Result<()>;
}

/// What a digest run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestOutcome {
    /// No destination configured.
    NotConfigured,
    /// Destination could not be resolved or rejected the message.
    Unavailable,
    Sent { tasks: usize },
}

/// Render the active-task report and send it to the configured destination.
///
/// An unset or unreachable destination is not an error: it is logged and
/// reported through the outcome. Store failures propagate.
pub async fn run_digest<S>(ops: &Operations, sink: &S) -> Result<DigestOutcome>
where
    S: DigestSink + ?Sized,
{
    let Some(target) = ops.task_channel()? else {
        tracing::debug!("No digest channel configured, skipping");
        return Ok(DigestOutcome::NotConfigured);
    };

    let handle = match sink.cached(&target).await {
        Some(handle) => handle,
        None => match sink.fetch(&target).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Digest channel {} unavailable: {}", target, e);
                return Ok(DigestOutcome::Unavailable);
            }
        },
    };

    let tasks = ops.active_tasks()?;
    let reply = active_tasks_reply(&tasks);
    if let Err(e) = sink.send(&handle, &reply).await {
        tracing::warn!("Failed to deliver digest to {}: {}", target, e);
        return Ok(DigestOutcome::Unavailable);
    }

    tracing::info!("Sent digest with {} tasks to {}", tasks.len(), target);
    Ok(DigestOutcome::Sent { tasks: tasks.len() })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::Error;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Sink that records what it was asked to do.
    #[derive(Default)]
    pub struct RecordingSink {
        pub cached: HashSet<ChatTarget>,
        pub fetchable: HashSet<ChatTarget>,
        pub reject_sends: bool,
        pub fetches: AtomicUsize,
        pub sent: Mutex<Vec<(ChatTarget, Reply)>>,
    }

    impl RecordingSink {
        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DigestSink for RecordingSink {
        type Handle = ChatTarget;

        async fn cached(&self, target: &ChatTarget) -> Option<ChatTarget> {
            self.cached.get(target).cloned()
        }

        async fn fetch(&self, target: &ChatTarget) -> Result<ChatTarget> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.fetchable
                .get(target)
                .cloned()
                .ok_or_else(|| Error::Unavailable(format!("unknown chat {}", target)))
        }

        async fn send(&self, handle: &ChatTarget, reply: &Reply) -> Result<()> {
            if self.reject_sends {
                return Err(Error::Unavailable("chat deleted".to_string()));
            }
            self.sent.lock().unwrap().push((handle.clone(), reply.clone()));
            Ok(())
        }
    }
}
