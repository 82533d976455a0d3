//! Retry policy for background saves.
//!
//! Saves are fire-and-forget from the gameplay thread's point of view. What
//! happens when one fails is decided here, explicitly: a save is attempted
//! up to [`PersistPolicy::max_attempts`] times with a linear backoff, and
//! every attempt re-snapshots the record it writes. A retry therefore never
//! sends a value older than one an earlier attempt already sent, which keeps
//! last-write-wins moving toward the in-memory truth.
//!
//! The default policy makes a single attempt: a failed save is logged and
//! the next mutation's save (or the next checkpoint) carries the state.

use std::time::Duration;

use progression_types::EntityId;
use tracing::{debug, error, warn};

use crate::adapter::PersistenceAdapter;

/// Default pause before the first retry, in milliseconds.
const DEFAULT_RETRY_BACKOFF_MS: u64 = 250;

/// How background saves react to adapter failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistPolicy {
    /// Total attempts per save, including the first. Zero is treated as one.
    pub max_attempts: u32,
    /// Pause before retry `n` is `n * retry_backoff`.
    pub retry_backoff: Duration,
}

impl PersistPolicy {
    /// One attempt, no retries.
    pub const fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            retry_backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }

    /// Up to `max_attempts` attempts with a linear `retry_backoff`.
    pub const fn with_retries(max_attempts: u32, retry_backoff: Duration) -> Self {
        Self {
            max_attempts,
            retry_backoff,
        }
    }

    fn attempts(self) -> u32 {
        self.max_attempts.max(1)
    }

    fn backoff_after(self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

impl Default for PersistPolicy {
    fn default() -> Self {
        Self::single_attempt()
    }
}

/// Persist one entity, taking a fresh snapshot before every attempt.
///
/// `snapshot` returning `None` ends the save without an error (the entity
/// was unloaded and its final save was issued by `unload`). Returns whether
/// a write succeeded.
pub(crate) async fn save_entity<R, F>(
    adapter: &dyn PersistenceAdapter<R>,
    domain: &str,
    id: EntityId,
    policy: PersistPolicy,
    mut snapshot: F,
) -> bool
where
    R: Send + Sync + 'static,
    F: FnMut() -> Option<R> + Send,
{
    let attempts = policy.attempts();
    let mut attempt: u32 = 1;
    loop {
        let Some(record) = snapshot() else {
            debug!(entity = %id, domain, "Record no longer cached, skipping save");
            return false;
        };
        match adapter.save_one(id, &record).await {
            Ok(()) => {
                debug!(entity = %id, domain, attempt, "Saved record");
                return true;
            }
            Err(e) if attempt < attempts => {
                warn!(entity = %id, domain, attempt, error = %e, "Save failed, retrying");
                tokio::time::sleep(policy.backoff_after(attempt)).await;
                attempt = attempt.saturating_add(1);
            }
            Err(e) => {
                error!(entity = %id, domain, attempt, error = %e, "Save failed, giving up");
                return false;
            }
        }
    }
}

/// Persist a batch, taking a fresh snapshot of all records before every
/// attempt. Returns whether a write succeeded.
pub(crate) async fn save_batch<R, F>(
    adapter: &dyn PersistenceAdapter<R>,
    domain: &str,
    policy: PersistPolicy,
    mut snapshot: F,
) -> bool
where
    R: Send + Sync + 'static,
    F: FnMut() -> Vec<(EntityId, R)> + Send,
{
    let attempts = policy.attempts();
    let mut attempt: u32 = 1;
    loop {
        let records = snapshot();
        if records.is_empty() {
            debug!(domain, "Nothing cached, skipping batch save");
            return true;
        }
        match adapter.save_all(&records).await {
            Ok(()) => {
                debug!(domain, count = records.len(), attempt, "Saved batch");
                return true;
            }
            Err(e) if attempt < attempts => {
                warn!(domain, count = records.len(), attempt, error = %e, "Batch save failed, retrying");
                tokio::time::sleep(policy.backoff_after(attempt)).await;
                attempt = attempt.saturating_add(1);
            }
            Err(e) => {
                error!(domain, count = records.len(), attempt, error = %e, "Batch save failed, giving up");
                return false;
            }
        }
    }
}
