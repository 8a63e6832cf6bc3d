//! Debounced background saves.
//!
//! A save scheduled for a key waits out the delay and then runs, unless
//! another save for the same key is scheduled first, in which case the
//! earlier one is dropped without running.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::DEFAULT_AUTOSAVE_DELAY_MS;

/// Identifies one user's pick on one match of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PickKey {
    pub pool_id: String,
    pub match_id: String,
    pub user_id: String,
}

impl PickKey {
    pub fn new(pool_id: &str, match_id: &str, user_id: &str) -> Self {
        PickKey {
            pool_id: pool_id.to_string(),
            match_id: match_id.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

struct PendingSave {
    ticket: u64,
    handle: JoinHandle<()>,
}

type PendingMap<K> = Arc<Mutex<HashMap<K, PendingSave>>>;

fn lock<K>(pending: &Mutex<HashMap<K, PendingSave>>) -> MutexGuard<'_, HashMap<K, PendingSave>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct AutosaveScheduler<K> {
    delay: Duration,
    pending: PendingMap<K>,
    tickets: AtomicU64,
}

impl<K> Default for AutosaveScheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_AUTOSAVE_DELAY_MS))
    }
}

impl<K> AutosaveScheduler<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new(delay: Duration) -> Self {
        AutosaveScheduler {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `save` once the delay has passed, replacing whatever was pending
    /// for `key`.
    pub fn schedule<F>(&self, key: K, save: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let ticket = self.tickets.fetch_add(1, Ordering::Relaxed);
        let due = Instant::now() + self.delay;
        let pending = Arc::clone(&self.pending);
        let task_key = key.clone();

        // Spawned under the lock so the task cannot look for its entry
        // before it has been inserted.
        let mut guard = lock(&self.pending);
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(due).await;
            {
                // A cancel or reschedule may have won the lock after the timer
                // fired; the abort then lands too late, so the entry decides.
                let mut pending = lock(&pending);
                if !pending.get(&task_key).is_some_and(|entry| entry.ticket == ticket) {
                    return;
                }
                pending.remove(&task_key);
            }
            save.await;
        });

        if let Some(previous) = guard.insert(key, PendingSave { ticket, handle }) {
            previous.handle.abort();
        }
    }

    /// Drop the pending save for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.pending).remove(key) {
            Some(previous) => {
                previous.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<PendingSave> = lock(&self.pending).drain().map(|(_, save)| save).collect();
        if !drained.is_empty() {
            tracing::debug!(cancelled = drained.len(), "Pending autosaves cancelled");
        }
        for save in drained {
            save.handle.abort();
        }
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl<K> Drop for AutosaveScheduler<K> {
    fn drop(&mut self) {
        for (_, save) in lock(&self.pending).drain() {
            save.handle.abort();
        }
    }
}
