//! Deduplicating, rate-limited work queue of reconciliation requests.
//!
//! Items are `(key, intent)` pairs where `key` is `"<namespace>/<name>"` of a
//! Submarine. The queue guarantees that a key is processed by at most one
//! worker at a time: a key handed to a worker is marked in-flight, and
//! re-adds while in-flight collapse into a single re-queue that becomes
//! ready when the worker calls [`WorkQueue::done`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;

/// What kind of parent delta produced a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// The parent was created.
    Add,
    /// The parent (or one of its children) changed.
    Update,
    /// The parent was deleted.
    Delete,
}

/// One queued reconciliation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// `"<namespace>/<name>"` of the parent.
    pub key: String,
    /// Collapsed intent for the key.
    pub intent: Intent,
}

/// Backoff for the nth consecutive failure of a key: exponential from 5 ms,
/// capped at 1000 s (the default controller rate-limiter parameters).
fn backoff_for(failures: u32) -> Duration {
    const BASE_MS: u64 = 5;
    const CAP: Duration = Duration::from_secs(1000);
    // 5ms << 28 already exceeds the cap.
    let shifted = if failures >= 28 {
        u64::MAX
    } else {
        BASE_MS << failures
    };
    Duration::from_millis(shifted).min(CAP)
}

/// A pending Delete supersedes anything; otherwise the later intent wins.
fn merge(old: Intent, new: Intent) -> Intent {
    if old == Intent::Delete || new == Intent::Delete {
        Intent::Delete
    } else {
        new
    }
}

struct Inner {
    ready: VecDeque<String>,
    pending: HashMap<String, Intent>,
    processing: HashSet<String>,
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

/// The shared work queue. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Mutex<Inner>>,
    notify: Arc<Notify>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                ready: VecDeque::new(),
                pending: HashMap::new(),
                processing: HashSet::new(),
                failures: HashMap::new(),
                shutting_down: false,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Enqueue an item. Duplicates collapse: a key already queued keeps a
    /// single slot and its intent is merged with the new one.
    pub fn add(&self, item: WorkItem) {
        let mut inner = self.lock();
        if inner.shutting_down {
            return;
        }

        match inner.pending.get(&item.key).copied() {
            Some(existing) => {
                let merged = merge(existing, item.intent);
                inner.pending.insert(item.key, merged);
            }
            None => {
                inner.pending.insert(item.key.clone(), item.intent);
                if !inner.processing.contains(&item.key) {
                    inner.ready.push_back(item.key);
                    drop(inner);
                    self.notify.notify_one();
                }
            }
        }
    }

    /// Pop the next ready item, waiting if none is available. Returns `None`
    /// once the queue has been shut down and drained. The returned key is
    /// in-flight until [`WorkQueue::done`] is called for it.
    pub async fn get(&self) -> Option<WorkItem> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(key) = inner.ready.pop_front() {
                    let intent = inner.pending.remove(&key).unwrap_or(Intent::Update);
                    inner.processing.insert(key.clone());
                    // Wake another waiter in case more items are ready.
                    if !inner.ready.is_empty() {
                        self.notify.notify_one();
                    }
                    return Some(WorkItem { key, intent });
                }
                if inner.shutting_down {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Release the in-flight mark for a key. A key re-added while in-flight
    /// becomes ready immediately.
    pub fn done(&self, key: &str) {
        let mut inner = self.lock();
        inner.processing.remove(key);
        if inner.pending.contains_key(key) {
            inner.ready.push_back(key.to_string());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Re-enqueue after the key's current backoff, then bump its failure
    /// counter.
    pub fn add_rate_limited(&self, item: WorkItem) {
        let delay = {
            let mut inner = self.lock();
            if inner.shutting_down {
                return;
            }
            let failures = inner.failures.entry(item.key.clone()).or_insert(0);
            let delay = backoff_for(*failures);
            *failures += 1;
            delay
        };

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Reset the failure counter for a key after a successful sync.
    pub fn forget(&self, key: &str) {
        self.lock().failures.remove(key);
    }

    /// Stop accepting items and let `get` return `None` once drained.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of items currently ready (excludes in-flight keys).
    pub fn len(&self) -> usize {
        self.lock().ready.len()
    }

    /// True when no items are ready.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
