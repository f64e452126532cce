//! # Rate-Limited Work Queue
//!
//! Deduplicating FIFO shared by a controller's workers.
//!
//! - An item added while it is already queued collapses into the pending entry.
//! - An item added while a worker is processing it is held back and queued once
//!   `done` is called, so two workers never hold the same item from one `get`.
//! - `shut_down` wakes every blocked `get`, which then returns `None`.

use super::rate_limiter::{default_controller_rate_limiter, RateLimiter};
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

#[derive(Debug)]
struct QueueState<T> {
    queue: VecDeque<T>,
    /// Items waiting to be processed
    dirty: HashSet<T>,
    /// Items currently handed out to a worker
    processing: HashSet<T>,
    shutting_down: bool,
}

/// Work queue with deduplication, delayed adds and rate-limited re-adds
#[derive(Debug)]
pub struct RateLimitingQueue<T> {
    name: String,
    state: Mutex<QueueState<T>>,
    notify: Notify,
    rate_limiter: Box<dyn RateLimiter<T>>,
}

impl<T> RateLimitingQueue<T>
where
    T: Clone + Eq + Hash + Send + Sync + Debug + 'static,
{
    /// Create a queue using the default controller rate limiter
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_rate_limiter(name, Box::new(default_controller_rate_limiter()))
    }

    pub fn with_rate_limiter(name: impl Into<String>, rate_limiter: Box<dyn RateLimiter<T>>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            rate_limiter,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an item; ignored after shutdown or when the item is already pending
    pub fn add(&self, item: T) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            // Queued again by `done`
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.notify.notify_one();
    }

    /// Wait for the next item; `None` once the queue is shutting down
    ///
    /// Items left in the queue at shutdown are not handed out.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent add or shutdown
            // cannot slip between the check and the await.
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on in case it was ours that got consumed
                        self.notify.notify_one();
                    }
                    return Some(item);
                }
            }

            notified.await;
        }
    }

    /// Mark an item as processed; if it was re-added meanwhile it is queued again
    pub fn done(&self, item: &T) {
        let mut state = self.lock();
        state.processing.remove(item);
        if state.dirty.contains(item) {
            state.queue.push_back(item.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Stop accepting items and release every blocked `get`
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
        debug!(queue = %self.name, "Work queue shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of items waiting to be handed out
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add the item after `delay`
    pub fn add_after(self: &Arc<Self>, item: T, delay: Duration) {
        if delay.is_zero() {
            self.add(item);
            return;
        }
        if self.is_shutting_down() {
            return;
        }
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(item);
        });
    }

    /// Add the item once the rate limiter allows it
    pub fn add_rate_limited(self: &Arc<Self>, item: T) {
        let delay = self.rate_limiter.when(&item);
        debug!(queue = %self.name, item = ?item, ?delay, "Rate-limited re-add");
        self.add_after(item, delay);
    }

    /// Reset the rate limiter's failure tracking for the item
    pub fn forget(&self, item: &T) {
        self.rate_limiter.forget(item);
    }

    pub fn num_requeues(&self, item: &T) -> u32 {
        self.rate_limiter.num_requeues(item)
    }
}
