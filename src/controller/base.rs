//! # Reconciliation Engine
//!
//! Generic worker-pooled event loop shared by every controller:
//! `list → enqueue → dequeue → process → sync`, with a periodic full resync.
//!
//! Retries come from the resync: every resource is re-listed and re-enqueued once
//! per `sync_interval`, so a failed sync is revisited on the next pass. With
//! `requeue_on_error` a failed item is additionally re-added through the queue's
//! rate limiter.

use super::queue::RateLimitingQueue;
use super::reconciler::Reconciler;
use crate::config::ControllerConfig;
use crate::observability;
use anyhow::Result;
use futures::FutureExt;
use std::any::Any;
use std::fmt::Debug;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, Instrument};

/// Queue, worker pool and resync timer for one resource type
#[derive(Debug)]
pub struct BaseController<K> {
    name: Arc<str>,
    queue: Arc<RateLimitingQueue<K>>,
    workers: usize,
    sync_interval: Duration,
    requeue_on_error: bool,
}

impl<K> Clone for BaseController<K> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            queue: Arc::clone(&self.queue),
            workers: self.workers,
            sync_interval: self.sync_interval,
            requeue_on_error: self.requeue_on_error,
        }
    }
}

/// Marks the item done when the worker is finished with it, whichever way it exits
struct DoneGuard<'a, K>
where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
{
    queue: &'a RateLimitingQueue<K>,
    key: &'a K,
}

impl<K> Drop for DoneGuard<'_, K>
where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
{
    fn drop(&mut self) {
        self.queue.done(self.key);
    }
}

impl<K> BaseController<K>
where
    K: Clone + Eq + Hash + Send + Sync + Debug + 'static,
{
    pub fn new(name: &str, config: &ControllerConfig) -> Self {
        Self::with_queue(
            Arc::new(RateLimitingQueue::new(name)),
            config.workers,
            config.sync_interval(),
        )
        .requeue_on_error(config.requeue_on_error)
    }

    pub fn with_queue(
        queue: Arc<RateLimitingQueue<K>>,
        workers: usize,
        sync_interval: Duration,
    ) -> Self {
        Self {
            name: Arc::from(queue.name()),
            queue,
            workers: workers.max(1),
            sync_interval,
            requeue_on_error: false,
        }
    }

    #[must_use]
    pub fn requeue_on_error(mut self, enabled: bool) -> Self {
        self.requeue_on_error = enabled;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<RateLimitingQueue<K>> {
        &self.queue
    }

    /// Run workers and the resync loop until the token is cancelled
    ///
    /// On cancellation the queue is shut down, which releases idle workers.
    /// In-flight syncs run to completion before this returns.
    pub async fn start<R>(&self, token: CancellationToken, reconciler: Arc<R>)
    where
        R: Reconciler<Key = K> + 'static,
    {
        info!(
            controller = %self.name,
            workers = self.workers,
            sync_interval_secs = self.sync_interval.as_secs(),
            "Starting controller"
        );

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers {
            let this = self.clone();
            let reconciler = Arc::clone(&reconciler);
            workers.spawn(async move {
                while this.process_next_work_item(reconciler.as_ref()).await {}
                debug!(controller = %this.name, worker_id, "Worker stopped");
            });
        }

        let mut ticker = tokio::time::interval(self.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile_all(reconciler.as_ref()).await {
                        error!(controller = %self.name, "Resync failed: {:#}", e);
                        observability::metrics::increment_reconciliation_errors(&self.name, "list");
                    }
                }
            }
        }

        info!(controller = %self.name, "Stopping controller, draining workers");
        self.queue.shut_down();

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(controller = %self.name, "Worker task failed: {}", e);
            }
        }

        info!(controller = %self.name, "Controller stopped");
    }

    /// List every resource and enqueue it
    ///
    /// # Errors
    ///
    /// Returns the listing error; nothing is enqueued for that cycle.
    pub async fn reconcile_all<R>(&self, reconciler: &R) -> Result<()>
    where
        R: Reconciler<Key = K>,
    {
        let objects = reconciler.list_objects().await?;
        observability::metrics::increment_resyncs(&self.name);
        debug!(
            controller = %self.name,
            count = objects.len(),
            "Resync listed resources"
        );

        for object in objects {
            self.queue.add(object);
        }
        observability::metrics::set_queue_depth(&self.name, self.queue.len());
        Ok(())
    }

    /// Take one item off the queue and reconcile it
    ///
    /// Returns `false` once the queue is shutting down.
    pub async fn process_next_work_item<R>(&self, reconciler: &R) -> bool
    where
        R: Reconciler<Key = K>,
    {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let _done = DoneGuard {
            queue: &self.queue,
            key: &key,
        };

        let started = Instant::now();
        observability::metrics::increment_reconciliations(&self.name);
        observability::metrics::set_queue_depth(&self.name, self.queue.len());

        let object = match reconciler.process_object(&key).await {
            Ok(object) => object,
            Err(e) => {
                error!(controller = %self.name, "Failed to process work item: {:#}", e);
                observability::metrics::increment_reconciliation_errors(&self.name, "process");
                return true;
            }
        };

        let span = tracing::info_span!("controller.sync", controller = %self.name);
        let outcome = AssertUnwindSafe(reconciler.sync(object).instrument(span))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                if self.requeue_on_error {
                    self.queue.forget(&key);
                }
            }
            Ok(Err(e)) => {
                error!(controller = %self.name, "Sync failed: {:#}", e);
                self.on_sync_failure(&key);
            }
            Err(panic) => {
                error!(
                    controller = %self.name,
                    "Sync panicked: {}",
                    panic_message(panic.as_ref())
                );
                self.on_sync_failure(&key);
            }
        }

        observability::metrics::observe_reconciliation_duration(
            &self.name,
            started.elapsed().as_secs_f64(),
        );
        true
    }

    fn on_sync_failure(&self, key: &K) {
        observability::metrics::increment_reconciliation_errors(&self.name, "sync");
        if self.requeue_on_error {
            observability::metrics::increment_requeues(&self.name);
            self.queue.add_rate_limited(key.clone());
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
