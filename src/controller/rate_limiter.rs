//! # Rate Limiters
//!
//! Delay policies for re-adding work items to the queue.
//!
//! The default controller limiter is the maximum of a per-item exponential
//! backoff and an overall token bucket:
//!
//! - per item: 5ms, 10ms, 20ms, ... capped at 1000s
//! - overall: 10 items/s with a burst of 100, backed by `governor`

use crate::constants::{
    DEFAULT_BUCKET_BURST, DEFAULT_BUCKET_QPS, DEFAULT_ITEM_BACKOFF_BASE_MS,
    DEFAULT_ITEM_BACKOFF_MAX_SECS,
};
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::num::NonZeroU32;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Slowest refill the bucket accepts (one token every 1000s)
const MIN_BUCKET_QPS: f64 = 0.001;

/// Decides how long an item waits before it is re-added
pub trait RateLimiter<T>: Send + Sync + Debug {
    /// Delay before the item may be processed again; counts as one failure
    fn when(&self, item: &T) -> Duration;

    /// Stop tracking the item, resetting its failure count
    fn forget(&self, item: &T);

    /// Number of failures recorded for the item
    fn num_requeues(&self, item: &T) -> u32;
}

/// Exponential per-item backoff: `base * 2^failures`, capped at `max`
#[derive(Debug)]
pub struct ItemExponentialFailureRateLimiter<T> {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<T, u32>>,
}

impl<T> ItemExponentialFailureRateLimiter<T> {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> RateLimiter<T> for ItemExponentialFailureRateLimiter<T>
where
    T: Clone + Eq + Hash + Send + Debug,
{
    fn when(&self, item: &T) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(item.clone()).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);

        // 2^31 * base already dwarfs any sane max
        let factor = 2u32.checked_pow(exponent.min(31)).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |delay| delay.min(self.max))
    }

    fn forget(&self, item: &T) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(item)
            .copied()
            .unwrap_or(0)
    }
}

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Overall token bucket shared by every item
///
/// When the bucket is empty the returned delay is the time until the next token
/// is available. A denied `when` does not consume a token.
pub struct BucketRateLimiter {
    qps: f64,
    burst: NonZeroU32,
    clock: DefaultClock,
    limiter: DirectLimiter,
}

impl fmt::Debug for BucketRateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketRateLimiter")
            .field("qps", &self.qps)
            .field("burst", &self.burst)
            .finish_non_exhaustive()
    }
}

impl BucketRateLimiter {
    pub fn new(qps: f64, burst: u32) -> Self {
        let qps = qps.max(MIN_BUCKET_QPS);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(Duration::from_secs_f64(1.0 / qps))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);
        let clock = DefaultClock::default();
        let limiter = governor::RateLimiter::direct_with_clock(quota, &clock);

        Self {
            qps,
            burst,
            clock,
            limiter,
        }
    }
}

impl<T> RateLimiter<T> for BucketRateLimiter {
    fn when(&self, _item: &T) -> Duration {
        match self.limiter.check() {
            Ok(()) => Duration::ZERO,
            Err(not_until) => not_until.wait_time_from(self.clock.now()),
        }
    }

    fn forget(&self, _item: &T) {}

    fn num_requeues(&self, _item: &T) -> u32 {
        0
    }
}

/// Combines limiters, waiting for the slowest of them
#[derive(Debug)]
pub struct MaxOfRateLimiter<T> {
    limiters: Vec<Box<dyn RateLimiter<T>>>,
}

impl<T> MaxOfRateLimiter<T> {
    pub fn new(limiters: Vec<Box<dyn RateLimiter<T>>>) -> Self {
        Self { limiters }
    }
}

impl<T: Debug> RateLimiter<T> for MaxOfRateLimiter<T> {
    fn when(&self, item: &T) -> Duration {
        self.limiters
            .iter()
            .map(|limiter| limiter.when(item))
            .max()
            .unwrap_or(Duration::ZERO)
    }

    fn forget(&self, item: &T) {
        for limiter in &self.limiters {
            limiter.forget(item);
        }
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.limiters
            .iter()
            .map(|limiter| limiter.num_requeues(item))
            .max()
            .unwrap_or(0)
    }
}

/// The limiter every controller queue starts with
pub fn default_controller_rate_limiter<T>() -> MaxOfRateLimiter<T>
where
    T: Clone + Eq + Hash + Send + Sync + Debug + 'static,
{
    MaxOfRateLimiter::new(vec![
        Box::new(ItemExponentialFailureRateLimiter::new(
            Duration::from_millis(DEFAULT_ITEM_BACKOFF_BASE_MS),
            Duration::from_secs(DEFAULT_ITEM_BACKOFF_MAX_SECS),
        )),
        Box::new(BucketRateLimiter::new(
            DEFAULT_BUCKET_QPS,
            DEFAULT_BUCKET_BURST,
        )),
    ])
}
