/*
 * Copyright (c) Huawei Technologies Co., Ltd. 2024. All rights reserved.
 * oploop is licensed under the Mulan PSL v2.
 * You can use this software according to the terms and conditions of the Mulan PSL v2.
 * You may obtain a copy of Mulan PSL v2 at:
 *     http://license.coscl.org.cn/MulanPSL2
 * THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND, EITHER EXPRESS OR
 * IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR
 * PURPOSE.
 * See the Mulan PSL v2 for more details.
 */

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::time::{Duration, Instant};

use crate::values::{DEFAULT_BASE_DELAY, DEFAULT_BURST, DEFAULT_MAX_DELAY, DEFAULT_QPS};

pub trait RateLimiter<T>: Send + Sync {
    /// Delay before the item may be processed again. Counts as one more failure.
    fn when(&self, item: &T) -> Duration;
    /// Stop tracking the item, its failure count goes back to zero.
    fn forget(&self, item: &T);
    /// Number of failures recorded for the item.
    fn num_requeues(&self, item: &T) -> u32;
}

fn lock<V>(m: &Mutex<V>) -> MutexGuard<'_, V> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-item exponential backoff: `base_delay * 2^(failures - 1)`, capped at `max_delay`.
pub struct ItemExponentialFailureRateLimiter<T> {
    failures: Mutex<HashMap<T, u32>>,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> ItemExponentialFailureRateLimiter<T> {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        ItemExponentialFailureRateLimiter { failures: Mutex::new(HashMap::new()), base_delay, max_delay }
    }
}

impl<T> Default for ItemExponentialFailureRateLimiter<T> {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)
    }
}

impl<T> RateLimiter<T> for ItemExponentialFailureRateLimiter<T>
where
    T: Clone + Eq + Hash + Send,
{
    fn when(&self, item: &T) -> Duration {
        let mut failures = lock(&self.failures);
        let exp = failures.entry(item.clone()).or_insert(0);
        let backoff = 2u32.checked_pow(*exp).and_then(|factor| self.base_delay.checked_mul(factor));
        *exp = exp.saturating_add(1);
        match backoff {
            Some(delay) if delay < self.max_delay => delay,
            _ => self.max_delay,
        }
    }

    fn forget(&self, item: &T) {
        lock(&self.failures).remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        lock(&self.failures).get(item).copied().unwrap_or(0)
    }
}

/// `fast_delay` for the first `max_fast_attempts` failures, `slow_delay` afterwards.
pub struct ItemFastSlowRateLimiter<T> {
    failures: Mutex<HashMap<T, u32>>,
    fast_delay: Duration,
    slow_delay: Duration,
    max_fast_attempts: u32,
}

impl<T> ItemFastSlowRateLimiter<T> {
    pub fn new(fast_delay: Duration, slow_delay: Duration, max_fast_attempts: u32) -> Self {
        ItemFastSlowRateLimiter { failures: Mutex::new(HashMap::new()), fast_delay, slow_delay, max_fast_attempts }
    }
}

impl<T> RateLimiter<T> for ItemFastSlowRateLimiter<T>
where
    T: Clone + Eq + Hash + Send,
{
    fn when(&self, item: &T) -> Duration {
        let mut failures = lock(&self.failures);
        let attempts = failures.entry(item.clone()).or_insert(0);
        *attempts = attempts.saturating_add(1);
        if *attempts <= self.max_fast_attempts {
            self.fast_delay
        } else {
            self.slow_delay
        }
    }

    fn forget(&self, item: &T) {
        lock(&self.failures).remove(item);
    }

    fn num_requeues(&self, item: &T) -> u32 {
        lock(&self.failures).get(item).copied().unwrap_or(0)
    }
}

struct Bucket {
    tokens: f64,
    last: Instant,
}

/// Overall token bucket shared by every item. It keeps no per-item history, so
/// `num_requeues` is always zero. A non-positive `qps` disables the limit.
pub struct BucketRateLimiter {
    bucket: Mutex<Bucket>,
    qps: f64,
    burst: u32,
}

impl BucketRateLimiter {
    pub fn new(qps: f64, burst: u32) -> Self {
        BucketRateLimiter { bucket: Mutex::new(Bucket { tokens: f64::from(burst), last: Instant::now() }), qps, burst }
    }
}

impl<T> RateLimiter<T> for BucketRateLimiter {
    fn when(&self, _item: &T) -> Duration {
        if !(self.qps.is_finite() && self.qps > 0.0) {
            return Duration::ZERO;
        }
        let mut bucket = lock(&self.bucket);
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(bucket.last).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.qps).min(f64::from(self.burst));
        bucket.last = now;
        bucket.tokens -= 1.0;
        if bucket.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-bucket.tokens / self.qps)
        }
    }

    fn forget(&self, _item: &T) {}

    fn num_requeues(&self, _item: &T) -> u32 {
        0
    }
}

/// Combines several limiters and always picks the longest delay.
pub struct MaxOfRateLimiter<T> {
    limiters: Vec<Box<dyn RateLimiter<T>>>,
}

impl<T> MaxOfRateLimiter<T> {
    pub fn new(limiters: Vec<Box<dyn RateLimiter<T>>>) -> Self {
        MaxOfRateLimiter { limiters }
    }
}

impl<T> RateLimiter<T> for MaxOfRateLimiter<T> {
    fn when(&self, item: &T) -> Duration {
        // every limiter must see the failure, no short-circuit
        self.limiters.iter().map(|l| l.when(item)).fold(Duration::ZERO, Duration::max)
    }

    fn forget(&self, item: &T) {
        self.limiters.iter().for_each(|l| l.forget(item));
    }

    fn num_requeues(&self, item: &T) -> u32 {
        self.limiters.iter().map(|l| l.num_requeues(item)).max().unwrap_or(0)
    }
}

/// Per-item exponential backoff (5ms to 1000s) bounded by an overall 10 qps / 100 burst bucket.
pub fn default_controller_rate_limiter<T>() -> MaxOfRateLimiter<T>
where
    T: Clone + Eq + Hash + Send + 'static,
{
    let limiters: Vec<Box<dyn RateLimiter<T>>> = vec![
        Box::new(ItemExponentialFailureRateLimiter::new(DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY)),
        Box::new(BucketRateLimiter::new(DEFAULT_QPS, DEFAULT_BURST)),
    ];
    MaxOfRateLimiter::new(limiters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_sequence() {
        let limiter = ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), Duration::from_secs(1000));
        let key = "ns/a".to_string();
        let delays: Vec<Duration> = (0..5).map(|_| limiter.when(&key)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
            ]
        );
        assert_eq!(limiter.num_requeues(&key), 5);

        limiter.forget(&key);
        assert_eq!(limiter.num_requeues(&key), 0);
        assert_eq!(limiter.when(&key), Duration::from_millis(5));
    }

    #[test]
    fn test_exponential_is_monotonic_and_capped() {
        let max = Duration::from_secs(1000);
        let limiter = ItemExponentialFailureRateLimiter::new(Duration::from_millis(5), max);
        let mut previous = Duration::ZERO;
        // far beyond the point where 2^n overflows
        for _ in 0..100 {
            let delay = limiter.when(&"ns/a");
            assert!(delay >= previous);
            assert!(delay <= max);
            previous = delay;
        }
        assert_eq!(previous, max);
        assert_eq!(limiter.num_requeues(&"ns/a"), 100);
    }

    #[test]
    fn test_exponential_tracks_items_separately() {
        let limiter = ItemExponentialFailureRateLimiter::default();
        limiter.when(&"ns/a");
        limiter.when(&"ns/a");
        assert_eq!(limiter.when(&"ns/b"), DEFAULT_BASE_DELAY);
        assert_eq!(limiter.num_requeues(&"ns/a"), 2);
        assert_eq!(limiter.num_requeues(&"ns/b"), 1);
    }

    #[test]
    fn test_fast_slow() {
        let limiter = ItemFastSlowRateLimiter::new(Duration::from_millis(5), Duration::from_secs(10), 3);
        for _ in 0..3 {
            assert_eq!(limiter.when(&"ns/a"), Duration::from_millis(5));
        }
        assert_eq!(limiter.when(&"ns/a"), Duration::from_secs(10));
        assert_eq!(limiter.num_requeues(&"ns/a"), 4);

        limiter.forget(&"ns/a");
        assert_eq!(limiter.when(&"ns/a"), Duration::from_millis(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_allows_burst_then_throttles() {
        let limiter = BucketRateLimiter::new(10.0, 2);
        assert_eq!(RateLimiter::<&str>::when(&limiter, &"ns/a"), Duration::ZERO);
        assert_eq!(RateLimiter::<&str>::when(&limiter, &"ns/b"), Duration::ZERO);
        let delay = RateLimiter::<&str>::when(&limiter, &"ns/c");
        assert!(delay > Duration::from_millis(99) && delay <= Duration::from_millis(101));
        assert_eq!(RateLimiter::<&str>::num_requeues(&limiter, &"ns/c"), 0);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(RateLimiter::<&str>::when(&limiter, &"ns/d"), Duration::ZERO);
    }

    #[test]
    fn test_bucket_disabled_without_qps() {
        let limiter = BucketRateLimiter::new(0.0, 0);
        for _ in 0..10 {
            assert_eq!(RateLimiter::<&str>::when(&limiter, &"ns/a"), Duration::ZERO);
        }
    }

    #[test]
    fn test_max_of_picks_longest_delay() {
        let limiter: MaxOfRateLimiter<&str> = MaxOfRateLimiter::new(vec![
            Box::new(ItemExponentialFailureRateLimiter::new(Duration::from_millis(1), Duration::from_secs(1))),
            Box::new(ItemFastSlowRateLimiter::new(Duration::from_millis(5), Duration::from_secs(3), 2)),
        ]);
        assert_eq!(limiter.when(&"ns/a"), Duration::from_millis(5));
        assert_eq!(limiter.when(&"ns/a"), Duration::from_millis(5));
        assert_eq!(limiter.when(&"ns/a"), Duration::from_secs(3));
        assert_eq!(limiter.num_requeues(&"ns/a"), 3);

        limiter.forget(&"ns/a");
        assert_eq!(limiter.num_requeues(&"ns/a"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_controller_rate_limiter() {
        let limiter = default_controller_rate_limiter::<String>();
        let key = "ns/a".to_string();
        assert_eq!(limiter.when(&key), Duration::from_millis(5));
        assert_eq!(limiter.when(&key), Duration::from_millis(10));
        assert_eq!(limiter.num_requeues(&key), 2);
    }
}
