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

use std::{fmt::Debug, hash::Hash};

use log::debug;
use tokio::time::Duration;

use crate::{
    delaying::DelayingQueue,
    rate_limiter::{default_controller_rate_limiter, RateLimiter},
};

/// Work queue of a controller.
///
/// Workers take an item with [`get`](Self::get) and must always hand it back with
/// [`done`](Self::done). On failure they call [`add_rate_limited`](Self::add_rate_limited),
/// on success [`forget`](Self::forget). The queue only counts failures, deciding when to
/// give up is left to the caller through [`num_requeues`](Self::num_requeues).
pub struct RateLimitingQueue<T> {
    queue: DelayingQueue<T>,
    rate_limiter: Box<dyn RateLimiter<T>>,
}

impl<T> RateLimitingQueue<T>
where
    T: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Must be called within a tokio runtime, see [`DelayingQueue::new`].
    pub fn new<R>(rate_limiter: R) -> Self
    where
        R: RateLimiter<T> + 'static,
    {
        RateLimitingQueue { queue: DelayingQueue::new(), rate_limiter: Box::new(rate_limiter) }
    }

    pub fn with_default_rate_limiter() -> Self {
        Self::new(default_controller_rate_limiter())
    }

    pub fn add(&self, item: T) {
        self.queue.add(item)
    }

    pub fn add_after(&self, item: T, delay: Duration) {
        self.queue.add_after(item, delay)
    }

    /// Schedule the item after the delay its failure history calls for, and record one
    /// more failure.
    pub fn add_rate_limited(&self, item: T) {
        let delay = self.rate_limiter.when(&item);
        debug!("requeue {:?} after {:?}", item, delay);
        self.queue.add_after(item, delay)
    }

    pub fn forget(&self, item: &T) {
        self.rate_limiter.forget(item)
    }

    /// Discard a pending delayed add of the item, see [`DelayingQueue::cancel`].
    pub fn cancel(&self, item: &T) {
        self.queue.cancel(item)
    }

    pub fn num_requeues(&self, item: &T) -> u32 {
        self.rate_limiter.num_requeues(item)
    }

    pub async fn get(&self) -> Option<T> {
        self.queue.get().await
    }

    pub fn done(&self, item: &T) {
        self.queue.done(item)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn shut_down(&self) {
        self.queue.shut_down()
    }

    pub async fn shut_down_with_drain(&self) {
        self.queue.shut_down_with_drain().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }
}
