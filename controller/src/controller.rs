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

use std::{future::Future, num::NonZeroUsize, sync::Arc, thread};

use kube::Resource;
use log::info;
use tokio::time::Duration;
use workqueue::{
    values::{DEFAULT_BASE_DELAY, DEFAULT_BURST, DEFAULT_MAX_DELAY, DEFAULT_QPS},
    BucketRateLimiter, ItemExponentialFailureRateLimiter, MaxOfRateLimiter, RateLimiter, RateLimitingQueue,
};

use crate::{
    cache::Cache,
    handler::{Dispatcher, EventHandler},
    key::ObjectKey,
    reconciler::Reconciler,
    values::DEFAULT_MAX_RETRIES,
    worker::WorkerPool,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerConfig {
    pub workers: usize,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Requeue delay after a successful reconcile that did not ask for one.
    pub reconcile_period: Option<Duration>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            workers: thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            reconcile_period: None,
        }
    }
}

/// Reconciliation loop of one primary resource kind.
///
/// The controller owns its queue. Watches feed it through the [`Dispatcher`]s handed
/// out by [`watch`](Self::watch) and [`watch_dependent`](Self::watch_dependent), and
/// [`run`](Self::run) drains it with a pool of workers.
pub struct Controller<K> {
    name: String,
    queue: Arc<RateLimitingQueue<ObjectKey>>,
    workers: usize,
    pool: Arc<WorkerPool<K>>,
}

impl<K> Controller<K>
where
    K: Resource + Send + Sync + 'static,
    K::DynamicType: Default,
{
    /// Must be called within a tokio runtime.
    pub fn new(
        name: &str,
        cache: Arc<dyn Cache<K>>,
        reconciler: Arc<dyn Reconciler<K>>,
        config: ControllerConfig,
    ) -> Self {
        let limiters: Vec<Box<dyn RateLimiter<ObjectKey>>> = vec![
            Box::new(ItemExponentialFailureRateLimiter::new(config.base_delay, config.max_delay)),
            Box::new(BucketRateLimiter::new(DEFAULT_QPS, DEFAULT_BURST)),
        ];
        let queue = Arc::new(RateLimitingQueue::new(MaxOfRateLimiter::new(limiters)));
        let pool = Arc::new(WorkerPool::new(
            name,
            queue.clone(),
            cache,
            reconciler,
            config.max_retries,
            config.reconcile_period,
        ));
        Controller { name: name.to_string(), queue, workers: config.workers, pool }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> Arc<RateLimitingQueue<ObjectKey>> {
        self.queue.clone()
    }

    /// Dispatcher for events of the primary resource.
    pub fn watch(&self, handler: EventHandler) -> Dispatcher<K> {
        Dispatcher::new(&self.name, self.queue.clone(), handler)
    }

    /// Dispatcher for events of another kind whose changes concern the primary resource,
    /// usually with [`EventHandler::EnqueueForOwner`].
    pub fn watch_dependent<D>(&self, handler: EventHandler) -> Dispatcher<D>
    where
        D: Resource + 'static,
        D::DynamicType: Default,
    {
        Dispatcher::new(&self.name, self.queue.clone(), handler)
    }

    /// Reconciles until `shutdown` completes and every worker has stopped.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        info!("{}: controller started", self.name);
        self.pool.clone().run(self.workers, shutdown).await;
        info!("{}: controller stopped", self.name);
    }
}
