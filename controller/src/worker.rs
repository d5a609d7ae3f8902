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

use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc};

use anyhow::{anyhow, Result};
use futures::{
    future::{self, Either},
    FutureExt,
};
use log::{debug, error, info, warn};
use tokio::time::Duration;
use workqueue::RateLimitingQueue;

use crate::{
    cache::Cache,
    key::ObjectKey,
    reconciler::{Action, Reconciler},
};

/// Workers pulling keys from the queue and reconciling them one at a time each.
pub struct WorkerPool<K> {
    name: String,
    queue: Arc<RateLimitingQueue<ObjectKey>>,
    cache: Arc<dyn Cache<K>>,
    reconciler: Arc<dyn Reconciler<K>>,
    max_retries: u32,
    reconcile_period: Option<Duration>,
}

impl<K> WorkerPool<K>
where
    K: Send + Sync + 'static,
{
    pub fn new(
        name: &str,
        queue: Arc<RateLimitingQueue<ObjectKey>>,
        cache: Arc<dyn Cache<K>>,
        reconciler: Arc<dyn Reconciler<K>>,
        max_retries: u32,
        reconcile_period: Option<Duration>,
    ) -> Self {
        WorkerPool { name: name.to_string(), queue, cache, reconciler, max_retries, reconcile_period }
    }

    /// Runs `workers` workers until the queue is shut down or `shutdown` completes, then
    /// waits for every worker to finish the key it is holding.
    pub async fn run<F>(self: Arc<Self>, workers: usize, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let workers = workers.max(1);
        info!("{}: starting {} worker(s)", self.name, workers);
        let handles: Vec<_> = (0..workers)
            .map(|id| {
                let pool = self.clone();
                tokio::spawn(async move { pool.work(id).await })
            })
            .collect();

        let joined = Box::pin(future::join_all(handles));
        let results = match future::select(joined, Box::pin(shutdown)).await {
            Either::Left((results, _)) => results,
            Either::Right(((), joined)) => {
                info!("{}: shutdown requested, stopping workers", self.name);
                self.queue.shut_down();
                joined.await
            },
        };
        for result in results {
            if let Err(e) = result {
                error!("{}: worker exited abnormally: {}", self.name, e);
            }
        }
        info!("{}: all workers stopped", self.name);
    }

    async fn work(&self, id: usize) {
        debug!("{}: worker {} started", self.name, id);
        while self.process_next_item().await {}
        debug!("{}: worker {} stopped", self.name, id);
    }

    /// Takes one key from the queue and reconciles it. Returns false once the queue is
    /// shut down.
    pub async fn process_next_item(&self) -> bool {
        let key = match self.queue.get().await {
            Some(key) => key,
            None => return false,
        };
        let result = self.reconcile_key(&key).await;
        self.handle_result(&key, result);
        self.queue.done(&key);
        true
    }

    async fn reconcile_key(&self, key: &ObjectKey) -> Result<Action> {
        let object = self.cache.get_by_key(key)?;
        match AssertUnwindSafe(async { self.reconciler.reconcile(key, object).await }).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(anyhow!("reconcile panicked: {}", panic_message(payload.as_ref()))),
        }
    }

    fn handle_result(&self, key: &ObjectKey, result: Result<Action>) {
        match result {
            Ok(action) => {
                self.queue.forget(key);
                match action.requeue_after.or(self.reconcile_period) {
                    Some(delay) => {
                        debug!("{}: reconciled {}, requeue after {:?}", self.name, key, delay);
                        self.queue.add_after(key.clone(), delay);
                    },
                    None => debug!("{}: reconciled {}", self.name, key),
                }
            },
            Err(e) => {
                let failures = self.queue.num_requeues(key).saturating_add(1);
                if failures < self.max_retries {
                    warn!(
                        "{}: reconcile {} failed ({}/{}), will retry: {:#}",
                        self.name, key, failures, self.max_retries, e
                    );
                    self.queue.add_rate_limited(key.clone());
                } else {
                    error!(
                        "{}: dropping {} out of the queue after {} failure(s): {:#}",
                        self.name, key, failures, e
                    );
                    self.queue.forget(key);
                    // a retry scheduled before an event re-queued the key must not revive it
                    self.queue.cancel(key);
                }
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
