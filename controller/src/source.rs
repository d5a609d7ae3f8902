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

use std::{collections::HashSet, fmt::Debug, future::Future, hash::Hash};

use futures::StreamExt;
use kube::{
    api::{Api, ListParams},
    runtime::{
        reflector::{store::Writer, ObjectRef, Store},
        watcher,
    },
    Resource,
};
use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use tokio::time::{sleep, Duration};
use tokio_retry::strategy::{jitter, ExponentialBackoff};

use crate::{
    cache::ReflectorCache,
    event::WatchEvent,
    handler::Dispatcher,
    values::{WATCH_RETRY_BASE_MILLIS, WATCH_RETRY_FACTOR, WATCH_RETRY_MAX_DELAY},
};

/// Keeps the local copy of watched objects and fans their changes out to dispatchers.
pub struct Informer<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash,
{
    writer: Writer<K>,
    store: Store<K>,
    dispatchers: Vec<Dispatcher<K>>,
}

impl<K> Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn new() -> Self {
        let writer = Writer::default();
        let store = writer.as_reader();
        Informer { writer, store, dispatchers: Vec::new() }
    }

    pub fn cache(&self) -> ReflectorCache<K> {
        ReflectorCache::new(self.store.clone())
    }

    pub fn dispatch_to(&mut self, dispatcher: Dispatcher<K>) {
        self.dispatchers.push(dispatcher);
    }

    /// Updates the store first so that reconcilers triggered by the event read the new state.
    pub fn apply(&mut self, event: watcher::Event<K>) {
        let events = self.translate(&event);
        self.writer.apply_watcher_event(&event);
        for e in &events {
            for dispatcher in &self.dispatchers {
                dispatcher.handle(e);
            }
        }
    }

    fn translate(&self, event: &watcher::Event<K>) -> Vec<WatchEvent<K>> {
        match event {
            watcher::Event::Applied(obj) => vec![self.applied(obj)],
            watcher::Event::Deleted(obj) => vec![WatchEvent::Delete(obj.clone())],
            watcher::Event::Restarted(objs) => {
                let listed: HashSet<ObjectRef<K>> = objs.iter().map(ObjectRef::from_obj).collect();
                let mut events: Vec<WatchEvent<K>> = self
                    .store
                    .state()
                    .into_iter()
                    .filter(|old| !listed.contains(&ObjectRef::from_obj(old)))
                    .map(WatchEvent::Delete)
                    .collect();
                events.extend(objs.iter().map(|obj| self.applied(obj)));
                events
            },
        }
    }

    fn applied(&self, obj: &K) -> WatchEvent<K> {
        match self.store.get(&ObjectRef::from_obj(obj)) {
            Some(old) => WatchEvent::Update { old, new: obj.clone() },
            None => WatchEvent::Create(obj.clone()),
        }
    }
}

impl<K> Default for Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

fn watch_backoff() -> impl Iterator<Item = Duration> + Send {
    ExponentialBackoff::from_millis(WATCH_RETRY_BASE_MILLIS)
        .factor(WATCH_RETRY_FACTOR)
        .max_delay(WATCH_RETRY_MAX_DELAY)
        .map(jitter)
}

/// Watch of one resource kind through the API server, feeding an [`Informer`].
pub struct WatchSource<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash,
{
    api: Api<K>,
    list_params: ListParams,
    informer: Informer<K>,
}

impl<K> WatchSource<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn new(api: Api<K>, list_params: ListParams) -> Self {
        WatchSource { api, list_params, informer: Informer::new() }
    }

    pub fn cache(&self) -> ReflectorCache<K> {
        self.informer.cache()
    }

    pub fn dispatch_to(&mut self, dispatcher: Dispatcher<K>) {
        self.informer.dispatch_to(dispatcher)
    }

    /// Watches until `shutdown` completes. Errors of the watch stream are retried with a
    /// jittered exponential backoff, the stream itself relists when needed.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let kind = K::kind(&K::DynamicType::default()).to_string();
        info!("start watching {}", kind);
        let mut stream = watcher(self.api.clone(), self.list_params.clone()).boxed();
        let mut backoff = watch_backoff();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = stream.next() => match event {
                    Some(Ok(event)) => {
                        backoff = watch_backoff();
                        self.informer.apply(event);
                    },
                    Some(Err(e)) => {
                        let delay = backoff.next().unwrap_or(WATCH_RETRY_MAX_DELAY);
                        warn!("watch {} reported error: {}, retry in {:.2}s", kind, e, delay.as_secs_f64());
                        tokio::select! {
                            _ = &mut shutdown => break,
                            _ = sleep(delay) => debug!("retry watching {}", kind),
                        }
                    },
                    None => {
                        warn!("watch stream of {} ended", kind);
                        break;
                    },
                },
            }
        }
        info!("stop watching {}", kind);
    }
}
