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
    collections::{HashSet, VecDeque},
    fmt::Debug,
    hash::Hash,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::trace;
use tokio::sync::Notify;

struct State<T> {
    // order in which items are handed out, every element is also in `dirty`
    queue: VecDeque<T>,
    // items that need processing
    dirty: HashSet<T>,
    // items claimed by a worker, an item may be both dirty and processing
    processing: HashSet<T>,
    shutting_down: bool,
}

/// De-duplicating FIFO.
///
/// An item added while it is already pending is dropped. An item added while it is being
/// processed is parked and handed out again once the worker calls [`Queue::done`], so a
/// single item is never processed by two workers at the same time.
pub struct Queue<T> {
    state: Mutex<State<T>>,
    cond: Notify,
    drained: Notify,
}

impl<T> Default for Queue<T>
where
    T: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T>
where
    T: Clone + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Queue {
            state: Mutex::new(State {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            cond: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, item: T) {
        let mut state = self.lock();
        if state.shutting_down {
            trace!("queue is shutting down, ignore {:?}", item);
            return;
        }
        if state.dirty.contains(&item) {
            trace!("{:?} is already pending", item);
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            trace!("{:?} is being processed, requeue it when done", item);
            return;
        }
        state.queue.push_back(item);
        drop(state);
        self.cond.notify_one();
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next item and mark it as processing.
    ///
    /// Returns `None` once the queue is shutting down, even if items are still queued.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.cond.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
            }
            notified.await;
        }
    }

    /// Mark the item as done processing. If it was added again meanwhile it goes back
    /// to the tail of the queue.
    pub fn done(&self, item: &T) {
        let mut state = self.lock();
        state.processing.remove(item);
        let requeued = state.dirty.contains(item);
        if requeued {
            state.queue.push_back(item.clone());
        }
        let drained = state.processing.is_empty();
        drop(state);
        if requeued {
            self.cond.notify_one();
        }
        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Every pending and future `get` returns `None`, later adds are ignored.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.cond.notify_waiters();
    }

    /// Shut down, then wait until every in-flight item has been marked done.
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.lock().processing.is_empty() {
                return;
            }
            drained.await;
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }
}
