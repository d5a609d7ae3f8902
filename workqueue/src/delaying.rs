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
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    fmt::Debug,
    hash::Hash,
    sync::Arc,
};

use log::{debug, trace};
use tokio::{
    sync::{mpsc, Notify},
    time::{sleep_until, Duration, Instant},
};

use crate::{queue::Queue, values::MAX_TIMER_WAIT};

struct WaitFor<T> {
    item: T,
    ready_at: Instant,
}

enum Timer<T> {
    Schedule(WaitFor<T>),
    Cancel(T),
}

// BinaryHeap is a max-heap, reverse the order so the earliest deadline is on top
impl<T> PartialEq for WaitFor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at == other.ready_at
    }
}

impl<T> Eq for WaitFor<T> {}

impl<T> PartialOrd for WaitFor<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for WaitFor<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.ready_at.cmp(&self.ready_at)
    }
}

/// [`Queue`] that can add an item back after a delay.
///
/// Delays are kept by a single background task, no worker is ever blocked by them. If the
/// same item is scheduled several times only the earliest deadline is kept.
pub struct DelayingQueue<T> {
    queue: Arc<Queue<T>>,
    waiting_tx: mpsc::UnboundedSender<Timer<T>>,
    stop: Arc<Notify>,
}

impl<T> DelayingQueue<T>
where
    T: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Create the queue and spawn its timer task, must be called within a tokio runtime.
    pub fn new() -> Self {
        let queue = Arc::new(Queue::new());
        let (waiting_tx, waiting_rx) = mpsc::unbounded_channel();
        let stop = Arc::new(Notify::new());
        tokio::spawn(waiting_loop(queue.clone(), waiting_rx, stop.clone()));
        DelayingQueue { queue, waiting_tx, stop }
    }

    pub fn add(&self, item: T) {
        self.queue.add(item)
    }

    pub fn add_after(&self, item: T, delay: Duration) {
        if self.queue.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.queue.add(item);
            return;
        }
        let ready_at = Instant::now() + delay;
        if self.waiting_tx.send(Timer::Schedule(WaitFor { item, ready_at })).is_err() {
            debug!("delay timer already stopped, drop delayed item");
        }
    }

    /// Discard the pending deadline of the item, if any. An item already handed to the
    /// queue stays there.
    pub fn cancel(&self, item: &T) {
        if self.waiting_tx.send(Timer::Cancel(item.clone())).is_err() {
            trace!("delay timer already stopped, nothing to cancel for {:?}", item);
        }
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
        self.queue.shut_down();
        self.stop.notify_one();
    }

    pub async fn shut_down_with_drain(&self) {
        self.stop.notify_one();
        self.queue.shut_down_with_drain().await
    }

    pub fn is_shutting_down(&self) -> bool {
        self.queue.is_shutting_down()
    }
}

async fn waiting_loop<T>(queue: Arc<Queue<T>>, mut waiting_rx: mpsc::UnboundedReceiver<Timer<T>>, stop: Arc<Notify>)
where
    T: Clone + Eq + Hash + Debug,
{
    let mut heap: BinaryHeap<WaitFor<T>> = BinaryHeap::new();
    // latest deadline per item, heap entries with another deadline are stale
    let mut known: HashMap<T, Instant> = HashMap::new();
    loop {
        let now = Instant::now();
        while heap.peek().map_or(false, |w| w.ready_at <= now) {
            if let Some(w) = heap.pop() {
                if known.get(&w.item) == Some(&w.ready_at) {
                    known.remove(&w.item);
                    trace!("{:?} is ready", w.item);
                    queue.add(w.item);
                }
            }
        }
        let next = heap.peek().map_or(now + MAX_TIMER_WAIT, |w| w.ready_at);

        tokio::select! {
            _ = stop.notified() => {
                debug!("delaying queue is shutting down, {} item(s) discarded", known.len());
                return;
            }
            _ = sleep_until(next) => {}
            received = waiting_rx.recv() => match received {
                Some(Timer::Schedule(w)) => insert(&mut heap, &mut known, w),
                // heap entries without a matching deadline in `known` are skipped when popped
                Some(Timer::Cancel(item)) => {
                    if known.remove(&item).is_some() {
                        trace!("deadline of {:?} cancelled", item);
                    }
                },
                None => return,
            },
        }
    }
}

fn insert<T>(heap: &mut BinaryHeap<WaitFor<T>>, known: &mut HashMap<T, Instant>, w: WaitFor<T>)
where
    T: Clone + Eq + Hash,
{
    match known.get(&w.item) {
        Some(ready_at) if *ready_at <= w.ready_at => {},
        _ => {
            known.insert(w.item.clone(), w.ready_at);
            heap.push(w);
        },
    }
}
